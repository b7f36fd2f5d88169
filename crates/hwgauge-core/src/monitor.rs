//! The query engine.

use crate::calibration::SaveThrottle;
use crate::composite::{self, GpuReading};
use crate::hardware::{walk, HardwareHandle, SensorProvider};
use crate::keys::{self, Channel, DeviceClass, Route};
use crate::last_valid::LastValid;
use crate::preferences::{NullStore, PreferenceStore, Preferences};
use crate::selector::{self, DeviceSelector, SelectionInputs};
use crate::sensor_map::SensorMap;
use crate::traffic::TrafficSource;
use crate::{Calibration, Result, MAP_MAX_AGE_SECS};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Slow nodes are not refreshed again this soon after a map build.
const POST_BUILD_GRACE: Duration = Duration::from_secs(3);

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Sensor map age that triggers a rebuild on the next query.
    pub map_max_age: Duration,
    /// Idle time before the network selector rescans.
    pub network_cooldown: Duration,
    /// Idle time before the disk selector rescans.
    pub disk_cooldown: Duration,
    /// Minimum time between calibration saves.
    pub calibration_save_interval: Duration,
    /// Boot volume name fragment. Detected from the OS when `None`.
    pub boot_volume: Option<String>,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            map_max_age: Duration::from_secs(MAP_MAX_AGE_SECS),
            network_cooldown: DeviceClass::Network.default_cooldown(),
            disk_cooldown: DeviceClass::Disk.default_cooldown(),
            calibration_save_interval: Duration::from_secs(30),
            boot_volume: None,
        }
    }
}

/// Resolves metric keys against a sensor provider.
///
/// All methods take `&self`; each cache sits behind its own lock so the
/// monitor can be shared between a refresh driver and concurrent readers.
pub struct HardwareMonitor {
    provider: Arc<dyn SensorProvider>,
    available: bool,
    options: MonitorOptions,
    boot_volume: Option<String>,
    map: RwLock<SensorMap>,
    network: Mutex<DeviceSelector>,
    disk: Mutex<DeviceSelector>,
    last_valid: Mutex<LastValid>,
    preferences: Mutex<Preferences>,
    store: Box<dyn PreferenceStore>,
    throttle: Mutex<SaveThrottle>,
    traffic: Option<Arc<dyn TrafficSource>>,
    generation: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl HardwareMonitor {
    /// Opens `provider`. A provider that fails to open leaves the monitor
    /// serving no data instead of failing.
    pub fn new(provider: Arc<dyn SensorProvider>, options: MonitorOptions) -> Self {
        let available = match provider.open() {
            Ok(()) => true,
            Err(e) => {
                warn!("{}; all readings will be empty", e);
                false
            }
        };

        let boot_volume = options
            .boot_volume
            .clone()
            .filter(|v| !v.trim().is_empty())
            .or_else(selector::boot_volume_marker);
        if let Some(marker) = &boot_volume {
            debug!("Boot volume marker: {}", marker);
        }

        Self {
            provider,
            available,
            boot_volume,
            map: RwLock::new(SensorMap::empty()),
            network: Mutex::new(DeviceSelector::new(
                DeviceClass::Network,
                options.network_cooldown,
            )),
            disk: Mutex::new(DeviceSelector::new(DeviceClass::Disk, options.disk_cooldown)),
            last_valid: Mutex::new(LastValid::new()),
            preferences: Mutex::new(Preferences::default()),
            store: Box::new(NullStore),
            throttle: Mutex::new(SaveThrottle::new(options.calibration_save_interval)),
            traffic: None,
            generation: AtomicU64::new(0),
            options,
        }
    }

    /// Loads persisted preferences and routes write-backs to `store`.
    pub fn with_preferences(mut self, preferences: Preferences, store: Box<dyn PreferenceStore>) -> Self {
        self.preferences = Mutex::new(preferences);
        self.store = store;
        self
    }

    /// Attaches the source of the `DATA.Day*` keys.
    pub fn with_traffic(mut self, traffic: Arc<dyn TrafficSource>) -> Self {
        self.traffic = Some(traffic);
        self
    }

    /// Returns true if the provider opened.
    pub fn is_available(&self) -> bool {
        self.available
    }

    fn hardware(&self) -> Vec<HardwareHandle> {
        if self.available {
            self.provider.hardware()
        } else {
            Vec::new()
        }
    }

    /// Reads one metric.
    ///
    /// `None` means the key has never produced a valid reading; once it has,
    /// transient gaps return the last valid value instead.
    pub fn get(&self, key: &str) -> Option<f32> {
        self.ensure_fresh();

        let reading = match keys::route(key) {
            Route::Device(class, channel) => self.device_reading(class, channel),
            Route::Traffic(channel) => self.traffic_reading(channel),
            Route::Composite => self.composite_reading(key),
            Route::VramPercent => self.vram_reading(),
            Route::Direct => self.direct_reading(key),
        };

        lock(&self.last_valid).settle(key, reading)
    }

    /// Current rate of the selected `class` device, without the last-valid
    /// fallback.
    ///
    /// `None` when no device is selected or its sensor has no value. Use this
    /// for accounting, where a stale rate must not be counted again.
    pub fn live_rate(&self, class: DeviceClass, channel: Channel) -> Option<f32> {
        self.ensure_fresh();
        self.device_reading(class, channel).filter(|v| !v.is_nan())
    }

    /// Distinct device names of `class`, in discovery order.
    pub fn list_devices(&self, class: DeviceClass) -> Vec<String> {
        let kind = class.hardware_kind();
        let mut names: Vec<String> = Vec::new();
        walk(&self.hardware(), &mut |node| {
            if node.kind() == kind && !names.iter().any(|n| n == node.name()) {
                names.push(node.name().to_string());
            }
        });
        names
    }

    /// Refreshes live hardware and starts a new resolution pass.
    ///
    /// CPU and GPU nodes are refreshed on every call. Other nodes are skipped
    /// right after a map build, which already refreshed them.
    pub fn update_all(&self) {
        self.generation.fetch_add(1, Ordering::Relaxed);

        let built_recently = self
            .map
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .built_at()
            .map(|at| at.elapsed() < POST_BUILD_GRACE)
            .unwrap_or(false);

        walk(&self.hardware(), &mut |node| {
            if node.kind().is_fast() || !built_recently {
                node.refresh();
            }
        });
    }

    /// Rebuilds the sensor map now.
    pub fn rebuild(&self) {
        let map = SensorMap::build(&self.hardware());
        *self.map.write().unwrap_or_else(|e| e.into_inner()) = map;
    }

    /// Keys currently resolved by the sensor map.
    pub fn mapped_keys(&self) -> Vec<&'static str> {
        self.ensure_fresh();
        self.map.read().unwrap_or_else(|e| e.into_inner()).keys()
    }

    /// Snapshot of the preferences, including calibration.
    pub fn preferences(&self) -> Preferences {
        lock(&self.preferences).clone()
    }

    /// Snapshot of the calibration record.
    pub fn calibration(&self) -> Calibration {
        lock(&self.preferences).calibration.clone()
    }

    /// Pins (or with `None`, unpins) the device used for `class` and saves it.
    pub fn set_preferred_device(&self, class: DeviceClass, name: Option<String>) -> Result<()> {
        let snapshot = {
            let mut prefs = lock(&self.preferences);
            prefs.set_preferred(class, name.as_deref());
            prefs.clone()
        };
        match snapshot.preferred(class) {
            Some(name) => info!("Pinned {} device: {}", class, name),
            None => info!("Unpinned {} device", class),
        }
        self.store.save(&snapshot)
    }

    /// Writes the current preferences through the store regardless of throttling.
    pub fn save_preferences(&self) -> Result<()> {
        let snapshot = self.preferences();
        self.store.save(&snapshot)
    }

    fn ensure_fresh(&self) {
        let stale = self
            .map
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_stale(self.options.map_max_age);
        if !stale {
            return;
        }

        let mut map = self.map.write().unwrap_or_else(|e| e.into_inner());
        // Another caller may have rebuilt while we waited for the lock.
        if map.is_stale(self.options.map_max_age) {
            *map = SensorMap::build(&self.hardware());
        }
    }

    fn direct_reading(&self, key: &str) -> Option<f32> {
        let map = self.map.read().unwrap_or_else(|e| e.into_inner());
        map.get(key).and_then(|sensor| sensor.value())
    }

    fn composite_reading(&self, key: &str) -> Option<f32> {
        match key {
            keys::CPU_CLOCK => self.cpu_clock(),
            keys::CPU_POWER => {
                let power = self.direct_reading(key)?;
                self.record_max(key, power);
                Some(power)
            }
            keys::GPU_CLOCK | keys::GPU_POWER => self.gpu_reading(key),
            _ => self.direct_reading(key),
        }
    }

    fn cpu_clock(&self) -> Option<f32> {
        let (cores, correction) = {
            let map = self.map.read().unwrap_or_else(|e| e.into_inner());
            let cores: Vec<(Option<f32>, Option<f32>)> = map
                .cores()
                .iter()
                .map(|core| {
                    (
                        core.clock.as_ref().and_then(|s| s.value()),
                        core.load.as_ref().and_then(|s| s.value()),
                    )
                })
                .collect();
            let bus = map.bus_speed().and_then(|s| s.value());
            (cores, composite::bus_correction(bus))
        };

        let clock = composite::cpu_clock(&cores, correction)?;
        self.record_max(keys::CPU_CLOCK, clock.peak);
        Some(clock.average)
    }

    fn gpu_reading(&self, key: &str) -> Option<f32> {
        let sensors = {
            let map = self.map.read().unwrap_or_else(|e| e.into_inner());
            map.gpu()?.sensors()
        };

        let reading = if key == keys::GPU_CLOCK {
            composite::gpu_clock(&sensors)
        } else {
            composite::gpu_power(&sensors)
        };

        match reading {
            GpuReading::Accepted(value) => {
                self.record_max(key, value);
                Some(value)
            }
            GpuReading::Rejected(value) => {
                debug!("Discarding implausible {} reading: {}", key, value);
                None
            }
            GpuReading::Missing => None,
        }
    }

    fn vram_reading(&self) -> Option<f32> {
        let used = self.direct_reading(keys::GPU_VRAM_USED);
        let total = self.direct_reading(keys::GPU_VRAM_TOTAL);
        used.zip(total)
            .and_then(|(used, total)| composite::vram_percent(used, total))
            .or_else(|| self.direct_reading(keys::GPU_VRAM_LOAD))
    }

    fn device_reading(&self, class: DeviceClass, channel: Channel) -> Option<f32> {
        let hardware = self.hardware();
        let generation = self.generation.load(Ordering::Relaxed);
        let (preferred, last_auto) = {
            let prefs = lock(&self.preferences);
            (
                prefs.preferred(class).map(str::to_string),
                prefs.last_auto(class).map(str::to_string),
            )
        };
        let inputs = SelectionInputs {
            preferred: preferred.as_deref(),
            last_auto: last_auto.as_deref(),
            boot_volume: self.boot_volume.as_deref(),
        };

        let selector = match class {
            DeviceClass::Network => &self.network,
            DeviceClass::Disk => &self.disk,
        };
        let selection = lock(selector).select(&hardware, inputs, generation, Instant::now())?;

        if let Some(name) = &selection.hint {
            self.persist_hint(class, name);
        }

        selector::channel_sensor(&selection.node, channel)?.value()
    }

    fn traffic_reading(&self, channel: Channel) -> Option<f32> {
        let today = self.traffic.as_ref()?.today();
        match channel {
            Channel::Up => Some(today.up as f32),
            Channel::Down => Some(today.down as f32),
            Channel::Read | Channel::Write => None,
        }
    }

    fn persist_hint(&self, class: DeviceClass, name: &str) {
        let snapshot = {
            let mut prefs = lock(&self.preferences);
            if !prefs.set_last_auto(class, name) {
                return;
            }
            prefs.clone()
        };
        info!("Selected {} device: {}", class, name);
        if let Err(e) = self.store.save(&snapshot) {
            warn!("Failed to save {} selection: {}", class, e);
        }
    }

    fn record_max(&self, key: &str, value: f32) {
        let snapshot = {
            let mut prefs = lock(&self.preferences);
            if !prefs.calibration.observe(key, value) {
                return;
            }
            debug!("New {} maximum: {}", key, value);
            if !lock(&self.throttle).ready(Instant::now()) {
                return;
            }
            prefs.clone()
        };
        if let Err(e) = self.store.save(&snapshot) {
            warn!("Failed to save calibration: {}", e);
        }
    }
}

//! Choice of "the" network adapter or disk behind the throughput keys.
//!
//! Resolution order per query: manual override, runtime cache, persisted
//! hint, full scan. The selection is per device, never per direction, so
//! both channels of a class read the same node.

use crate::hardware::{name_has, walk, HardwareHandle, SensorHandle, SensorKind};
use crate::keys::{Channel, DeviceClass};
use crate::ACTIVE_THROUGHPUT;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Adapter name fragments that mark virtual, tunnel or loopback devices.
pub const VIRTUAL_ADAPTERS: &[&str] = &[
    "virtual",
    "vmware",
    "hyper-v",
    "hyper v",
    "vbox",
    "loopback",
    "tunnel",
    "tap",
    "tun",
    "bluetooth",
    "zerotier",
    "tailscale",
    "wi-fi direct",
    "wifi direct",
    "wan miniport",
    "docker",
    "veth",
    "virbr",
];

const VIRTUAL_PENALTY: f64 = -1e9;
const BOOT_VOLUME_BONUS: f64 = 1e9;

/// Outcome of one selection.
pub struct Selection {
    /// Node to read both channels from.
    pub node: HardwareHandle,
    /// Name to persist as the new last-automatic choice, if it changed.
    pub hint: Option<String>,
}

/// Persisted inputs for one selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionInputs<'a> {
    /// Manual override.
    pub preferred: Option<&'a str>,
    /// Last automatically chosen name.
    pub last_auto: Option<&'a str>,
    /// Name fragment of the device holding the boot volume.
    pub boot_volume: Option<&'a str>,
}

/// Runtime state of the selector for one device class.
pub struct DeviceSelector {
    class: DeviceClass,
    cooldown: Duration,
    cached: Option<HardwareHandle>,
    last_scan: Option<Instant>,
    generation: Option<u64>,
}

impl DeviceSelector {
    /// Creates a selector with an empty cache.
    pub fn new(class: DeviceClass, cooldown: Duration) -> Self {
        Self {
            class,
            cooldown,
            cached: None,
            last_scan: None,
            generation: None,
        }
    }

    #[cfg(test)]
    fn cached(&self) -> Option<&HardwareHandle> {
        self.cached.as_ref()
    }

    /// Resolves the node to read for this class.
    ///
    /// Within one `generation` a node chosen by the cache, hint or scan
    /// paths is reused unconditionally.
    pub fn select(
        &mut self,
        hardware: &[HardwareHandle],
        inputs: SelectionInputs<'_>,
        generation: u64,
        now: Instant,
    ) -> Option<Selection> {
        let candidates = self.candidates(hardware);

        if let Some(name) = inputs.preferred {
            if let Some(node) = find_by_name(&candidates, name) {
                return Some(Selection { node, hint: None });
            }
        }

        if let Some(node) = self.cached.clone() {
            if !candidates.iter().any(|c| same_node(c, &node)) {
                debug!("Cached {} device {} is gone", self.class, node.name());
                self.cached = None;
            } else if self.generation == Some(generation) {
                return Some(Selection { node, hint: None });
            } else {
                let in_cooldown = self
                    .last_scan
                    .map(|at| now.duration_since(at) < self.cooldown)
                    .unwrap_or(false);
                if in_cooldown || self.activity(&node) > ACTIVE_THROUGHPUT as f64 {
                    self.generation = Some(generation);
                    return Some(Selection { node, hint: None });
                }
            }
        }

        if self.cached.is_none() {
            if let Some(node) = inputs.last_auto.and_then(|n| find_by_name(&candidates, n)) {
                debug!("Adopted persisted {} device {}", self.class, node.name());
                self.adopt(node.clone(), generation, now);
                return Some(Selection { node, hint: None });
            }
        }

        let node = self.scan(&candidates, inputs.boot_volume);
        let Some(node) = node else {
            self.last_scan = Some(now);
            self.cached = None;
            self.generation = None;
            return None;
        };

        self.adopt(node.clone(), generation, now);
        let hint = match inputs.last_auto {
            Some(prev) if prev.eq_ignore_ascii_case(node.name()) => None,
            _ => Some(node.name().to_string()),
        };
        Some(Selection { node, hint })
    }

    fn adopt(&mut self, node: HardwareHandle, generation: u64, now: Instant) {
        self.cached = Some(node);
        self.generation = Some(generation);
        self.last_scan = Some(now);
    }

    fn candidates(&self, hardware: &[HardwareHandle]) -> Vec<HardwareHandle> {
        let kind = self.class.hardware_kind();
        let mut nodes = Vec::new();
        walk(hardware, &mut |node| {
            if node.kind() == kind {
                nodes.push(node.clone());
            }
        });
        nodes
    }

    /// Summed throughput of the node's channel sensors.
    fn activity(&self, node: &HardwareHandle) -> f64 {
        self.class
            .channels()
            .iter()
            .filter_map(|channel| channel_sensor(node, *channel))
            .filter_map(|sensor| sensor.value())
            .filter(|v| !v.is_nan())
            .map(|v| v as f64)
            .sum()
    }

    fn scan(&self, candidates: &[HardwareHandle], boot_volume: Option<&str>) -> Option<HardwareHandle> {
        let mut best: Option<(f64, &HardwareHandle)> = None;

        for node in candidates {
            let sensors: Vec<SensorHandle> = self
                .class
                .channels()
                .iter()
                .filter_map(|channel| channel_sensor(node, *channel))
                .collect();
            if sensors.is_empty() {
                continue;
            }

            let mut score = self.activity(node);
            match self.class {
                DeviceClass::Network => {
                    if is_virtual_adapter(node.name()) {
                        score += VIRTUAL_PENALTY;
                    }
                }
                DeviceClass::Disk => {
                    let on_boot = boot_volume.is_some_and(|marker| {
                        name_has(node.name(), marker)
                            || sensors.iter().any(|s| name_has(s.name(), marker))
                    });
                    if on_boot {
                        score += BOOT_VOLUME_BONUS;
                    }
                }
            }

            debug!("{} candidate {}: score {}", self.class, node.name(), score);
            if best.map(|(top, _)| score > top).unwrap_or(true) {
                best = Some((score, node));
            }
        }

        best.map(|(_, node)| node.clone())
    }
}

/// Returns true if `name` looks like a virtual, tunnel or loopback adapter.
pub fn is_virtual_adapter(name: &str) -> bool {
    VIRTUAL_ADAPTERS.iter().any(|needle| name_has(name, needle))
}

/// First throughput sensor on `node` whose name carries a keyword of `channel`.
pub fn channel_sensor(node: &HardwareHandle, channel: Channel) -> Option<SensorHandle> {
    node.sensors().into_iter().find(|sensor| {
        sensor.kind() == SensorKind::Throughput
            && channel
                .keywords()
                .iter()
                .any(|keyword| name_has(sensor.name(), keyword))
    })
}

fn find_by_name(candidates: &[HardwareHandle], name: &str) -> Option<HardwareHandle> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    candidates
        .iter()
        .find(|node| node.name().eq_ignore_ascii_case(name))
        .cloned()
}

fn same_node(a: &HardwareHandle, b: &HardwareHandle) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Name fragment identifying the device that holds the boot volume.
#[cfg(target_os = "linux")]
pub fn boot_volume_marker() -> Option<String> {
    crate::sysfs::disk::root_disk()
}

/// Name fragment identifying the device that holds the boot volume.
#[cfg(windows)]
pub fn boot_volume_marker() -> Option<String> {
    let root = std::env::var("SystemRoot").ok()?;
    let drive: String = root.chars().take(2).collect();
    (drive.len() == 2 && drive.ends_with(':')).then(|| drive.to_lowercase())
}

/// Name fragment identifying the device that holds the boot volume.
#[cfg(not(any(target_os = "linux", windows)))]
pub fn boot_volume_marker() -> Option<String> {
    None
}

//! CPU node: load from /proc/stat, clocks from cpufreq, temperatures from
//! hwmon and package power from RAPL.

use super::hwmon::{self, TempSensor};
use super::{read_text, read_value, CounterRate, MIN_RATE_INTERVAL};
use crate::fixed::SensorCell;
use crate::hardware::{Hardware, HardwareKind, SensorHandle, SensorKind};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// hwmon drivers that report CPU temperatures, preferred first.
const CPU_TEMP_CHIPS: &[&str] = &["coretemp", "k10temp", "zenpower"];

/// Idle and total jiffies of one /proc/stat line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

impl CpuTimes {
    /// Busy percentage between `prev` and `self`.
    pub fn load_since(&self, prev: &CpuTimes) -> Option<f32> {
        let idle = self.idle.saturating_sub(prev.idle);
        let total = self.total.saturating_sub(prev.total);
        if total == 0 {
            return None;
        }
        Some((100.0 * (1.0 - idle as f64 / total as f64)) as f32)
    }
}

/// Parses the `cpu` and `cpuN` lines of /proc/stat.
pub fn parse_stat(content: &str) -> HashMap<String, CpuTimes> {
    content
        .lines()
        .filter(|line| line.starts_with("cpu"))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let label = parts.next()?.to_string();
            let fields: Vec<u64> = parts.filter_map(|s| s.parse().ok()).collect();
            if fields.len() < 4 {
                return None;
            }
            let times = CpuTimes {
                idle: fields[3],
                total: fields.iter().sum(),
            };
            Some((label, times))
        })
        .collect()
}

/// Returns the first `model name` in /proc/cpuinfo.
pub fn parse_model_name(content: &str) -> Option<String> {
    content
        .lines()
        .find(|line| line.starts_with("model name"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, name)| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

struct CoreLoad {
    label: String,
    cell: Arc<SensorCell>,
}

struct CoreClock {
    path: PathBuf,
    cell: Arc<SensorCell>,
}

struct PackagePower {
    path: PathBuf,
    cell: Arc<SensorCell>,
}

#[derive(Default)]
struct CpuState {
    times: HashMap<String, CpuTimes>,
    sampled_at: Option<Instant>,
    energy: Option<CounterRate>,
}

/// The processor package.
pub struct CpuNode {
    name: String,
    stat_path: PathBuf,
    total: Arc<SensorCell>,
    loads: Vec<CoreLoad>,
    clocks: Vec<CoreClock>,
    temps: Vec<TempSensor>,
    power: Option<PackagePower>,
    state: Mutex<CpuState>,
}

impl CpuNode {
    /// Builds the node from /proc/stat. Returns `None` if it is unreadable.
    pub fn discover(root: &Path) -> Option<Self> {
        let stat_path = root.join("proc/stat");
        let stat = parse_stat(&fs::read_to_string(&stat_path).ok()?);

        let name = fs::read_to_string(root.join("proc/cpuinfo"))
            .ok()
            .and_then(|info| parse_model_name(&info))
            .unwrap_or_else(|| "CPU".to_string());

        let mut indices: Vec<u32> = stat
            .keys()
            .filter_map(|label| label.strip_prefix("cpu")?.parse().ok())
            .collect();
        indices.sort_unstable();

        // Sensor names are 1-based.
        let loads = indices
            .iter()
            .map(|i| CoreLoad {
                label: format!("cpu{i}"),
                cell: SensorCell::new(SensorKind::Load, &format!("CPU Core #{}", i + 1)),
            })
            .collect();

        let clocks = indices
            .iter()
            .filter_map(|i| {
                let path = root.join(format!(
                    "sys/devices/system/cpu/cpu{i}/cpufreq/scaling_cur_freq"
                ));
                path.exists().then(|| CoreClock {
                    path,
                    cell: SensorCell::new(SensorKind::Clock, &format!("Core #{}", i + 1)),
                })
            })
            .collect();

        let temps = hwmon::find_chip(root, CPU_TEMP_CHIPS)
            .map(|chip| {
                hwmon::temperatures(&chip)
                    .into_iter()
                    .map(|channel| TempSensor::new(channel.input, &channel.label))
                    .collect()
            })
            .unwrap_or_default();

        let rapl = root.join("sys/class/powercap/intel-rapl:0");
        let power = rapl.join("energy_uj").exists().then(|| PackagePower {
            path: rapl.join("energy_uj"),
            cell: SensorCell::new(SensorKind::Power, "CPU Package"),
        });
        let energy = power.as_ref().map(|_| {
            read_value::<u64>(&rapl.join("max_energy_range_uj"))
                .map(CounterRate::wrapping_at)
                .unwrap_or_else(|_| CounterRate::new())
        });

        Some(Self {
            name,
            stat_path,
            total: SensorCell::new(SensorKind::Load, "CPU Total"),
            loads,
            clocks,
            temps,
            power,
            state: Mutex::new(CpuState {
                times: HashMap::new(),
                sampled_at: None,
                energy,
            }),
        })
    }

    fn refresh_at(&self, now: Instant) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.refresh_loads(&mut state, now);
        self.refresh_power(&mut state, now);
        drop(state);

        for clock in &self.clocks {
            // kHz to MHz.
            let mhz = read_value::<f32>(&clock.path).ok().map(|khz| khz / 1000.0);
            clock.cell.set(mhz);
        }
        for temp in &self.temps {
            temp.refresh();
        }
    }

    fn refresh_loads(&self, state: &mut CpuState, now: Instant) {
        // Shorter windows hold too few jiffies; keep the previous loads.
        let too_soon = state
            .sampled_at
            .is_some_and(|at| now.saturating_duration_since(at) < MIN_RATE_INTERVAL);
        if too_soon {
            return;
        }

        let Some(content) = read_text(&self.stat_path) else {
            self.total.set(None);
            return;
        };
        let times = parse_stat(&content);

        let load = |label: &str| {
            let current = times.get(label)?;
            current.load_since(state.times.get(label)?)
        };
        self.total.set(load("cpu"));
        for core in &self.loads {
            core.cell.set(load(&core.label));
        }

        state.times = times;
        state.sampled_at = Some(now);
    }

    fn refresh_power(&self, state: &mut CpuState, now: Instant) {
        let (Some(power), Some(energy)) = (&self.power, state.energy.as_mut()) else {
            return;
        };
        match read_value::<u64>(&power.path) {
            // Microjoules per second to watts.
            Ok(uj) => power
                .cell
                .set(energy.update(uj, now).map(|r| (r / 1e6) as f32)),
            Err(_) => {
                energy.reset();
                power.cell.set(None);
            }
        }
    }
}

impl Hardware for CpuNode {
    fn kind(&self) -> HardwareKind {
        HardwareKind::Cpu
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn sensors(&self) -> Vec<SensorHandle> {
        let mut sensors: Vec<SensorHandle> = vec![self.total.clone() as SensorHandle];
        sensors.extend(self.loads.iter().map(|c| c.cell.clone() as SensorHandle));
        sensors.extend(self.clocks.iter().map(|c| c.cell.clone() as SensorHandle));
        sensors.extend(self.temps.iter().map(|t| t.cell.clone() as SensorHandle));
        if let Some(power) = &self.power {
            sensors.push(power.cell.clone());
        }
        sensors
    }

    fn refresh(&self) {
        self.refresh_at(Instant::now());
    }
}

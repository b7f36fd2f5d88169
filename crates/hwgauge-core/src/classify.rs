//! Sensor classification rule table.
//!
//! Each row maps a (hardware predicate, sensor kind, name pattern) triple to a
//! metric key. Rows are evaluated top to bottom and a sensor takes the key of
//! the first row it matches. Row order also ranks candidates for the same
//! key: a sensor matched by an earlier row beats one matched by a later row,
//! so aggregate CPU temperatures win over per-core fallbacks.
//!
//! Network and storage nodes have no rows. Their throughput sensors are
//! resolved per query by the device selectors.

use crate::hardware::{name_has, HardwareKind, SensorKind};
use crate::keys;

/// One classification row.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    /// Key assigned on match.
    pub key: &'static str,
    /// Hardware nodes the row applies to.
    pub hardware: fn(HardwareKind) -> bool,
    /// Required sensor kind.
    pub sensor: SensorKind,
    /// At least one of these must appear in the name.
    pub any_of: &'static [&'static str],
    /// All of these must appear in the name.
    pub all_of: &'static [&'static str],
    /// None of these may appear in the name.
    pub none_of: &'static [&'static str],
}

impl Rule {
    /// Returns true if a sensor on `hardware` matches this row.
    pub fn matches(&self, hardware: HardwareKind, sensor: SensorKind, name: &str) -> bool {
        (self.hardware)(hardware)
            && self.sensor == sensor
            && self.any_of.iter().any(|needle| name_has(name, needle))
            && self.all_of.iter().all(|needle| name_has(name, needle))
            && !self.none_of.iter().any(|needle| name_has(name, needle))
    }
}

fn cpu(kind: HardwareKind) -> bool {
    kind == HardwareKind::Cpu
}

fn gpu(kind: HardwareKind) -> bool {
    kind.is_gpu()
}

fn memory(kind: HardwareKind) -> bool {
    kind == HardwareKind::Memory
}

/// The classification table, highest precedence first.
pub const RULES: &[Rule] = &[
    Rule {
        key: keys::CPU_LOAD,
        hardware: cpu,
        sensor: SensorKind::Load,
        any_of: &["total"],
        all_of: &[],
        none_of: &[],
    },
    Rule {
        key: keys::CPU_TEMP,
        hardware: cpu,
        sensor: SensorKind::Temperature,
        any_of: &["package", "average", "tctl", "tdie", "ccd", "cores"],
        all_of: &[],
        none_of: &[],
    },
    // Some mobile parts expose only per-core readings.
    Rule {
        key: keys::CPU_TEMP,
        hardware: cpu,
        sensor: SensorKind::Temperature,
        any_of: &["cpu", "core"],
        all_of: &[],
        none_of: &["soc", "vrm", "fan", "pump", "liquid", "coolant", "distance"],
    },
    Rule {
        key: keys::CPU_POWER,
        hardware: cpu,
        sensor: SensorKind::Power,
        any_of: &["package", "cores"],
        all_of: &[],
        none_of: &[],
    },
    Rule {
        key: keys::GPU_LOAD,
        hardware: gpu,
        sensor: SensorKind::Load,
        any_of: &["core", "d3d 3d"],
        all_of: &[],
        none_of: &[],
    },
    Rule {
        key: keys::GPU_TEMP,
        hardware: gpu,
        sensor: SensorKind::Temperature,
        any_of: &["core", "hot spot", "soc", "vr"],
        all_of: &[],
        none_of: &[],
    },
    Rule {
        key: keys::GPU_VRAM_USED,
        hardware: gpu,
        sensor: SensorKind::SmallData,
        any_of: &["memory", "dedicated"],
        all_of: &["used"],
        none_of: &[],
    },
    Rule {
        key: keys::GPU_VRAM_TOTAL,
        hardware: gpu,
        sensor: SensorKind::SmallData,
        any_of: &["memory", "dedicated"],
        all_of: &["total"],
        none_of: &[],
    },
    Rule {
        key: keys::GPU_VRAM_LOAD,
        hardware: gpu,
        sensor: SensorKind::Load,
        any_of: &["memory"],
        all_of: &[],
        none_of: &[],
    },
    Rule {
        key: keys::MEM_LOAD,
        hardware: memory,
        sensor: SensorKind::Load,
        any_of: &["memory"],
        all_of: &[],
        none_of: &[],
    },
];

/// Returns the index into [`RULES`] of the first row matching the sensor.
pub fn classify(hardware: HardwareKind, sensor: SensorKind, name: &str) -> Option<usize> {
    RULES
        .iter()
        .position(|rule| rule.matches(hardware, sensor, name))
}

/// Extracts N from names like "Core #3" or "CPU Core #3 Thread #1".
pub fn core_index(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let start = lower.find("core #")? + "core #".len();
    let digits: String = lower[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_for(hardware: HardwareKind, sensor: SensorKind, name: &str) -> Option<&'static str> {
        classify(hardware, sensor, name).map(|i| RULES[i].key)
    }

    #[test]
    fn test_cpu_rows() {
        assert_eq!(
            key_for(HardwareKind::Cpu, SensorKind::Load, "CPU Total"),
            Some(keys::CPU_LOAD)
        );
        assert_eq!(
            key_for(HardwareKind::Cpu, SensorKind::Power, "CPU Package"),
            Some(keys::CPU_POWER)
        );
        assert_eq!(
            key_for(HardwareKind::Cpu, SensorKind::Temperature, "Core (Tctl/Tdie)"),
            Some(keys::CPU_TEMP)
        );
        assert_eq!(key_for(HardwareKind::Cpu, SensorKind::Load, "CPU Core #1"), None);
    }

    #[test]
    fn test_cpu_temp_tiers() {
        let package = classify(HardwareKind::Cpu, SensorKind::Temperature, "CPU Package").unwrap();
        let core = classify(HardwareKind::Cpu, SensorKind::Temperature, "Core #1").unwrap();
        assert_eq!(RULES[package].key, RULES[core].key);
        assert!(package < core);
    }

    #[test]
    fn test_cpu_temp_excludes_irrelevant() {
        for name in ["CPU SoC", "CPU VRM", "Core Distance to TjMax", "CPU Pump", "Coolant CPU"] {
            assert_eq!(
                key_for(HardwareKind::Cpu, SensorKind::Temperature, name),
                None,
                "{name} should not classify"
            );
        }
    }

    #[test]
    fn test_gpu_rows() {
        let kind = HardwareKind::GpuNvidia;
        assert_eq!(key_for(kind, SensorKind::Load, "GPU Core"), Some(keys::GPU_LOAD));
        assert_eq!(key_for(kind, SensorKind::Load, "D3D 3D"), Some(keys::GPU_LOAD));
        assert_eq!(key_for(kind, SensorKind::Temperature, "GPU Hot Spot"), Some(keys::GPU_TEMP));
        assert_eq!(
            key_for(kind, SensorKind::SmallData, "GPU Memory Used"),
            Some(keys::GPU_VRAM_USED)
        );
        assert_eq!(
            key_for(kind, SensorKind::SmallData, "D3D Dedicated Memory Total"),
            Some(keys::GPU_VRAM_TOTAL)
        );
        assert_eq!(key_for(kind, SensorKind::Load, "GPU Memory"), Some(keys::GPU_VRAM_LOAD));
        assert_eq!(key_for(kind, SensorKind::SmallData, "GPU Memory Free"), None);
    }

    #[test]
    fn test_memory_row() {
        assert_eq!(
            key_for(HardwareKind::Memory, SensorKind::Load, "Memory"),
            Some(keys::MEM_LOAD)
        );
        assert_eq!(key_for(HardwareKind::Cpu, SensorKind::Load, "Memory"), None);
    }

    #[test]
    fn test_network_and_storage_unclassified() {
        assert_eq!(
            key_for(HardwareKind::Network, SensorKind::Throughput, "Upload Speed"),
            None
        );
        assert_eq!(key_for(HardwareKind::Storage, SensorKind::Load, "Total Activity"), None);
    }

    #[test]
    fn test_core_index() {
        assert_eq!(core_index("Core #3"), Some(3));
        assert_eq!(core_index("CPU Core #12 Thread #1"), Some(12));
        assert_eq!(core_index("Bus Speed"), None);
        assert_eq!(core_index("Core #"), None);
    }
}

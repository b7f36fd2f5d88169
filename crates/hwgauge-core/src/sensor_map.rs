//! Metric key to sensor lookup, built by one classification pass.

use crate::classify::{self, RULES};
use crate::hardware::{name_has, HardwareHandle, HardwareKind, SensorHandle, SensorKind};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::debug;

/// Clock and load sensors of one CPU core.
#[derive(Clone)]
pub struct CoreSensors {
    pub index: u32,
    pub clock: Option<SensorHandle>,
    pub load: Option<SensorHandle>,
}

struct Candidate {
    rule: usize,
    sensor: SensorHandle,
}

/// Key to sensor mapping plus the CPU core and GPU caches that sit beside it.
///
/// Rebuilt wholesale; never patched in place.
pub struct SensorMap {
    entries: HashMap<&'static str, SensorHandle>,
    cores: Vec<CoreSensors>,
    bus_speed: Option<SensorHandle>,
    gpu: Option<HardwareHandle>,
    built_at: Option<Instant>,
}

impl SensorMap {
    /// Creates a map with no entries that is immediately stale.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            cores: Vec::new(),
            bus_speed: None,
            gpu: None,
            built_at: None,
        }
    }

    /// Walks `hardware`, refreshing each node, and classifies every sensor.
    ///
    /// Nodes are visited discrete GPU first, then integrated GPU, then the
    /// rest, each followed by its sub-nodes. For every key the sensor matched
    /// by the highest-precedence row wins; between sensors matched by the same
    /// row the first one discovered is kept and later ones are shadowed.
    pub fn build(hardware: &[HardwareHandle]) -> Self {
        let mut ordered: Vec<HardwareHandle> = hardware.to_vec();
        ordered.sort_by_key(|node| node.kind().discovery_priority());

        let mut builder = Builder::default();
        for node in &ordered {
            builder.register(node);
        }

        let map = builder.finish();
        debug!(
            "Sensor map built: {} keys, {} cores, gpu={}",
            map.entries.len(),
            map.cores.len(),
            map.gpu.as_ref().map(|g| g.name().to_string()).unwrap_or_default()
        );
        map
    }

    /// Returns the sensor classified under `key`.
    pub fn get(&self, key: &str) -> Option<&SensorHandle> {
        self.entries.get(key)
    }

    /// Returns the mapped keys, sorted.
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys: Vec<&'static str> = self.entries.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Per-core clock/load pairs, ordered by core index.
    pub fn cores(&self) -> &[CoreSensors] {
        &self.cores
    }

    /// The CPU bus-speed clock sensor, if the provider exposes one.
    pub fn bus_speed(&self) -> Option<&SensorHandle> {
        self.bus_speed.as_ref()
    }

    /// The preferred GPU node (first GPU in discovery order).
    pub fn gpu(&self) -> Option<&HardwareHandle> {
        self.gpu.as_ref()
    }

    /// Returns true if the map was never built or is older than `max_age`.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.built_at
            .map(|at| at.elapsed() > max_age)
            .unwrap_or(true)
    }

    /// Time of the last build.
    pub fn built_at(&self) -> Option<Instant> {
        self.built_at
    }
}

#[derive(Default)]
struct Builder {
    candidates: HashMap<&'static str, Candidate>,
    clocks: BTreeMap<u32, SensorHandle>,
    loads: BTreeMap<u32, SensorHandle>,
    bus_speed: Option<SensorHandle>,
    gpu: Option<HardwareHandle>,
}

impl Builder {
    fn register(&mut self, node: &HardwareHandle) {
        node.refresh();
        let kind = node.kind();

        if kind.is_gpu() && self.gpu.is_none() {
            self.gpu = Some(node.clone());
        }

        for sensor in node.sensors() {
            if kind == HardwareKind::Cpu {
                self.register_core(&sensor);
            }

            let Some(rule) = classify::classify(kind, sensor.kind(), sensor.name()) else {
                continue;
            };
            let key = RULES[rule].key;
            let replace = match self.candidates.get(key) {
                Some(existing) => rule < existing.rule,
                None => true,
            };
            if replace {
                self.candidates.insert(key, Candidate { rule, sensor });
            }
        }

        for child in node.children() {
            self.register(&child);
        }
    }

    fn register_core(&mut self, sensor: &SensorHandle) {
        match sensor.kind() {
            SensorKind::Clock if name_has(sensor.name(), "bus speed") => {
                self.bus_speed.get_or_insert_with(|| sensor.clone());
            }
            SensorKind::Clock => {
                if let Some(index) = classify::core_index(sensor.name()) {
                    self.clocks.entry(index).or_insert_with(|| sensor.clone());
                }
            }
            SensorKind::Load => {
                if let Some(index) = classify::core_index(sensor.name()) {
                    self.loads.entry(index).or_insert_with(|| sensor.clone());
                }
            }
            _ => {}
        }
    }

    fn finish(mut self) -> SensorMap {
        let cores = self
            .clocks
            .iter()
            .map(|(index, clock)| CoreSensors {
                index: *index,
                clock: Some(clock.clone()),
                load: self.loads.remove(index),
            })
            .collect();

        SensorMap {
            entries: self
                .candidates
                .into_iter()
                .map(|(key, candidate)| (key, candidate.sensor))
                .collect(),
            cores,
            bus_speed: self.bus_speed,
            gpu: self.gpu,
            built_at: Some(Instant::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::{FixedHardware, SensorCell};
    use crate::keys;
    use std::sync::Arc;

    fn cpu() -> FixedHardware {
        FixedHardware::new(HardwareKind::Cpu, "Ryzen 7 7840HS")
            .with_sensor(SensorCell::reading(SensorKind::Load, "CPU Total", 20.0))
            .with_sensor(SensorCell::reading(SensorKind::Temperature, "Core #1", 61.0))
            .with_sensor(SensorCell::reading(SensorKind::Temperature, "Core (Tctl/Tdie)", 64.0))
            .with_sensor(SensorCell::reading(SensorKind::Clock, "Bus Speed", 100.0))
            .with_sensor(SensorCell::reading(SensorKind::Clock, "Core #1", 3000.0))
            .with_sensor(SensorCell::reading(SensorKind::Clock, "Core #2", 4000.0))
            .with_sensor(SensorCell::reading(SensorKind::Load, "CPU Core #1 Thread #1", 10.0))
            .with_sensor(SensorCell::reading(SensorKind::Load, "CPU Core #1 Thread #2", 90.0))
            .with_sensor(SensorCell::reading(SensorKind::Load, "CPU Core #2", 50.0))
    }

    fn gpu(kind: HardwareKind, name: &str, temp: f32) -> FixedHardware {
        FixedHardware::new(kind, name)
            .with_sensor(SensorCell::reading(SensorKind::Temperature, "GPU Core", temp))
    }

    #[test]
    fn test_empty_map_is_stale() {
        let map = SensorMap::empty();
        assert!(map.is_stale(Duration::from_secs(600)));
        assert!(map.keys().is_empty());
    }

    #[test]
    fn test_build_classifies() {
        let map = SensorMap::build(&[cpu().handle()]);
        assert_eq!(map.keys(), vec![keys::CPU_LOAD, keys::CPU_TEMP]);
        assert!(!map.is_stale(Duration::from_secs(600)));
    }

    #[test]
    fn test_aggregate_temperature_beats_earlier_core() {
        let map = SensorMap::build(&[cpu().handle()]);
        let temp = map.get(keys::CPU_TEMP).unwrap();
        assert_eq!(temp.name(), "Core (Tctl/Tdie)");
    }

    #[test]
    fn test_first_writer_wins_within_rule() {
        let cpu = FixedHardware::new(HardwareKind::Cpu, "cpu")
            .with_sensor(SensorCell::reading(SensorKind::Load, "CPU Total", 1.0))
            .with_sensor(SensorCell::reading(SensorKind::Load, "CPU Total (alt)", 2.0));
        let map = SensorMap::build(&[cpu.handle()]);
        assert_eq!(map.get(keys::CPU_LOAD).unwrap().value(), Some(1.0));
    }

    #[test]
    fn test_discrete_gpu_preferred() {
        let integrated = gpu(HardwareKind::GpuIntel, "Intel Iris Xe", 45.0).handle();
        let discrete = gpu(HardwareKind::GpuNvidia, "RTX 4070", 70.0).handle();
        let map = SensorMap::build(&[integrated, discrete]);
        assert_eq!(map.get(keys::GPU_TEMP).unwrap().value(), Some(70.0));
        assert_eq!(map.gpu().unwrap().name(), "RTX 4070");
    }

    #[test]
    fn test_core_cache() {
        let map = SensorMap::build(&[cpu().handle()]);
        let cores = map.cores();
        assert_eq!(cores.len(), 2);
        assert_eq!(cores[0].index, 1);
        assert_eq!(cores[0].load.as_ref().unwrap().value(), Some(10.0));
        assert_eq!(cores[1].clock.as_ref().unwrap().value(), Some(4000.0));
        assert_eq!(map.bus_speed().unwrap().value(), Some(100.0));
    }

    #[test]
    fn test_children_are_walked_and_refreshed() {
        let memory = FixedHardware::new(HardwareKind::Memory, "DIMM")
            .with_sensor(SensorCell::reading(SensorKind::Load, "Memory", 42.0))
            .shared();
        let board = FixedHardware::new(HardwareKind::Other, "Board")
            .with_child(memory.clone())
            .handle();
        let map = SensorMap::build(&[board]);
        assert_eq!(map.get(keys::MEM_LOAD).unwrap().value(), Some(42.0));
        assert_eq!(memory.refresh_count(), 1);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let nodes = vec![
            cpu().handle(),
            gpu(HardwareKind::GpuAmd, "RX 7800", 55.0).handle(),
        ];
        let first = SensorMap::build(&nodes);
        let second = SensorMap::build(&nodes);
        assert_eq!(first.keys(), second.keys());
        for key in first.keys() {
            assert!(Arc::ptr_eq(
                first.get(key).unwrap(),
                second.get(key).unwrap()
            ));
        }
    }

    #[test]
    fn test_missing_hardware_leaves_keys_absent() {
        let map = SensorMap::build(&[]);
        assert!(map.get(keys::GPU_TEMP).is_none());
        assert!(map.gpu().is_none());
        assert!(map.cores().is_empty());
    }
}

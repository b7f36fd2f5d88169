//! Linux sensor provider backed by procfs and sysfs.
//!
//! Builds the hardware tree from `/proc` and `/sys` with sensor names in the
//! vocabulary the classification rules expect ("CPU Total", "GPU Core",
//! "Upload Speed", ...). Every path is resolved under a configurable root so
//! the provider can run against a captured tree.

pub mod cpu;
pub mod disk;
pub mod gpu;
pub mod hwmon;
pub mod memory;
pub mod network;

use crate::hardware::{HardwareHandle, SensorProvider};
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Counter samples closer together than this reuse the previous rate.
pub(crate) const MIN_RATE_INTERVAL: Duration = Duration::from_millis(250);

/// Sensor provider reading the local machine.
pub struct SysfsProvider {
    root: PathBuf,
    nodes: RwLock<Vec<HardwareHandle>>,
}

impl SysfsProvider {
    /// Creates a provider for the running system.
    pub fn new() -> Self {
        Self::with_root("/")
    }

    /// Creates a provider that resolves `/proc` and `/sys` under `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            nodes: RwLock::new(Vec::new()),
        }
    }
}

impl Default for SysfsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorProvider for SysfsProvider {
    fn open(&self) -> Result<()> {
        let class = self.root.join("sys/class");
        if !class.is_dir() {
            return Err(Error::ProviderUnavailable(format!(
                "{} not found",
                class.display()
            )));
        }

        let mut nodes: Vec<HardwareHandle> = Vec::new();
        for gpu in gpu::discover(&self.root) {
            nodes.push(Arc::new(gpu));
        }
        if let Some(cpu) = cpu::CpuNode::discover(&self.root) {
            nodes.push(Arc::new(cpu));
        }
        if let Some(memory) = memory::MemoryNode::discover(&self.root) {
            nodes.push(Arc::new(memory));
        }
        for adapter in network::discover(&self.root) {
            nodes.push(Arc::new(adapter));
        }
        for disk in disk::discover(&self.root) {
            nodes.push(Arc::new(disk));
        }

        for node in &nodes {
            debug!("Found {} node: {}", node.kind(), node.name());
            // Prime counter baselines so the first real refresh yields rates.
            node.refresh();
        }
        info!("Sysfs provider found {} hardware nodes", nodes.len());

        *self.nodes.write().unwrap_or_else(|e| e.into_inner()) = nodes;
        Ok(())
    }

    fn hardware(&self) -> Vec<HardwareHandle> {
        self.nodes.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Reads a single-value sysfs attribute.
pub(crate) fn read_value<T: FromStr>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    let text = text.trim();
    text.parse().map_err(|_| Error::Parse {
        source_name: path.display().to_string(),
        value: text.to_string(),
    })
}

/// Reads a sysfs attribute as trimmed text.
pub(crate) fn read_text(path: &Path) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Converts a monotonically increasing counter into a per-second rate.
#[derive(Debug, Default)]
pub(crate) struct CounterRate {
    /// Counter value at which the counter wraps to zero.
    wrap: Option<u64>,
    last: Option<(u64, Instant)>,
    rate: Option<f64>,
}

impl CounterRate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wrapping_at(max: u64) -> Self {
        Self {
            wrap: Some(max),
            ..Self::default()
        }
    }

    /// Feeds a counter sample and returns the rate since the previous one.
    pub fn update(&mut self, value: u64, now: Instant) -> Option<f64> {
        let Some((prev, at)) = self.last else {
            self.last = Some((value, now));
            return None;
        };

        let elapsed = now.saturating_duration_since(at);
        if elapsed < MIN_RATE_INTERVAL {
            return self.rate;
        }

        let delta = if value >= prev {
            value - prev
        } else {
            match self.wrap {
                Some(max) => max.saturating_sub(prev).saturating_add(value),
                // Counter reset (interface re-created, device re-attached).
                None => 0,
            }
        };

        self.last = Some((value, now));
        self.rate = Some(delta as f64 / elapsed.as_secs_f64());
        self.rate
    }

    /// Drops the baseline after a failed read.
    pub fn reset(&mut self) {
        self.last = None;
        self.rate = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{HardwareKind, SensorKind};
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_counter_rate() {
        let start = Instant::now();
        let mut rate = CounterRate::new();
        assert_eq!(rate.update(1000, start), None);
        assert_eq!(rate.update(3000, start + Duration::from_secs(2)), Some(1000.0));
        // Too soon: previous rate is reused and the baseline kept.
        assert_eq!(
            rate.update(9000, start + Duration::from_millis(2100)),
            Some(1000.0)
        );
        assert_eq!(rate.update(2000, start + Duration::from_secs(3)), Some(0.0));
    }

    #[test]
    fn test_counter_rate_wraps() {
        let start = Instant::now();
        let mut rate = CounterRate::wrapping_at(1_000);
        rate.update(900, start);
        assert_eq!(rate.update(100, start + Duration::from_secs(1)), Some(200.0));
    }

    #[test]
    fn test_read_value_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "value", "12 kHz\n");
        let err = read_value::<u64>(&dir.path().join("value")).unwrap_err();
        assert!(matches!(err, Error::Parse { value, .. } if value == "12 kHz"));
        assert!(matches!(
            read_value::<u64>(&dir.path().join("missing")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_open_without_sysfs_fails() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SysfsProvider::with_root(dir.path());
        assert!(matches!(provider.open(), Err(Error::ProviderUnavailable(_))));
        assert!(provider.hardware().is_empty());
    }

    #[test]
    fn test_open_captured_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "proc/stat", "cpu  10 0 10 80 0 0 0 0 0 0\ncpu0 10 0 10 80 0 0 0 0 0 0\n");
        write(root, "proc/cpuinfo", "processor\t: 0\nmodel name\t: Test CPU 9000\n");
        write(root, "proc/meminfo", "MemTotal:       16000000 kB\nMemAvailable:    4000000 kB\n");
        write(root, "proc/diskstats", "   8       0 sda 10 0 100 0 20 0 200 0 0 0 0\n");
        write(root, "sys/class/net/lo/statistics/rx_bytes", "5\n");
        write(root, "sys/class/net/lo/statistics/tx_bytes", "5\n");
        write(root, "sys/class/net/eth0/statistics/rx_bytes", "1000\n");
        write(root, "sys/class/net/eth0/statistics/tx_bytes", "2000\n");
        write(root, "sys/block/sda/size", "1000\n");
        write(root, "sys/block/loop0/size", "0\n");

        let provider = SysfsProvider::with_root(root);
        provider.open().unwrap();
        let nodes = provider.hardware();
        let summary: Vec<(HardwareKind, String)> = nodes
            .iter()
            .map(|n| (n.kind(), n.name().to_string()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (HardwareKind::Cpu, "Test CPU 9000".to_string()),
                (HardwareKind::Memory, "Generic Memory".to_string()),
                (HardwareKind::Network, "eth0".to_string()),
                (HardwareKind::Storage, "sda".to_string()),
            ]
        );

        let memory = &nodes[1];
        let load = memory
            .sensors()
            .into_iter()
            .find(|s| s.kind() == SensorKind::Load)
            .unwrap();
        assert_eq!(load.value(), Some(75.0));
    }
}

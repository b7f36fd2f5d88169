//! Network adapter nodes from /sys/class/net.

use super::{read_value, CounterRate};
use crate::fixed::SensorCell;
use crate::hardware::{Hardware, HardwareKind, SensorHandle, SensorKind};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

struct Rates {
    tx: CounterRate,
    rx: CounterRate,
}

/// One interface with byte counters.
pub struct AdapterNode {
    name: String,
    statistics: PathBuf,
    upload: Arc<SensorCell>,
    download: Arc<SensorCell>,
    rates: Mutex<Rates>,
}

impl AdapterNode {
    fn new(name: String, statistics: PathBuf) -> Self {
        Self {
            name,
            statistics,
            upload: SensorCell::new(SensorKind::Throughput, "Upload Speed"),
            download: SensorCell::new(SensorKind::Throughput, "Download Speed"),
            rates: Mutex::new(Rates {
                tx: CounterRate::new(),
                rx: CounterRate::new(),
            }),
        }
    }
}

/// Lists interfaces that expose statistics, loopback excluded, sorted by name.
///
/// Virtual adapters are kept; the selector penalises them instead.
pub fn discover(root: &Path) -> Vec<AdapterNode> {
    let Ok(entries) = fs::read_dir(root.join("sys/class/net")) else {
        return Vec::new();
    };

    let mut adapters: Vec<AdapterNode> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == "lo" {
                return None;
            }
            let statistics = entry.path().join("statistics");
            statistics
                .join("rx_bytes")
                .exists()
                .then(|| AdapterNode::new(name, statistics))
        })
        .collect();
    adapters.sort_by(|a, b| a.name.cmp(&b.name));
    adapters
}

impl Hardware for AdapterNode {
    fn kind(&self) -> HardwareKind {
        HardwareKind::Network
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn sensors(&self) -> Vec<SensorHandle> {
        vec![
            self.upload.clone() as SensorHandle,
            self.download.clone() as SensorHandle,
        ]
    }

    fn refresh(&self) {
        let now = Instant::now();
        let mut rates = self.rates.lock().unwrap_or_else(|e| e.into_inner());

        let tx = read_value::<u64>(&self.statistics.join("tx_bytes"));
        let rx = read_value::<u64>(&self.statistics.join("rx_bytes"));
        match (tx, rx) {
            (Ok(tx), Ok(rx)) => {
                self.upload.set(rates.tx.update(tx, now).map(|r| r as f32));
                self.download.set(rates.rx.update(rx, now).map(|r| r as f32));
            }
            _ => {
                // Interface went away; start over when it returns.
                rates.tx.reset();
                rates.rx.reset();
                self.upload.set(None);
                self.download.set(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::Sensor;

    fn interface(root: &Path, name: &str, rx: u64, tx: u64) {
        let stats = root.join("sys/class/net").join(name).join("statistics");
        fs::create_dir_all(&stats).unwrap();
        fs::write(stats.join("rx_bytes"), format!("{rx}\n")).unwrap();
        fs::write(stats.join("tx_bytes"), format!("{tx}\n")).unwrap();
    }

    #[test]
    fn test_discover_skips_loopback() {
        let dir = tempfile::tempdir().unwrap();
        interface(dir.path(), "wlp2s0", 0, 0);
        interface(dir.path(), "lo", 0, 0);
        interface(dir.path(), "enp13s0", 0, 0);
        interface(dir.path(), "docker0", 0, 0);
        fs::create_dir_all(dir.path().join("sys/class/net/bonding_masters")).unwrap();

        let names: Vec<String> = discover(dir.path())
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        assert_eq!(names, vec!["docker0", "enp13s0", "wlp2s0"]);
    }

    #[test]
    fn test_first_refresh_has_no_rate() {
        let dir = tempfile::tempdir().unwrap();
        interface(dir.path(), "eth0", 100, 200);
        let adapters = discover(dir.path());
        adapters[0].refresh();
        assert_eq!(adapters[0].sensors()[0].value(), None);
    }

    #[test]
    fn test_vanished_interface_clears_readings() {
        let dir = tempfile::tempdir().unwrap();
        interface(dir.path(), "eth0", 100, 200);
        let adapters = discover(dir.path());
        adapters[0].refresh();
        fs::remove_dir_all(dir.path().join("sys/class/net/eth0")).unwrap();
        adapters[0].refresh();
        assert!(adapters[0].sensors().iter().all(|s| s.value().is_none()));
    }
}

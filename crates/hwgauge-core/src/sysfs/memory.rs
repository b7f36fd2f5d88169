//! Memory node from /proc/meminfo.

use crate::fixed::SensorCell;
use crate::hardware::{Hardware, HardwareKind, SensorHandle, SensorKind};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const KIB_PER_GIB: f32 = 1024.0 * 1024.0;

/// `MemTotal` and `MemAvailable` in KiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemInfo {
    pub total_kb: u64,
    pub available_kb: u64,
}

impl MemInfo {
    pub fn used_kb(&self) -> u64 {
        self.total_kb.saturating_sub(self.available_kb)
    }

    /// Used percentage.
    pub fn load(&self) -> Option<f32> {
        (self.total_kb > 0).then(|| 100.0 * (self.used_kb() as f64 / self.total_kb as f64) as f32)
    }
}

fn field(content: &str, key: &str) -> Option<u64> {
    content
        .lines()
        .find(|line| line.starts_with(key))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|value| value.parse().ok())
}

/// Parses /proc/meminfo.
pub fn parse_meminfo(content: &str) -> Option<MemInfo> {
    Some(MemInfo {
        total_kb: field(content, "MemTotal:")?,
        available_kb: field(content, "MemAvailable:")?,
    })
}

/// System memory.
pub struct MemoryNode {
    path: PathBuf,
    load: Arc<SensorCell>,
    used: Arc<SensorCell>,
    available: Arc<SensorCell>,
}

impl MemoryNode {
    /// Builds the node if /proc/meminfo is readable.
    pub fn discover(root: &Path) -> Option<Self> {
        let path = root.join("proc/meminfo");
        parse_meminfo(&fs::read_to_string(&path).ok()?)?;
        Some(Self {
            path,
            load: SensorCell::new(SensorKind::Load, "Memory"),
            used: SensorCell::new(SensorKind::SmallData, "Memory Used"),
            available: SensorCell::new(SensorKind::SmallData, "Memory Available"),
        })
    }
}

impl Hardware for MemoryNode {
    fn kind(&self) -> HardwareKind {
        HardwareKind::Memory
    }

    fn name(&self) -> &str {
        "Generic Memory"
    }

    fn sensors(&self) -> Vec<SensorHandle> {
        vec![
            self.load.clone() as SensorHandle,
            self.used.clone() as SensorHandle,
            self.available.clone() as SensorHandle,
        ]
    }

    fn refresh(&self) {
        let info = fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| parse_meminfo(&content));
        self.load.set(info.and_then(|i| i.load()));
        self.used.set(info.map(|i| i.used_kb() as f32 / KIB_PER_GIB));
        self.available
            .set(info.map(|i| i.available_kb as f32 / KIB_PER_GIB));
    }
}

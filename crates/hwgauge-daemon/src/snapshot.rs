//! Per-tick metric snapshot.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use hwgauge_core::HardwareMonitor;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Readings of the configured keys at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Local>,
    pub metrics: BTreeMap<String, Option<f32>>,
}

impl Snapshot {
    /// Refreshes hardware and reads every key.
    pub fn sample(monitor: &HardwareMonitor, keys: &[String]) -> Self {
        monitor.update_all();
        let metrics = keys
            .iter()
            .map(|key| (key.clone(), monitor.get(key)))
            .collect();
        Self {
            timestamp: Local::now(),
            metrics,
        }
    }

    /// Reading for `key`, if sampled and available.
    pub fn get(&self, key: &str) -> Option<f32> {
        self.metrics.get(key).copied().flatten()
    }

    /// Writes the snapshot as JSON, replacing `path` atomically.
    pub fn write(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize snapshot")?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write snapshot to {:?}", tmp))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace snapshot {:?}", path))?;
        Ok(())
    }
}

//! Daily network traffic accounting.
//!
//! Integrates the engine's upload/download rates between samples and keeps
//! per-day totals keyed by local calendar date.

use anyhow::{Context, Result};
use chrono::{Duration as Days, Local, NaiveDate};
use hwgauge_core::{DailyTraffic, TrafficSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const TRAFFIC_FILE: &str = "traffic.json";

/// Days of history kept, today included.
const RETAINED_DAYS: i64 = 31;

/// Sample gaps longer than this (suspend, stalled loop) are not integrated.
const MAX_GAP: Duration = Duration::from_secs(60);

/// Bytes transferred on one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DayTotals {
    pub up: f64,
    pub down: f64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrafficFile {
    #[serde(default)]
    days: BTreeMap<NaiveDate, DayTotals>,
}

struct Inner {
    days: BTreeMap<NaiveDate, DayTotals>,
    last_sample: Option<Instant>,
    dirty: bool,
}

/// Per-day traffic totals backed by `<state_dir>/traffic.json`.
pub struct TrafficLog {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl TrafficLog {
    /// Loads saved totals, starting empty if the file is missing or unreadable.
    pub fn load(state_dir: &Path) -> Self {
        let path = state_dir.join(TRAFFIC_FILE);
        let days = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<TrafficFile>(&content) {
                Ok(file) => file.days,
                Err(e) => {
                    warn!("Ignoring unreadable {:?}: {}", path, e);
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        debug!("Loaded traffic history for {} days", days.len());

        Self {
            path,
            inner: Mutex::new(Inner {
                days,
                last_sample: None,
                dirty: false,
            }),
        }
    }

    /// Adds the bytes moved since the previous sample at the given rates.
    pub fn record(&self, up: Option<f32>, down: Option<f32>, now: Instant, today: NaiveDate) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let previous = inner.last_sample.replace(now);
        let Some(previous) = previous else {
            return;
        };

        let elapsed = now.saturating_duration_since(previous);
        if elapsed > MAX_GAP {
            debug!("Skipping {:?} traffic gap", elapsed);
            return;
        }
        let secs = elapsed.as_secs_f64();
        let bytes = |rate: Option<f32>| {
            rate.filter(|r| r.is_finite() && *r > 0.0)
                .map(|r| r as f64 * secs)
                .unwrap_or(0.0)
        };

        let entry = inner.days.entry(today).or_default();
        entry.up += bytes(up);
        entry.down += bytes(down);

        let oldest = today - Days::days(RETAINED_DAYS - 1);
        inner.days.retain(|day, _| *day >= oldest);
        inner.dirty = true;
    }

    /// Totals for `day`.
    pub fn totals_for(&self, day: NaiveDate) -> DayTotals {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.days.get(&day).copied().unwrap_or_default()
    }

    /// Writes totals if they changed since the last flush.
    pub fn flush(&self) -> Result<()> {
        let (content, saved) = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if !inner.dirty {
                return Ok(());
            }
            let file = TrafficFile {
                days: inner.days.clone(),
            };
            let content =
                serde_json::to_string_pretty(&file).context("Failed to serialize traffic totals")?;
            (content, file.days)
        };

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).context("Failed to write traffic totals")?;
        std::fs::rename(&tmp, &self.path).context("Failed to replace traffic totals")?;

        // Totals recorded while writing stay unsaved until the next flush.
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.days == saved {
            inner.dirty = false;
        }
        Ok(())
    }
}

impl TrafficSource for TrafficLog {
    fn today(&self) -> DailyTraffic {
        let totals = self.totals_for(Local::now().date_naive());
        DailyTraffic {
            up: totals.up,
            down: totals.down,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwgauge_core::keys::{self, Channel};
    use hwgauge_core::{
        DeviceClass, FixedHardware, FixedProvider, HardwareKind, HardwareMonitor, MonitorOptions,
        SensorCell, SensorKind,
    };
    use std::sync::Arc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn test_integrates_rates() {
        let dir = tempfile::tempdir().unwrap();
        let log = TrafficLog::load(dir.path());
        let start = Instant::now();

        log.record(Some(1000.0), Some(4000.0), start, day(1));
        assert_eq!(log.totals_for(day(1)), DayTotals::default());

        log.record(Some(1000.0), Some(4000.0), start + Duration::from_secs(2), day(1));
        log.record(None, Some(f32::NAN), start + Duration::from_secs(3), day(1));
        assert_eq!(
            log.totals_for(day(1)),
            DayTotals {
                up: 2000.0,
                down: 8000.0
            }
        );
    }

    #[test]
    fn test_long_gap_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = TrafficLog::load(dir.path());
        let start = Instant::now();
        log.record(Some(1000.0), None, start, day(1));
        log.record(Some(1000.0), None, start + Duration::from_secs(3600), day(1));
        assert_eq!(log.totals_for(day(1)).up, 0.0);
        log.record(Some(1000.0), None, start + Duration::from_secs(3601), day(1));
        assert_eq!(log.totals_for(day(1)).up, 1000.0);
    }

    #[test]
    fn test_rollover_and_retention() {
        let dir = tempfile::tempdir().unwrap();
        let log = TrafficLog::load(dir.path());
        let start = Instant::now();
        log.record(Some(10.0), None, start, day(1));
        log.record(Some(10.0), None, start + Duration::from_secs(1), day(1));
        log.record(Some(10.0), None, start + Duration::from_secs(2), day(2));
        assert_eq!(log.totals_for(day(1)).up, 10.0);
        assert_eq!(log.totals_for(day(2)).up, 10.0);

        let later = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        log.record(Some(10.0), None, start + Duration::from_secs(3), later);
        assert_eq!(log.totals_for(day(1)), DayTotals::default());
        assert_eq!(log.totals_for(day(2)).up, 10.0);
    }

    #[test]
    fn test_flush_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let log = TrafficLog::load(dir.path());
        let start = Instant::now();
        log.record(Some(512.0), Some(256.0), start, day(5));
        log.record(Some(512.0), Some(256.0), start + Duration::from_secs(4), day(5));
        log.flush().unwrap();

        let reloaded = TrafficLog::load(dir.path());
        assert_eq!(
            reloaded.totals_for(day(5)),
            DayTotals {
                up: 2048.0,
                down: 1024.0
            }
        );
    }

    #[test]
    fn test_failed_flush_retried() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state");
        std::fs::create_dir(&state).unwrap();
        let log = TrafficLog::load(&state);
        let start = Instant::now();
        log.record(Some(100.0), None, start, day(7));
        log.record(Some(100.0), None, start + Duration::from_secs(1), day(7));

        std::fs::remove_dir(&state).unwrap();
        assert!(log.flush().is_err());

        std::fs::create_dir(&state).unwrap();
        log.flush().unwrap();
        assert_eq!(TrafficLog::load(&state).totals_for(day(7)).up, 100.0);
    }

    #[test]
    fn test_unplugged_adapter_adds_nothing() {
        let (up, down) = (
            SensorCell::reading(SensorKind::Throughput, "Upload Speed", 1000.0),
            SensorCell::reading(SensorKind::Throughput, "Download Speed", 0.0),
        );
        let adapter = FixedHardware::new(HardwareKind::Network, "eth0")
            .with_sensor(up)
            .with_sensor(down)
            .handle();
        let provider = Arc::new(FixedProvider::new(vec![adapter]));
        let monitor = HardwareMonitor::new(provider.clone(), MonitorOptions::default());

        let dir = tempfile::tempdir().unwrap();
        let log = TrafficLog::load(dir.path());
        let start = Instant::now();
        let tick = |log: &TrafficLog, secs: u64| {
            monitor.update_all();
            log.record(
                monitor.live_rate(DeviceClass::Network, Channel::Up),
                monitor.live_rate(DeviceClass::Network, Channel::Down),
                start + Duration::from_secs(secs),
                day(9),
            );
        };

        tick(&log, 0);
        tick(&log, 1);
        assert_eq!(log.totals_for(day(9)).up, 1000.0);
        assert_eq!(monitor.get(keys::NET_UP), Some(1000.0));

        provider.set_hardware(Vec::new());
        monitor.rebuild();
        for secs in 2..12 {
            tick(&log, secs);
        }
        assert_eq!(monitor.get(keys::NET_UP), Some(1000.0));
        assert_eq!(log.totals_for(day(9)).up, 1000.0);
    }

    #[test]
    fn test_clean_log_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let log = TrafficLog::load(dir.path());
        log.flush().unwrap();
        assert!(!dir.path().join(TRAFFIC_FILE).exists());
    }
}

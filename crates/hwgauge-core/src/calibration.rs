//! Observed-maximum record used for adaptive percentage scaling.

use crate::keys;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Clock observations above this are not recorded.
const MAX_RECORDABLE_CLOCK_MHZ: f32 = 10_000.0;

/// Power observations above this are not recorded.
const MAX_RECORDABLE_POWER_W: f32 = 2_000.0;

/// Highest plausible values seen for the composite metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    #[serde(default = "default_cpu_clock")]
    pub recorded_max_cpu_clock: f32,

    #[serde(default = "default_cpu_power")]
    pub recorded_max_cpu_power: f32,

    #[serde(default = "default_gpu_clock")]
    pub recorded_max_gpu_clock: f32,

    #[serde(default = "default_gpu_power")]
    pub recorded_max_gpu_power: f32,
}

fn default_cpu_clock() -> f32 {
    4200.0
}

fn default_cpu_power() -> f32 {
    65.0
}

fn default_gpu_clock() -> f32 {
    1800.0
}

fn default_gpu_power() -> f32 {
    100.0
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            recorded_max_cpu_clock: default_cpu_clock(),
            recorded_max_cpu_power: default_cpu_power(),
            recorded_max_gpu_clock: default_gpu_clock(),
            recorded_max_gpu_power: default_gpu_power(),
        }
    }
}

impl Calibration {
    /// Raises the maximum for `key` if `value` exceeds it. Returns true on change.
    pub fn observe(&mut self, key: &str, value: f32) -> bool {
        if value <= 0.0 || !value.is_finite() {
            return false;
        }
        if key.contains("Clock") && value > MAX_RECORDABLE_CLOCK_MHZ {
            return false;
        }
        if key.contains("Power") && value > MAX_RECORDABLE_POWER_W {
            return false;
        }

        let Some(slot) = self.slot_mut(key) else {
            return false;
        };
        if value > *slot {
            *slot = value;
            true
        } else {
            false
        }
    }

    /// Returns the recorded maximum for `key`.
    pub fn max_for(&self, key: &str) -> Option<f32> {
        match key {
            keys::CPU_CLOCK => Some(self.recorded_max_cpu_clock),
            keys::CPU_POWER => Some(self.recorded_max_cpu_power),
            keys::GPU_CLOCK => Some(self.recorded_max_gpu_clock),
            keys::GPU_POWER => Some(self.recorded_max_gpu_power),
            _ => None,
        }
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut f32> {
        match key {
            keys::CPU_CLOCK => Some(&mut self.recorded_max_cpu_clock),
            keys::CPU_POWER => Some(&mut self.recorded_max_cpu_power),
            keys::GPU_CLOCK => Some(&mut self.recorded_max_gpu_clock),
            keys::GPU_POWER => Some(&mut self.recorded_max_gpu_power),
            _ => None,
        }
    }
}

/// Limits how often a changing record is written out.
#[derive(Debug)]
pub struct SaveThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl SaveThrottle {
    /// Creates a throttle that allows one save per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Returns true and arms the throttle if a save is allowed at `now`.
    pub fn ready(&mut self, now: Instant) -> bool {
        let allowed = self
            .last
            .map(|last| now.duration_since(last) >= self.interval)
            .unwrap_or(true);
        if allowed {
            self.last = Some(now);
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cal = Calibration::default();
        assert_eq!(cal.max_for(keys::CPU_CLOCK), Some(4200.0));
        assert_eq!(cal.max_for(keys::CPU_POWER), Some(65.0));
        assert_eq!(cal.max_for(keys::GPU_CLOCK), Some(1800.0));
        assert_eq!(cal.max_for(keys::GPU_POWER), Some(100.0));
        assert_eq!(cal.max_for(keys::MEM_LOAD), None);
    }

    #[test]
    fn test_observe_only_raises() {
        let mut cal = Calibration::default();
        assert!(cal.observe(keys::GPU_POWER, 250.0));
        assert!(!cal.observe(keys::GPU_POWER, 200.0));
        assert_eq!(cal.recorded_max_gpu_power, 250.0);
    }

    #[test]
    fn test_observe_rejects_implausible() {
        let mut cal = Calibration::default();
        assert!(!cal.observe(keys::CPU_CLOCK, 12_000.0));
        assert!(!cal.observe(keys::GPU_POWER, 2_500.0));
        assert!(!cal.observe(keys::CPU_POWER, -1.0));
        assert!(!cal.observe(keys::CPU_POWER, f32::INFINITY));
        assert!(!cal.observe(keys::CPU_LOAD, 100.0));
        assert_eq!(cal, Calibration::default());
    }

    #[test]
    fn test_observe_accepts_high_gpu_power() {
        let mut cal = Calibration::default();
        assert!(cal.observe(keys::GPU_POWER, 1999.0));
        assert_eq!(cal.recorded_max_gpu_power, 1999.0);
    }

    #[test]
    fn test_save_throttle() {
        let start = Instant::now();
        let mut throttle = SaveThrottle::new(Duration::from_secs(30));
        assert!(throttle.ready(start));
        assert!(!throttle.ready(start + Duration::from_secs(10)));
        assert!(throttle.ready(start + Duration::from_secs(31)));
    }
}

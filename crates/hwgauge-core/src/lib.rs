//! hwgauge core library
//!
//! Turns a tree of raw hardware sensors into a small set of stable, named
//! metrics ("CPU.Clock", "NET.Up", ...) for overlays and alerting. The
//! [`HardwareMonitor`] is the single query point; everything else in this
//! crate feeds it.

pub mod calibration;
pub mod classify;
pub mod composite;
pub mod error;
pub mod fixed;
pub mod hardware;
pub mod keys;
pub mod last_valid;
pub mod monitor;
pub mod preferences;
pub mod selector;
pub mod sensor_map;
#[cfg(target_os = "linux")]
pub mod sysfs;
pub mod traffic;

pub use calibration::Calibration;
pub use error::{Error, Result};
pub use fixed::{FixedHardware, FixedProvider, SensorCell};
pub use hardware::{
    Hardware, HardwareHandle, HardwareKind, Sensor, SensorHandle, SensorKind, SensorProvider,
};
pub use keys::DeviceClass;
pub use monitor::{HardwareMonitor, MonitorOptions};
pub use preferences::{NullStore, PreferenceStore, Preferences};
#[cfg(target_os = "linux")]
pub use sysfs::SysfsProvider;
pub use traffic::{DailyTraffic, TrafficSource};

/// Sensor map entries older than this are rebuilt on the next query.
pub const MAP_MAX_AGE_SECS: u64 = 600;

/// Activity (summed channel throughput) above which a cached device is kept without a rescan.
pub const ACTIVE_THROUGHPUT: f32 = 0.1;

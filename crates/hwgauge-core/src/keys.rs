//! Metric key vocabulary and query routing.

use crate::hardware::HardwareKind;
use crate::{Error, Result};
use std::str::FromStr;
use std::time::Duration;

pub const CPU_LOAD: &str = "CPU.Load";
pub const CPU_TEMP: &str = "CPU.Temp";
pub const CPU_CLOCK: &str = "CPU.Clock";
pub const CPU_POWER: &str = "CPU.Power";
pub const GPU_LOAD: &str = "GPU.Load";
pub const GPU_TEMP: &str = "GPU.Temp";
pub const GPU_CLOCK: &str = "GPU.Clock";
pub const GPU_POWER: &str = "GPU.Power";
pub const GPU_VRAM: &str = "GPU.VRAM";
pub const GPU_VRAM_USED: &str = "GPU.VRAM.Used";
pub const GPU_VRAM_TOTAL: &str = "GPU.VRAM.Total";
pub const GPU_VRAM_LOAD: &str = "GPU.VRAM.Load";
pub const MEM_LOAD: &str = "MEM.Load";
pub const NET_UP: &str = "NET.Up";
pub const NET_DOWN: &str = "NET.Down";
pub const DISK_READ: &str = "DISK.Read";
pub const DISK_WRITE: &str = "DISK.Write";
pub const DATA_DAY_UP: &str = "DATA.DayUp";
pub const DATA_DAY_DOWN: &str = "DATA.DayDown";

/// The displayable key set, in panel order.
pub const ALL: &[&str] = &[
    CPU_LOAD,
    CPU_TEMP,
    CPU_CLOCK,
    CPU_POWER,
    GPU_LOAD,
    GPU_TEMP,
    GPU_VRAM,
    GPU_CLOCK,
    GPU_POWER,
    MEM_LOAD,
    DISK_READ,
    DISK_WRITE,
    NET_UP,
    NET_DOWN,
    DATA_DAY_UP,
    DATA_DAY_DOWN,
];

/// Multi-instance device family resolved by a device selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    Network,
    Disk,
}

impl DeviceClass {
    /// Hardware nodes that belong to this class.
    pub fn hardware_kind(&self) -> HardwareKind {
        match self {
            DeviceClass::Network => HardwareKind::Network,
            DeviceClass::Disk => HardwareKind::Storage,
        }
    }

    /// Minimum time between full scans while the cached device is idle.
    pub fn default_cooldown(&self) -> Duration {
        match self {
            DeviceClass::Network => Duration::from_secs(3),
            DeviceClass::Disk => Duration::from_secs(10),
        }
    }

    /// The two throughput channels of this class.
    pub fn channels(&self) -> [Channel; 2] {
        match self {
            DeviceClass::Network => [Channel::Up, Channel::Down],
            DeviceClass::Disk => [Channel::Read, Channel::Write],
        }
    }
}

impl FromStr for DeviceClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "network" | "net" => Ok(DeviceClass::Network),
            "disk" | "storage" => Ok(DeviceClass::Disk),
            _ => Err(Error::InvalidDeviceClass(s.to_string())),
        }
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceClass::Network => write!(f, "network"),
            DeviceClass::Disk => write!(f, "disk"),
        }
    }
}

/// One direction of a device's throughput.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Up,
    Down,
    Read,
    Write,
}

impl Channel {
    /// Name fragments that identify this channel's throughput sensor.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Channel::Up => &["upload", "up", "sent", "send", "tx", "transmit"],
            Channel::Down => &["download", "down", "received", "receive", "rx"],
            Channel::Read => &["read"],
            Channel::Write => &["write"],
        }
    }
}

/// How a key is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Throughput read from the selected device.
    Device(DeviceClass, Channel),
    /// Delegated to the traffic-accounting collaborator.
    Traffic(Channel),
    /// Clock or power formula.
    Composite,
    /// VRAM used/total percentage.
    VramPercent,
    /// Plain sensor map lookup.
    Direct,
}

/// Returns the resolution path for `key`.
pub fn route(key: &str) -> Route {
    match key {
        NET_UP => Route::Device(DeviceClass::Network, Channel::Up),
        NET_DOWN => Route::Device(DeviceClass::Network, Channel::Down),
        DISK_READ => Route::Device(DeviceClass::Disk, Channel::Read),
        DISK_WRITE => Route::Device(DeviceClass::Disk, Channel::Write),
        DATA_DAY_UP => Route::Traffic(Channel::Up),
        DATA_DAY_DOWN => Route::Traffic(Channel::Down),
        GPU_VRAM => Route::VramPercent,
        _ if key.contains("Clock") || key.contains("Power") => Route::Composite,
        _ => Route::Direct,
    }
}

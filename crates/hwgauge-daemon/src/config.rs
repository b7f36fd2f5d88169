//! Configuration management.

use anyhow::{Context, Result};
use hwgauge_core::{keys, MonitorOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Sample loop interval in milliseconds
    #[serde(default = "default_poll")]
    pub poll: u64,

    /// Directory for preferences.toml and traffic.json
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Device overrides
    #[serde(default)]
    pub devices: DevicesConfig,

    /// Engine tuning
    #[serde(default)]
    pub engine: EngineConfig,

    /// Snapshot output
    #[serde(default)]
    pub output: OutputConfig,

    /// Daily traffic accounting
    #[serde(default)]
    pub traffic: TrafficConfig,
}

/// Manual device choices. Empty strings mean automatic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DevicesConfig {
    /// Network adapter to report
    #[serde(default)]
    pub network: String,

    /// Disk to report
    #[serde(default)]
    pub disk: String,

    /// Name fragment of the boot disk (e.g. "nvme0n1")
    #[serde(default)]
    pub boot_volume: String,
}

/// Engine timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sensor map rebuild age in seconds
    #[serde(default = "default_map_rebuild")]
    pub map_rebuild_secs: u64,

    /// Idle network adapter rescan delay in milliseconds
    #[serde(default = "default_network_cooldown")]
    pub network_cooldown_ms: u64,

    /// Idle disk rescan delay in milliseconds
    #[serde(default = "default_disk_cooldown")]
    pub disk_cooldown_ms: u64,

    /// Minimum seconds between calibration saves
    #[serde(default = "default_calibration_save")]
    pub calibration_save_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            map_rebuild_secs: default_map_rebuild(),
            network_cooldown_ms: default_network_cooldown(),
            disk_cooldown_ms: default_disk_cooldown(),
            calibration_save_secs: default_calibration_save(),
        }
    }
}

/// Snapshot output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// JSON file rewritten every tick (unset = no snapshot)
    #[serde(default)]
    pub snapshot: Option<String>,

    /// Keys sampled every tick
    #[serde(default = "default_keys")]
    pub keys: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            snapshot: None,
            keys: default_keys(),
        }
    }
}

/// Traffic accounting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficConfig {
    /// Seconds between traffic.json writes
    #[serde(default = "default_flush")]
    pub flush_secs: u64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            flush_secs: default_flush(),
        }
    }
}

// Default value functions
fn default_poll() -> u64 {
    1000
}

fn default_state_dir() -> String {
    "/var/lib/hwgauge".to_string()
}

fn default_map_rebuild() -> u64 {
    hwgauge_core::MAP_MAX_AGE_SECS
}

fn default_network_cooldown() -> u64 {
    3000
}

fn default_disk_cooldown() -> u64 {
    10000
}

fn default_calibration_save() -> u64 {
    30
}

fn default_keys() -> Vec<String> {
    keys::ALL.iter().map(|k| k.to_string()).collect()
}

fn default_flush() -> u64 {
    60
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path.as_ref(), content).context("Failed to write configuration file")?;
        Ok(())
    }

    /// Engine options derived from `[engine]` and `[devices]`.
    pub fn monitor_options(&self) -> MonitorOptions {
        let boot_volume = self.devices.boot_volume.trim();
        MonitorOptions {
            map_max_age: Duration::from_secs(self.engine.map_rebuild_secs),
            network_cooldown: Duration::from_millis(self.engine.network_cooldown_ms),
            disk_cooldown: Duration::from_millis(self.engine.disk_cooldown_ms),
            calibration_save_interval: Duration::from_secs(self.engine.calibration_save_secs),
            boot_volume: (!boot_volume.is_empty()).then(|| boot_volume.to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll: default_poll(),
            state_dir: default_state_dir(),
            devices: DevicesConfig::default(),
            engine: EngineConfig::default(),
            output: OutputConfig::default(),
            traffic: TrafficConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.output.keys.len(), keys::ALL.len());
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            poll = 2000

            [devices]
            network = "enp13s0"

            [engine]
            disk_cooldown_ms = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.poll, 2000);
        assert_eq!(config.devices.network, "enp13s0");
        assert_eq!(config.devices.disk, "");
        assert_eq!(config.engine.disk_cooldown_ms, 5000);
        assert_eq!(config.engine.network_cooldown_ms, 3000);
    }

    #[test]
    fn test_monitor_options() {
        let mut config = Config::default();
        let options = config.monitor_options();
        assert_eq!(options.map_max_age, Duration::from_secs(600));
        assert_eq!(options.disk_cooldown, Duration::from_secs(10));
        assert_eq!(options.boot_volume, None);

        config.devices.boot_volume = " sda ".to_string();
        assert_eq!(config.monitor_options().boot_volume.as_deref(), Some("sda"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hwgauge.toml");
        let mut config = Config::default();
        config.output.snapshot = Some("/run/hwgauge/snapshot.json".to_string());
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }
}

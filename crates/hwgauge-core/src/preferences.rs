//! Device overrides, selection hints and calibration owned by the host.

use crate::calibration::Calibration;
use crate::keys::DeviceClass;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Persisted engine inputs and write-backs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Pinned network adapter name (empty = automatic).
    #[serde(default)]
    pub preferred_network: String,

    /// Pinned disk name (empty = automatic).
    #[serde(default)]
    pub preferred_disk: String,

    /// Adapter chosen by the last automatic scan.
    #[serde(default)]
    pub last_auto_network: String,

    /// Disk chosen by the last automatic scan.
    #[serde(default)]
    pub last_auto_disk: String,

    /// Observed maxima.
    #[serde(default)]
    pub calibration: Calibration,
}

impl Preferences {
    /// Returns the manual override for `class`, if set.
    pub fn preferred(&self, class: DeviceClass) -> Option<&str> {
        let name = match class {
            DeviceClass::Network => &self.preferred_network,
            DeviceClass::Disk => &self.preferred_disk,
        };
        Some(name.trim()).filter(|n| !n.is_empty())
    }

    /// Sets or clears the manual override for `class`.
    pub fn set_preferred(&mut self, class: DeviceClass, name: Option<&str>) {
        let value = name.map(str::trim).unwrap_or_default().to_string();
        match class {
            DeviceClass::Network => self.preferred_network = value,
            DeviceClass::Disk => self.preferred_disk = value,
        }
    }

    /// Returns the last automatically chosen device for `class`, if any.
    pub fn last_auto(&self, class: DeviceClass) -> Option<&str> {
        let name = match class {
            DeviceClass::Network => &self.last_auto_network,
            DeviceClass::Disk => &self.last_auto_disk,
        };
        Some(name.as_str()).filter(|n| !n.is_empty())
    }

    /// Records the automatic choice for `class`. Returns true if it changed.
    pub fn set_last_auto(&mut self, class: DeviceClass, name: &str) -> bool {
        let slot = match class {
            DeviceClass::Network => &mut self.last_auto_network,
            DeviceClass::Disk => &mut self.last_auto_disk,
        };
        if slot == name {
            return false;
        }
        *slot = name.to_string();
        true
    }
}

/// Configuration collaborator that owns persistence of [`Preferences`].
pub trait PreferenceStore: Send + Sync {
    /// Writes the full preference record.
    fn save(&self, preferences: &Preferences) -> Result<()>;
}

/// Store that discards every save.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl PreferenceStore for NullStore {
    fn save(&self, _preferences: &Preferences) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferred_blank_is_none() {
        let mut prefs = Preferences::default();
        assert_eq!(prefs.preferred(DeviceClass::Network), None);
        prefs.preferred_network = "   ".to_string();
        assert_eq!(prefs.preferred(DeviceClass::Network), None);
        prefs.set_preferred(DeviceClass::Network, Some(" eth0 "));
        assert_eq!(prefs.preferred(DeviceClass::Network), Some("eth0"));
        prefs.set_preferred(DeviceClass::Network, None);
        assert_eq!(prefs.preferred(DeviceClass::Network), None);
    }

    #[test]
    fn test_last_auto_write_on_change() {
        let mut prefs = Preferences::default();
        assert!(prefs.set_last_auto(DeviceClass::Disk, "nvme0n1"));
        assert!(!prefs.set_last_auto(DeviceClass::Disk, "nvme0n1"));
        assert_eq!(prefs.last_auto(DeviceClass::Disk), Some("nvme0n1"));
        assert_eq!(prefs.last_auto(DeviceClass::Network), None);
    }
}

//! Preference persistence in the state directory.

use hwgauge_core::{Error, PreferenceStore, Preferences};
use std::path::{Path, PathBuf};
use tracing::warn;

const PREFERENCES_FILE: &str = "preferences.toml";

/// Writes engine preferences to `<state_dir>/preferences.toml`.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Creates a store rooted at `state_dir`, creating the directory if needed.
    pub fn new(state_dir: &Path) -> Self {
        if let Err(e) = std::fs::create_dir_all(state_dir) {
            warn!("Failed to create state directory {:?}: {}", state_dir, e);
        }
        Self {
            path: state_dir.join(PREFERENCES_FILE),
        }
    }

    /// Loads saved preferences, falling back to defaults.
    pub fn load(&self) -> Preferences {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return Preferences::default(),
        };
        match toml::from_str(&content) {
            Ok(preferences) => preferences,
            Err(e) => {
                warn!("Ignoring unreadable {:?}: {}", self.path, e);
                Preferences::default()
            }
        }
    }
}

impl PreferenceStore for StateStore {
    fn save(&self, preferences: &Preferences) -> hwgauge_core::Result<()> {
        let content =
            toml::to_string_pretty(preferences).map_err(|e| Error::Persist(e.to_string()))?;
        // Replace atomically.
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        assert_eq!(store.load(), Preferences::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(&dir.path().join("nested"));
        let mut preferences = Preferences::default();
        preferences.last_auto_network = "enp13s0".to_string();
        preferences.calibration.recorded_max_gpu_power = 320.0;

        store.save(&preferences).unwrap();
        assert_eq!(store.load(), preferences);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PREFERENCES_FILE),
            "preferred_disk = \"sdb\"\n\n[calibration]\nrecorded_max_cpu_clock = 5200.0\n",
        )
        .unwrap();
        let loaded = StateStore::new(dir.path()).load();
        assert_eq!(loaded.preferred_disk, "sdb");
        assert_eq!(loaded.calibration.recorded_max_cpu_clock, 5200.0);
        assert_eq!(loaded.calibration.recorded_max_cpu_power, 65.0);
    }

    #[test]
    fn test_corrupt_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PREFERENCES_FILE), "preferred_disk = [").unwrap();
        assert_eq!(StateStore::new(dir.path()).load(), Preferences::default());
    }
}

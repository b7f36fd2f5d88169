//! hwmon chip discovery and temperature channels.

use super::{read_text, read_value};
use crate::fixed::SensorCell;
use crate::hardware::SensorKind;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Returns the first `/sys/class/hwmon` chip whose `name` is in `names`.
///
/// Chips are tried in `names` order, so callers list preferred drivers first.
pub fn find_chip(root: &Path, names: &[&str]) -> Option<PathBuf> {
    let mut chips: Vec<(String, PathBuf)> = fs::read_dir(root.join("sys/class/hwmon"))
        .ok()?
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            read_text(&path.join("name")).map(|name| (name, path))
        })
        .collect();
    chips.sort_by(|a, b| a.1.cmp(&b.1));

    names.iter().find_map(|wanted| {
        chips
            .iter()
            .find(|(name, _)| name == wanted)
            .map(|(_, path)| path.clone())
    })
}

/// Returns the hwmon directory of a device, e.g. a GPU's `device/hwmon/hwmonN`.
pub fn device_chip(device: &Path) -> Option<PathBuf> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(device.join("hwmon"))
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .collect();
    dirs.sort();
    dirs.into_iter().next()
}

/// One `tempN_input` channel.
pub struct TempChannel {
    pub input: PathBuf,
    pub label: String,
}

/// Lists the temperature channels of a chip, ordered by channel number.
///
/// Channels without a `tempN_label` are labelled "Temp N".
pub fn temperatures(chip: &Path) -> Vec<TempChannel> {
    let Ok(entries) = fs::read_dir(chip) else {
        return Vec::new();
    };

    let mut indices: Vec<u32> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            name.strip_prefix("temp")?
                .strip_suffix("_input")?
                .parse()
                .ok()
        })
        .collect();
    indices.sort_unstable();

    indices
        .into_iter()
        .map(|n| TempChannel {
            input: chip.join(format!("temp{n}_input")),
            label: read_text(&chip.join(format!("temp{n}_label")))
                .unwrap_or_else(|| format!("Temp {n}")),
        })
        .collect()
}

/// A temperature cell bound to its input file.
pub struct TempSensor {
    pub input: PathBuf,
    pub cell: Arc<SensorCell>,
}

impl TempSensor {
    pub fn new(input: PathBuf, name: &str) -> Self {
        Self {
            input,
            cell: SensorCell::new(SensorKind::Temperature, name),
        }
    }

    /// Re-reads millidegrees and stores degrees Celsius.
    pub fn refresh(&self) {
        let value = read_value::<f32>(&self.input).ok().map(|m| m / 1000.0);
        self.cell.set(value);
    }
}

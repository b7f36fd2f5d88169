//! GPU nodes from /sys/class/drm.

use super::hwmon::{self, TempSensor};
use super::{read_text, read_value};
use crate::fixed::SensorCell;
use crate::hardware::{Hardware, HardwareKind, SensorHandle, SensorKind};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Maps a PCI vendor id to a GPU kind.
pub fn vendor_kind(vendor: &str) -> Option<HardwareKind> {
    match vendor.trim().to_lowercase().as_str() {
        "0x10de" => Some(HardwareKind::GpuNvidia),
        "0x1002" => Some(HardwareKind::GpuAmd),
        "0x8086" => Some(HardwareKind::GpuIntel),
        _ => None,
    }
}

/// Sensor name for a GPU hwmon temperature label.
pub fn temperature_name(label: &str) -> String {
    match label.to_lowercase().as_str() {
        "edge" => "GPU Core".to_string(),
        "junction" => "GPU Hot Spot".to_string(),
        "mem" => "GPU Memory Junction".to_string(),
        other => format!("GPU {other}"),
    }
}

/// Unit conversion applied to a raw attribute.
#[derive(Debug, Clone, Copy)]
enum Scale {
    Unit,
    /// Hz to MHz, µW to W.
    Million,
}

impl Scale {
    fn apply(&self, raw: f64) -> f32 {
        match self {
            Scale::Unit => raw as f32,
            Scale::Million => (raw / 1e6) as f32,
        }
    }
}

struct Attribute {
    path: PathBuf,
    scale: Scale,
    cell: Arc<SensorCell>,
}

impl Attribute {
    fn bind(path: PathBuf, scale: Scale, kind: SensorKind, name: &str) -> Option<Self> {
        path.exists().then(|| Self {
            path,
            scale,
            cell: SensorCell::new(kind, name),
        })
    }

    fn refresh(&self) {
        let value = read_value::<f64>(&self.path).ok().map(|raw| self.scale.apply(raw));
        self.cell.set(value);
    }
}

/// One graphics adapter.
pub struct GpuNode {
    kind: HardwareKind,
    name: String,
    attributes: Vec<Attribute>,
    temps: Vec<TempSensor>,
}

impl GpuNode {
    fn discover_card(card: &Path) -> Option<Self> {
        let device = card.join("device");
        let kind = vendor_kind(&read_text(&device.join("vendor"))?)?;
        let card_name = card.file_name()?.to_string_lossy().to_string();
        let vendor = match kind {
            HardwareKind::GpuNvidia => "NVIDIA",
            HardwareKind::GpuAmd => "AMD",
            _ => "Intel",
        };
        let name = format!("{vendor} GPU ({card_name})");

        let mut attributes: Vec<Attribute> = [
            Attribute::bind(
                device.join("gpu_busy_percent"),
                Scale::Unit,
                SensorKind::Load,
                "GPU Core",
            ),
            Attribute::bind(
                device.join("mem_info_vram_used"),
                Scale::Unit,
                SensorKind::SmallData,
                "GPU Memory Used",
            ),
            Attribute::bind(
                device.join("mem_info_vram_total"),
                Scale::Unit,
                SensorKind::SmallData,
                "GPU Memory Total",
            ),
        ]
        .into_iter()
        .flatten()
        .collect();

        let mut temps = Vec::new();
        if let Some(chip) = hwmon::device_chip(&device) {
            temps = hwmon::temperatures(&chip)
                .into_iter()
                .map(|channel| TempSensor::new(channel.input, &temperature_name(&channel.label)))
                .collect();
            attributes.extend(Attribute::bind(
                chip.join("freq1_input"),
                Scale::Million,
                SensorKind::Clock,
                "GPU Core",
            ));
            let power = ["power1_average", "power1_input"]
                .iter()
                .map(|file| chip.join(file))
                .find(|path| path.exists());
            if let Some(path) = power {
                attributes.extend(Attribute::bind(
                    path,
                    Scale::Million,
                    SensorKind::Power,
                    "GPU Package",
                ));
            }
        }

        Some(Self {
            kind,
            name,
            attributes,
            temps,
        })
    }
}

/// True for `cardN`, false for connectors like `card1-DP-1`.
fn is_card(name: &str) -> bool {
    name.strip_prefix("card")
        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// Returns one node per `cardN` with a known vendor, in card order.
pub fn discover(root: &Path) -> Vec<GpuNode> {
    let Ok(entries) = fs::read_dir(root.join("sys/class/drm")) else {
        return Vec::new();
    };

    let mut cards: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .map(|name| is_card(&name.to_string_lossy()))
                .unwrap_or(false)
        })
        .collect();
    cards.sort();

    cards.iter().filter_map(|card| GpuNode::discover_card(card)).collect()
}

impl Hardware for GpuNode {
    fn kind(&self) -> HardwareKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn sensors(&self) -> Vec<SensorHandle> {
        self.attributes
            .iter()
            .map(|a| a.cell.clone() as SensorHandle)
            .chain(self.temps.iter().map(|t| t.cell.clone() as SensorHandle))
            .collect()
    }

    fn refresh(&self) {
        for attribute in &self.attributes {
            attribute.refresh();
        }
        for temp in &self.temps {
            temp.refresh();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::Sensor;

    fn write(path: PathBuf, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_vendor_kind() {
        assert_eq!(vendor_kind("0x10de\n"), Some(HardwareKind::GpuNvidia));
        assert_eq!(vendor_kind("0x1002"), Some(HardwareKind::GpuAmd));
        assert_eq!(vendor_kind("0x8086"), Some(HardwareKind::GpuIntel));
        assert_eq!(vendor_kind("0x1af4"), None);
    }

    #[test]
    fn test_temperature_name() {
        assert_eq!(temperature_name("edge"), "GPU Core");
        assert_eq!(temperature_name("junction"), "GPU Hot Spot");
        assert_eq!(temperature_name("mem"), "GPU Memory Junction");
    }

    #[test]
    fn test_discover_amd_card() {
        let dir = tempfile::tempdir().unwrap();
        let drm = dir.path().join("sys/class/drm");
        let device = drm.join("card1/device");
        let chip = device.join("hwmon/hwmon4");
        write(device.join("vendor"), "0x1002\n");
        write(device.join("gpu_busy_percent"), "37\n");
        write(device.join("mem_info_vram_used"), "2147483648\n");
        write(device.join("mem_info_vram_total"), "17163091968\n");
        write(chip.join("temp1_input"), "52000\n");
        write(chip.join("temp1_label"), "edge\n");
        write(chip.join("freq1_input"), "2450000000\n");
        write(chip.join("power1_average"), "212000000\n");
        write(drm.join("card1-DP-1/status"), "connected\n");
        write(drm.join("card0/device/vendor"), "0x1af4\n");

        let gpus = discover(dir.path());
        assert_eq!(gpus.len(), 1);
        let gpu = &gpus[0];
        assert_eq!(gpu.kind(), HardwareKind::GpuAmd);
        assert_eq!(gpu.name(), "AMD GPU (card1)");

        gpu.refresh();
        let readings: Vec<(SensorKind, String, Option<f32>)> = gpu
            .sensors()
            .iter()
            .map(|s| (s.kind(), s.name().to_string(), s.value()))
            .collect();
        assert_eq!(
            readings,
            vec![
                (SensorKind::Load, "GPU Core".to_string(), Some(37.0)),
                (SensorKind::SmallData, "GPU Memory Used".to_string(), Some(2147483648.0)),
                (SensorKind::SmallData, "GPU Memory Total".to_string(), Some(17163091968.0)),
                (SensorKind::Clock, "GPU Core".to_string(), Some(2450.0)),
                (SensorKind::Power, "GPU Package".to_string(), Some(212.0)),
                (SensorKind::Temperature, "GPU Core".to_string(), Some(52.0)),
            ]
        );
    }
}

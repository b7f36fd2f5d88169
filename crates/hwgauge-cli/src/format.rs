//! Human-readable rendering of metric values.

use hwgauge_core::keys;

/// Formats a byte rate as a human-readable string (e.g., "1.2 MB/s")
pub fn format_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec))
}

/// Formats a byte count as a human-readable string (e.g., "3.4 GB")
pub fn format_bytes(bytes: f64) -> String {
    if bytes >= 1_000_000_000.0 {
        format!("{:.1} GB", bytes / 1_000_000_000.0)
    } else if bytes >= 1_000_000.0 {
        format!("{:.1} MB", bytes / 1_000_000.0)
    } else if bytes >= 1_000.0 {
        format!("{:.1} KB", bytes / 1_000.0)
    } else {
        format!("{:.0} B", bytes)
    }
}

/// Formats `value` in the unit implied by `key`. Missing readings print "n/a".
pub fn format_value(key: &str, value: Option<f32>) -> String {
    let Some(value) = value else {
        return "n/a".to_string();
    };
    let v = value as f64;

    match key {
        keys::NET_UP | keys::NET_DOWN | keys::DISK_READ | keys::DISK_WRITE => format_rate(v),
        keys::DATA_DAY_UP | keys::DATA_DAY_DOWN => format_bytes(v),
        keys::GPU_VRAM_USED | keys::GPU_VRAM_TOTAL => format!("{:.0}", v),
        _ if key.ends_with(".Temp") => format!("{:.1} °C", v),
        _ if key.ends_with(".Clock") => format!("{:.0} MHz", v),
        _ if key.ends_with(".Power") => format!("{:.1} W", v),
        _ => format!("{:.1} %", v),
    }
}

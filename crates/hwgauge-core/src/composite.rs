//! Derived metrics computed from several raw sensors.
//!
//! Everything here is a pure function of current sensor values. The engine
//! adds the calibration side effect and the last-valid fallback.

use crate::hardware::{name_has, SensorHandle, SensorKind};

/// GPU clock readings above this are sensor glitches.
pub const MAX_GPU_CLOCK_MHZ: f32 = 6000.0;

/// GPU power readings above this are sensor glitches.
pub const MAX_GPU_POWER_W: f32 = 2000.0;

/// VRAM totals above this (10 MiB worth of MB) are taken to be in bytes.
pub const VRAM_BYTES_THRESHOLD: f32 = 10.0 * 1024.0 * 1024.0;

const BYTES_PER_MIB: f32 = 1024.0 * 1024.0;

/// Reference bus clock the correction restores.
const NOMINAL_BUS_MHZ: f32 = 100.0;

const GPU_CLOCK_NAMES: &[&str] = &["graphics", "core", "shader"];
const GPU_POWER_NAMES: &[&str] = &["package", "ppt", "board", "core", "gpu"];

/// Scale factor for per-core clocks derived from a misreported bus speed.
///
/// Some drivers report the bus at ~15 MHz instead of ~100 MHz, which makes
/// every derived core clock read about 6.5x low. The factor is only applied
/// when the bus reading lies in (1, 20) MHz and the resulting factor lies in
/// (2, 10); anything else is treated as noise and left uncorrected.
// TODO: drop once the provider reports the bus clock correctly on Zen 5.
pub fn bus_correction(bus_mhz: Option<f32>) -> f32 {
    let Some(bus) = bus_mhz.filter(|b| !b.is_nan()) else {
        return 1.0;
    };
    if bus > 1.0 && bus < 20.0 {
        let factor = NOMINAL_BUS_MHZ / bus;
        if factor > 2.0 && factor < 10.0 {
            return factor;
        }
    }
    1.0
}

/// Result of the per-core clock formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuClock {
    /// Load-weighted (or plain) average, MHz.
    pub average: f32,
    /// Highest corrected per-core clock seen, MHz.
    pub peak: f32,
}

/// Load-weighted average of per-core clocks.
///
/// `cores` holds (clock, load) readings. Cores without a clock are skipped.
/// When no core reports load the plain mean of the clocks is returned
/// instead, so an idle machine does not read 0 MHz.
pub fn cpu_clock(cores: &[(Option<f32>, Option<f32>)], correction: f32) -> Option<CpuClock> {
    let mut weighted_sum = 0.0f64;
    let mut total_load = 0.0f64;
    let mut clock_sum = 0.0f64;
    let mut clock_count = 0u32;
    let mut peak = 0.0f32;

    for (clock, load) in cores {
        let Some(clock) = clock.filter(|c| !c.is_nan()) else {
            continue;
        };
        let clock = clock * correction;

        peak = peak.max(clock);
        clock_sum += clock as f64;
        clock_count += 1;

        if let Some(load) = load.filter(|l| !l.is_nan()) {
            weighted_sum += clock as f64 * load as f64;
            total_load += load as f64;
        }
    }

    if clock_count == 0 {
        return None;
    }

    let average = if total_load <= 0.001 {
        (clock_sum / clock_count as f64) as f32
    } else {
        (weighted_sum / total_load) as f32
    };

    Some(CpuClock { average, peak })
}

/// VRAM usage percentage from used/total in the provider's unit.
///
/// Totals above [`VRAM_BYTES_THRESHOLD`] are taken to be bytes and both
/// values are rescaled to MiB before dividing.
pub fn vram_percent(used: f32, total: f32) -> Option<f32> {
    if used.is_nan() || total.is_nan() || total <= 0.0 {
        return None;
    }
    let (used, total) = if total > VRAM_BYTES_THRESHOLD {
        (used / BYTES_PER_MIB, total / BYTES_PER_MIB)
    } else {
        (used, total)
    };
    Some(used / total * 100.0)
}

/// Outcome of a GPU sensor lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GpuReading {
    /// No matching sensor, or it has no value.
    Missing,
    /// Value above the physical bound.
    Rejected(f32),
    /// Plausible value.
    Accepted(f32),
}

/// GPU core clock from the first graphics/core/shader clock sensor.
pub fn gpu_clock(sensors: &[SensorHandle]) -> GpuReading {
    bounded_reading(sensors, SensorKind::Clock, GPU_CLOCK_NAMES, MAX_GPU_CLOCK_MHZ)
}

/// GPU power from the first package/ppt/board/core/gpu power sensor.
pub fn gpu_power(sensors: &[SensorHandle]) -> GpuReading {
    bounded_reading(sensors, SensorKind::Power, GPU_POWER_NAMES, MAX_GPU_POWER_W)
}

fn bounded_reading(
    sensors: &[SensorHandle],
    kind: SensorKind,
    names: &[&str],
    bound: f32,
) -> GpuReading {
    let sensor = sensors
        .iter()
        .find(|s| s.kind() == kind && names.iter().any(|n| name_has(s.name(), n)));

    match sensor.and_then(|s| s.value()) {
        Some(v) if v.is_nan() => GpuReading::Missing,
        Some(v) if v > bound => GpuReading::Rejected(v),
        Some(v) => GpuReading::Accepted(v),
        None => GpuReading::Missing,
    }
}

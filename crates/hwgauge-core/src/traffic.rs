//! Interface to the daily traffic-accounting collaborator.

/// Bytes transferred since local midnight.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DailyTraffic {
    pub up: f64,
    pub down: f64,
}

/// Supplies today's traffic totals for the `DATA.Day*` keys.
pub trait TrafficSource: Send + Sync {
    /// Returns today's totals.
    fn today(&self) -> DailyTraffic;
}

//! In-memory hardware tree.
//!
//! [`SensorCell`] is the settable sensor every provider in this crate builds
//! on. [`FixedHardware`] and [`FixedProvider`] wrap cells in a tree whose
//! values are pushed by the host instead of read from the OS, which is what
//! tests and replay tools need.

use crate::hardware::{
    Hardware, HardwareHandle, HardwareKind, Sensor, SensorHandle, SensorKind, SensorProvider,
};
use crate::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// A sensor whose value is written by its owner.
#[derive(Debug)]
pub struct SensorCell {
    kind: SensorKind,
    name: String,
    value: Mutex<Option<f32>>,
}

impl SensorCell {
    /// Creates an empty cell.
    pub fn new(kind: SensorKind, name: &str) -> Arc<Self> {
        Arc::new(Self {
            kind,
            name: name.to_string(),
            value: Mutex::new(None),
        })
    }

    /// Creates a cell holding `value`.
    pub fn reading(kind: SensorKind, name: &str, value: f32) -> Arc<Self> {
        let cell = Self::new(kind, name);
        cell.set(Some(value));
        cell
    }

    /// Stores a new value (`None` = sensor not reporting).
    pub fn set(&self, value: Option<f32>) {
        *self.value.lock().unwrap_or_else(|e| e.into_inner()) = value;
    }
}

impl Sensor for SensorCell {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Option<f32> {
        *self.value.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Hardware node with host-managed sensors.
pub struct FixedHardware {
    kind: HardwareKind,
    name: String,
    sensors: Vec<Arc<SensorCell>>,
    children: Vec<HardwareHandle>,
    refreshes: AtomicUsize,
}

impl FixedHardware {
    /// Creates a node without sensors.
    pub fn new(kind: HardwareKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            sensors: Vec::new(),
            children: Vec::new(),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// Adds a sensor.
    pub fn with_sensor(mut self, sensor: Arc<SensorCell>) -> Self {
        self.sensors.push(sensor);
        self
    }

    /// Adds a sub-node.
    pub fn with_child(mut self, child: HardwareHandle) -> Self {
        self.children.push(child);
        self
    }

    /// Number of times [`Hardware::refresh`] was called.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Wraps the node for sharing while keeping access to [`Self::refresh_count`].
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Wraps the node as a type-erased handle.
    pub fn handle(self) -> HardwareHandle {
        Arc::new(self)
    }
}

impl Hardware for FixedHardware {
    fn kind(&self) -> HardwareKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn sensors(&self) -> Vec<SensorHandle> {
        self.sensors
            .iter()
            .map(|cell| Arc::clone(cell) as SensorHandle)
            .collect()
    }

    fn children(&self) -> Vec<HardwareHandle> {
        self.children.clone()
    }

    fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }
}

/// Provider over a host-managed list of nodes.
pub struct FixedProvider {
    nodes: RwLock<Vec<HardwareHandle>>,
    failure: Option<String>,
}

impl FixedProvider {
    /// Creates a provider exposing `nodes`.
    pub fn new(nodes: Vec<HardwareHandle>) -> Self {
        Self {
            nodes: RwLock::new(nodes),
            failure: None,
        }
    }

    /// Creates a provider whose [`SensorProvider::open`] fails with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
            failure: Some(reason.to_string()),
        }
    }

    /// Replaces the node list, as if hardware had been plugged or removed.
    pub fn set_hardware(&self, nodes: Vec<HardwareHandle>) {
        *self.nodes.write().unwrap_or_else(|e| e.into_inner()) = nodes;
    }
}

impl SensorProvider for FixedProvider {
    fn open(&self) -> Result<()> {
        match &self.failure {
            Some(reason) => Err(Error::ProviderUnavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn hardware(&self) -> Vec<HardwareHandle> {
        self.nodes.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_set_and_clear() {
        let cell = SensorCell::reading(SensorKind::Load, "CPU Total", 12.5);
        assert_eq!(cell.value(), Some(12.5));
        cell.set(None);
        assert_eq!(cell.value(), None);
    }

    #[test]
    fn test_refresh_count() {
        let hw = FixedHardware::new(HardwareKind::Cpu, "cpu").shared();
        let handle: HardwareHandle = hw.clone();
        handle.refresh();
        handle.refresh();
        assert_eq!(hw.refresh_count(), 2);
    }

    #[test]
    fn test_failing_provider() {
        let provider = FixedProvider::failing("no driver");
        assert!(matches!(
            provider.open(),
            Err(Error::ProviderUnavailable(reason)) if reason == "no driver"
        ));
        assert!(provider.hardware().is_empty());
    }

    #[test]
    fn test_set_hardware() {
        let provider = FixedProvider::new(Vec::new());
        provider.set_hardware(vec![FixedHardware::new(HardwareKind::Network, "eth0").handle()]);
        assert_eq!(provider.hardware().len(), 1);
    }
}

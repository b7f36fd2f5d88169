//! Capability interface over a sensor provider's hardware tree.
//!
//! A provider exposes hardware nodes (CPU, GPUs, memory, adapters, disks),
//! each with a list of sensors and optional sub-nodes. Values only change
//! when a node is told to [`Hardware::refresh`]; the engine never writes them.

use crate::Result;
use std::fmt;
use std::sync::Arc;

/// Shared handle to a sensor owned by a provider.
pub type SensorHandle = Arc<dyn Sensor>;

/// Shared handle to a hardware node owned by a provider.
pub type HardwareHandle = Arc<dyn Hardware>;

/// Hardware node type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareKind {
    Cpu,
    GpuNvidia,
    GpuAmd,
    GpuIntel,
    Memory,
    Network,
    Storage,
    Other,
}

impl HardwareKind {
    /// Returns true for any GPU vendor variant.
    pub fn is_gpu(&self) -> bool {
        matches!(
            self,
            HardwareKind::GpuNvidia | HardwareKind::GpuAmd | HardwareKind::GpuIntel
        )
    }

    /// Walk order for sensor discovery: discrete GPUs, then integrated, then the rest.
    pub fn discovery_priority(&self) -> u8 {
        match self {
            HardwareKind::GpuNvidia | HardwareKind::GpuAmd => 0,
            HardwareKind::GpuIntel => 1,
            _ => 2,
        }
    }

    /// Returns true for nodes that are refreshed on every tick.
    pub fn is_fast(&self) -> bool {
        *self == HardwareKind::Cpu || self.is_gpu()
    }
}

impl fmt::Display for HardwareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HardwareKind::Cpu => "cpu",
            HardwareKind::GpuNvidia => "gpu-nvidia",
            HardwareKind::GpuAmd => "gpu-amd",
            HardwareKind::GpuIntel => "gpu-intel",
            HardwareKind::Memory => "memory",
            HardwareKind::Network => "network",
            HardwareKind::Storage => "storage",
            HardwareKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Sensor type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    /// Percentage, 0-100.
    Load,
    /// Degrees Celsius.
    Temperature,
    /// Watts.
    Power,
    /// MHz.
    Clock,
    /// Bytes per second.
    Throughput,
    /// Provider-defined size unit (MB, GiB or bytes).
    SmallData,
}

/// A single reading exposed by a hardware node.
pub trait Sensor: Send + Sync {
    /// Returns the sensor type.
    fn kind(&self) -> SensorKind;

    /// Returns the display name, e.g. "CPU Package".
    fn name(&self) -> &str;

    /// Returns the value as of the owning node's last refresh.
    fn value(&self) -> Option<f32>;
}

/// A hardware node in the provider's tree.
pub trait Hardware: Send + Sync {
    /// Returns the node type.
    fn kind(&self) -> HardwareKind;

    /// Returns the display name, e.g. "enp13s0".
    fn name(&self) -> &str;

    /// Returns this node's sensors in provider order.
    fn sensors(&self) -> Vec<SensorHandle>;

    /// Returns sub-nodes. The tree has no cycles.
    fn children(&self) -> Vec<HardwareHandle> {
        Vec::new()
    }

    /// Re-reads the node's sensors from the underlying source.
    fn refresh(&self);
}

/// Source of the hardware tree.
pub trait SensorProvider: Send + Sync {
    /// Discovers hardware. Called once by the engine before anything else.
    fn open(&self) -> Result<()>;

    /// Returns the top-level hardware nodes.
    fn hardware(&self) -> Vec<HardwareHandle>;
}

/// Calls `visit` on every node of the tree, parents before children.
pub fn walk(nodes: &[HardwareHandle], visit: &mut dyn FnMut(&HardwareHandle)) {
    for node in nodes {
        visit(node);
        walk(&node.children(), visit);
    }
}

/// Case-insensitive substring test used by every name heuristic.
pub fn name_has(name: &str, needle: &str) -> bool {
    if name.is_empty() || needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

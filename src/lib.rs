pub use cgmath;
pub use conflict::{ConflictResolver, Resolution};
pub use config::{SignalConfig, SignalSelection, SimulationConfig};
pub use error::{Error, Result};
pub use event::{EventKind, SimEvent};
pub use light::{Phase, Signal, SignalController};
pub use network::{
    NetworkDescription, Node, NodeDescription, NodeKind, RoadNetwork, SegmentDescription,
    SegmentState, UNREACHABLE,
};
pub use simulation::{Simulation, Snapshot, VehicleSnapshot};
pub use slotmap::{Key, KeyData};
pub use util::Interval;
pub use vehicle::{RoutePlanner, Vehicle, VehicleState};

use slotmap::{new_key_type, SlotMap};

mod config;
mod conflict;
mod error;
mod event;
mod light;
mod network;
mod simulation;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

/// ID of a [Node], as supplied by the network description.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct NodeId(pub u64);

/// ID of a directed segment: its end nodes plus the index among parallel segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentId {
    pub from: NodeId,
    pub to: NodeId,
    pub key: u32,
}

impl SegmentId {
    pub const fn new(from: NodeId, to: NodeId, key: u32) -> Self {
        Self { from, to, key }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}#{}", self.from, self.to, self.key)
    }
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;

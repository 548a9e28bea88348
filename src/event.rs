use crate::{Error, NodeId, Phase, SegmentId, VehicleId};

/// A diagnostic notification produced by the simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct SimEvent {
    /// The simulation time at which the event occured, in s.
    pub time: f64,
    pub kind: EventKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    /// The network loader substituted the default speed limit (km/h) for a segment.
    DefaultSpeedLimitApplied { segment: SegmentId, speed_limit: f64 },
    /// A signal changed phase.
    SignalChanged { node: NodeId, phase: Phase },
    /// A vehicle found its next segment congested and is looking for a new route.
    VehicleRerouted { vehicle: VehicleId, node: NodeId },
    /// A vehicle has no viable route and is holding at a node.
    VehicleStopped { vehicle: VehicleId, node: NodeId },
    /// A stopped vehicle found its pending segment clear again.
    VehicleResumed { vehicle: VehicleId, node: NodeId },
    /// A vehicle reached its destination.
    VehicleArrived { vehicle: VehicleId, node: NodeId },
    /// A vehicle was removed from the network before reaching its destination.
    VehicleExited { vehicle: VehicleId },
    /// Two or more vehicles shared a segment and one of them had to yield.
    ConflictResolved {
        segment: SegmentId,
        priority: VehicleId,
        yielding: VehicleId,
    },
    /// An occupancy change was refused by the network.
    OccupancyRejected { vehicle: VehicleId, error: Error },
}

impl SimEvent {
    pub(crate) fn new(time: f64, kind: EventKind) -> Self {
        Self { time, kind }
    }
}

use crate::{NodeId, SegmentId, VehicleId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),
    #[error("Segment {from}->{to} not found")]
    SegmentNotFound { from: NodeId, to: NodeId },
    #[error("Vehicle {0:?} not found")]
    VehicleNotFound(VehicleId),
    #[error("Vehicle {vehicle:?} is already occupying segment {segment}")]
    AlreadyOccupying {
        vehicle: VehicleId,
        segment: SegmentId,
    },
    #[error("No route found from {from} to {to}")]
    NoRouteFound { from: NodeId, to: NodeId },
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, Error>;

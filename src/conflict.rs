use crate::{Error, Result, SegmentState, VehicleId};
use itertools::Itertools;

/// Decides which of the vehicles sharing a segment has priority.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConflictResolver {
    /// The speed multiplier applied to a yielding vehicle.
    yield_factor: f64,
}

/// The outcome of resolving a conflict between two vehicles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolution {
    /// The vehicle which arrived first.
    pub priority: VehicleId,
    /// The vehicle which must yield.
    pub yielding: VehicleId,
    /// The effective speed of the yielding vehicle in km/h.
    pub yield_speed: f64,
}

impl ConflictResolver {
    pub fn new(yield_factor: f64) -> Self {
        Self { yield_factor }
    }

    /// Gets the speed multiplier applied to a yielding vehicle.
    pub fn yield_factor(&self) -> f64 {
        self.yield_factor
    }

    /// Resolves a conflict between two vehicles on the same segment.
    /// The earlier arrival has priority; equal arrivals are ordered by vehicle ID.
    pub fn resolve(&self, segment: &SegmentState, a: VehicleId, b: VehicleId) -> Result<Resolution> {
        let arrival = |vehicle| {
            segment
                .arrivals
                .get(&vehicle)
                .copied()
                .ok_or(Error::VehicleNotFound(vehicle))
        };
        let (a_time, b_time) = (arrival(a)?, arrival(b)?);
        let (priority, yielding) = if (a_time, a) <= (b_time, b) {
            (a, b)
        } else {
            (b, a)
        };
        Ok(Resolution {
            priority,
            yielding,
            yield_speed: self.yield_factor * segment.speed_limit,
        })
    }

    /// Resolves every conflict on a segment: the occupant that arrived first has
    /// priority, and each later occupant yields to the one ahead of it.
    pub fn resolve_segment(&self, segment: &SegmentState) -> Vec<Resolution> {
        segment
            .arrivals
            .iter()
            .map(|(vehicle, time)| (*time, *vehicle))
            .sorted_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .tuple_windows()
            .map(|((_, priority), (_, yielding))| Resolution {
                priority,
                yielding,
                yield_speed: self.yield_factor * segment.speed_limit,
            })
            .collect()
    }
}

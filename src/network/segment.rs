use crate::{SegmentId, VehicleId};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Converts km/h to m/s.
const KMH_TO_MS: f64 = 1.0 / 3.6;

/// A directed road segment between two nodes.
#[derive(Debug)]
pub struct Segment {
    /// The segment ID.
    id: SegmentId,
    /// The length in m.
    length: f64,
    /// The speed limit in km/h.
    speed_limit: f64,
    /// The vehicles on the segment. Locked independently of every other segment.
    occupancy: Mutex<Occupancy>,
}

/// The vehicles occupying a segment, keyed by ID, with the time each one entered.
///
/// The occupant set and the arrival ledger are one map, so they always agree.
#[derive(Clone, Debug, Default)]
struct Occupancy {
    arrivals: BTreeMap<VehicleId, f64>,
}

/// A copy of a segment's state at some instant.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentState {
    pub id: SegmentId,
    /// The length in m.
    pub length: f64,
    /// The speed limit in km/h.
    pub speed_limit: f64,
    /// The number of occupying vehicles.
    pub density: usize,
    /// The time each occupying vehicle entered the segment.
    pub arrivals: BTreeMap<VehicleId, f64>,
}

impl Segment {
    pub(crate) fn new(id: SegmentId, length: f64, speed_limit: f64) -> Self {
        Self {
            id,
            length,
            speed_limit,
            occupancy: Mutex::new(Occupancy::default()),
        }
    }

    /// Gets the segment ID.
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Gets the length of the segment in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Gets the speed limit in km/h.
    pub fn speed_limit(&self) -> f64 {
        self.speed_limit
    }

    /// Gets the number of vehicles on the segment.
    pub fn density(&self) -> usize {
        self.occupancy().arrivals.len()
    }

    /// Whether the given vehicle is on the segment.
    pub fn contains(&self, vehicle: VehicleId) -> bool {
        self.occupancy().arrivals.contains_key(&vehicle)
    }

    /// Gets the time the given vehicle entered the segment.
    pub fn arrival(&self, vehicle: VehicleId) -> Option<f64> {
        self.occupancy().arrivals.get(&vehicle).copied()
    }

    /// The time to traverse the segment in s given its current density.
    pub fn travel_time(&self, congestion_coefficient: f64) -> f64 {
        let free_flow = self.length / (self.speed_limit * KMH_TO_MS);
        free_flow * (1.0 + self.density() as f64 * congestion_coefficient)
    }

    /// Takes a copy of the segment's state.
    pub fn state(&self) -> SegmentState {
        let occupancy = self.occupancy();
        SegmentState {
            id: self.id,
            length: self.length,
            speed_limit: self.speed_limit,
            density: occupancy.arrivals.len(),
            arrivals: occupancy.arrivals.clone(),
        }
    }

    /// Records the vehicle as occupying the segment. Keeps the original arrival
    /// time if the vehicle was already recorded.
    pub(crate) fn insert_vehicle(&self, vehicle: VehicleId, at_time: f64) {
        self.occupancy().arrivals.entry(vehicle).or_insert(at_time);
    }

    /// Removes the vehicle, returning whether it was present.
    pub(crate) fn remove_vehicle(&self, vehicle: VehicleId) -> bool {
        self.occupancy().arrivals.remove(&vehicle).is_some()
    }

    fn occupancy(&self) -> MutexGuard<'_, Occupancy> {
        // The ledger is only ever mutated by single map operations,
        // so it is consistent even if a holder panicked.
        self.occupancy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl SegmentState {
    /// The IDs of the occupying vehicles, in ID order.
    pub fn occupants(&self) -> impl Iterator<Item = VehicleId> + '_ {
        self.arrivals.keys().copied()
    }
}

use crate::event::{EventKind, SimEvent};
use crate::{Error, NodeId, Result, SegmentId, SimulationConfig, VehicleId};
use cgmath::{MetricSpace, Point2};
use log::{info, warn};
use slotmap::Key;
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub use description::{NetworkDescription, NodeDescription, NodeKind, SegmentDescription};
pub use segment::{Segment, SegmentState};

mod description;
mod segment;

/// The travel time reported for a segment which does not exist.
pub const UNREACHABLE: f64 = f64::INFINITY;

/// The number of independently locked shards of the vehicle placement registry.
const PLACEMENT_SHARDS: usize = 16;

/// A 2D point in m.
pub type Point2d = Point2<f64>;

/// A node of the road network.
#[derive(Clone, Debug)]
pub struct Node {
    /// The node ID.
    id: NodeId,
    /// Whether the node is an intersection.
    kind: NodeKind,
    /// The position of the node in m.
    position: Point2d,
    /// The segments leaving this node.
    segments_out: SmallVec<[SegmentId; 4]>,
}

/// The road network: its topology and the traffic state of every segment.
#[derive(Debug)]
pub struct RoadNetwork {
    /// The nodes, keyed by ID.
    nodes: BTreeMap<NodeId, Node>,
    /// The segments, keyed by ID. Parallel segments are adjacent in key order.
    segments: BTreeMap<SegmentId, Segment>,
    /// Which segment each vehicle occupies, sharded by vehicle ID.
    placements: Vec<Mutex<HashMap<VehicleId, SegmentId>>>,
    /// The fraction of extra travel time per occupying vehicle.
    congestion_coefficient: f64,
    /// The highest speed limit of any segment in km/h.
    max_speed_limit: f64,
}

impl Node {
    /// Gets the node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Gets the kind of node.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Whether the node is an intersection.
    pub fn is_intersection(&self) -> bool {
        self.kind == NodeKind::Intersection
    }

    /// Gets the position of the node in m.
    pub fn position(&self) -> Point2d {
        self.position
    }

    /// Gets the segments leaving this node.
    pub fn segments_out(&self) -> &[SegmentId] {
        &self.segments_out
    }
}

impl RoadNetwork {
    /// Builds a road network from a description.
    ///
    /// Segments without a speed limit are given `config.default_speed_limit`;
    /// each substitution is reported as an event in the returned list.
    pub fn load(
        description: &NetworkDescription,
        config: &SimulationConfig,
    ) -> Result<(Self, Vec<SimEvent>)> {
        let invalid = |msg: String| Error::InvalidConfiguration(msg);
        let mut events = vec![];

        let mut nodes = BTreeMap::new();
        for node in &description.nodes {
            if !(node.x.is_finite() && node.y.is_finite()) {
                return Err(invalid(format!("node {} has a non-finite position", node.id)));
            }
            let prev = nodes.insert(
                node.id,
                Node {
                    id: node.id,
                    kind: node.kind,
                    position: Point2d::new(node.x, node.y),
                    segments_out: SmallVec::new(),
                },
            );
            if prev.is_some() {
                return Err(invalid(format!("duplicate node {}", node.id)));
            }
        }

        let mut segments = BTreeMap::new();
        let mut max_speed_limit: f64 = 0.0;
        for seg in &description.segments {
            let id = SegmentId::new(seg.from, seg.to, seg.key);
            if !nodes.contains_key(&seg.to) {
                return Err(invalid(format!("segment {} ends at unknown node", id)));
            }
            let from = nodes
                .get_mut(&seg.from)
                .ok_or_else(|| invalid(format!("segment {} starts at unknown node", id)))?;
            if !(seg.length.is_finite() && seg.length > 0.0) {
                return Err(invalid(format!(
                    "segment {} has non-positive length {}",
                    id, seg.length
                )));
            }
            if segments.contains_key(&id) {
                return Err(invalid(format!("duplicate segment {}", id)));
            }
            let speed_limit = match seg.speed_limit {
                Some(speed_limit) if speed_limit.is_finite() && speed_limit > 0.0 => speed_limit,
                Some(speed_limit) => {
                    return Err(invalid(format!(
                        "segment {} has non-positive speed limit {}",
                        id, speed_limit
                    )));
                }
                None => {
                    warn!(
                        "Segment {} has no speed limit; using default of {} km/h",
                        id, config.default_speed_limit
                    );
                    events.push(SimEvent::new(
                        0.0,
                        EventKind::DefaultSpeedLimitApplied {
                            segment: id,
                            speed_limit: config.default_speed_limit,
                        },
                    ));
                    config.default_speed_limit
                }
            };
            from.segments_out.push(id);
            segments.insert(id, Segment::new(id, seg.length, speed_limit));
            max_speed_limit = max_speed_limit.max(speed_limit);
        }

        info!(
            "Loaded road network with {} nodes and {} segments",
            nodes.len(),
            segments.len()
        );

        let network = Self {
            nodes,
            segments,
            placements: (0..PLACEMENT_SHARDS).map(|_| Default::default()).collect(),
            congestion_coefficient: config.congestion_coefficient,
            max_speed_limit,
        };
        Ok((network, events))
    }

    /// Gets the node with the given ID.
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(Error::NodeNotFound(id))
    }

    /// Returns an iterator over all the nodes, in ID order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Returns an iterator over all the segments, in ID order.
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    /// Gets the segment with the given ID.
    pub fn segment(&self, id: SegmentId) -> Result<&Segment> {
        self.segments.get(&id).ok_or(Error::SegmentNotFound {
            from: id.from,
            to: id.to,
        })
    }

    /// The nodes reachable from `node` by a single segment.
    pub fn neighbors(&self, node: NodeId) -> Result<BTreeSet<NodeId>> {
        let node = self.node(node)?;
        Ok(node.segments_out.iter().map(|id| id.to).collect())
    }

    /// The highest speed limit in the network in km/h.
    pub fn max_speed_limit(&self) -> f64 {
        self.max_speed_limit
    }

    /// Gets the state of the segment from `from` to `to`.
    ///
    /// If there are parallel segments, the one with the least travel time is used.
    pub fn segment_state(&self, from: NodeId, to: NodeId) -> Result<SegmentState> {
        self.best_segment(from, to).map(Segment::state)
    }

    /// The congestion-adjusted time in s to travel from `from` to `to`,
    /// or [UNREACHABLE] if no segment joins them.
    pub fn travel_time(&self, from: NodeId, to: NodeId) -> f64 {
        self.parallel_segments(from, to)
            .map(|seg| seg.travel_time(self.congestion_coefficient))
            .fold(UNREACHABLE, f64::min)
    }

    /// The congestion-adjusted time in s to travel along the given segment.
    pub fn segment_travel_time(&self, id: SegmentId) -> f64 {
        self.segments
            .get(&id)
            .map(|seg| seg.travel_time(self.congestion_coefficient))
            .unwrap_or(UNREACHABLE)
    }

    /// Gets the segment from `from` to `to` with the least travel time.
    /// Ties go to the lowest parallel index.
    pub fn best_segment(&self, from: NodeId, to: NodeId) -> Result<&Segment> {
        let mut best: Option<(&Segment, f64)> = None;
        for seg in self.parallel_segments(from, to) {
            let time = seg.travel_time(self.congestion_coefficient);
            if best.map_or(true, |(_, best_time)| time < best_time) {
                best = Some((seg, time));
            }
        }
        best.map(|(seg, _)| seg)
            .ok_or(Error::SegmentNotFound { from, to })
    }

    /// Gets the segment from `from` to `to` with the least travel time among those
    /// holding no more than `max_density` vehicles.
    pub fn best_free_segment(
        &self,
        from: NodeId,
        to: NodeId,
        max_density: usize,
    ) -> Option<&Segment> {
        let mut best: Option<(&Segment, f64)> = None;
        for seg in self.parallel_segments(from, to) {
            if seg.density() > max_density {
                continue;
            }
            let time = seg.travel_time(self.congestion_coefficient);
            if best.map_or(true, |(_, best_time)| time < best_time) {
                best = Some((seg, time));
            }
        }
        best.map(|(seg, _)| seg)
    }

    /// Records that the vehicle has entered the best segment from `from` to `to`.
    pub fn enter_segment(
        &self,
        vehicle: VehicleId,
        from: NodeId,
        to: NodeId,
        at_time: f64,
    ) -> Result<SegmentId> {
        let id = self.best_segment(from, to)?.id();
        self.enter(vehicle, id, at_time)?;
        Ok(id)
    }

    /// Records that the vehicle has entered the given segment.
    ///
    /// Fails if the vehicle is still recorded on a different segment.
    pub fn enter(&self, vehicle: VehicleId, id: SegmentId, at_time: f64) -> Result<()> {
        let segment = self.segment(id)?;
        {
            let mut placements = self.placements(vehicle);
            match placements.get(&vehicle) {
                Some(current) if *current != id => {
                    return Err(Error::AlreadyOccupying {
                        vehicle,
                        segment: *current,
                    });
                }
                _ => {
                    placements.insert(vehicle, id);
                }
            }
        }
        segment.insert_vehicle(vehicle, at_time);
        Ok(())
    }

    /// Removes the vehicle from whichever segment from `from` to `to` it occupies.
    /// Does nothing if it is on none of them.
    pub fn leave_segment(&self, vehicle: VehicleId, from: NodeId, to: NodeId) -> Result<()> {
        let mut found = false;
        for seg in self.parallel_segments(from, to) {
            found = true;
            self.leave(vehicle, seg.id())?;
        }
        if found {
            Ok(())
        } else {
            Err(Error::SegmentNotFound { from, to })
        }
    }

    /// Removes the vehicle from the given segment, if it is on it.
    pub fn leave(&self, vehicle: VehicleId, id: SegmentId) -> Result<()> {
        let segment = self.segment(id)?;
        if segment.remove_vehicle(vehicle) {
            let mut placements = self.placements(vehicle);
            if placements.get(&vehicle) == Some(&id) {
                placements.remove(&vehicle);
            }
        }
        Ok(())
    }

    /// Removes the vehicle from the network entirely, returning the segment it was on.
    pub fn remove_vehicle(&self, vehicle: VehicleId) -> Option<SegmentId> {
        let id = self.placements(vehicle).remove(&vehicle)?;
        if let Some(segment) = self.segments.get(&id) {
            segment.remove_vehicle(vehicle);
        }
        Some(id)
    }

    /// Gets the segment the vehicle currently occupies.
    pub fn placement(&self, vehicle: VehicleId) -> Option<SegmentId> {
        self.placements(vehicle).get(&vehicle).copied()
    }

    /// The total number of vehicles on all segments.
    pub fn total_occupancy(&self) -> usize {
        self.segments.values().map(Segment::density).sum()
    }

    /// The straight line distance between two nodes in m.
    pub fn distance(&self, a: NodeId, b: NodeId) -> Result<f64> {
        Ok(self.node(a)?.position.distance(self.node(b)?.position))
    }

    fn parallel_segments(&self, from: NodeId, to: NodeId) -> impl Iterator<Item = &Segment> {
        self.segments
            .range(SegmentId::new(from, to, 0)..=SegmentId::new(from, to, u32::MAX))
            .map(|(_, seg)| seg)
    }

    fn placements(&self, vehicle: VehicleId) -> MutexGuard<'_, HashMap<VehicleId, SegmentId>> {
        let shard = vehicle.data().as_ffi() as usize % PLACEMENT_SHARDS;
        self.placements[shard]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

use crate::network::Segment;
use crate::{Error, NodeId, Result, RoadNetwork, SegmentId, SignalController};
use itertools::Itertools;

/// Converts km/h to m/s.
const KMH_TO_MS: f64 = 1.0 / 3.6;

/// The congestion-aware route planner.
/// This can be conceptualised as every vehicle's GPS navigation unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoutePlanner {
    /// Segments with a density above this are not considered.
    congestion_threshold: usize,
}

impl RoutePlanner {
    pub fn new(congestion_threshold: usize) -> Self {
        Self {
            congestion_threshold,
        }
    }

    /// Gets the density above which a segment is considered congested.
    pub fn congestion_threshold(&self) -> usize {
        self.congestion_threshold
    }

    /// Whether a segment with the given density is congested.
    pub fn is_congested(&self, density: usize) -> bool {
        density > self.congestion_threshold
    }

    /// Gets the quickest uncongested segment from `from` to `to`.
    pub fn free_segment(
        &self,
        network: &RoadNetwork,
        from: NodeId,
        to: NodeId,
    ) -> Option<SegmentId> {
        network
            .best_free_segment(from, to, self.congestion_threshold)
            .map(Segment::id)
    }

    /// Finds the quickest loop-free route from `origin` to `destination`,
    /// including both end nodes.
    ///
    /// Segment costs are their current congestion-adjusted travel times, plus the
    /// remaining red time of any signal at the far end. Congested segments are avoided.
    pub fn plan(
        &self,
        origin: NodeId,
        destination: NodeId,
        network: &RoadNetwork,
        signals: &SignalController,
        now: f64,
    ) -> Result<Vec<NodeId>> {
        network.node(origin)?;
        let dst_pos = network.node(destination)?.position();
        let max_vel = network.max_speed_limit() * KMH_TO_MS;

        let successors = |node: &NodeId| -> Vec<(NodeId, u64)> {
            let Ok(node) = network.node(*node) else {
                return vec![];
            };
            node.segments_out()
                .iter()
                .filter_map(|id| {
                    let segment = network.segment(*id).ok()?;
                    if self.is_congested(segment.density()) {
                        return None;
                    }
                    let time = network.segment_travel_time(*id);
                    if !time.is_finite() {
                        return None;
                    }
                    let delay = signals.remaining_red(id.to, now);
                    Some((id.to, to_millis(time + delay)))
                })
                .collect()
        };

        // Straight line distance at the network's top speed never overestimates.
        let heuristic = |node: &NodeId| -> u64 {
            match network.node(*node) {
                Ok(node) if max_vel > 0.0 => {
                    let dist = cgmath::MetricSpace::distance(node.position(), dst_pos);
                    (1000.0 * dist / max_vel).floor() as u64
                }
                _ => 0,
            }
        };

        let result = pathfinding::directed::astar::astar(
            &origin,
            successors,
            heuristic,
            |node| *node == destination,
        );

        match result {
            Some((route, _)) => {
                debug_assert!(route.iter().all_unique());
                Ok(route)
            }
            None => Err(Error::NoRouteFound {
                from: origin,
                to: destination,
            }),
        }
    }
}

/// Converts a duration in s to whole ms, rounding up so no segment is free.
fn to_millis(time: f64) -> u64 {
    u64::max((1000.0 * time).ceil() as u64, 1)
}

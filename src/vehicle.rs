use crate::event::EventKind;
use crate::{NodeId, RoadNetwork, SegmentId, SignalController, VehicleId};
use log::debug;
use smallvec::SmallVec;
use std::collections::VecDeque;

pub use self::pathfinding::RoutePlanner;

mod pathfinding;

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID.
    pub(crate) id: VehicleId,
    /// The node the vehicle is at, or the start of the segment it is traversing.
    current: NodeId,
    /// The node the vehicle would like to reach.
    destination: NodeId,
    /// The end of the segment being traversed, if the vehicle is traversing one.
    next: Option<NodeId>,
    /// The vehicle's effective speed in km/h.
    speed: f64,
    /// The nodes still to be visited after `current` (and `next`).
    route: VecDeque<NodeId>,
    /// The agent state.
    state: VehicleState,
    /// The segment the vehicle occupies.
    segment: Option<SegmentId>,
    /// The time the vehicle entered its segment, in s.
    entered_at: f64,
    /// The time the vehicle will reach the end of its segment, in s.
    ready_at: f64,
    /// Whether the vehicle has yielded on its current segment.
    yielding: bool,
}

/// The state of a vehicle's agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VehicleState {
    /// No route yet; one will be requested again next tick.
    Waiting,
    /// Just added to the network.
    Entering,
    /// Following its route.
    Moving,
    /// Its next segment is congested; a new route will be requested.
    Rerouting,
    /// Sharing a segment with another vehicle while priority is decided.
    Sharing,
    /// No viable route; waiting for its pending segment to clear.
    Stopped,
    /// Reached its destination.
    Arrived,
    /// Removed from the network before reaching its destination.
    Exited,
}

impl VehicleState {
    /// Whether the vehicle is finished with the network.
    pub fn is_terminal(self) -> bool {
        matches!(self, VehicleState::Arrived | VehicleState::Exited)
    }
}

/// A change to the segment occupancy requested by a vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OccupancyOp {
    Enter(SegmentId),
    Leave(SegmentId),
}

/// The state read by vehicles when deciding what to do in a tick.
pub(crate) struct TickContext<'a> {
    pub network: &'a RoadNetwork,
    pub signals: &'a SignalController,
    pub planner: &'a RoutePlanner,
    /// The current time in s.
    pub now: f64,
}

/// What a vehicle decided to do in a tick.
#[derive(Debug, Default)]
pub(crate) struct Decision {
    /// Occupancy changes, to be applied in order.
    pub ops: SmallVec<[OccupancyOp; 2]>,
    pub events: SmallVec<[EventKind; 1]>,
}

impl Vehicle {
    /// Creates a new vehicle.
    pub(crate) fn new(id: VehicleId, origin: NodeId, destination: NodeId) -> Self {
        Self {
            id,
            current: origin,
            destination,
            next: None,
            speed: 0.0,
            route: VecDeque::new(),
            state: VehicleState::Entering,
            segment: None,
            entered_at: 0.0,
            ready_at: 0.0,
            yielding: false,
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The node the vehicle is at, or the start of the segment it is traversing.
    pub fn current_node(&self) -> NodeId {
        self.current
    }

    /// The end node of the segment the vehicle is traversing.
    pub fn next_node(&self) -> Option<NodeId> {
        self.next
    }

    /// The node the vehicle would like to reach.
    pub fn destination(&self) -> NodeId {
        self.destination
    }

    /// The vehicle's effective speed in km/h.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// The nodes yet to be visited after the current segment.
    pub fn route(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.route.iter().copied()
    }

    /// Gets the agent state.
    pub fn state(&self) -> VehicleState {
        self.state
    }

    /// The segment the vehicle occupies.
    pub fn segment(&self) -> Option<SegmentId> {
        self.segment
    }

    /// The time the vehicle entered its segment, in s.
    pub fn entered_at(&self) -> f64 {
        self.entered_at
    }

    /// The time the vehicle will reach the end of its segment, in s.
    pub fn ready_at(&self) -> f64 {
        self.ready_at
    }

    /// Whether the vehicle is yielding on its current segment.
    pub fn is_yielding(&self) -> bool {
        self.yielding
    }

    /// Decides what to do this tick.
    ///
    /// The vehicle only reads the network; the returned occupancy changes
    /// are applied by the caller.
    pub(crate) fn step(&mut self, ctx: &TickContext) -> Decision {
        let mut decision = Decision::default();
        use VehicleState::*;
        match self.state {
            Arrived | Exited => {}
            Entering | Waiting => match self.plan(ctx) {
                Some(route) => {
                    self.adopt_route(route);
                    self.set_state(Moving);
                    self.advance(ctx, &mut decision);
                }
                None => self.set_state(Waiting),
            },
            Moving | Sharing => {
                self.state = Moving;
                self.advance(ctx, &mut decision);
            }
            Rerouting => match self.plan(ctx) {
                Some(route) => {
                    self.adopt_route(route);
                    self.set_state(Moving);
                    self.advance(ctx, &mut decision);
                }
                None => {
                    self.set_state(Stopped);
                    decision.events.push(EventKind::VehicleStopped {
                        vehicle: self.id,
                        node: self.current,
                    });
                }
            },
            Stopped => {
                if self.pending_segment(ctx).is_some() {
                    self.set_state(Moving);
                    decision.events.push(EventKind::VehicleResumed {
                        vehicle: self.id,
                        node: self.current,
                    });
                    self.advance(ctx, &mut decision);
                }
            }
        }
        decision
    }

    /// Marks the vehicle removed from the network. The caller deregisters it.
    pub(crate) fn exit(&mut self) {
        self.set_state(VehicleState::Exited);
        self.clear_route();
        self.segment = None;
    }

    /// Marks the vehicle as sharing a segment while a conflict is resolved.
    pub(crate) fn share(&mut self) {
        if self.state == VehicleState::Moving {
            self.state = VehicleState::Sharing;
        }
    }

    /// The vehicle has priority on its segment and travels at `speed` km/h.
    pub(crate) fn take_priority(&mut self, speed: f64) {
        self.speed = speed;
        self.finish_sharing();
    }

    /// The vehicle must yield on its segment, travelling at `speed` km/h.
    /// Its remaining traversal is stretched by `1 / factor` the first time it yields.
    /// Returns `true` if the vehicle was not already yielding.
    pub(crate) fn yield_to(&mut self, speed: f64, factor: f64, now: f64) -> bool {
        let newly = !self.yielding;
        if newly && self.next.is_some() && self.ready_at > now {
            self.ready_at = now + (self.ready_at - now) / factor;
        }
        self.yielding = true;
        self.speed = speed;
        self.finish_sharing();
        newly
    }

    /// The vehicle is alone on its segment again and travels at `speed` km/h.
    pub(crate) fn stop_yielding(&mut self, speed: f64) {
        if self.yielding {
            self.yielding = false;
            self.speed = speed;
        }
    }

    /// Overwrites the occupied segment with what the network recorded.
    pub(crate) fn sync_segment(&mut self, segment: Option<SegmentId>) {
        self.segment = segment;
    }

    fn finish_sharing(&mut self) {
        if self.state == VehicleState::Sharing {
            self.state = VehicleState::Moving;
        }
    }

    /// Moves the vehicle along its route as far as it can get this tick.
    fn advance(&mut self, ctx: &TickContext, decision: &mut Decision) {
        if let Some(next) = self.next {
            // Still traversing, or held at a red signal
            if ctx.now < self.ready_at {
                return;
            }
            let red = ctx.signals.remaining_red(next, ctx.now);
            if red > 0.0 {
                self.ready_at = ctx.now + red;
                return;
            }
            self.current = next;
            self.next = None;
        }

        if self.current == self.destination {
            self.arrive(decision);
            return;
        }

        let Some(id) = self.pending_segment(ctx) else {
            self.set_state(VehicleState::Rerouting);
            decision.events.push(EventKind::VehicleRerouted {
                vehicle: self.id,
                node: self.current,
            });
            return;
        };
        let Ok(segment) = ctx.network.segment(id) else {
            return;
        };

        if let Some(prev) = self.segment {
            decision.ops.push(OccupancyOp::Leave(prev));
        }
        decision.ops.push(OccupancyOp::Enter(id));
        self.route.pop_front();
        self.segment = Some(id);
        self.next = Some(id.to);
        self.speed = segment.speed_limit();
        self.yielding = false;
        self.entered_at = ctx.now;
        self.ready_at = ctx.now + ctx.network.segment_travel_time(id);
        debug!(
            "Vehicle {:?} entered segment {} until t={:.1}",
            self.id, id, self.ready_at
        );
    }

    /// The segment the vehicle would enter next: the quickest uncongested one
    /// towards the next node on its route.
    fn pending_segment(&self, ctx: &TickContext) -> Option<SegmentId> {
        let to = self.route.front()?;
        ctx.planner.free_segment(ctx.network, self.current, *to)
    }

    fn arrive(&mut self, decision: &mut Decision) {
        if let Some(segment) = self.segment.take() {
            decision.ops.push(OccupancyOp::Leave(segment));
        }
        self.clear_route();
        self.set_state(VehicleState::Arrived);
        decision.events.push(EventKind::VehicleArrived {
            vehicle: self.id,
            node: self.current,
        });
    }

    fn plan(&self, ctx: &TickContext) -> Option<Vec<NodeId>> {
        let result = ctx.planner.plan(
            self.current,
            self.destination,
            ctx.network,
            ctx.signals,
            ctx.now,
        );
        match result {
            Ok(route) => Some(route),
            Err(err) => {
                debug!("Vehicle {:?} could not plan a route: {}", self.id, err);
                None
            }
        }
    }

    /// Replaces the planned route. `route` starts at the current node.
    fn adopt_route(&mut self, route: Vec<NodeId>) {
        self.route = route.into_iter().skip(1).collect();
    }

    fn clear_route(&mut self) {
        self.route.clear();
        self.next = None;
    }

    fn set_state(&mut self, state: VehicleState) {
        if self.state != state {
            debug!("Vehicle {:?}: {:?} -> {:?}", self.id, self.state, state);
            self.state = state;
        }
    }
}

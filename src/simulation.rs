use crate::event::{EventKind, SimEvent};
use crate::vehicle::{Decision, OccupancyOp, TickContext};
use crate::{
    ConflictResolver, Error, NetworkDescription, NodeId, Phase, Result, RoadNetwork, RoutePlanner,
    SegmentId, SignalController, SimulationConfig, Vehicle, VehicleId, VehicleSet, VehicleState,
};
use log::{info, warn};
use rayon::prelude::*;

/// A traffic simulation.
pub struct Simulation {
    /// The simulation parameters.
    config: SimulationConfig,
    /// The road network and its traffic state.
    network: RoadNetwork,
    /// The intersection signals.
    signals: SignalController,
    /// The route planner shared by all vehicles.
    planner: RoutePlanner,
    /// Decides priority on shared segments.
    resolver: ConflictResolver,
    /// The vehicles being simulated, including archived ones which have arrived or exited.
    vehicles: VehicleSet,
    /// Events not yet drained by the caller.
    events: Vec<SimEvent>,
    /// The current simulation time in s.
    time: f64,
    /// The current frame of simulation.
    frame: usize,
}

/// The observable state of a simulation at the start of a tick.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Snapshot {
    /// The simulation time in s.
    pub time: f64,
    pub frame: usize,
    /// The phase of every signal, in node order.
    pub signals: Vec<(NodeId, Phase)>,
    pub vehicles: Vec<VehicleSnapshot>,
    /// The density of every segment, in segment order.
    pub densities: Vec<(SegmentId, usize)>,
}

/// The observable state of one vehicle.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub state: VehicleState,
    pub current: NodeId,
    pub next: Option<NodeId>,
    pub segment: Option<SegmentId>,
    /// The effective speed in km/h.
    pub speed: f64,
}

impl Simulation {
    /// Creates a new simulation of the described network.
    pub fn new(description: &NetworkDescription, config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let (network, events) = RoadNetwork::load(description, &config)?;
        let signals = SignalController::new(&network, &config.signals, 0.0)?;
        let planner = RoutePlanner::new(config.congestion_threshold);
        info!(
            "Assigned {} signals; segments above {} vehicles are congested",
            signals.iter().count(),
            planner.congestion_threshold()
        );
        Ok(Self {
            planner,
            resolver: ConflictResolver::new(config.yield_factor),
            config,
            network,
            signals,
            vehicles: VehicleSet::with_key(),
            events,
            time: 0.0,
            frame: 0,
        })
    }

    /// Adds a vehicle which will travel from `origin` to `destination`.
    /// It registers with the network on the next tick.
    pub fn add_vehicle(&mut self, origin: NodeId, destination: NodeId) -> Result<VehicleId> {
        self.network.node(origin)?;
        self.network.node(destination)?;
        let id = self
            .vehicles
            .insert_with_key(|id| Vehicle::new(id, origin, destination));
        Ok(id)
    }

    /// Removes a vehicle from the network before it reaches its destination.
    /// The vehicle is kept, in the `Exited` state, until [Self::prune_finished] is called.
    pub fn exit_vehicle(&mut self, id: VehicleId) -> Result<()> {
        let vehicle = self
            .vehicles
            .get_mut(id)
            .ok_or(Error::VehicleNotFound(id))?;
        if vehicle.state().is_terminal() {
            return Ok(());
        }
        self.network.remove_vehicle(id);
        vehicle.exit();
        info!("Vehicle {:?} exited at t={:.1}", id, self.time);
        self.events
            .push(SimEvent::new(self.time, EventKind::VehicleExited { vehicle: id }));
        Ok(())
    }

    /// Deletes all vehicles which have arrived or exited, returning how many there were.
    pub fn prune_finished(&mut self) -> usize {
        let before = self.vehicles.len();
        self.vehicles.retain(|_, vehicle| !vehicle.state().is_terminal());
        before - self.vehicles.len()
    }

    /// Advances the simulation by one tick.
    pub fn step(&mut self) {
        self.update_signals();
        let decisions = self.decide_vehicles();
        self.apply_decisions(decisions);
        self.resolve_conflicts();
        self.frame += 1;
        self.time += self.config.tick;
    }

    /// Gets the current simulation time in s.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Gets the simulation parameters.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Gets the road network.
    pub fn network(&self) -> &RoadNetwork {
        &self.network
    }

    /// Gets the signal controller.
    pub fn signals(&self) -> &SignalController {
        &self.signals
    }

    /// Gets the conflict resolver.
    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    /// Gets a reference to the vehicle with the given ID.
    pub fn vehicle(&self, id: VehicleId) -> Result<&Vehicle> {
        self.vehicles.get(id).ok_or(Error::VehicleNotFound(id))
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets the events produced since the last call.
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    /// Gets the events produced since events were last drained.
    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    /// Captures the signal phases, vehicle positions and segment densities.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            time: self.time,
            frame: self.frame,
            signals: self
                .signals
                .iter()
                .map(|(node, signal)| (node, signal.phase()))
                .collect(),
            vehicles: self
                .vehicles
                .values()
                .map(|vehicle| VehicleSnapshot {
                    id: vehicle.id(),
                    state: vehicle.state(),
                    current: vehicle.current_node(),
                    next: vehicle.next_node(),
                    segment: vehicle.segment(),
                    speed: vehicle.speed(),
                })
                .collect(),
            densities: self
                .network
                .segments()
                .map(|segment| (segment.id(), segment.density()))
                .collect(),
        }
    }

    /// Updates the traffic signals.
    fn update_signals(&mut self) {
        for (node, phase) in self.signals.step(self.time) {
            self.events
                .push(SimEvent::new(self.time, EventKind::SignalChanged { node, phase }));
        }
    }

    /// Lets every active vehicle decide its move against the network as it stands
    /// at the start of the tick.
    fn decide_vehicles(&mut self) -> Vec<(VehicleId, Decision)> {
        let ctx = TickContext {
            network: &self.network,
            signals: &self.signals,
            planner: &self.planner,
            now: self.time,
        };
        self.vehicles
            .iter_mut()
            .filter(|(_, vehicle)| !vehicle.state().is_terminal())
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(id, vehicle)| (id, vehicle.step(&ctx)))
            .collect()
    }

    /// Applies the occupancy changes decided by the vehicles and records their events.
    ///
    /// Each vehicle's changes are applied in order; different vehicles are applied
    /// concurrently, serialised only by the per-segment locks.
    fn apply_decisions(&mut self, decisions: Vec<(VehicleId, Decision)>) {
        let network = &self.network;
        let now = self.time;
        let failures = decisions
            .par_iter()
            .flat_map_iter(|(id, decision)| {
                decision.ops.iter().filter_map(move |op| {
                    let result = match *op {
                        OccupancyOp::Enter(segment) => network.enter(*id, segment, now),
                        OccupancyOp::Leave(segment) => network.leave(*id, segment),
                    };
                    result.err().map(|err| (*id, err))
                })
            })
            .collect::<Vec<_>>();

        for (id, decision) in decisions {
            for kind in decision.events {
                if let EventKind::VehicleArrived { node, .. } = &kind {
                    info!("Vehicle {:?} arrived at node {} at t={:.1}", id, node, now);
                }
                self.events.push(SimEvent::new(now, kind));
            }
        }

        for (id, error) in failures {
            warn!("Occupancy change for vehicle {:?} rejected: {}", id, error);
            if let Some(vehicle) = self.vehicles.get_mut(id) {
                vehicle.sync_segment(self.network.placement(id));
            }
            self.events.push(SimEvent::new(
                now,
                EventKind::OccupancyRejected { vehicle: id, error },
            ));
        }
    }

    /// Decides priority on every segment occupied by more than one vehicle.
    fn resolve_conflicts(&mut self) {
        let now = self.time;
        for segment in self.network.segments() {
            let state = segment.state();
            if state.density == 1 {
                // Whoever it was yielding to has left
                for id in state.occupants() {
                    if let Some(vehicle) = self.vehicles.get_mut(id) {
                        vehicle.stop_yielding(state.speed_limit);
                    }
                }
            }
            if state.density < 2 {
                continue;
            }
            for id in state.occupants() {
                if let Some(vehicle) = self.vehicles.get_mut(id) {
                    vehicle.share();
                }
            }

            let resolutions = self.resolver.resolve_segment(&state);
            if let Some(leader) = resolutions.first().map(|res| res.priority) {
                if let Some(vehicle) = self.vehicles.get_mut(leader) {
                    vehicle.take_priority(state.speed_limit);
                }
            }
            for res in resolutions {
                let Some(vehicle) = self.vehicles.get_mut(res.yielding) else {
                    continue;
                };
                if vehicle.yield_to(res.yield_speed, self.resolver.yield_factor(), now) {
                    self.events.push(SimEvent::new(
                        now,
                        EventKind::ConflictResolved {
                            segment: state.id,
                            priority: res.priority,
                            yielding: res.yielding,
                        },
                    ));
                }
            }
        }
    }
}

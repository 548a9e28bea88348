//! Tests that involve the simulation of a single segment.

use assert_approx_eq::assert_approx_eq;
use roadnet_sim::{
    EventKind, NetworkDescription, NodeId, NodeKind, SegmentId, Simulation, SimulationConfig,
    VehicleState,
};

const A: NodeId = NodeId(1);
const B: NodeId = NodeId(2);

/// Two nodes joined by a 100 m segment with a speed limit of 50 km/h.
fn two_nodes() -> NetworkDescription {
    NetworkDescription::default()
        .node(1, NodeKind::NonIntersection, 0.0, 0.0)
        .node(2, NodeKind::NonIntersection, 100.0, 0.0)
        .segment(1, 2, 100.0, Some(50.0))
}

fn density(sim: &Simulation) -> usize {
    sim.network().segment_state(A, B).unwrap().density
}

/// Test that a vehicle occupies the segment while traversing it, then arrives.
#[test]
fn vehicle_traverses_and_arrives() {
    let mut sim = Simulation::new(&two_nodes(), SimulationConfig::default()).unwrap();
    let v1 = sim.add_vehicle(A, B).unwrap();
    assert_eq!(sim.vehicle(v1).unwrap().state(), VehicleState::Entering);

    sim.step();
    let vehicle = sim.vehicle(v1).unwrap();
    assert_eq!(vehicle.state(), VehicleState::Moving);
    assert_eq!(vehicle.next_node(), Some(B));
    assert_eq!(vehicle.segment(), Some(SegmentId::new(A, B, 0)));
    assert_approx_eq!(vehicle.ready_at(), 7.2);
    assert_eq!(density(&sim), 1);

    // 100 m at 50 km/h takes 7.2 s, so the vehicle is done on the tick at t = 8
    for _ in 0..7 {
        sim.step();
        assert_eq!(density(&sim), 1);
    }
    sim.step();

    let vehicle = sim.vehicle(v1).unwrap();
    assert_eq!(vehicle.state(), VehicleState::Arrived);
    assert_eq!(vehicle.current_node(), B);
    assert_eq!(vehicle.next_node(), None);
    assert_eq!(vehicle.segment(), None);
    assert_eq!(vehicle.route().count(), 0);
    assert_eq!(density(&sim), 0);
    assert_eq!(sim.network().placement(v1), None);

    let events = sim.drain_events();
    assert!(events.iter().any(|e| e.time == 8.0
        && e.kind == EventKind::VehicleArrived { vehicle: v1, node: B }));
    assert!(sim.events().is_empty());

    assert_eq!(sim.prune_finished(), 1);
    assert!(sim.vehicle(v1).is_err());
}

/// Test that the earlier of two vehicles on a segment has priority.
#[test]
fn later_arrival_yields() {
    let mut sim = Simulation::new(&two_nodes(), SimulationConfig::default()).unwrap();
    let v1 = sim.add_vehicle(A, B).unwrap();
    sim.step();
    let v2 = sim.add_vehicle(A, B).unwrap();
    sim.step();

    let state = sim.network().segment_state(A, B).unwrap();
    assert_eq!(state.density, 2);
    assert_eq!(state.arrivals[&v1], 0.0);
    assert_eq!(state.arrivals[&v2], 1.0);

    let res = sim.resolver().resolve(&state, v2, v1).unwrap();
    assert_eq!(res.priority, v1);
    assert_eq!(res.yielding, v2);
    assert_approx_eq!(res.yield_speed, 0.8 * 50.0);

    assert_approx_eq!(sim.vehicle(v1).unwrap().speed(), 50.0);
    assert_approx_eq!(sim.vehicle(v2).unwrap().speed(), 40.0);
    assert!(sim.vehicle(v2).unwrap().is_yielding());
    assert_eq!(sim.vehicle(v2).unwrap().state(), VehicleState::Moving);

    // V2 entered behind one occupant, then had its traversal stretched by 1 / 0.8
    let expected = 1.0 + 7.2 * 1.01 / 0.8;
    assert_approx_eq!(sim.vehicle(v2).unwrap().ready_at(), expected);

    let conflicts = sim
        .events()
        .iter()
        .filter(|e| matches!(e.kind, EventKind::ConflictResolved { .. }))
        .count();
    assert_eq!(conflicts, 1);

    // Re-resolving on later ticks does not report the conflict again
    sim.step();
    let conflicts = sim
        .events()
        .iter()
        .filter(|e| matches!(e.kind, EventKind::ConflictResolved { .. }))
        .count();
    assert_eq!(conflicts, 1);

    // V1 is done on the tick at t = 8, leaving V2 alone on the segment
    while sim.time() < 9.0 {
        sim.step();
    }
    assert_eq!(sim.vehicle(v1).unwrap().state(), VehicleState::Arrived);
    assert_eq!(density(&sim), 1);
    let vehicle = sim.vehicle(v2).unwrap();
    assert_eq!(vehicle.state(), VehicleState::Moving);
    assert!(!vehicle.is_yielding());
    assert_approx_eq!(vehicle.speed(), 50.0);
    assert_approx_eq!(vehicle.ready_at(), expected);

    for _ in 0..20 {
        sim.step();
    }
    assert_eq!(sim.vehicle(v1).unwrap().state(), VehicleState::Arrived);
    assert_eq!(sim.vehicle(v2).unwrap().state(), VehicleState::Arrived);
    assert_eq!(density(&sim), 0);
}

/// Test that a vehicle can be removed mid-traversal without leaving a trace.
#[test]
fn exit_deregisters_vehicle() {
    let mut sim = Simulation::new(&two_nodes(), SimulationConfig::default()).unwrap();
    let v1 = sim.add_vehicle(A, B).unwrap();
    sim.step();
    sim.step();
    assert_eq!(density(&sim), 1);

    sim.exit_vehicle(v1).unwrap();
    assert_eq!(density(&sim), 0);
    assert_eq!(sim.network().placement(v1), None);
    assert_eq!(sim.vehicle(v1).unwrap().state(), VehicleState::Exited);
    assert!(sim
        .events()
        .iter()
        .any(|e| e.kind == EventKind::VehicleExited { vehicle: v1 }));

    // Exited vehicles are inert
    for _ in 0..10 {
        sim.step();
    }
    assert_eq!(sim.vehicle(v1).unwrap().state(), VehicleState::Exited);
    assert_eq!(density(&sim), 0);
    sim.exit_vehicle(v1).unwrap();
}

/// Test that a vehicle without a route waits rather than failing.
#[test]
fn unroutable_vehicle_waits() {
    let mut sim = Simulation::new(&two_nodes(), SimulationConfig::default()).unwrap();
    let v1 = sim.add_vehicle(B, A).unwrap();
    for _ in 0..3 {
        sim.step();
        assert_eq!(sim.vehicle(v1).unwrap().state(), VehicleState::Waiting);
    }
    assert_eq!(
        sim.add_vehicle(A, NodeId(9)),
        Err(roadnet_sim::Error::NodeNotFound(NodeId(9)))
    );
}

/// Test that a vehicle whose origin is its destination arrives immediately.
#[test]
fn vehicle_already_at_destination() {
    let mut sim = Simulation::new(&two_nodes(), SimulationConfig::default()).unwrap();
    let v1 = sim.add_vehicle(B, B).unwrap();
    sim.step();
    assert_eq!(sim.vehicle(v1).unwrap().state(), VehicleState::Arrived);
    assert_eq!(density(&sim), 0);
}

/// Test that missing speed limits are defaulted and reported.
#[test]
fn default_speed_limit_is_reported() {
    let desc = two_nodes().segment(2, 1, 100.0, None);
    let mut sim = Simulation::new(&desc, SimulationConfig::default()).unwrap();
    let events = sim.drain_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0].kind,
        EventKind::DefaultSpeedLimitApplied { segment, speed_limit }
            if segment == SegmentId::new(B, A, 0) && speed_limit == 50.0
    ));
}

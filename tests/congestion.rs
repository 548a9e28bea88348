//! Tests of rerouting around congested segments.

use roadnet_sim::{
    EventKind, NetworkDescription, NodeId, NodeKind, SegmentDescription, SegmentId, Simulation,
    SimulationConfig, VehicleId, VehicleState,
};

const A: NodeId = NodeId(1);
const B: NodeId = NodeId(2);
const C: NodeId = NodeId(3);
const D: NodeId = NodeId(4);

/// A -> B -> C is the quick way to C; B -> D -> C is a detour.
fn network(with_detour: bool) -> NetworkDescription {
    let desc = NetworkDescription::default()
        .node(1, NodeKind::NonIntersection, 0.0, 0.0)
        .node(2, NodeKind::NonIntersection, 100.0, 0.0)
        .node(3, NodeKind::NonIntersection, 1100.0, 0.0)
        .node(4, NodeKind::NonIntersection, 600.0, 800.0)
        .segment(1, 2, 100.0, Some(50.0))
        .segment(2, 3, 1000.0, Some(100.0));
    if with_detour {
        desc.segment(2, 4, 1000.0, Some(50.0))
            .segment(4, 3, 1000.0, Some(50.0))
    } else {
        desc
    }
}

/// Starts V1 towards C, then jams B -> C with six vehicles behind it.
fn jammed(with_detour: bool) -> (Simulation, VehicleId) {
    let mut sim = Simulation::new(&network(with_detour), SimulationConfig::default()).unwrap();
    let v1 = sim.add_vehicle(A, C).unwrap();
    sim.step();
    assert_eq!(sim.vehicle(v1).unwrap().route().collect::<Vec<_>>(), vec![C]);

    for _ in 0..6 {
        sim.add_vehicle(B, C).unwrap();
    }
    sim.step();
    assert_eq!(sim.network().segment_state(B, C).unwrap().density, 6);

    // V1 reaches B on the tick at t = 8
    for _ in 2..9 {
        sim.step();
    }
    assert_eq!(sim.vehicle(v1).unwrap().current_node(), B);
    assert_eq!(sim.vehicle(v1).unwrap().state(), VehicleState::Rerouting);
    assert!(sim
        .events()
        .iter()
        .any(|e| e.kind == EventKind::VehicleRerouted { vehicle: v1, node: B }));
    // Still queued on the segment it came in on
    assert_eq!(sim.network().placement(v1), Some(SegmentId::new(A, B, 0)));

    (sim, v1)
}

#[test]
fn congestion_triggers_detour() {
    let (mut sim, v1) = jammed(true);
    sim.step();

    let vehicle = sim.vehicle(v1).unwrap();
    assert_eq!(vehicle.state(), VehicleState::Moving);
    assert_eq!(vehicle.segment(), Some(SegmentId::new(B, D, 0)));
    assert_eq!(vehicle.route().collect::<Vec<_>>(), vec![C]);
    assert_eq!(sim.network().segment_state(A, B).unwrap().density, 0);
    assert_eq!(sim.network().segment_state(B, D).unwrap().density, 1);

    for _ in 0..200 {
        sim.step();
    }
    assert_eq!(sim.vehicle(v1).unwrap().state(), VehicleState::Arrived);
    assert_eq!(sim.network().total_occupancy(), 0);
}

#[test]
fn congestion_without_detour_stops_then_resumes() {
    let (mut sim, v1) = jammed(false);
    sim.step();

    assert_eq!(sim.vehicle(v1).unwrap().state(), VehicleState::Stopped);
    assert!(sim
        .events()
        .iter()
        .any(|e| e.kind == EventKind::VehicleStopped { vehicle: v1, node: B }));

    // Stopping is not a failure; the vehicle keeps checking until the jam clears
    let mut resumed = false;
    for _ in 0..200 {
        sim.step();
        let state = sim.vehicle(v1).unwrap().state();
        if state != VehicleState::Stopped {
            resumed = true;
            assert_eq!(sim.vehicle(v1).unwrap().segment(), Some(SegmentId::new(B, C, 0)));
            break;
        }
    }
    assert!(resumed);
    assert!(sim
        .events()
        .iter()
        .any(|e| e.kind == EventKind::VehicleResumed { vehicle: v1, node: B }));

    for _ in 0..200 {
        sim.step();
    }
    assert_eq!(sim.vehicle(v1).unwrap().state(), VehicleState::Arrived);
    assert_eq!(sim.network().total_occupancy(), 0);
}

/// A -> B -> C with a second, slower B -> C segment alongside the fast one.
fn parallel_network() -> NetworkDescription {
    let mut desc = network(false);
    desc.segments.push(SegmentDescription {
        from: B,
        to: C,
        key: 1,
        length: 1000.0,
        speed_limit: Some(30.0),
    });
    desc
}

fn jam_fast_lane(sim: &mut Simulation) {
    for _ in 0..6 {
        sim.add_vehicle(B, C).unwrap();
    }
    sim.step();
    assert_eq!(sim.network().segment(SegmentId::new(B, C, 0)).unwrap().density(), 6);
    assert_eq!(sim.network().segment(SegmentId::new(B, C, 1)).unwrap().density(), 0);
}

#[test]
fn jammed_parallel_segment_uses_free_one() {
    let mut sim = Simulation::new(&parallel_network(), SimulationConfig::default()).unwrap();
    jam_fast_lane(&mut sim);

    let v1 = sim.add_vehicle(B, C).unwrap();
    sim.step();
    let vehicle = sim.vehicle(v1).unwrap();
    assert_eq!(vehicle.state(), VehicleState::Moving);
    assert_eq!(vehicle.segment(), Some(SegmentId::new(B, C, 1)));
    assert_eq!(vehicle.speed(), 30.0);
    assert_eq!(sim.network().placement(v1), Some(SegmentId::new(B, C, 1)));

    for _ in 0..200 {
        sim.step();
    }
    assert_eq!(sim.vehicle(v1).unwrap().state(), VehicleState::Arrived);
    assert!(!sim
        .events()
        .iter()
        .any(|e| e.kind == EventKind::VehicleRerouted { vehicle: v1, node: B }));
}

#[test]
fn arriving_vehicle_takes_free_parallel_segment() {
    let mut sim = Simulation::new(&parallel_network(), SimulationConfig::default()).unwrap();
    let v1 = sim.add_vehicle(A, C).unwrap();
    sim.step();
    jam_fast_lane(&mut sim);

    // V1 reaches B on the tick at t = 8, while the fast lane is still jammed
    for _ in 2..9 {
        sim.step();
    }
    let vehicle = sim.vehicle(v1).unwrap();
    assert_eq!(vehicle.current_node(), B);
    assert_eq!(vehicle.state(), VehicleState::Moving);
    assert_eq!(vehicle.segment(), Some(SegmentId::new(B, C, 1)));
    assert_eq!(sim.network().segment_state(A, B).unwrap().density, 0);
    assert!(!sim
        .events()
        .iter()
        .any(|e| matches!(e.kind, EventKind::VehicleRerouted { .. })));
}

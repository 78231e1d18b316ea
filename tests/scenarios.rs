//! End-to-end runs through the public `World` API.

use approx::assert_relative_eq;
use shipsim2d::core::{NpcFloorGeometry, PointDefinition};
use shipsim2d::environment::Environment;
use shipsim2d::events::RecordingSink;
use shipsim2d::math::Vector;
use shipsim2d::npcs::RegimeType;
use shipsim2d::{ShipBuilder, SimulationEvent, SimulationParameters, World};

const GRAVITY: f32 = 9.8;
const TICK: f32 = 1.0 / 64.0;

fn airborne_world(params: &SimulationParameters) -> World {
    World::new(params).with_environment(Environment::flat(-1000.0, -2000.0))
}

/// Two iron points one meter apart joined by a spring.
fn pair(world: &World, pin_both: bool, pin_first: bool) -> ShipBuilder {
    let iron = world.materials().structural_id("Iron").unwrap();
    let mut builder = ShipBuilder::new();
    let a = builder.add_point(PointDefinition::new(Vector::new(0.0, 0.0), iron));
    let b = builder.add_point(PointDefinition::new(Vector::new(0.0, -1.0), iron));
    builder.add_spring(a, b);
    if pin_both || pin_first {
        builder.pin(a);
    }
    if pin_both {
        builder.pin(b);
    }
    builder
}

#[test]
fn falling_human_lands_within_free_fall_time() {
    let params = SimulationParameters::default();
    let mut world = airborne_world(&params);

    // Flat top edge at y = 0
    let iron = world.materials().structural_id("Iron").unwrap();
    let mut builder = ShipBuilder::new();
    let a = builder.add_point(PointDefinition::new(Vector::new(-10.0, 0.0), iron));
    let b = builder.add_point(PointDefinition::new(Vector::new(10.0, 0.0), iron));
    let c = builder.add_point(PointDefinition::new(Vector::new(0.0, -4.0), iron));
    builder.add_triangle([a, b, c]);
    builder.set_floor(a, b, NpcFloorGeometry::Depth1H);
    builder.pin(a).pin(b).pin(c);
    world.add_ship(builder, &params).unwrap();

    let sailor = world.npcs().database().human_id("Sailor").unwrap();
    let id = world
        .begin_place_new_human_npc(sailor, Vector::new(0.0, 10.0), false, &params)
        .unwrap()
        .picked()
        .unwrap()
        .id;
    world.complete_new_npc(id, &params).unwrap();
    assert_eq!(world.npcs().npc(id).unwrap().current_regime, RegimeType::Free);

    let free_fall_ticks = ((2.0 * 10.0 / GRAVITY).sqrt() / TICK).ceil() as usize;

    // Not before half the free fall time
    for _ in 0..free_fall_ticks / 2 {
        world.update(&params);
    }
    assert_eq!(world.npcs().npc(id).unwrap().current_regime, RegimeType::Free);

    // Damping slows the fall a little
    let mut landed_at = None;
    for tick in free_fall_ticks / 2..2 * free_fall_ticks {
        world.update(&params);
        if world.npcs().npc(id).unwrap().current_regime == RegimeType::Constrained {
            landed_at = Some(tick);
            break;
        }
    }
    assert!(landed_at.is_some(), "human never landed");
    assert_eq!(world.npcs().constrained_regime_human_npc_count(), 1);
    assert_eq!(world.npcs().free_regime_human_npc_count(), 0);
}

#[test]
fn overstretched_spring_breaks_with_one_event() {
    let params = SimulationParameters::default();
    let mut world = airborne_world(&params);
    let sink = RecordingSink::new();
    world.register_event_sink(Box::new(sink.clone()));
    let builder = pair(&world, true, false);
    let ship_id = world.add_ship(builder, &params).unwrap();

    world
        .ship_mut(ship_id)
        .unwrap()
        .points_mut()
        .set_position(1, Vector::new(0.0, -10.0));
    world.update(&params);

    let springs = world.ship(ship_id).unwrap().springs();
    assert!(springs.is_deleted(0));
    assert_eq!(sink.count_matching(|event| matches!(event, SimulationEvent::Break { .. })), 1);

    // Stays broken
    for _ in 0..10 {
        world.update(&params);
    }
    assert!(world.ship(ship_id).unwrap().springs().is_deleted(0));
    assert_eq!(sink.count_matching(|event| matches!(event, SimulationEvent::Break { .. })), 1);
}

#[test]
fn pinned_pair_never_moves_or_stresses() {
    let params = SimulationParameters::default();
    let mut world = airborne_world(&params);
    let ship_id = world.add_ship(pair(&world, true, false), &params).unwrap();
    let before: Vec<Vector> = (0..2)
        .map(|point| world.ship(ship_id).unwrap().points().position(point))
        .collect();

    for _ in 0..1000 {
        world.update(&params);
        let ship = world.ship(ship_id).unwrap();
        assert!(!ship.springs().is_deleted(0));
        assert!(!ship.springs().strain_state(0).is_stressed);
    }

    let ship = world.ship(ship_id).unwrap();
    for (point, position) in before.into_iter().enumerate() {
        assert_eq!(ship.points().position(point), position);
        assert_eq!(ship.points().velocity(point), Vector::ZERO);
    }
}

#[test]
fn pinned_furniture_particles_never_move() {
    let params = SimulationParameters::default();
    let mut world = airborne_world(&params);

    let iron = world.materials().structural_id("Iron").unwrap();
    let mut builder = ShipBuilder::new();
    let a = builder.add_point(PointDefinition::new(Vector::new(-10.0, 0.0), iron));
    let b = builder.add_point(PointDefinition::new(Vector::new(10.0, 0.0), iron));
    let c = builder.add_point(PointDefinition::new(Vector::new(0.0, -4.0), iron));
    builder.add_triangle([a, b, c]);
    builder.pin(a).pin(b).pin(c);
    let ship_id = world.add_ship(builder, &params).unwrap();

    let crate_kind = world.npcs().database().furniture_id("Crate").unwrap();
    let id = world
        .begin_place_new_furniture_npc(crate_kind, Vector::new(0.0, -1.0), false, &params)
        .unwrap()
        .picked()
        .unwrap()
        .id;
    world.complete_new_npc(id, &params).unwrap();

    // Top edge of the crate: both ends pinned, the bottom corners hang free
    let mesh = world.npcs().npc(id).unwrap().particle_mesh.clone();
    let top = mesh
        .springs
        .iter()
        .find(|spring| spring.endpoints == (0, 1))
        .copied()
        .unwrap();
    let pinned = [mesh.particles[0].index, mesh.particles[1].index];
    for index in pinned {
        world.ship_mut(ship_id).unwrap().points_mut().pin(index, &params);
    }
    let before: Vec<Vector> = pinned
        .iter()
        .map(|&index| world.ship(ship_id).unwrap().points().position(index))
        .collect();
    assert_relative_eq!((before[1] - before[0]).length(), top.rest_length, max_relative = 1e-4);

    for _ in 0..1000 {
        world.update(&params);
        let ship = world.ship(ship_id).unwrap();
        assert!((0..ship.springs().len()).all(|spring| !ship.springs().strain_state(spring).is_stressed));
        let length = (ship.points().position(pinned[1]) - ship.points().position(pinned[0])).length();
        assert_eq!(length, (before[1] - before[0]).length());
    }

    let ship = world.ship(ship_id).unwrap();
    for (index, position) in pinned.into_iter().zip(before) {
        assert_eq!(ship.points().position(index), position);
        assert_eq!(ship.points().velocity(index), Vector::ZERO);
    }
}

#[test]
fn hanging_sag_is_independent_of_iteration_count() {
    let mut sags = Vec::new();
    for iterations in [1, 2, 4, 8, 16] {
        let params = SimulationParameters::default().with_iterations(iterations);
        let mut world = airborne_world(&params);
        let ship_id = world.add_ship(pair(&world, false, true), &params).unwrap();
        // Long enough for the oscillation to die out
        for _ in 0..2000 {
            world.update(&params);
        }
        let ship = world.ship(ship_id).unwrap();
        sags.push(ship.springs().length(0, ship.points()) - 1.0);
    }

    let largest = sags.iter().cloned().fold(f32::MIN, f32::max);
    let smallest = sags.iter().cloned().fold(f32::MAX, f32::min);
    assert!(smallest > 1e-3, "sags {sags:?}");
    assert_relative_eq!(largest, smallest, max_relative = 0.02);
}

#[test]
fn identical_worlds_stay_identical() {
    let params = SimulationParameters::default().with_seed(42);
    let run = || {
        let mut world = World::new(&params);
        let iron = world.materials().structural_id("Iron").unwrap();
        let hull = shipsim2d::ship::RectangularGrid::new(Vector::new(-6.0, -1.0), 6, 2, 2.0, iron).with_deck(0);
        world.add_ship(hull.into_builder(), &params).unwrap();
        let sailor = world.npcs().database().human_id("Sailor").unwrap();
        let id = world
            .begin_place_new_human_npc(sailor, Vector::new(0.0, -0.9), false, &params)
            .unwrap()
            .picked()
            .unwrap()
            .id;
        world.complete_new_npc(id, &params).unwrap();
        for _ in 0..100 {
            world.update(&params);
        }
        world.render_snapshot()
    };

    assert_eq!(run(), run());
}

//! NPC placement, transfer and removal bookkeeping.

use shipsim2d::environment::Environment;
use shipsim2d::math::Vector;
use shipsim2d::npcs::{NpcHighlight, RegimeType, ShipNpcCounts};
use shipsim2d::ship::RectangularGrid;
use shipsim2d::{NpcId, ShipId, SimulationParameters, World};

/// Two pinned 4x4 m hulls, one at the origin and one 30 m to the right.
fn two_hulls(params: &SimulationParameters) -> World {
    let mut world = World::new(params).with_environment(Environment::flat(-100.0, -800.0));
    let iron = world.materials().structural_id("Iron").unwrap();
    for x in [0.0, 30.0] {
        let mut builder = RectangularGrid::new(Vector::new(x, 0.0), 2, 2, 2.0, iron)
            .with_deck(0)
            .into_builder();
        for point in 0..builder.point_count() {
            builder.pin(point);
        }
        world.add_ship(builder, params).unwrap();
    }
    world
}

fn place_sailor(world: &mut World, feet: Vector, params: &SimulationParameters) -> NpcId {
    let sailor = world.npcs().database().human_id("Sailor").unwrap();
    let id = world
        .begin_place_new_human_npc(sailor, feet, false, params)
        .unwrap()
        .picked()
        .unwrap()
        .id;
    world.complete_new_npc(id, params).unwrap();
    id
}

fn hosts(world: &World, ship_id: ShipId) -> Vec<NpcId> {
    world.npcs().ship_npcs(ship_id).to_vec()
}

#[test]
fn removing_a_constrained_human_only_touches_its_counter() {
    let params = SimulationParameters::default();
    let mut world = two_hulls(&params);
    let standing = place_sailor(&mut world, Vector::new(1.0, 0.5), &params);
    let flying = place_sailor(&mut world, Vector::new(15.0, 20.0), &params);
    let flying_host = world.npcs().npc(flying).unwrap().current_ship_id;
    assert_eq!(world.npcs().constrained_regime_human_npc_count(), 1);
    assert_eq!(world.npcs().free_regime_human_npc_count(), 1);
    let one_sailor = ShipNpcCounts {
        furniture: 0,
        humans: 1,
        captains: 0,
    };
    assert_eq!(world.npcs().ship_npc_counts(0), one_sailor);
    assert_eq!(world.npcs().ship_npc_counts(flying_host), one_sailor);

    world.remove_npc(standing, &params).unwrap();
    assert_eq!(world.npcs().constrained_regime_human_npc_count(), 0);
    assert_eq!(world.npcs().free_regime_human_npc_count(), 1);
    assert_eq!(world.npcs().ship_npc_counts(0), ShipNpcCounts::default());
    assert_eq!(world.npcs().ship_npc_counts(flying_host), one_sailor);

    world.remove_npc(flying, &params).unwrap();
    assert_eq!(world.npcs().constrained_regime_human_npc_count(), 0);
    assert_eq!(world.npcs().free_regime_human_npc_count(), 0);
    assert_eq!(world.npcs().npc_count(), 0);
    assert_eq!(world.npcs().ship_npc_counts(flying_host), ShipNpcCounts::default());
}

#[test]
fn ship_counts_follow_placement_transfer_and_abort() {
    let params = SimulationParameters::default();
    let mut world = two_hulls(&params);
    let captain = world.npcs().database().human_id("Captain").unwrap();
    let id = world
        .begin_place_new_human_npc(captain, Vector::new(1.0, 0.5), false, &params)
        .unwrap()
        .picked()
        .unwrap()
        .id;
    world.complete_new_npc(id, &params).unwrap();
    let lamp = world.npcs().database().furniture_id("Lamp").unwrap();
    let lamp_id = world
        .begin_place_new_furniture_npc(lamp, Vector::new(3.0, 1.0), false, &params)
        .unwrap()
        .picked()
        .unwrap()
        .id;

    let counts = |world: &World, ship_id| world.npcs().ship_npc_counts(ship_id);
    assert_eq!((counts(&world, 0).humans, counts(&world, 0).captains), (1, 1));
    assert_eq!(counts(&world, 0).furniture + counts(&world, 1).furniture, 1);

    world.abort_new_npc(lamp_id, &params).unwrap();
    assert_eq!(counts(&world, 0).furniture + counts(&world, 1).furniture, 0);
    world.begin_move_npc(id, 0, true, &params).unwrap();
    world.move_npc_to(id, Vector::new(31.0, 0.5), Vector::ZERO, &params).unwrap();
    world.end_move_npc(id, &params).unwrap();

    assert_eq!(world.npcs().ship_npc_counts(0), ShipNpcCounts::default());
    assert_eq!(
        world.npcs().ship_npc_counts(1),
        ShipNpcCounts {
            furniture: 0,
            humans: 1,
            captains: 1,
        }
    );
}

#[test]
fn placement_lands_on_the_hull_under_the_feet() {
    let params = SimulationParameters::default();
    let mut world = two_hulls(&params);
    let id = place_sailor(&mut world, Vector::new(1.0, 0.5), &params);

    assert_eq!(world.npcs().npc(id).unwrap().current_ship_id, 0);
    assert_eq!(hosts(&world, 0), vec![id]);
    assert!(hosts(&world, 1).is_empty());
}

#[test]
fn moving_to_another_hull_transfers_membership() {
    let params = SimulationParameters::default();
    let mut world = two_hulls(&params);
    let id = place_sailor(&mut world, Vector::new(1.0, 0.5), &params);
    let other = place_sailor(&mut world, Vector::new(3.0, 0.5), &params);
    let capacity = world.ship(1).unwrap().points().npc_capacity();

    world.begin_move_npc(id, 0, true, &params).unwrap();
    world.move_npc_to(id, Vector::new(31.0, 0.5), Vector::ZERO, &params).unwrap();
    world.end_move_npc(id, &params).unwrap();

    let state = world.npcs().npc(id).unwrap();
    assert_eq!(state.current_ship_id, 1);
    assert_eq!(state.current_regime, RegimeType::Constrained);
    assert_eq!(hosts(&world, 0), vec![other]);
    assert_eq!(hosts(&world, 1), vec![id]);
    assert_eq!(world.ship(1).unwrap().points().remaining_npc_capacity(), capacity - 2);

    for _ in 0..64 {
        world.update(&params);
    }
    assert_eq!(hosts(&world, 1), vec![id]);
    assert_eq!(world.npcs().constrained_regime_human_npc_count(), 2);
}

#[test]
fn aborting_a_placement_leaves_no_trace() {
    let params = SimulationParameters::default();
    let mut world = two_hulls(&params);
    let lamp = world.npcs().database().furniture_id("Lamp").unwrap();
    let picked = world
        .begin_place_new_furniture_npc(lamp, Vector::new(2.0, 1.0), false, &params)
        .unwrap()
        .picked()
        .unwrap();
    assert_eq!(world.npcs().npc_count(), 1);

    world.abort_new_npc(picked.id, &params).unwrap();
    assert_eq!(world.npcs().npc_count(), 0);
    assert!(hosts(&world, 0).is_empty() && hosts(&world, 1).is_empty());
}

#[test]
fn probe_select_and_highlight() {
    let params = SimulationParameters::default();
    let mut world = two_hulls(&params);
    let id = place_sailor(&mut world, Vector::new(1.0, 0.5), &params);

    let picked = world.probe_npc_at(Vector::new(1.1, 1.2), 0.5, &params).unwrap();
    assert_eq!(picked.id, id);
    assert!(world.probe_npc_at(Vector::new(20.0, 1.2), 0.5, &params).is_none());

    world.select_npc(Some(picked.id)).unwrap();
    world.highlight_npc(picked.id, NpcHighlight::Selected).unwrap();
    assert_eq!(world.npcs().selected_npc(), Some(id));
    assert_eq!(world.npcs().npc(id).unwrap().highlight, NpcHighlight::Selected);

    world.remove_npc(id, &params).unwrap();
    assert_eq!(world.npcs().selected_npc(), None);
}

#[test]
fn smashed_humans_are_knocked_out() {
    let params = SimulationParameters::default();
    let mut world = two_hulls(&params);
    let id = place_sailor(&mut world, Vector::new(1.0, 0.5), &params);

    world.smash_at(Vector::new(1.0, 1.0), 1.0, &params);
    let behavior = world.npcs().npc(id).unwrap().human().unwrap().behavior.name();
    assert!(behavior.contains("KnockedOut"), "{behavior}");
}

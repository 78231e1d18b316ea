use bevy::log::LogPlugin;
use bevy::prelude::*;

use shipsim2d::events::LogSink;
use shipsim2d::math::Vector;
use shipsim2d::ship::RectangularGrid;
use shipsim2d::{Result, ShipSimPlugin, SimulationParameters, World};

/// About thirty simulated seconds.
const DEMO_TICKS: usize = 64 * 30;

fn populate(world: &mut World, params: &SimulationParameters) -> Result<()> {
    let iron = world.materials().structural_id("Iron").unwrap_or_default();
    let hull = RectangularGrid::new(Vector::new(-20.0, -4.0), 20, 4, 2.0, iron)
        .with_deck(0)
        .with_deck(2)
        .with_wall(0)
        .with_wall(20);
    world.add_ship(hull.into_builder(), params)?;
    world.register_event_sink(Box::new(LogSink));

    let database = world.npcs().database();
    let crew = ["Captain", "Sailor", "Sailor", "Passenger"]
        .into_iter()
        .filter_map(|name| database.human_id(name))
        .collect::<Vec<_>>();
    let cargo = database.furniture_id("Crate");

    for (ordinal, sub_kind) in crew.into_iter().enumerate() {
        let feet = Vector::new(-12.0 + 8.0 * ordinal as f32, -3.9);
        if let Some(picked) = world.begin_place_new_human_npc(sub_kind, feet, false, params)?.picked() {
            world.complete_new_npc(picked.id, params)?;
        }
    }
    if let Some(cargo) = cargo
        && let Some(picked) = world
            .begin_place_new_furniture_npc(cargo, Vector::new(4.0, 1.0), true, params)?
            .picked()
    {
        world.complete_new_npc(picked.id, params)?;
    }
    Ok(())
}

fn setup(params: Res<SimulationParameters>, mut world: ResMut<World>) {
    if let Err(error) = populate(&mut world, &params) {
        error!("Demo setup failed: {}", error);
    }
}

fn main() {
    let mut app = App::new();
    app.add_plugins((MinimalPlugins, LogPlugin::default(), ShipSimPlugin))
        .add_systems(Startup, setup);
    app.finish();
    app.cleanup();

    for _ in 0..DEMO_TICKS {
        app.update();
    }

    let world = app.world().resource::<World>();
    info!(
        "Demo finished after {} ticks ({:.1}s simulated), {} NPCs",
        world.sequence_number(),
        world.current_simulation_time(),
        world.npcs().npc_count()
    );
}

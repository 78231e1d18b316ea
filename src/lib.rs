#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use bevy::prelude::*;

pub mod config;
pub mod core;
pub mod environment;
pub mod error;
pub mod events;
pub mod math;
pub mod npcs;
pub mod render;
pub mod ship;
pub mod world;

// Re-exports
pub use config::SimulationParameters;
pub use error::{Result, SimulationError};
pub use events::{SimulationEvent, SimulationEventSink};
pub use npcs::{NpcId, NpcPlacement, Npcs, PickedNpc};
pub use render::RenderSnapshot;
pub use ship::{Ship, ShipBuilder, ShipId};
pub use world::World;

/// Ticks between two statistics log lines.
const STATS_PERIOD: u64 = 64;

pub struct ShipSimPlugin;

impl Plugin for ShipSimPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SimulationParameters>()
            .init_resource::<World>()
            .add_systems(Update, (update_world, publish_world_stats).chain());
    }
}

fn update_world(params: Res<SimulationParameters>, mut world: ResMut<World>) {
    world.update(&params);
}

fn publish_world_stats(world: Res<World>) {
    if world.sequence_number() % STATS_PERIOD != 0 {
        return;
    }

    for ship in world.ships() {
        let stats = ship.statistics();
        info!(
            "Ship {}: {} broken springs, {} destroyed triangles, {:.1} water taken, last update {:.3}ms",
            ship.id(),
            stats.broken_springs,
            stats.destroyed_triangles,
            stats.water_taken,
            stats.last_update_ms
        );
    }
    let npcs = world.npcs();
    info!(
        "Npcs: {} total, {} constrained humans, {} free humans",
        npcs.npc_count(),
        npcs.constrained_regime_human_npc_count(),
        npcs.free_regime_human_npc_count()
    );
}

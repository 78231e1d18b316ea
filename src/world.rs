//! The simulated world: ships, NPCs and their environment
//!
//! [`World::update`] is one simulation tick. Ships advance in id order, then
//! the NPCs react to what broke and move against the deformed meshes.

use std::time::Instant;

use bevy::log::{debug, info, warn};
use bevy::prelude::*;
use rand::{SeedableRng, rngs::StdRng};

use crate::config::{SIMULATION_STEP_TIME_DURATION, SimulationParameters};
use crate::core::{ConnectedComponentId, MaterialDatabase};
use crate::environment::Environment;
use crate::error::{Result, SimulationError};
use crate::events::{SimulationEventDispatcher, SimulationEventSink};
use crate::math::{Real, Vector};
use crate::npcs::{NpcContext, NpcDatabase, NpcHighlight, NpcId, NpcPlacement, NpcSubKindId, Npcs, PickedNpc};
use crate::ship::interactions::{BLAST_FORCE, DRAW_FORCE, SWIRL_FORCE};
use crate::ship::{Ship, ShipBuilder, ShipId, ShipUpdateContext, ShipUpdateOutcome};

/// Aggregate simulation state.
#[derive(Resource)]
pub struct World {
    ships: Vec<Option<Ship>>,
    npcs: Npcs,
    environment: Environment,
    materials: MaterialDatabase,
    events: SimulationEventDispatcher,
    rng: StdRng,
    current_simulation_time: Real,
    sequence_number: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::new(&SimulationParameters::default())
    }
}

impl World {
    pub fn new(params: &SimulationParameters) -> Self {
        Self {
            ships: Vec::new(),
            npcs: Npcs::default(),
            environment: Environment::default(),
            materials: MaterialDatabase::new(),
            events: SimulationEventDispatcher::new(),
            rng: StdRng::seed_from_u64(params.rng_seed),
            current_simulation_time: 0.0,
            sequence_number: 0,
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_npc_database(mut self, database: NpcDatabase) -> Self {
        self.npcs = Npcs::new(database);
        self
    }

    pub fn with_materials(mut self, materials: MaterialDatabase) -> Self {
        self.materials = materials;
        self
    }

    // Accessors

    pub fn ships(&self) -> impl Iterator<Item = &Ship> + '_ {
        self.ships.iter().flatten()
    }

    pub fn ship_slots(&self) -> &[Option<Ship>] {
        &self.ships
    }

    pub fn ship(&self, ship_id: ShipId) -> Result<&Ship> {
        self.ships
            .get(ship_id as usize)
            .and_then(Option::as_ref)
            .ok_or(SimulationError::UnknownShip(ship_id))
    }

    pub fn ship_mut(&mut self, ship_id: ShipId) -> Result<&mut Ship> {
        crate::npcs::ship_mut(&mut self.ships, ship_id)
    }

    pub fn npcs(&self) -> &Npcs {
        &self.npcs
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    pub fn materials(&self) -> &MaterialDatabase {
        &self.materials
    }

    pub fn register_event_sink(&mut self, sink: Box<dyn SimulationEventSink>) {
        self.events.register_sink(sink);
    }

    pub fn current_simulation_time(&self) -> Real {
        self.current_simulation_time
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    // Ships

    /// Builds a ship into the next free id.
    pub fn add_ship(&mut self, builder: ShipBuilder, params: &SimulationParameters) -> Result<ShipId> {
        let ship_id = self.ships.len() as ShipId;
        let ship = builder.build(ship_id, &self.materials, params)?;
        info!(
            "World: ship {} added with {} points, {} springs, {} triangles",
            ship_id,
            ship.points().structural_count(),
            ship.springs().len(),
            ship.triangles().len()
        );
        self.ships.push(Some(ship));
        self.npcs.on_ship_added(ship_id);
        Ok(ship_id)
    }

    /// Removes a ship together with the NPCs it hosts.
    pub fn remove_ship(&mut self, ship_id: ShipId, params: &SimulationParameters) -> Result<()> {
        self.ship(ship_id)?;
        let hosted = self.npcs.ship_npcs(ship_id).to_vec();
        self.with_npcs(params, |npcs, ctx| {
            hosted.into_iter().try_for_each(|id| npcs.remove_npc(id, ctx))
        })?;
        self.ships[ship_id as usize] = None;
        info!("World: ship {} removed", ship_id);
        Ok(())
    }

    // Update

    /// Advances the world by one simulation tick.
    pub fn update(&mut self, params: &SimulationParameters) {
        let start = Instant::now();
        self.environment.update(self.current_simulation_time);

        let mut outcomes: Vec<(ShipId, ShipUpdateOutcome)> = Vec::with_capacity(self.ships.len());
        {
            let mut context = ShipUpdateContext {
                current_simulation_time: self.current_simulation_time,
                sequence_number: self.sequence_number,
                environment: &self.environment,
                params,
                materials: &self.materials,
                events: &mut self.events,
            };
            for ship in self.ships.iter_mut().flatten() {
                let outcome = ship.update(&mut context);
                outcomes.push((ship.id(), outcome));
            }
        }

        self.with_npcs(params, |npcs, ctx| {
            for (ship_id, outcome) in &outcomes {
                if !outcome.destroyed_triangles.is_empty()
                    && let Err(error) = npcs.on_ship_triangles_destroyed(*ship_id, &outcome.destroyed_triangles, ctx.ships)
                {
                    warn!("World: triangle destruction on ship {} not forwarded: {}", ship_id, error);
                }
                if outcome.connectivity_changed
                    && let Err(error) = npcs.on_ship_connectivity_changed(*ship_id, ctx)
                {
                    warn!("World: connectivity change on ship {} not forwarded: {}", ship_id, error);
                }
            }
            npcs.update(ctx);
        });

        self.events.flush();
        self.current_simulation_time += SIMULATION_STEP_TIME_DURATION;
        self.sequence_number += 1;

        debug!(
            "World: tick {} in {:.3}ms",
            self.sequence_number,
            start.elapsed().as_secs_f64() * 1000.0
        );
    }

    /// Runs `f` with the NPCs and a context borrowing the rest of the world.
    pub fn with_npcs<R>(&mut self, params: &SimulationParameters, f: impl FnOnce(&mut Npcs, &mut NpcContext<'_>) -> R) -> R {
        let mut ctx = NpcContext {
            ships: &mut self.ships,
            environment: &self.environment,
            params,
            materials: &self.materials,
            events: &mut self.events,
            rng: &mut self.rng,
            current_simulation_time: self.current_simulation_time,
            sequence_number: self.sequence_number,
        };
        f(&mut self.npcs, &mut ctx)
    }

    // NPCs

    pub fn begin_place_new_furniture_npc(
        &mut self,
        sub_kind: NpcSubKindId,
        position: Vector,
        move_whole_mesh: bool,
        params: &SimulationParameters,
    ) -> Result<NpcPlacement> {
        self.with_npcs(params, |npcs, ctx| {
            npcs.begin_place_new_furniture_npc(sub_kind, position, move_whole_mesh, ctx)
        })
    }

    pub fn begin_place_new_human_npc(
        &mut self,
        sub_kind: NpcSubKindId,
        position: Vector,
        move_whole_mesh: bool,
        params: &SimulationParameters,
    ) -> Result<NpcPlacement> {
        self.with_npcs(params, |npcs, ctx| {
            npcs.begin_place_new_human_npc(sub_kind, position, move_whole_mesh, ctx)
        })
    }

    pub fn begin_move_npc(&mut self, id: NpcId, particle_ordinal: usize, move_whole_mesh: bool, params: &SimulationParameters) -> Result<()> {
        self.with_npcs(params, |npcs, ctx| npcs.begin_move_npc(id, particle_ordinal, move_whole_mesh, ctx))
    }

    pub fn move_npc_to(&mut self, id: NpcId, position: Vector, world_offset: Vector, params: &SimulationParameters) -> Result<()> {
        self.with_npcs(params, |npcs, ctx| npcs.move_npc_to(id, position, world_offset, ctx))
    }

    pub fn end_move_npc(&mut self, id: NpcId, params: &SimulationParameters) -> Result<()> {
        self.with_npcs(params, |npcs, ctx| npcs.end_move_npc(id, ctx))
    }

    pub fn complete_new_npc(&mut self, id: NpcId, params: &SimulationParameters) -> Result<()> {
        self.with_npcs(params, |npcs, ctx| npcs.complete_new_npc(id, ctx))
    }

    pub fn remove_npc(&mut self, id: NpcId, params: &SimulationParameters) -> Result<()> {
        self.with_npcs(params, |npcs, ctx| npcs.remove_npc(id, ctx))
    }

    pub fn abort_new_npc(&mut self, id: NpcId, params: &SimulationParameters) -> Result<()> {
        self.with_npcs(params, |npcs, ctx| npcs.abort_new_npc(id, ctx))
    }

    pub fn probe_npc_at(&self, position: Vector, radius: Real, params: &SimulationParameters) -> Option<PickedNpc> {
        self.npcs
            .probe_npc_at(position, radius, &self.ships, params.npc_size_multiplier)
    }

    pub fn turnaround_npc(&mut self, id: NpcId) -> Result<()> {
        self.npcs.turnaround_npc(id)
    }

    pub fn select_npc(&mut self, id: Option<NpcId>) -> Result<()> {
        self.npcs.select_npc(id, &mut self.events)
    }

    pub fn select_next_npc(&mut self) -> Result<()> {
        self.npcs.select_next_npc(&mut self.events)
    }

    pub fn highlight_npc(&mut self, id: NpcId, highlight: NpcHighlight) -> Result<()> {
        self.npcs.highlight_npc(id, highlight)
    }

    pub fn set_generalized_panic_level(&mut self, level: Real) {
        self.npcs.set_generalized_panic_level(level);
    }

    // Tools

    /// Translates a ship and everything standing on it.
    pub fn move_by(&mut self, ship_id: ShipId, offset: Vector, inertial_velocity: Vector) -> Result<()> {
        self.ship_mut(ship_id)?.move_by(offset, inertial_velocity);
        self.npcs.move_by(ship_id, None, offset, inertial_velocity, &mut self.ships)
    }

    /// Moves only the NPCs standing on one connected component of a ship.
    pub fn move_npcs_of_component_by(
        &mut self,
        ship_id: ShipId,
        component: ConnectedComponentId,
        offset: Vector,
        inertial_velocity: Vector,
    ) -> Result<()> {
        self.npcs
            .move_by(ship_id, Some(component), offset, inertial_velocity, &mut self.ships)
    }

    /// Rotates a ship and everything standing on it around `center`.
    pub fn rotate_by(&mut self, ship_id: ShipId, angle: Real, center: Vector) -> Result<()> {
        self.ship_mut(ship_id)?.rotate_by(angle, center);
        self.npcs.rotate_by(ship_id, None, angle, center, &mut self.ships)
    }

    pub fn apply_blast_at(&mut self, ship_id: ShipId, center: Vector, radius: Real, force_multiplier: Real) -> Result<()> {
        self.ship_mut(ship_id)?
            .apply_blast_at(center, radius, force_multiplier);
        self.npcs
            .apply_blast(ship_id, center, radius, BLAST_FORCE * force_multiplier, &self.ships);
        Ok(())
    }

    pub fn draw_to(&mut self, center: Vector, strength_fraction: Real) {
        for ship in self.ships.iter_mut().flatten() {
            ship.draw_to(center, strength_fraction);
        }
        self.npcs.draw_to(center, DRAW_FORCE * strength_fraction, &self.ships);
    }

    pub fn swirl_at(&mut self, center: Vector, strength_fraction: Real) {
        for ship in self.ships.iter_mut().flatten() {
            ship.swirl_at(center, strength_fraction);
        }
        self.npcs.swirl_at(center, SWIRL_FORCE * strength_fraction, &self.ships);
    }

    /// Knocks out the humans near `position`.
    pub fn smash_at(&mut self, position: Vector, radius: Real, params: &SimulationParameters) {
        self.with_npcs(params, |npcs, ctx| npcs.smash_at(position, radius, ctx));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NpcFloorGeometry, PointDefinition};
    use crate::events::{RecordingSink, SimulationEvent};
    use crate::npcs::RegimeType;
    use crate::ship::RectangularGrid;

    fn deck_ship(materials: &MaterialDatabase) -> ShipBuilder {
        let iron = materials.structural_id("Iron").unwrap_or(0);
        let mut builder = RectangularGrid::new(Vector::new(-10.0, 0.0), 11, 3, 2.0, iron)
            .with_deck(0)
            .into_builder();
        for point in 0..builder.point_count() {
            builder.pin(point);
        }
        builder
    }

    #[test]
    fn ticks_advance_time_and_sequence() {
        let params = SimulationParameters::default();
        let mut world = World::new(&params);
        world.update(&params);
        world.update(&params);
        assert_eq!(world.sequence_number(), 2);
        approx::assert_relative_eq!(world.current_simulation_time(), 2.0 * SIMULATION_STEP_TIME_DURATION);
    }

    #[test]
    fn ships_get_consecutive_ids() {
        let params = SimulationParameters::default();
        let mut world = World::new(&params);
        let first = world.add_ship(deck_ship(world.materials()), &params).unwrap();
        let second = world.add_ship(deck_ship(world.materials()), &params).unwrap();
        assert_eq!((first, second), (0, 1));
        assert!(matches!(world.ship(2), Err(SimulationError::UnknownShip(2))));
    }

    #[test]
    fn removing_a_ship_removes_its_npcs() {
        let params = SimulationParameters::default();
        let mut world = World::new(&params);
        let ship_id = world.add_ship(deck_ship(world.materials()), &params).unwrap();
        let sailor = world.npcs().database().human_id("Sailor").unwrap();
        let picked = world
            .begin_place_new_human_npc(sailor, Vector::new(0.0, 0.5), false, &params)
            .unwrap()
            .picked()
            .unwrap();
        world.complete_new_npc(picked.id, &params).unwrap();
        assert_eq!(world.npcs().npc_count(), 1);

        world.remove_ship(ship_id, &params).unwrap();
        assert_eq!(world.npcs().npc_count(), 0);
        assert!(world.ship(ship_id).is_err());
    }

    #[test]
    fn npcs_follow_a_moved_ship() {
        let params = SimulationParameters::default();
        let mut world = World::new(&params);
        let ship_id = world.add_ship(deck_ship(world.materials()), &params).unwrap();
        let sailor = world.npcs().database().human_id("Sailor").unwrap();
        let id = world
            .begin_place_new_human_npc(sailor, Vector::new(1.0, 0.5), false, &params)
            .unwrap()
            .picked()
            .unwrap()
            .id;
        world.complete_new_npc(id, &params).unwrap();
        let feet = world.npcs().npc(id).unwrap().particle_mesh.particles[0].index;
        let before = world.ship(ship_id).unwrap().points().position(feet);

        world.move_by(ship_id, Vector::new(5.0, 0.0), Vector::ZERO).unwrap();
        let after = world.ship(ship_id).unwrap().points().position(feet);
        approx::assert_relative_eq!(after.x, before.x + 5.0);
    }

    #[test]
    fn a_single_triangle_ship_hosts_a_standing_human() {
        let params = SimulationParameters::default();
        let mut world = World::new(&params).with_environment(Environment::flat(-100.0, -800.0));
        let sink = RecordingSink::new();
        world.register_event_sink(Box::new(sink.clone()));

        let iron = world.materials().structural_id("Iron").unwrap_or(0);
        let mut builder = ShipBuilder::new();
        let a = builder.add_point(PointDefinition::new(Vector::new(-10.0, 0.0), iron));
        let b = builder.add_point(PointDefinition::new(Vector::new(0.0, 4.0), iron));
        let c = builder.add_point(PointDefinition::new(Vector::new(10.0, 0.0), iron));
        builder.add_triangle([a, b, c]);
        builder.set_floor(c, a, NpcFloorGeometry::Depth1H);
        builder.pin(a).pin(b).pin(c);
        world.add_ship(builder, &params).unwrap();

        let sailor = world.npcs().database().human_id("Sailor").unwrap();
        let id = world
            .begin_place_new_human_npc(sailor, Vector::new(0.0, 0.05), false, &params)
            .unwrap()
            .picked()
            .unwrap()
            .id;
        world.complete_new_npc(id, &params).unwrap();
        world.select_npc(Some(id)).unwrap();

        for _ in 0..120 {
            world.update(&params);
        }
        assert_eq!(world.npcs().npc(id).unwrap().current_regime, RegimeType::Constrained);
        assert!(sink.count_matching(|event| matches!(event, SimulationEvent::HumanNpcBehaviorChanged { .. })) > 0);
    }
}

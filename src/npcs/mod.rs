//! NPCs
//!
//! Furniture and humans are small particle meshes whose particles live in
//! the NPC region of their host ship's particle store. Each particle is
//! either constrained to a ship triangle (moving with the mesh and
//! colliding with its floors) or free (plain ballistic motion).
//!
//! One [`Npcs::update`] runs, per NPC:
//!
//! 1. waterness and combustion;
//! 2. constrained state validation against the live mesh;
//! 3. forces, springs and per-particle physics;
//! 4. regime bookkeeping;
//!
//! then the human behavior state machines and finally the animation.

pub mod animation;
pub mod database;
pub mod human_behavior;
pub mod interactions;
pub mod physics;
pub mod regime;
pub mod state;

use std::time::Instant;

use bevy::log::{debug, info, trace, warn};
use rand::{Rng, rngs::StdRng};

pub use database::{
    FurnitureGeometry, FurnitureSubKind, HumanRole, HumanSubKind, NpcDatabase, NpcParticleAttributes,
    NpcSubKindId,
};
pub use state::{
    BarycentricPosition, BeingPlacedState, ConstrainedState, FurnitureNpcState, HumanAnimationState,
    HumanBehavior, HumanNpcState, KindSpecificState, LimbVector, NpcCombustionState, NpcHighlight, NpcKind,
    NpcParticle, NpcSpring, NpcState, ParticleMesh, RegimeType, VirtualFloor,
};

use crate::config::{MAX_PARTICLES_PER_NPC, SimulationParameters};
use crate::core::MaterialDatabase;
use crate::environment::Environment;
use crate::error::{Result, SimulationError};
use crate::events::{SimulationEvent, SimulationEventDispatcher};
use crate::math::{Real, Vector};
use crate::ship::{Ship, ShipId};

pub type NpcId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParticleMeshKind {
    Particle,
    Dipole,
    Quad,
}

/// Why a placement did not produce an NPC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementRejection {
    TooManyNpcs,
    NoShip,
    ParticleCapacityExhausted,
}

/// An NPC grabbed by a particle, with the pointer's offset from it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PickedNpc {
    pub id: NpcId,
    pub particle_ordinal: usize,
    /// Pointer position minus particle position.
    pub world_offset: Vector,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NpcPlacement {
    Placed(PickedNpc),
    Rejected(PlacementRejection),
}

impl NpcPlacement {
    pub fn picked(self) -> Option<PickedNpc> {
        match self {
            Self::Placed(picked) => Some(picked),
            Self::Rejected(_) => None,
        }
    }
}

/// Everything NPC operations read or write besides the NPCs themselves.
pub struct NpcContext<'a> {
    pub ships: &'a mut [Option<Ship>],
    pub environment: &'a Environment,
    pub params: &'a SimulationParameters,
    pub materials: &'a MaterialDatabase,
    pub events: &'a mut SimulationEventDispatcher,
    pub rng: &'a mut StdRng,
    pub current_simulation_time: Real,
    pub sequence_number: u64,
}

/// Mean adult height in meters.
const HUMAN_HEIGHT_MEAN: Real = 1.65;
const HUMAN_HEIGHT_STD_DEV: Real = 0.065;
/// Walking speed of a human of mean height, in m/s.
const HUMAN_BASE_WALKING_SPEED: Real = 1.0;

/// Subset of parameters the NPC mesh constants depend on.
#[derive(Clone, Copy, Debug, PartialEq)]
struct NpcParameterKey {
    size_multiplier: Real,
    spring_reduction_fraction_adjustment: Real,
    spring_damping_coefficient_adjustment: Real,
    water_density_adjustment: Real,
}

impl NpcParameterKey {
    fn of(params: &SimulationParameters) -> Self {
        Self {
            size_multiplier: params.npc_size_multiplier,
            spring_reduction_fraction_adjustment: params.npc_spring_reduction_fraction_adjustment,
            spring_damping_coefficient_adjustment: params.npc_spring_damping_coefficient_adjustment,
            water_density_adjustment: params.water_density_adjustment,
        }
    }
}

/// Per-ship NPC tallies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShipNpcCounts {
    pub furniture: usize,
    pub humans: usize,
    pub captains: usize,
}

/// NPCs hosted by one ship.
#[derive(Clone, Debug, Default)]
struct ShipNpcs {
    npcs: Vec<NpcId>,
    counts: ShipNpcCounts,
}

impl ShipNpcs {
    fn add(&mut self, state: &NpcState) {
        self.npcs.push(state.id);
        self.tally(state, 1);
    }

    fn remove(&mut self, state: &NpcState) {
        let before = self.npcs.len();
        self.npcs.retain(|&npc| npc != state.id);
        if self.npcs.len() < before {
            self.tally(state, -1);
        }
    }

    fn tally(&mut self, state: &NpcState, delta: isize) {
        let bump = |count: &mut usize| *count = count.saturating_add_signed(delta);
        match &state.kind_specific {
            KindSpecificState::Furniture(_) => bump(&mut self.counts.furniture),
            KindSpecificState::Human(human) => {
                bump(&mut self.counts.humans);
                if human.role == HumanRole::Captain {
                    bump(&mut self.counts.captains);
                }
            }
        }
    }
}

pub struct Npcs {
    state_buffer: Vec<Option<NpcState>>,
    ship_npcs: Vec<ShipNpcs>,
    npc_count: usize,
    constrained_regime_human_npc_count: usize,
    free_regime_human_npc_count: usize,
    selected_npc: Option<NpcId>,
    generalized_panic_level: Real,
    database: NpcDatabase,
    parameter_key: Option<NpcParameterKey>,
}

impl Default for Npcs {
    fn default() -> Self {
        Self::new(NpcDatabase::new())
    }
}

pub(crate) fn ship_mut(ships: &mut [Option<Ship>], ship_id: ShipId) -> Result<&mut Ship> {
    ships
        .get_mut(ship_id as usize)
        .and_then(Option::as_mut)
        .ok_or(SimulationError::UnknownShip(ship_id))
}

fn topmost_ship_id(ships: &[Option<Ship>]) -> Option<ShipId> {
    ships.iter().rposition(Option::is_some).map(|index| index as ShipId)
}

impl Npcs {
    pub fn new(database: NpcDatabase) -> Self {
        Self {
            state_buffer: Vec::new(),
            ship_npcs: Vec::new(),
            npc_count: 0,
            constrained_regime_human_npc_count: 0,
            free_regime_human_npc_count: 0,
            selected_npc: None,
            generalized_panic_level: 0.0,
            database,
            parameter_key: None,
        }
    }

    // Accessors

    pub fn database(&self) -> &NpcDatabase {
        &self.database
    }

    pub fn database_mut(&mut self) -> &mut NpcDatabase {
        &mut self.database
    }

    pub fn npc(&self, id: NpcId) -> Result<&NpcState> {
        self.state_buffer
            .get(id as usize)
            .and_then(Option::as_ref)
            .ok_or(SimulationError::UnknownNpc(id))
    }

    pub fn npcs(&self) -> impl Iterator<Item = &NpcState> + '_ {
        self.state_buffer.iter().flatten()
    }

    pub fn npc_count(&self) -> usize {
        self.npc_count
    }

    pub fn constrained_regime_human_npc_count(&self) -> usize {
        self.constrained_regime_human_npc_count
    }

    pub fn free_regime_human_npc_count(&self) -> usize {
        self.free_regime_human_npc_count
    }

    pub fn selected_npc(&self) -> Option<NpcId> {
        self.selected_npc
    }

    pub fn generalized_panic_level(&self) -> Real {
        self.generalized_panic_level
    }

    /// Panic shared by every human, in [0, 1].
    pub fn set_generalized_panic_level(&mut self, level: Real) {
        self.generalized_panic_level = level.clamp(0.0, 1.0);
    }

    /// NPCs hosted by a ship, in arrival order.
    pub fn ship_npcs(&self, ship_id: ShipId) -> &[NpcId] {
        self.ship_npcs
            .get(ship_id as usize)
            .map(|ship| ship.npcs.as_slice())
            .unwrap_or_default()
    }

    pub fn ship_npc_counts(&self, ship_id: ShipId) -> ShipNpcCounts {
        self.ship_npcs
            .get(ship_id as usize)
            .map(|ship| ship.counts)
            .unwrap_or_default()
    }

    pub fn on_ship_added(&mut self, ship_id: ShipId) {
        let needed = ship_id as usize + 1;
        if self.ship_npcs.len() < needed {
            self.ship_npcs.resize_with(needed, ShipNpcs::default);
        }
    }

    // Placement

    /// Creates a furniture NPC being placed at `position` on the topmost ship.
    pub fn begin_place_new_furniture_npc(
        &mut self,
        sub_kind: NpcSubKindId,
        position: Vector,
        move_whole_mesh: bool,
        ctx: &mut NpcContext<'_>,
    ) -> Result<NpcPlacement> {
        let furniture = self.database.furniture(sub_kind)?.clone();
        let size = ctx.params.npc_size_multiplier;

        let (offsets, springs): (Vec<Vector>, Vec<NpcSpring>) = match furniture.mesh_kind {
            ParticleMeshKind::Particle => (vec![Vector::ZERO], Vec::new()),
            ParticleMeshKind::Dipole => {
                return Err(SimulationError::UnsupportedNpcMesh(ParticleMeshKind::Dipole));
            }
            ParticleMeshKind::Quad => {
                let (w, h) = (furniture.geometry.width, furniture.geometry.height);
                let diagonal = (w * w + h * h).sqrt();
                // TL, TR, BR, BL
                let offsets = [
                    Vector::new(-w / 2.0, h / 2.0),
                    Vector::new(w / 2.0, h / 2.0),
                    Vector::new(w / 2.0, -h / 2.0),
                    Vector::new(-w / 2.0, -h / 2.0),
                ]
                .map(|offset| offset * size)
                .to_vec();
                let springs = vec![
                    NpcSpring::new(0, 1, w),
                    NpcSpring::new(1, 2, h),
                    NpcSpring::new(2, 3, w),
                    NpcSpring::new(3, 0, h),
                    NpcSpring::new(0, 2, diagonal),
                    NpcSpring::new(1, 3, diagonal),
                ];
                (offsets, springs)
            }
        };

        let positions: Vec<Vector> = offsets.iter().map(|offset| position + *offset).collect();
        let attributes = vec![furniture.particle; positions.len()];
        let kind_specific = KindSpecificState::Furniture(FurnitureNpcState {
            sub_kind,
            mesh_kind: furniture.mesh_kind,
        });

        self.place_new_npc(&positions, &attributes, springs, kind_specific, 0, move_whole_mesh, ctx)
            .map(|placement| match placement {
                NpcPlacement::Placed(picked) => NpcPlacement::Placed(PickedNpc {
                    world_offset: position - positions[0],
                    ..picked
                }),
                rejected => rejected,
            })
    }

    /// Creates a human being placed with its feet at `position`, held by the head.
    pub fn begin_place_new_human_npc(
        &mut self,
        sub_kind: NpcSubKindId,
        position: Vector,
        move_whole_mesh: bool,
        ctx: &mut NpcContext<'_>,
    ) -> Result<NpcPlacement> {
        let human = self.database.human(sub_kind)?.clone();

        let height = (sample_normal(ctx.rng, HUMAN_HEIGHT_MEAN, HUMAN_HEIGHT_STD_DEV)
            .clamp(
                HUMAN_HEIGHT_MEAN - 3.0 * HUMAN_HEIGHT_STD_DEV,
                HUMAN_HEIGHT_MEAN + 3.0 * HUMAN_HEIGHT_STD_DEV,
            ))
            * human.size_multiplier;
        let walking_speed_base = HUMAN_BASE_WALKING_SPEED * height / HUMAN_HEIGHT_MEAN;
        let head = position + Vector::new(0.0, height * ctx.params.npc_size_multiplier);

        let state = HumanNpcState::new(sub_kind, human.role, height, walking_speed_base, ctx.current_simulation_time);
        self.place_new_npc(
            &[position, head],
            &[human.feet, human.head],
            vec![NpcSpring::new(0, 1, height)],
            KindSpecificState::Human(state),
            1,
            move_whole_mesh,
            ctx,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn place_new_npc(
        &mut self,
        positions: &[Vector],
        attributes: &[NpcParticleAttributes],
        springs: Vec<NpcSpring>,
        kind_specific: KindSpecificState,
        anchor_particle_ordinal: usize,
        move_whole_mesh: bool,
        ctx: &mut NpcContext<'_>,
    ) -> Result<NpcPlacement> {
        debug_assert!(positions.len() <= MAX_PARTICLES_PER_NPC);

        if self.npc_count >= ctx.params.max_npcs {
            return Ok(NpcPlacement::Rejected(PlacementRejection::TooManyNpcs));
        }
        let Some(ship_id) = topmost_ship_id(ctx.ships) else {
            return Ok(NpcPlacement::Rejected(PlacementRejection::NoShip));
        };
        let ship = ship_mut(ctx.ships, ship_id)?;
        if ship.points().remaining_npc_capacity() < positions.len() {
            return Ok(NpcPlacement::Rejected(PlacementRejection::ParticleCapacityExhausted));
        }

        let mut particles = Vec::with_capacity(positions.len());
        for (position, attributes) in positions.iter().zip(attributes) {
            let mass = physics::particle_mass(attributes, ctx.params);
            let index = ship
                .points_mut()
                .allocate_npc_particle(*position, mass, ctx.materials)?;
            particles.push(NpcParticle::new(index, *attributes));
        }

        let id = self.next_free_id();
        let mut state = NpcState {
            id,
            current_ship_id: ship_id,
            current_plane_id: ship.max_plane_id(),
            current_connected_component_id: None,
            current_regime: RegimeType::BeingPlaced,
            particle_mesh: ParticleMesh { particles, springs },
            kind_specific,
            being_placed: Some(BeingPlacedState {
                anchor_particle_ordinal,
                move_whole_mesh,
                previous_regime: None,
            }),
            combustion_progress: -1.0,
            combustion_state: None,
            highlight: NpcHighlight::None,
            random_normalized_uniform_seed: ctx.rng.random_range(-1.0..=1.0),
        };
        physics::recalculate_mesh_parameters(&mut state.particle_mesh, ctx.params);

        let anchor = state.particle_mesh.particles[anchor_particle_ordinal].index;
        let world_offset = positions[0] - ship.points().position(anchor);

        self.on_ship_added(ship_id);
        self.ship_npcs[ship_id as usize].add(&state);
        self.state_buffer[id as usize] = Some(state);
        self.npc_count += 1;
        ctx.events.on_npc_counts_updated(self.npc_count, ctx.params.max_npcs);

        debug!("Npcs: NPC {} being placed on ship {}", id, ship_id);
        Ok(NpcPlacement::Placed(PickedNpc {
            id,
            particle_ordinal: anchor_particle_ordinal,
            world_offset,
        }))
    }

    fn next_free_id(&mut self) -> NpcId {
        match self.state_buffer.iter().position(Option::is_none) {
            Some(index) => index as NpcId,
            None => {
                self.state_buffer.push(None);
                (self.state_buffer.len() - 1) as NpcId
            }
        }
    }

    /// Runs `f` with the NPC taken out of the buffer, so it can freely call
    /// back into `self`. The state goes back even when `f` fails.
    pub(crate) fn with_npc<R>(
        &mut self,
        id: NpcId,
        f: impl FnOnce(&mut Self, &mut NpcState) -> Result<R>,
    ) -> Result<R> {
        let mut state = self
            .state_buffer
            .get_mut(id as usize)
            .and_then(Option::take)
            .ok_or(SimulationError::UnknownNpc(id))?;
        let result = f(self, &mut state);
        self.state_buffer[id as usize] = Some(state);
        result
    }

    /// Puts an existing NPC back into the being placed regime.
    pub fn begin_move_npc(
        &mut self,
        id: NpcId,
        particle_ordinal: usize,
        move_whole_mesh: bool,
        ctx: &mut NpcContext<'_>,
    ) -> Result<()> {
        let is_selected = self.selected_npc == Some(id);
        self.with_npc(id, |npcs, state| {
            let previous_regime = state.effective_regime();
            let anchor_particle_ordinal = particle_ordinal.min(state.particle_mesh.particles.len() - 1);
            state.being_placed = Some(BeingPlacedState {
                anchor_particle_ordinal,
                move_whole_mesh,
                previous_regime,
            });
            state.current_regime = RegimeType::BeingPlaced;

            let ship = ship_mut(ctx.ships, state.current_ship_id)?;
            for particle in &mut state.particle_mesh.particles {
                particle.constrained = None;
                particle.external_force = Vector::ZERO;
                ship.points_mut().set_velocity(particle.index, Vector::ZERO);
            }

            if let Some(human) = state.human_mut() {
                human.transition_to(HumanBehavior::BeingPlaced, ctx.current_simulation_time);
                human.equilibrium_torque = 0.0;
                if is_selected {
                    ctx.events.publish(SimulationEvent::HumanNpcBehaviorChanged {
                        npc: id,
                        behavior: human.behavior.name(),
                    });
                }
            }

            // Being placed NPCs keep counting as what they were
            npcs.on_regime_changed(state.kind(), previous_regime, state.effective_regime(), ctx.events);
            Ok(())
        })
    }

    /// Drags a being placed NPC so that its anchor sits at `position - world_offset`.
    pub fn move_npc_to(
        &mut self,
        id: NpcId,
        position: Vector,
        world_offset: Vector,
        ctx: &mut NpcContext<'_>,
    ) -> Result<()> {
        self.with_npc(id, |_, state| {
            let being_placed = state.being_placed.ok_or(SimulationError::InvalidNpcState {
                npc: id,
                operation: "move",
                state: "not being placed",
            })?;

            let ship = ship_mut(ctx.ships, state.current_ship_id)?;
            let points = ship.points_mut();
            let anchor = state.particle_mesh.particles[being_placed.anchor_particle_ordinal].index;
            let delta = position - world_offset - points.position(anchor);

            if being_placed.move_whole_mesh {
                for particle in &state.particle_mesh.particles {
                    points.set_position(particle.index, points.position(particle.index) + delta);
                    points.set_velocity(particle.index, Vector::ZERO);
                }
            } else {
                points.set_position(anchor, points.position(anchor) + delta);
                points.set_velocity(anchor, Vector::ZERO);
            }

            if let Some(human) = state.human_mut() {
                human.total_distance_traveled_off_edge += delta.length();
            }
            Ok(())
        })
    }

    /// Ends a move, reclassifying the NPC against the live meshes.
    pub fn end_move_npc(&mut self, id: NpcId, ctx: &mut NpcContext<'_>) -> Result<()> {
        let is_selected = self.selected_npc == Some(id);
        self.with_npc(id, |npcs, state| {
            if state.being_placed.is_none() {
                return Err(SimulationError::InvalidNpcState {
                    npc: id,
                    operation: "end move",
                    state: "not being placed",
                });
            }

            let before = state.effective_regime();
            npcs.reset_npc_state_to_world(state, ctx)?;
            state.being_placed = None;

            let regime = state.current_regime;
            let now = ctx.current_simulation_time;
            if let Some(human) = state.human_mut() {
                let behavior = match regime {
                    RegimeType::Free => HumanBehavior::free_aerial(),
                    _ => HumanBehavior::constrained_aerial(),
                };
                human.transition_to(behavior, now);
                if is_selected {
                    ctx.events.publish(SimulationEvent::HumanNpcBehaviorChanged {
                        npc: id,
                        behavior: human.behavior.name(),
                    });
                }
            }

            npcs.on_regime_changed(state.kind(), before, state.effective_regime(), ctx.events);
            Ok(())
        })
    }

    pub fn complete_new_npc(&mut self, id: NpcId, ctx: &mut NpcContext<'_>) -> Result<()> {
        self.end_move_npc(id, ctx)?;
        if let Ok(state) = self.npc(id) {
            info!(
                "Npcs: NPC {} completed on ship {} as {:?}",
                id, state.current_ship_id, state.current_regime
            );
        }
        Ok(())
    }

    /// Destroys an NPC, releasing its particles and updating all counts.
    pub fn remove_npc(&mut self, id: NpcId, ctx: &mut NpcContext<'_>) -> Result<()> {
        let state = self
            .state_buffer
            .get_mut(id as usize)
            .and_then(Option::take)
            .ok_or(SimulationError::UnknownNpc(id))?;

        match ship_mut(ctx.ships, state.current_ship_id) {
            Ok(ship) => {
                for particle in &state.particle_mesh.particles {
                    ship.points_mut().free_npc_particle(particle.index);
                }
            }
            Err(_) => warn!("Npcs: NPC {} removed from missing ship {}", id, state.current_ship_id),
        }
        if let Some(ship) = self.ship_npcs.get_mut(state.current_ship_id as usize) {
            ship.remove(&state);
        }

        self.on_regime_changed(state.kind(), state.effective_regime(), None, ctx.events);
        self.npc_count -= 1;
        if self.selected_npc == Some(id) {
            self.selected_npc = None;
            ctx.events.publish(SimulationEvent::NpcSelectionChanged { selected: None });
        }
        ctx.events.on_npc_counts_updated(self.npc_count, ctx.params.max_npcs);

        debug!("Npcs: NPC {} removed", id);
        Ok(())
    }

    pub fn abort_new_npc(&mut self, id: NpcId, ctx: &mut NpcContext<'_>) -> Result<()> {
        if self.npc(id)?.being_placed.is_none() {
            return Err(SimulationError::InvalidNpcState {
                npc: id,
                operation: "abort",
                state: "already placed",
            });
        }
        self.remove_npc(id, ctx)
    }

    // Regime bookkeeping

    /// Single writer of the human regime counts.
    pub(crate) fn on_regime_changed(
        &mut self,
        kind: NpcKind,
        old: Option<RegimeType>,
        new: Option<RegimeType>,
        events: &mut SimulationEventDispatcher,
    ) {
        if kind != NpcKind::Human || old == new {
            return;
        }

        match old {
            Some(RegimeType::Constrained) => {
                debug_assert!(self.constrained_regime_human_npc_count > 0);
                self.constrained_regime_human_npc_count = self.constrained_regime_human_npc_count.saturating_sub(1);
            }
            Some(RegimeType::Free) => {
                debug_assert!(self.free_regime_human_npc_count > 0);
                self.free_regime_human_npc_count = self.free_regime_human_npc_count.saturating_sub(1);
            }
            _ => {}
        }
        match new {
            Some(RegimeType::Constrained) => self.constrained_regime_human_npc_count += 1,
            Some(RegimeType::Free) => self.free_regime_human_npc_count += 1,
            _ => {}
        }

        events.on_human_npc_counts_updated(
            self.constrained_regime_human_npc_count,
            self.free_regime_human_npc_count,
        );
    }

    /// Moves the NPC's particles into another ship's store.
    ///
    /// Positions and velocities carry over; every particle comes out free.
    pub(crate) fn transfer_npc_to_ship(
        &mut self,
        state: &mut NpcState,
        new_ship_id: ShipId,
        ctx: &mut NpcContext<'_>,
    ) -> Result<()> {
        let old_ship_id = state.current_ship_id;
        if old_ship_id == new_ship_id {
            return Ok(());
        }

        let old_ship = ship_mut(ctx.ships, old_ship_id)?;
        let kinematics: Vec<(Vector, Vector)> = state
            .particle_mesh
            .particles
            .iter()
            .map(|particle| {
                (
                    old_ship.points().position(particle.index),
                    old_ship.points().velocity(particle.index),
                )
            })
            .collect();

        let new_ship = ship_mut(ctx.ships, new_ship_id)?;
        let mut new_indices = Vec::with_capacity(kinematics.len());
        for (particle, (position, velocity)) in state.particle_mesh.particles.iter().zip(&kinematics) {
            match new_ship
                .points_mut()
                .allocate_npc_particle(*position, particle.mass, ctx.materials)
            {
                Ok(index) => {
                    new_ship.points_mut().set_velocity(index, *velocity);
                    new_indices.push(index);
                }
                Err(error) => {
                    for index in new_indices {
                        new_ship.points_mut().free_npc_particle(index);
                    }
                    return Err(error);
                }
            }
        }

        let old_ship = ship_mut(ctx.ships, old_ship_id)?;
        for (particle, new_index) in state.particle_mesh.particles.iter_mut().zip(new_indices) {
            old_ship.points_mut().free_npc_particle(particle.index);
            particle.index = new_index;
            particle.constrained = None;
        }

        if let Some(ship) = self.ship_npcs.get_mut(old_ship_id as usize) {
            ship.remove(state);
        }
        self.on_ship_added(new_ship_id);
        self.ship_npcs[new_ship_id as usize].add(state);
        state.current_ship_id = new_ship_id;

        debug!("Npcs: NPC {} transferred from ship {} to ship {}", state.id, old_ship_id, new_ship_id);
        Ok(())
    }

    // Update

    /// Advances every NPC by one simulation tick.
    pub fn update(&mut self, ctx: &mut NpcContext<'_>) {
        let start = Instant::now();

        let key = NpcParameterKey::of(ctx.params);
        if self.parameter_key != Some(key) {
            for state in self.state_buffer.iter_mut().flatten() {
                physics::recalculate_mesh_parameters(&mut state.particle_mesh, ctx.params);
            }
            self.parameter_key = Some(key);
        }

        // Physics
        for index in 0..self.state_buffer.len() {
            let Some(mut state) = self.state_buffer[index].take() else {
                continue;
            };
            self.update_npc_physics(&mut state, ctx);
            self.state_buffer[index] = Some(state);
        }

        // Behavior
        let generalized_panic_level = self.generalized_panic_level;
        for state in self.state_buffer.iter_mut().flatten() {
            if state.kind() != NpcKind::Human || state.current_regime == RegimeType::BeingPlaced {
                continue;
            }
            let Some(ship) = ctx.ships.get(state.current_ship_id as usize).and_then(Option::as_ref) else {
                continue;
            };
            let before = state.human().map(|human| human.behavior.name());
            human_behavior::update_human(
                state,
                ship,
                generalized_panic_level,
                ctx.params,
                ctx.rng,
                ctx.current_simulation_time,
                ctx.sequence_number,
            );
            let after = state.human().map(|human| human.behavior.name());
            if before != after {
                trace!("Npcs: human {} is now {:?}", state.id, after);
                if let (Some(behavior), true) = (after, self.selected_npc == Some(state.id)) {
                    ctx.events.publish(SimulationEvent::HumanNpcBehaviorChanged {
                        npc: state.id,
                        behavior,
                    });
                }
            }
        }

        // Animation
        for state in self.state_buffer.iter_mut().flatten() {
            if state.kind() != NpcKind::Human {
                continue;
            }
            let Some(ship) = ctx.ships.get(state.current_ship_id as usize).and_then(Option::as_ref) else {
                continue;
            };
            animation::update_human_animation(state, ship, ctx.params, ctx.current_simulation_time);
        }

        debug!(
            "Npcs: {} NPCs updated in {:.3}ms",
            self.npc_count,
            start.elapsed().as_secs_f64() * 1000.0
        );
    }

    fn update_npc_physics(&mut self, state: &mut NpcState, ctx: &mut NpcContext<'_>) {
        let before = state.effective_regime();
        let is_low_frequency_turn =
            (u64::from(state.id) + ctx.sequence_number) % crate::config::NPC_LOW_FREQUENCY_UPDATE_PERIOD == 0;

        let Some(ship) = ctx.ships.get_mut(state.current_ship_id as usize).and_then(Option::as_mut) else {
            warn!("Npcs: NPC {} lives on missing ship {}", state.id, state.current_ship_id);
            return;
        };

        if state.current_regime != RegimeType::BeingPlaced {
            physics::update_combustion(state, ship, is_low_frequency_turn);
            regime::validate_constrained_states(state, ship);
        }

        let impacts = physics::update_npc_particles(state, ship, ctx.environment, ctx.params, ctx.materials);

        if state.current_regime != RegimeType::BeingPlaced {
            regime::refresh_regime(state, ship);
            if let Some(human) = state.human_mut() {
                for impact in &impacts {
                    human_behavior::on_human_impact(human, impact, ctx.current_simulation_time);
                }
            }
        }

        self.on_regime_changed(state.kind(), before, state.effective_regime(), ctx.events);
    }
}

/// Normal variate by the Box-Muller transform.
fn sample_normal(rng: &mut StdRng, mean: Real, std_dev: Real) -> Real {
    let u1: Real = rng.random::<Real>().max(Real::MIN_POSITIVE);
    let u2: Real = rng.random::<Real>();
    mean + std_dev * (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::events::RecordingSink;

    #[test]
    fn human_placed_inside_triangle_is_constrained() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let id = place_human(&mut npcs, &mut fixture, Vector::new(0.0, 0.5));

        let state = npcs.npc(id).unwrap();
        assert_eq!(state.current_regime, RegimeType::Constrained);
        assert_eq!(npcs.constrained_regime_human_npc_count(), 1);
        assert_eq!(npcs.free_regime_human_npc_count(), 0);
        assert_eq!(npcs.ship_npcs(0), &[id]);
    }

    #[test]
    fn human_placed_in_the_air_is_free() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let id = place_human(&mut npcs, &mut fixture, Vector::new(0.0, 10.0));

        let state = npcs.npc(id).unwrap();
        assert_eq!(state.current_regime, RegimeType::Free);
        assert_eq!(state.human().unwrap().behavior, HumanBehavior::free_aerial());
        assert_eq!(npcs.free_regime_human_npc_count(), 1);
    }

    #[test]
    fn dipoles_are_unsupported() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let oar = npcs.database().furniture_id("Oar").unwrap();
        let result = npcs.begin_place_new_furniture_npc(oar, Vector::ZERO, false, &mut fixture.ctx());
        assert_eq!(
            result,
            Err(SimulationError::UnsupportedNpcMesh(ParticleMeshKind::Dipole))
        );
        assert_eq!(npcs.npc_count(), 0);
    }

    #[test]
    fn placement_beyond_max_npcs_is_rejected() {
        let mut fixture = Fixture::triangle();
        fixture.params = fixture.params.clone().with_max_npcs(1);
        let mut npcs = Npcs::default();
        let lamp = npcs.database().furniture_id("Lamp").unwrap();
        let first = npcs
            .begin_place_new_furniture_npc(lamp, Vector::new(0.0, 1.0), false, &mut fixture.ctx())
            .unwrap();
        assert!(first.picked().is_some());
        let second = npcs
            .begin_place_new_furniture_npc(lamp, Vector::new(1.0, 1.0), false, &mut fixture.ctx())
            .unwrap();
        assert_eq!(second, NpcPlacement::Rejected(PlacementRejection::TooManyNpcs));
    }

    #[test]
    fn placement_without_ships_is_rejected() {
        let mut fixture = Fixture::triangle();
        fixture.ships.clear();
        let mut npcs = Npcs::default();
        let lamp = npcs.database().furniture_id("Lamp").unwrap();
        let placement = npcs
            .begin_place_new_furniture_npc(lamp, Vector::ZERO, false, &mut fixture.ctx())
            .unwrap();
        assert_eq!(placement, NpcPlacement::Rejected(PlacementRejection::NoShip));
    }

    #[test]
    fn removal_releases_particles_and_counts() {
        let mut fixture = Fixture::triangle();
        let sink = RecordingSink::new();
        fixture.events.register_sink(Box::new(sink.clone()));
        let mut npcs = Npcs::default();
        let capacity = fixture.ship().points().remaining_npc_capacity();
        let id = place_human(&mut npcs, &mut fixture, Vector::new(0.0, 0.5));
        assert_eq!(fixture.ship().points().remaining_npc_capacity(), capacity - 2);

        npcs.remove_npc(id, &mut fixture.ctx()).unwrap();
        fixture.events.flush();

        assert_eq!(fixture.ship().points().remaining_npc_capacity(), capacity);
        assert_eq!(npcs.npc_count(), 0);
        assert_eq!(npcs.constrained_regime_human_npc_count(), 0);
        assert!(npcs.ship_npcs(0).is_empty());
        assert!(matches!(npcs.npc(id), Err(SimulationError::UnknownNpc(_))));
        let last_counts = sink
            .events()
            .into_iter()
            .filter(|event| matches!(event, SimulationEvent::HumanNpcCountsUpdated { .. }))
            .last();
        assert_eq!(
            last_counts,
            Some(SimulationEvent::HumanNpcCountsUpdated { constrained: 0, free: 0 })
        );
    }

    #[test]
    fn moving_keeps_the_pointer_offset() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let sub_kind = npcs.database().human_id("Captain").unwrap();
        let picked = npcs
            .begin_place_new_human_npc(sub_kind, Vector::new(0.0, 0.5), true, &mut fixture.ctx())
            .unwrap()
            .picked()
            .unwrap();
        npcs.move_npc_to(picked.id, Vector::new(3.0, 1.0), picked.world_offset, &mut fixture.ctx())
            .unwrap();

        let state = npcs.npc(picked.id).unwrap();
        let feet = fixture.ship().points().position(state.particle_mesh.particles[0].index);
        approx::assert_relative_eq!(feet.x, 3.0, epsilon = 1e-4);
        approx::assert_relative_eq!(feet.y, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn ending_a_move_on_a_placed_npc_is_an_error() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let id = place_human(&mut npcs, &mut fixture, Vector::new(0.0, 0.5));
        assert!(matches!(
            npcs.end_move_npc(id, &mut fixture.ctx()),
            Err(SimulationError::InvalidNpcState { .. })
        ));
        // The state survives the failed call
        assert!(npcs.npc(id).is_ok());
    }

    #[test]
    fn begin_move_keeps_regime_counts() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let id = place_human(&mut npcs, &mut fixture, Vector::new(0.0, 0.5));
        npcs.begin_move_npc(id, 1, false, &mut fixture.ctx()).unwrap();
        assert_eq!(npcs.npc(id).unwrap().current_regime, RegimeType::BeingPlaced);
        assert_eq!(npcs.constrained_regime_human_npc_count(), 1);

        npcs.end_move_npc(id, &mut fixture.ctx()).unwrap();
        assert_eq!(npcs.constrained_regime_human_npc_count(), 1);
        assert_eq!(npcs.free_regime_human_npc_count(), 0);
    }
}

//! Particle store
//!
//! Structure-of-arrays buffers for every particle of a ship. The index space
//! is split in three contiguous regions:
//!
//! * `[0, S)` structural particles, appended at build time;
//! * `[S, S + E)` ephemeral particles, handed out by an [`EphemeralPool`];
//! * `[S + E, S + E + N)` NPC particles, reserved and freed by the NPC layer.
//!
//! All coefficient buffers consumed by the relaxation loop (integration
//! factor, buoyancy coefficients, ocean floor collision factors) are cached
//! here and only recomputed when their inputs change.

use bevy::prelude::*;

use super::ephemeral::{
    EphemeralAllocation, EphemeralHandle, EphemeralParticle, EphemeralPool, EphemeralState,
    initial_velocity,
};
use super::materials::{CombustionType, MaterialDatabase, MaterialId, StructuralMaterial};
use crate::config::{
    AIR_DENSITY, AIR_THERMAL_EXPANSION_COEFFICIENT, GRAVITY, GRAVITY_MAGNITUDE,
    MASS_CONVERGENCE_RATE, MIN_PARTICLE_MASS, PointCoefficientKey, STANDARD_TEMPERATURE,
    SimulationParameters, WATER_DENSITY, WATER_THERMAL_EXPANSION_COEFFICIENT,
};
use crate::environment::Environment;
use crate::error::{Result, SimulationError};
use crate::events::SimulationEventDispatcher;
use crate::math::{Real, Vector, mix};

pub type ElementIndex = usize;
pub type PlaneId = u32;
pub type ConnectedComponentId = u32;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CombustionState {
    #[default]
    NotBurning,
    Developing,
    Burning,
    Extinguishing,
    Exploded,
}

impl CombustionState {
    pub fn is_burning(self) -> bool {
        matches!(self, Self::Developing | Self::Burning)
    }
}

/// Buoyancy force is `(coefficient1 + coefficient2 * T) * fluid_density`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BuoyancyCoefficients {
    pub coefficient1: Real,
    pub coefficient2: Real,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OceanFloorCollisionFactors {
    /// Multiplies the normal velocity on bounce; in `[-1, 0]`.
    pub elastic_factor: Real,
    /// Fraction of the tangential velocity removed on contact; in `[0, 1]`.
    pub friction_factor: Real,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectedSpring {
    pub spring: ElementIndex,
    pub other_endpoint: ElementIndex,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetachOptions {
    pub generate_debris: bool,
    pub fire_destroy_event: bool,
}

/// Everything needed to append one structural particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointDefinition {
    pub position: Vector,
    pub water: Real,
    pub internal_pressure: Real,
    pub structural_material: MaterialId,
    pub electrical_material: Option<MaterialId>,
    pub is_rope: bool,
    /// Randomized strength seed in `[0, 1]`, 0.5 being nominal.
    pub strength: Real,
}

impl PointDefinition {
    pub fn new(position: Vector, structural_material: MaterialId) -> Self {
        Self {
            position,
            water: 0.0,
            internal_pressure: 1.0,
            structural_material,
            electrical_material: None,
            is_rope: false,
            strength: 0.5,
        }
    }

    pub fn with_rope(mut self, is_rope: bool) -> Self {
        self.is_rope = is_rope;
        self
    }

    pub fn with_strength(mut self, strength: Real) -> Self {
        self.strength = strength.clamp(0.0, 1.0);
        self
    }

    pub fn with_water(mut self, water: Real) -> Self {
        self.water = water.max(0.0);
        self
    }

    pub fn with_electrical_material(mut self, material: MaterialId) -> Self {
        self.electrical_material = Some(material);
        self
    }
}

/// Split borrow handed to the spring force loop.
pub struct SpringForceView<'a> {
    pub positions: &'a [Vector],
    pub velocities: &'a [Vector],
    pub dynamic_force_buffers: &'a mut [Vec<Vector>],
}

/// Split borrow handed to the integrator, limited to structural particles.
pub struct IntegrationView<'a> {
    pub positions: &'a mut [Vector],
    pub velocities: &'a mut [Vector],
    pub static_forces: &'a [Vector],
    pub integration_factors: &'a [Real],
    pub dynamic_force_buffers: &'a mut [Vec<Vector>],
}

pub struct Points {
    structural_capacity: usize,
    structural_count: usize,
    ephemeral_capacity: usize,
    npc_capacity: usize,

    position: Vec<Vector>,
    velocity: Vec<Vector>,
    static_force: Vec<Vector>,
    dynamic_force_buffers: Vec<Vec<Vector>>,

    augmented_material_mass: Vec<Real>,
    mass: Vec<Real>,
    integration_factor: Vec<Real>,
    frozen_coefficient: Vec<Real>,
    buoyancy_coefficients: Vec<BuoyancyCoefficients>,
    ocean_floor_collision_factors: Vec<OceanFloorCollisionFactors>,
    wind_receptivity: Vec<Real>,

    material: Vec<MaterialId>,
    electrical_material: Vec<Option<MaterialId>>,
    strength: Vec<Real>,
    stress: Vec<Real>,
    decay: Vec<Real>,
    water: Vec<Real>,
    internal_pressure: Vec<Real>,
    temperature: Vec<Real>,
    combustion_state: Vec<CombustionState>,

    is_active: Vec<bool>,
    is_damaged: Vec<bool>,
    is_detached: Vec<bool>,
    is_leaking: Vec<bool>,
    is_rope: Vec<bool>,
    is_electrified: Vec<bool>,
    is_bomb_in_proximity: Vec<bool>,

    connected_component_id: Vec<ConnectedComponentId>,
    plane_id: Vec<PlaneId>,
    connected_springs: Vec<Vec<ConnectedSpring>>,
    connected_triangles: Vec<Vec<ElementIndex>>,

    ephemeral_pool: EphemeralPool,
    npc_free_slots: Vec<ElementIndex>,

    coefficient_key: Option<PointCoefficientKey>,
    /// Slots allocated since the last coefficient pass.
    stale_slots: Vec<ElementIndex>,
}

impl Points {
    pub fn new(
        structural_capacity: usize,
        ephemeral_capacity: usize,
        npc_capacity: usize,
        partitions: usize,
    ) -> Self {
        let total = structural_capacity + ephemeral_capacity + npc_capacity;
        let npc_start = structural_capacity + ephemeral_capacity;
        Self {
            structural_capacity,
            structural_count: 0,
            ephemeral_capacity,
            npc_capacity,
            position: vec![Vector::ZERO; total],
            velocity: vec![Vector::ZERO; total],
            static_force: vec![Vector::ZERO; total],
            dynamic_force_buffers: vec![vec![Vector::ZERO; total]; partitions.max(1)],
            augmented_material_mass: vec![1.0; total],
            mass: vec![1.0; total],
            integration_factor: vec![0.0; total],
            frozen_coefficient: vec![1.0; total],
            buoyancy_coefficients: vec![BuoyancyCoefficients::default(); total],
            ocean_floor_collision_factors: vec![OceanFloorCollisionFactors::default(); total],
            wind_receptivity: vec![0.0; total],
            material: vec![0; total],
            electrical_material: vec![None; total],
            strength: vec![0.5; total],
            stress: vec![0.0; total],
            decay: vec![1.0; total],
            water: vec![0.0; total],
            internal_pressure: vec![1.0; total],
            temperature: vec![STANDARD_TEMPERATURE; total],
            combustion_state: vec![CombustionState::NotBurning; total],
            is_active: vec![false; total],
            is_damaged: vec![false; total],
            is_detached: vec![false; total],
            is_leaking: vec![false; total],
            is_rope: vec![false; total],
            is_electrified: vec![false; total],
            is_bomb_in_proximity: vec![false; total],
            connected_component_id: vec![0; total],
            plane_id: vec![0; total],
            connected_springs: vec![Vec::new(); total],
            connected_triangles: vec![Vec::new(); total],
            ephemeral_pool: EphemeralPool::new(ephemeral_capacity),
            npc_free_slots: (npc_start..total).rev().collect(),
            coefficient_key: None,
            stale_slots: Vec::new(),
        }
    }

    // Regions

    /// Size of the whole index space.
    pub fn element_count(&self) -> usize {
        self.position.len()
    }

    pub fn structural_count(&self) -> usize {
        self.structural_count
    }

    pub fn remaining_structural_capacity(&self) -> usize {
        self.structural_capacity - self.structural_count
    }

    pub fn ephemeral_start(&self) -> ElementIndex {
        self.structural_capacity
    }

    pub fn npc_start(&self) -> ElementIndex {
        self.structural_capacity + self.ephemeral_capacity
    }

    /// Structural and ephemeral slots, i.e. everything the ship integrates.
    pub fn ship_particle_end(&self) -> ElementIndex {
        self.npc_start()
    }

    pub fn is_structural(&self, index: ElementIndex) -> bool {
        index < self.structural_count
    }

    pub fn is_ephemeral(&self, index: ElementIndex) -> bool {
        (self.ephemeral_start()..self.npc_start()).contains(&index)
    }

    pub fn is_npc(&self, index: ElementIndex) -> bool {
        index >= self.npc_start() && index < self.element_count()
    }

    pub fn is_active(&self, index: ElementIndex) -> bool {
        self.is_active[index]
    }

    pub fn partition_count(&self) -> usize {
        self.dynamic_force_buffers.len()
    }

    pub fn set_partition_count(&mut self, partitions: usize) {
        let total = self.element_count();
        self.dynamic_force_buffers = vec![vec![Vector::ZERO; total]; partitions.max(1)];
    }

    // Structural particles

    /// Appends a structural particle.
    ///
    /// Capacity is fixed when the store is created; callers are expected to
    /// check [`Points::remaining_structural_capacity`] first.
    pub fn add(
        &mut self,
        definition: PointDefinition,
        materials: &MaterialDatabase,
    ) -> Result<ElementIndex> {
        if self.structural_count >= self.structural_capacity {
            return Err(SimulationError::ParticleCapacityExhausted {
                region: "structural",
                capacity: self.structural_capacity,
            });
        }

        let index = self.structural_count;
        self.structural_count += 1;

        let material = materials.structural(definition.structural_material);
        self.initialize_slot(index, definition.position, definition.structural_material, material);
        self.water[index] = definition.water;
        self.internal_pressure[index] = definition.internal_pressure;
        self.electrical_material[index] = definition.electrical_material;
        self.is_rope[index] = definition.is_rope || material.is_rope;
        self.strength[index] = definition.strength;
        Ok(index)
    }

    fn initialize_slot(
        &mut self,
        index: ElementIndex,
        position: Vector,
        material_id: MaterialId,
        material: &StructuralMaterial,
    ) {
        self.position[index] = position;
        self.velocity[index] = Vector::ZERO;
        self.static_force[index] = Vector::ZERO;
        for buffer in &mut self.dynamic_force_buffers {
            buffer[index] = Vector::ZERO;
        }
        self.augmented_material_mass[index] = material.mass.max(MIN_PARTICLE_MASS);
        self.mass[index] = self.augmented_material_mass[index];
        self.frozen_coefficient[index] = 1.0;
        self.wind_receptivity[index] = material.wind_receptivity;
        self.material[index] = material_id;
        self.electrical_material[index] = None;
        self.strength[index] = 0.5;
        self.stress[index] = 0.0;
        self.decay[index] = 1.0;
        self.water[index] = 0.0;
        self.temperature[index] = STANDARD_TEMPERATURE;
        self.combustion_state[index] = CombustionState::NotBurning;
        self.is_active[index] = true;
        self.is_damaged[index] = false;
        self.is_detached[index] = false;
        self.is_leaking[index] = false;
        self.is_rope[index] = false;
        self.is_electrified[index] = false;
        self.is_bomb_in_proximity[index] = false;
        self.connected_component_id[index] = 0;
        self.plane_id[index] = 0;
        self.connected_springs[index].clear();
        self.connected_triangles[index].clear();
        self.stale_slots.push(index);
    }

    // Accessors

    #[inline]
    pub fn position(&self, index: ElementIndex) -> Vector {
        self.position[index]
    }

    #[inline]
    pub fn set_position(&mut self, index: ElementIndex, position: Vector) {
        self.position[index] = position;
    }

    #[inline]
    pub fn positions(&self) -> &[Vector] {
        &self.position
    }

    #[inline]
    pub fn velocity(&self, index: ElementIndex) -> Vector {
        self.velocity[index]
    }

    #[inline]
    pub fn set_velocity(&mut self, index: ElementIndex, velocity: Vector) {
        self.velocity[index] = velocity;
    }

    #[inline]
    pub fn velocities(&self) -> &[Vector] {
        &self.velocity
    }

    #[inline]
    pub fn static_force(&self, index: ElementIndex) -> Vector {
        self.static_force[index]
    }

    #[inline]
    pub fn add_static_force(&mut self, index: ElementIndex, force: Vector) {
        self.static_force[index] += force;
    }

    #[inline]
    pub fn set_static_force(&mut self, index: ElementIndex, force: Vector) {
        self.static_force[index] = force;
    }

    pub fn reset_static_forces(&mut self) {
        self.static_force.iter_mut().for_each(|f| *f = Vector::ZERO);
    }

    pub fn reset_dynamic_forces(&mut self) {
        for buffer in &mut self.dynamic_force_buffers {
            buffer.iter_mut().for_each(|f| *f = Vector::ZERO);
        }
    }

    pub fn spring_force_view(&mut self) -> SpringForceView<'_> {
        SpringForceView {
            positions: &self.position,
            velocities: &self.velocity,
            dynamic_force_buffers: &mut self.dynamic_force_buffers,
        }
    }

    pub fn integration_view(&mut self) -> IntegrationView<'_> {
        let count = self.structural_count;
        IntegrationView {
            positions: &mut self.position[..count],
            velocities: &mut self.velocity[..count],
            static_forces: &self.static_force[..count],
            integration_factors: &self.integration_factor[..count],
            dynamic_force_buffers: &mut self.dynamic_force_buffers,
        }
    }

    #[inline]
    pub fn mass(&self, index: ElementIndex) -> Real {
        self.mass[index]
    }

    #[inline]
    pub fn augmented_material_mass(&self, index: ElementIndex) -> Real {
        self.augmented_material_mass[index]
    }

    /// Transient extra mass on top of the material's, e.g. cargo or NPC weight.
    pub fn set_augmented_material_mass(&mut self, index: ElementIndex, mass: Real) {
        self.augmented_material_mass[index] = mass.max(MIN_PARTICLE_MASS);
    }

    #[inline]
    pub fn integration_factor(&self, index: ElementIndex) -> Real {
        self.integration_factor[index]
    }

    #[inline]
    pub fn frozen_coefficient(&self, index: ElementIndex) -> Real {
        self.frozen_coefficient[index]
    }

    #[inline]
    pub fn is_pinned(&self, index: ElementIndex) -> bool {
        self.frozen_coefficient[index] == 0.0
    }

    #[inline]
    pub fn buoyancy_coefficients(&self, index: ElementIndex) -> BuoyancyCoefficients {
        self.buoyancy_coefficients[index]
    }

    #[inline]
    pub fn ocean_floor_collision_factors(&self, index: ElementIndex) -> OceanFloorCollisionFactors {
        self.ocean_floor_collision_factors[index]
    }

    #[inline]
    pub fn wind_receptivity(&self, index: ElementIndex) -> Real {
        self.wind_receptivity[index]
    }

    #[inline]
    pub fn material(&self, index: ElementIndex) -> MaterialId {
        self.material[index]
    }

    #[inline]
    pub fn electrical_material(&self, index: ElementIndex) -> Option<MaterialId> {
        self.electrical_material[index]
    }

    #[inline]
    pub fn strength(&self, index: ElementIndex) -> Real {
        self.strength[index]
    }

    #[inline]
    pub fn stress(&self, index: ElementIndex) -> Real {
        self.stress[index]
    }

    #[inline]
    pub fn set_stress(&mut self, index: ElementIndex, stress: Real) {
        self.stress[index] = stress;
    }

    #[inline]
    pub fn decay(&self, index: ElementIndex) -> Real {
        self.decay[index]
    }

    /// Decay only ever goes down; use [`Points::restore`] to reset it.
    pub fn set_decay(&mut self, index: ElementIndex, decay: Real) {
        self.decay[index] = decay.clamp(0.0, self.decay[index]);
    }

    #[inline]
    pub fn water(&self, index: ElementIndex) -> Real {
        self.water[index]
    }

    #[inline]
    pub fn set_water(&mut self, index: ElementIndex, water: Real) {
        self.water[index] = water.max(0.0);
    }

    #[inline]
    pub fn internal_pressure(&self, index: ElementIndex) -> Real {
        self.internal_pressure[index]
    }

    #[inline]
    pub fn temperature(&self, index: ElementIndex) -> Real {
        self.temperature[index]
    }

    #[inline]
    pub fn set_temperature(&mut self, index: ElementIndex, temperature: Real) {
        self.temperature[index] = temperature.max(0.0);
    }

    #[inline]
    pub fn combustion_state(&self, index: ElementIndex) -> CombustionState {
        self.combustion_state[index]
    }

    #[inline]
    pub fn is_damaged(&self, index: ElementIndex) -> bool {
        self.is_damaged[index]
    }

    #[inline]
    pub fn is_detached(&self, index: ElementIndex) -> bool {
        self.is_detached[index]
    }

    #[inline]
    pub fn is_leaking(&self, index: ElementIndex) -> bool {
        self.is_leaking[index]
    }

    pub fn set_leaking(&mut self, index: ElementIndex, is_leaking: bool) {
        self.is_leaking[index] = is_leaking;
    }

    #[inline]
    pub fn is_rope(&self, index: ElementIndex) -> bool {
        self.is_rope[index]
    }

    #[inline]
    pub fn is_electrified(&self, index: ElementIndex) -> bool {
        self.is_electrified[index]
    }

    pub fn set_electrified(&mut self, index: ElementIndex, value: bool) {
        self.is_electrified[index] = value;
    }

    #[inline]
    pub fn is_bomb_in_proximity(&self, index: ElementIndex) -> bool {
        self.is_bomb_in_proximity[index]
    }

    pub fn set_bomb_in_proximity(&mut self, index: ElementIndex, value: bool) {
        self.is_bomb_in_proximity[index] = value;
    }

    #[inline]
    pub fn connected_component_id(&self, index: ElementIndex) -> ConnectedComponentId {
        self.connected_component_id[index]
    }

    pub fn set_connectivity(
        &mut self,
        index: ElementIndex,
        component: ConnectedComponentId,
        plane: PlaneId,
    ) {
        self.connected_component_id[index] = component;
        self.plane_id[index] = plane;
    }

    #[inline]
    pub fn plane_id(&self, index: ElementIndex) -> PlaneId {
        self.plane_id[index]
    }

    pub fn connected_springs(&self, index: ElementIndex) -> &[ConnectedSpring] {
        &self.connected_springs[index]
    }

    pub fn add_connected_spring(
        &mut self,
        index: ElementIndex,
        spring: ElementIndex,
        other_endpoint: ElementIndex,
    ) {
        self.connected_springs[index].push(ConnectedSpring {
            spring,
            other_endpoint,
        });
    }

    pub fn remove_connected_spring(&mut self, index: ElementIndex, spring: ElementIndex) -> bool {
        let springs = &mut self.connected_springs[index];
        match springs.iter().position(|cs| cs.spring == spring) {
            Some(position) => {
                springs.swap_remove(position);
                true
            }
            None => false,
        }
    }

    pub fn connected_triangles(&self, index: ElementIndex) -> &[ElementIndex] {
        &self.connected_triangles[index]
    }

    pub fn add_connected_triangle(&mut self, index: ElementIndex, triangle: ElementIndex) {
        self.connected_triangles[index].push(triangle);
    }

    pub fn remove_connected_triangle(&mut self, index: ElementIndex, triangle: ElementIndex) {
        self.connected_triangles[index].retain(|&t| t != triangle);
    }

    // Pinning

    /// Pins a particle: it stops and never moves again until unpinned.
    pub fn pin(&mut self, index: ElementIndex, params: &SimulationParameters) {
        self.freeze(index, params);
    }

    pub fn unpin(&mut self, index: ElementIndex, params: &SimulationParameters) {
        self.thaw(index, params);
    }

    pub fn freeze(&mut self, index: ElementIndex, params: &SimulationParameters) {
        self.frozen_coefficient[index] = 0.0;
        self.velocity[index] = Vector::ZERO;
        self.recalculate_integration_factor(index, params);
    }

    pub fn thaw(&mut self, index: ElementIndex, params: &SimulationParameters) {
        self.frozen_coefficient[index] = 1.0;
        self.recalculate_integration_factor(index, params);
    }

    fn recalculate_integration_factor(&mut self, index: ElementIndex, params: &SimulationParameters) {
        let dt = params.mechanical_simulation_step_time_duration();
        self.integration_factor[index] = dt * dt * self.frozen_coefficient[index] / self.mass[index];
    }

    // Damage

    /// Damages a particle that lost one of its springs.
    ///
    /// Non-hull particles start leaking.
    pub fn damage(&mut self, index: ElementIndex, materials: &MaterialDatabase) {
        if !materials.structural(self.material[index]).is_hull {
            self.is_leaking[index] = true;
        }
        self.is_damaged[index] = true;
    }

    /// Marks a particle as detached from its structure.
    ///
    /// Effects happen only on the first call for a given particle; later
    /// calls are no-ops until [`Points::restore`].
    pub fn detach(
        &mut self,
        index: ElementIndex,
        velocity: Vector,
        options: DetachOptions,
        current_simulation_time: Real,
        environment: &Environment,
        materials: &MaterialDatabase,
        events: &mut SimulationEventDispatcher,
    ) {
        if self.is_detached[index] {
            return;
        }

        self.is_detached[index] = true;
        self.is_damaged[index] = true;
        self.is_leaking[index] = true;
        if !self.is_pinned(index) {
            self.velocity[index] = velocity;
        }

        let position = self.position[index];
        if options.generate_debris {
            let count = 2 + (index % 3);
            for i in 0..count {
                let angle = std::f32::consts::TAU * (i as Real) / (count as Real);
                let direction = Vector::new(angle.cos(), angle.sin());
                self.create_ephemeral_particle_debris(
                    position,
                    velocity + direction * 4.0,
                    current_simulation_time,
                    1.5,
                    materials,
                );
            }
        }

        if options.fire_destroy_event {
            events.on_destroy(self.material[index], environment.is_underwater(position), 1);
        }
    }

    /// Undoes damage: the particle is whole again.
    pub fn restore(&mut self, index: ElementIndex) {
        self.is_damaged[index] = false;
        self.is_detached[index] = false;
        self.is_leaking[index] = false;
        self.decay[index] = 1.0;
        if self.combustion_state[index] == CombustionState::Exploded {
            self.combustion_state[index] = CombustionState::NotBurning;
        }
    }

    // Cached coefficients

    /// Recomputes buoyancy and ocean floor factors when the inputs changed.
    pub fn recalculate_cached_coefficients(
        &mut self,
        params: &SimulationParameters,
        materials: &MaterialDatabase,
    ) -> bool {
        let key = params.point_coefficient_key();
        if self.coefficient_key == Some(key) {
            if self.stale_slots.is_empty() {
                return false;
            }
            let stale = std::mem::take(&mut self.stale_slots);
            for index in stale {
                if self.is_active[index] {
                    self.recalculate_slot_coefficients(index, params, materials);
                }
            }
            return true;
        }

        self.stale_slots.clear();
        for index in 0..self.element_count() {
            if self.is_active[index] {
                self.recalculate_slot_coefficients(index, params, materials);
            }
        }

        self.coefficient_key = Some(key);
        true
    }

    fn recalculate_slot_coefficients(
        &mut self,
        index: ElementIndex,
        params: &SimulationParameters,
        materials: &MaterialDatabase,
    ) {
        let material = materials.structural(self.material[index]);
        let volume = material.buoyancy_volume_fill;
        let expansion = material.thermal_expansion_coefficient;
        self.buoyancy_coefficients[index] = BuoyancyCoefficients {
            coefficient1: GRAVITY_MAGNITUDE * volume * (1.0 - expansion * STANDARD_TEMPERATURE),
            coefficient2: GRAVITY_MAGNITUDE * volume * expansion,
        };

        let elasticity = (material.elasticity_coefficient + params.ocean_floor_elasticity_coefficient)
            / 2.0
            * params.elasticity_adjustment;
        let friction = (material.kinetic_friction_coefficient
            + params.ocean_floor_friction_coefficient)
            / 2.0
            * params.friction_adjustment;
        self.ocean_floor_collision_factors[index] = OceanFloorCollisionFactors {
            elastic_factor: (-elasticity).clamp(-1.0, 0.0),
            friction_factor: friction.clamp(0.0, 1.0),
        };
        self.recalculate_integration_factor(index, params);
    }

    /// Converges particle masses toward material plus absorbed water mass.
    ///
    /// Returns the particles whose mass moved, so the springs touching them
    /// can recompute their coefficients.
    pub fn update_masses(
        &mut self,
        params: &SimulationParameters,
        materials: &MaterialDatabase,
    ) -> Vec<ElementIndex> {
        let water_density = WATER_DENSITY * params.water_density_adjustment;
        let mut changed = Vec::new();
        for index in 0..self.structural_count {
            let volume_fill = materials.structural(self.material[index]).buoyancy_volume_fill;
            let target = self.augmented_material_mass[index]
                + self.water[index].min(volume_fill) * water_density;
            let current = self.mass[index];
            let next = (current + (target - current) * MASS_CONVERGENCE_RATE).max(MIN_PARTICLE_MASS);
            if (next - current).abs() > current * 1e-6 {
                self.mass[index] = next;
                self.recalculate_integration_factor(index, params);
                changed.push(index);
            }
        }

        changed
    }

    // Combustion

    /// Ignites hot particles and extinguishes wet or cooled ones.
    pub fn update_combustion_low_frequency(
        &mut self,
        params: &SimulationParameters,
        materials: &MaterialDatabase,
    ) -> usize {
        let mut ignited = 0;
        for index in 0..self.structural_count {
            let material = materials.structural(self.material[index]);
            let ignition = material.ignition_temperature * params.ignition_temperature_adjustment;
            let is_wet = self.water[index] > 0.1;
            match self.combustion_state[index] {
                CombustionState::NotBurning => {
                    if self.temperature[index] >= ignition && !is_wet && self.decay[index] > 0.0 {
                        self.combustion_state[index] = match material.combustion_type {
                            CombustionType::Combustion => CombustionState::Developing,
                            CombustionType::Explosion => CombustionState::Exploded,
                        };
                        if material.combustion_type == CombustionType::Explosion {
                            self.decay[index] = 0.0;
                        }
                        ignited += 1;
                    }
                }
                CombustionState::Developing => {
                    self.combustion_state[index] = if is_wet {
                        CombustionState::Extinguishing
                    } else {
                        CombustionState::Burning
                    };
                }
                CombustionState::Burning => {
                    if is_wet || self.temperature[index] < ignition * 0.9 || self.decay[index] <= 0.0 {
                        self.combustion_state[index] = CombustionState::Extinguishing;
                    }
                }
                CombustionState::Extinguishing => {
                    self.combustion_state[index] = CombustionState::NotBurning;
                }
                CombustionState::Exploded => {}
            }
        }

        ignited
    }

    /// Burning particles heat up and decay.
    pub fn update_combustion_high_frequency(&mut self, params: &SimulationParameters) {
        let heat = crate::config::COMBUSTION_HEAT_PER_TICK * params.combustion_heat_adjustment;
        for index in 0..self.structural_count {
            if self.combustion_state[index] == CombustionState::Burning {
                self.temperature[index] += heat;
                self.decay[index] = (self.decay[index] - 0.0005).max(0.0);
            }
        }
    }

    // Ephemerals

    fn create_ephemeral(
        &mut self,
        particle: EphemeralParticle,
        position: Vector,
        velocity: Vector,
        material_id: MaterialId,
        materials: &MaterialDatabase,
    ) -> Option<EphemeralHandle> {
        let allocation = self.ephemeral_pool.allocate(particle)?;
        if let EphemeralAllocation::Evicted(handle) = allocation {
            trace!("Evicted ephemeral slot {} for {:?}", handle.slot, particle.kind());
        }

        let handle = allocation.handle();
        let index = self.ephemeral_start() + handle.slot as usize;
        let material = materials.structural(material_id);
        self.initialize_slot(index, position, material_id, material);
        self.velocity[index] = initial_velocity(particle.kind(), velocity);
        Some(handle)
    }

    pub fn create_ephemeral_particle_air_bubble(
        &mut self,
        position: Vector,
        current_simulation_time: Real,
        vortex_amplitude: Real,
        vortex_period: Real,
        materials: &MaterialDatabase,
    ) -> Option<EphemeralHandle> {
        let particle = EphemeralParticle {
            state: EphemeralState::AirBubble {
                vortex_amplitude,
                vortex_period: vortex_period.max(0.1),
            },
            start_time: current_simulation_time,
            max_lifetime: Real::MAX,
        };
        self.create_ephemeral(particle, position, Vector::ZERO, materials.unique().air_bubble, materials)
    }

    pub fn create_ephemeral_particle_debris(
        &mut self,
        position: Vector,
        velocity: Vector,
        current_simulation_time: Real,
        max_lifetime: Real,
        materials: &MaterialDatabase,
    ) -> Option<EphemeralHandle> {
        let particle = EphemeralParticle {
            state: EphemeralState::Debris,
            start_time: current_simulation_time,
            max_lifetime,
        };
        self.create_ephemeral(particle, position, velocity, materials.unique().debris, materials)
    }

    pub fn create_ephemeral_particle_smoke(
        &mut self,
        position: Vector,
        current_simulation_time: Real,
        max_lifetime: Real,
        materials: &MaterialDatabase,
    ) -> Option<EphemeralHandle> {
        let particle = EphemeralParticle {
            state: EphemeralState::Smoke {
                growth_rate: 1.0 / max_lifetime.max(0.1),
                progress: 0.0,
            },
            start_time: current_simulation_time,
            max_lifetime,
        };
        self.create_ephemeral(particle, position, Vector::ZERO, materials.unique().smoke, materials)
    }

    pub fn create_ephemeral_particle_sparkle(
        &mut self,
        position: Vector,
        velocity: Vector,
        current_simulation_time: Real,
        max_lifetime: Real,
        materials: &MaterialDatabase,
    ) -> Option<EphemeralHandle> {
        let particle = EphemeralParticle {
            state: EphemeralState::Sparkle { progress: 0.0 },
            start_time: current_simulation_time,
            max_lifetime,
        };
        self.create_ephemeral(particle, position, velocity, materials.unique().sparkle, materials)
    }

    pub fn create_ephemeral_particle_wake_bubble(
        &mut self,
        position: Vector,
        velocity: Vector,
        current_simulation_time: Real,
        materials: &MaterialDatabase,
    ) -> Option<EphemeralHandle> {
        let particle = EphemeralParticle {
            state: EphemeralState::WakeBubble { progress: 0.0 },
            start_time: current_simulation_time,
            max_lifetime: 0.8,
        };
        self.create_ephemeral(particle, position, velocity, materials.unique().air_bubble, materials)
    }

    pub fn ephemeral_particle(&self, handle: EphemeralHandle) -> Option<&EphemeralParticle> {
        self.ephemeral_pool.get(handle)
    }

    pub fn ephemeral_index(&self, handle: EphemeralHandle) -> Option<ElementIndex> {
        self.ephemeral_pool
            .get(handle)
            .map(|_| self.ephemeral_start() + handle.slot as usize)
    }

    pub fn live_ephemeral_count(&self) -> usize {
        self.ephemeral_pool.live_count()
    }

    /// Moves ephemeral particles and retires the expired ones.
    pub fn update_ephemeral_particles(
        &mut self,
        current_simulation_time: Real,
        dt: Real,
        environment: &Environment,
    ) -> usize {
        let mut expired = 0;
        for handle in self.ephemeral_pool.live_handles() {
            let index = self.ephemeral_start() + handle.slot as usize;
            let position = self.position[index];
            let depth = environment.depth(position);

            let Some(particle) = self.ephemeral_pool.get_mut(handle) else {
                continue;
            };
            let age = particle.age(current_simulation_time);
            let lifetime_progress = if particle.max_lifetime > 0.0 {
                age / particle.max_lifetime
            } else {
                1.0
            };

            let (acceleration, is_expired) = match &mut particle.state {
                EphemeralState::AirBubble {
                    vortex_amplitude,
                    vortex_period,
                } => {
                    let sway = (age * std::f32::consts::TAU / *vortex_period).cos() * *vortex_amplitude;
                    (Vector::new(sway, GRAVITY_MAGNITUDE * 0.5), depth <= 0.0)
                }
                EphemeralState::Debris => (GRAVITY, lifetime_progress >= 1.0),
                EphemeralState::Smoke {
                    growth_rate,
                    progress,
                } => {
                    *progress = (*progress + *growth_rate * dt).min(1.0);
                    (Vector::new(0.0, 0.5), lifetime_progress >= 1.0)
                }
                EphemeralState::Sparkle { progress } | EphemeralState::WakeBubble { progress } => {
                    *progress = lifetime_progress.min(1.0);
                    (GRAVITY * 0.5, lifetime_progress >= 1.0)
                }
            };

            if is_expired {
                self.ephemeral_pool.release(handle);
                self.is_active[index] = false;
                self.velocity[index] = Vector::ZERO;
                expired += 1;
                continue;
            }

            // Water slows everything down
            let drag = if depth > 0.0 { 0.9 } else { 0.995 };
            self.velocity[index] = (self.velocity[index] + acceleration * dt) * drag;
            self.position[index] += self.velocity[index] * dt;
        }

        expired
    }

    // NPC region

    pub fn remaining_npc_capacity(&self) -> usize {
        self.npc_free_slots.len()
    }

    pub fn npc_capacity(&self) -> usize {
        self.npc_capacity
    }

    /// Reserves an NPC particle slot.
    pub fn allocate_npc_particle(
        &mut self,
        position: Vector,
        mass: Real,
        materials: &MaterialDatabase,
    ) -> Result<ElementIndex> {
        let index = self
            .npc_free_slots
            .pop()
            .ok_or(SimulationError::ParticleCapacityExhausted {
                region: "npc",
                capacity: self.npc_capacity,
            })?;
        let material_id = materials.unique().npc;
        self.initialize_slot(index, position, material_id, materials.structural(material_id));
        self.augmented_material_mass[index] = mass.max(MIN_PARTICLE_MASS);
        self.mass[index] = self.augmented_material_mass[index];
        Ok(index)
    }

    pub fn free_npc_particle(&mut self, index: ElementIndex) {
        debug_assert!(self.is_npc(index));
        if self.is_npc(index) && self.is_active[index] {
            self.is_active[index] = false;
            self.velocity[index] = Vector::ZERO;
            self.npc_free_slots.push(index);
        }
    }

    /// Air density at a given temperature.
    pub fn air_density(temperature: Real) -> Real {
        AIR_DENSITY / (1.0 + AIR_THERMAL_EXPANSION_COEFFICIENT * (temperature - STANDARD_TEMPERATURE))
    }

    /// Water density at a given temperature.
    pub fn water_density(temperature: Real, params: &SimulationParameters) -> Real {
        WATER_DENSITY * params.water_density_adjustment
            / (1.0 + WATER_THERMAL_EXPANSION_COEFFICIENT * (temperature - STANDARD_TEMPERATURE))
    }

    /// Mixes air and water density by how far under water the particle is.
    pub fn fluid_density(underwater_coefficient: Real, params: &SimulationParameters) -> Real {
        mix(
            Self::air_density(params.air_temperature),
            Self::water_density(params.water_temperature, params),
            underwater_coefficient,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn store() -> (Points, MaterialDatabase, SimulationParameters) {
        let materials = MaterialDatabase::new();
        let params = SimulationParameters::default();
        let mut points = Points::new(4, 3, 2, 1);
        let iron = materials.structural_id("Iron").unwrap();
        points.add(PointDefinition::new(Vector::ZERO, iron), &materials).unwrap();
        points.add(PointDefinition::new(Vector::X, iron), &materials).unwrap();
        points.recalculate_cached_coefficients(&params, &materials);
        (points, materials, params)
    }

    #[test]
    fn regions_are_contiguous() {
        let (points, _, _) = store();
        assert_eq!(points.element_count(), 9);
        assert_eq!(points.structural_count(), 2);
        assert!(points.is_structural(1));
        assert!(!points.is_structural(2));
        assert!(points.is_ephemeral(4));
        assert!(points.is_npc(7));
        assert!(!points.is_npc(9));
    }

    #[test]
    fn add_fails_when_structural_region_is_full() {
        let (mut points, materials, _) = store();
        let wood = materials.structural_id("Wood").unwrap();
        points.add(PointDefinition::new(Vector::Y, wood), &materials).unwrap();
        points.add(PointDefinition::new(Vector::Y, wood), &materials).unwrap();
        let err = points.add(PointDefinition::new(Vector::Y, wood), &materials);
        assert!(matches!(
            err,
            Err(SimulationError::ParticleCapacityExhausted { region: "structural", .. })
        ));
    }

    #[test]
    fn pinning_zeroes_integration_factor_and_velocity() {
        let (mut points, _, params) = store();
        points.set_velocity(0, Vector::new(3.0, 1.0));
        assert!(points.integration_factor(0) > 0.0);

        points.pin(0, &params);
        assert!(points.is_pinned(0));
        assert_eq!(points.integration_factor(0), 0.0);
        assert_eq!(points.velocity(0), Vector::ZERO);

        points.unpin(0, &params);
        assert!(!points.is_pinned(0));
        assert!(points.integration_factor(0) > 0.0);
    }

    #[test]
    fn ocean_floor_factors_are_clamped() {
        let materials = MaterialDatabase::new();
        let params = SimulationParameters {
            elasticity_adjustment: 10.0,
            friction_adjustment: 10.0,
            ..Default::default()
        };
        let mut points = Points::new(1, 0, 0, 1);
        points
            .add(PointDefinition::new(Vector::ZERO, 0), &materials)
            .unwrap();
        points.recalculate_cached_coefficients(&params, &materials);
        let factors = points.ocean_floor_collision_factors(0);
        assert_relative_eq!(factors.elastic_factor, -1.0);
        assert_relative_eq!(factors.friction_factor, 1.0);
    }

    #[test]
    fn cached_coefficients_recompute_only_on_change() {
        let (mut points, materials, params) = store();
        assert!(!points.recalculate_cached_coefficients(&params, &materials));
        let changed = params.clone().with_iterations(7);
        assert!(points.recalculate_cached_coefficients(&changed, &materials));
    }

    #[test]
    fn detach_has_effect_only_once() {
        let (mut points, materials, _) = store();
        let environment = Environment::flat(10.0, -100.0);
        let mut events = SimulationEventDispatcher::new();
        let sink = crate::events::RecordingSink::new();
        events.register_sink(Box::new(sink.clone()));
        let options = DetachOptions {
            generate_debris: true,
            fire_destroy_event: true,
        };

        points.detach(0, Vector::X, options, 0.0, &environment, &materials, &mut events);
        let debris = points.live_ephemeral_count();
        assert!(points.is_damaged(0));
        assert!(debris > 0);

        points.detach(0, Vector::Y, options, 0.0, &environment, &materials, &mut events);
        assert_eq!(points.velocity(0), Vector::X);
        assert_eq!(points.live_ephemeral_count(), debris);

        events.flush();
        assert_eq!(sink.events().len(), 1);

        points.restore(0);
        assert!(!points.is_damaged(0));
        assert!(!points.is_leaking(0));
    }

    #[test]
    fn damage_leaks_only_through_non_hull_particles() {
        let (mut points, materials, params) = store();
        let iron = materials.structural_id("Iron").unwrap();
        let wood = materials.structural_id("Wood").unwrap();
        let hull = points.add(PointDefinition::new(Vector::new(5.0, 0.0), iron), &materials).unwrap();
        let plank = points.add(PointDefinition::new(Vector::new(6.0, 0.0), wood), &materials).unwrap();
        points.recalculate_cached_coefficients(&params, &materials);

        points.damage(hull, &materials);
        points.damage(plank, &materials);

        assert!(points.is_damaged(hull) && points.is_damaged(plank));
        assert!(!points.is_leaking(hull));
        assert!(points.is_leaking(plank));
        assert!(!points.is_detached(hull) && !points.is_detached(plank));
    }

    #[test]
    fn new_slots_get_coefficients_without_a_full_pass() {
        let (mut points, materials, params) = store();
        let before = points.integration_factor(0);
        let npc = points.allocate_npc_particle(Vector::ZERO, 80.0, &materials).unwrap();
        points.integration_factor[0] = -1.0;

        assert!(points.recalculate_cached_coefficients(&params, &materials));
        assert!(points.integration_factor(npc) > 0.0);
        // Untouched slots keep their cached values
        assert_eq!(points.integration_factor(0), -1.0);
        assert!(before > 0.0);
        assert!(!points.recalculate_cached_coefficients(&params, &materials));
    }

    #[test]
    fn water_makes_particles_heavier() {
        let (mut points, materials, params) = store();
        let before = points.mass(0);
        points.set_water(0, 1.0);
        let changed = points.update_masses(&params, &materials);
        assert!(changed.contains(&0));
        assert!(points.mass(0) > before);
        assert!(!changed.contains(&1));
    }

    #[test]
    fn air_bubbles_expire_at_the_surface() {
        let (mut points, materials, _) = store();
        let environment = Environment::flat(0.0, -100.0);
        let handle = points
            .create_ephemeral_particle_air_bubble(Vector::new(0.0, -0.05), 0.0, 0.0, 1.0, &materials)
            .unwrap();
        let index = points.ephemeral_index(handle).unwrap();
        assert!(points.is_active(index));

        let mut time = 0.0;
        for _ in 0..64 {
            time += 1.0 / 64.0;
            points.update_ephemeral_particles(time, 1.0 / 64.0, &environment);
        }
        assert!(points.ephemeral_particle(handle).is_none());
        assert!(!points.is_active(index));
    }

    #[test]
    fn npc_slots_are_reused() {
        let (mut points, materials, _) = store();
        let a = points.allocate_npc_particle(Vector::ZERO, 70.0, &materials).unwrap();
        let b = points.allocate_npc_particle(Vector::ZERO, 70.0, &materials).unwrap();
        assert!(points.is_npc(a) && points.is_npc(b));
        assert!(points.allocate_npc_particle(Vector::ZERO, 70.0, &materials).is_err());

        points.free_npc_particle(a);
        assert_eq!(points.remaining_npc_capacity(), 1);
        let c = points.allocate_npc_particle(Vector::ZERO, 70.0, &materials).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn combustion_ignites_hot_dry_particles() {
        let (mut points, materials, params) = store();
        let wood = materials.structural_id("Wood").unwrap();
        let index = points
            .add(PointDefinition::new(Vector::ZERO, wood), &materials)
            .unwrap();
        points.set_temperature(index, 700.0);
        assert_eq!(points.update_combustion_low_frequency(&params, &materials), 1);
        assert!(points.combustion_state(index).is_burning());

        points.update_combustion_low_frequency(&params, &materials);
        assert_eq!(points.combustion_state(index), CombustionState::Burning);
        let before = points.temperature(index);
        points.update_combustion_high_frequency(&params);
        assert!(points.temperature(index) > before);

        points.set_water(index, 1.0);
        points.update_combustion_low_frequency(&params, &materials);
        assert_eq!(points.combustion_state(index), CombustionState::Extinguishing);
    }
}

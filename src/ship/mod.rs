//! Ship simulation
//!
//! A [`Ship`] owns one particle store, its spring network and its triangle
//! mesh, and advances them one tick at a time:
//!
//! 1. masses and cached coefficients;
//! 2. static forces: queued interactions, gravity, buoyancy, drag, wind,
//!    hydrostatic pressure;
//! 3. N relaxation sub-steps of spring forces and integration, with sea
//!    floor collisions every second sub-step;
//! 4. world bounds;
//! 5. strains, breakage and the triangles and particles it orphans;
//! 6. connectivity and plane ids when the structure changed;
//! 7. water, heat, combustion and ephemeral particles.

pub mod builder;
pub mod collisions;
pub mod connectivity;
pub mod heat;
pub mod interactions;
pub mod spring_relaxation;
pub mod water;
pub mod world_forces;

use std::ops::Range;
use std::time::Instant;

use bevy::log::{debug, trace};
use indexmap::IndexMap;

pub use builder::{RectangularGrid, ShipBuilder, octant_of};
pub use connectivity::ConnectivityOutcome;
pub use interactions::Interaction;

use crate::config::{NPC_LOW_FREQUENCY_UPDATE_PERIOD, SIMULATION_STEP_TIME_DURATION, SimulationParameters};
use crate::core::{
    DetachOptions, ElementIndex, MaterialDatabase, NpcFloorGeometry, NpcFloorKind, PlaneId, Points,
    SpringDestroyOptions, Springs, StressRenderMode, Triangles,
};
use crate::environment::Environment;
use crate::error::{Result, SimulationError};
use crate::events::SimulationEventDispatcher;
use crate::math::{Real, Vector};

pub type ShipId = u32;

/// Fraction of the overshoot a particle is bounced back by at the world edge.
const WORLD_BOUNDS_ELASTICITY: Real = 0.5;

/// Floor classification of one edge in the builder's floor map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FloorEdge {
    pub kind: NpcFloorKind,
    pub geometry: NpcFloorGeometry,
}

/// Everything a ship update reads or writes besides the ship itself.
pub struct ShipUpdateContext<'a> {
    pub current_simulation_time: Real,
    pub sequence_number: u64,
    pub environment: &'a Environment,
    pub params: &'a SimulationParameters,
    pub materials: &'a MaterialDatabase,
    pub events: &'a mut SimulationEventDispatcher,
}

/// What changed in the structure during one update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShipUpdateOutcome {
    pub broken_springs: Vec<ElementIndex>,
    pub destroyed_triangles: Vec<ElementIndex>,
    pub connectivity_changed: bool,
}

/// Running totals, mostly for logging and benches.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ShipStatistics {
    pub broken_springs: usize,
    pub destroyed_triangles: usize,
    pub detached_points: usize,
    pub water_taken: Real,
    pub last_update_ms: f64,
}

pub struct Ship {
    id: ShipId,
    points: Points,
    springs: Springs,
    triangles: Triangles,
    floors: IndexMap<(ElementIndex, ElementIndex), FloorEdge>,
    queued_interactions: Vec<Interaction>,
    spring_partitions: Vec<Range<usize>>,
    stress_render_mode: StressRenderMode,
    is_structure_dirty: bool,
    max_plane_id: PlaneId,
    component_count: usize,
    statistics: ShipStatistics,
}

impl Ship {
    pub(crate) fn from_parts(
        id: ShipId,
        points: Points,
        springs: Springs,
        triangles: Triangles,
        floors: IndexMap<(ElementIndex, ElementIndex), FloorEdge>,
        params: &SimulationParameters,
    ) -> Self {
        let partitions = params.spring_relaxation_parallelism.max(1);
        let mut ship = Self {
            id,
            spring_partitions: spring_relaxation::partition_springs(springs.len(), partitions),
            points,
            springs,
            triangles,
            floors,
            queued_interactions: Vec::new(),
            stress_render_mode: StressRenderMode::default(),
            is_structure_dirty: true,
            max_plane_id: 0,
            component_count: 0,
            statistics: ShipStatistics::default(),
        };
        ship.update_connectivity();
        ship
    }

    // Accessors

    #[inline]
    pub fn id(&self) -> ShipId {
        self.id
    }

    #[inline]
    pub fn points(&self) -> &Points {
        &self.points
    }

    #[inline]
    pub fn points_mut(&mut self) -> &mut Points {
        &mut self.points
    }

    #[inline]
    pub fn springs(&self) -> &Springs {
        &self.springs
    }

    #[inline]
    pub fn triangles(&self) -> &Triangles {
        &self.triangles
    }

    /// Mutable particles next to the read-only mesh, for NPC physics.
    pub fn particles_and_mesh(&mut self) -> (&mut Points, &Triangles) {
        (&mut self.points, &self.triangles)
    }

    pub fn floor_at(&self, a: ElementIndex, b: ElementIndex) -> Option<FloorEdge> {
        let key = if a <= b { (a, b) } else { (b, a) };
        self.floors.get(&key).copied()
    }

    pub fn max_plane_id(&self) -> PlaneId {
        self.max_plane_id
    }

    pub fn component_count(&self) -> usize {
        self.component_count
    }

    pub fn statistics(&self) -> &ShipStatistics {
        &self.statistics
    }

    pub fn set_stress_render_mode(&mut self, mode: StressRenderMode) {
        self.stress_render_mode = mode;
    }

    /// Geometric center of the structural particles.
    pub fn center(&self) -> Vector {
        let count = self.points.structural_count();
        if count == 0 {
            return Vector::ZERO;
        }
        let sum: Vector = (0..count).map(|i| self.points.position(i)).sum();
        sum / count as Real
    }

    pub fn find_topmost_workable_triangle_containing(&self, position: Vector) -> Option<(ElementIndex, [Real; 3])> {
        self.triangles.find_topmost_workable_containing(position, &self.points)
    }

    /// Re-splits the springs into `partitions` force partitions.
    pub fn recalculate_spring_relaxation_parallelism(&mut self, partitions: usize) {
        let partitions = partitions.max(1);
        self.points.set_partition_count(partitions);
        self.spring_partitions = spring_relaxation::partition_springs(self.springs.len(), partitions);
        debug!("Ship {}: spring relaxation split into {} partitions", self.id, partitions);
    }

    // Pinning

    pub fn pin(&mut self, point: ElementIndex, params: &SimulationParameters) -> Result<()> {
        self.check_point(point)?;
        self.points.pin(point, params);
        Ok(())
    }

    pub fn unpin(&mut self, point: ElementIndex, params: &SimulationParameters) -> Result<()> {
        self.check_point(point)?;
        self.points.unpin(point, params);
        Ok(())
    }

    fn check_point(&self, point: ElementIndex) -> Result<()> {
        let count = self.points.structural_count();
        if point >= count {
            return Err(SimulationError::index_out_of_bounds(point, count));
        }
        Ok(())
    }

    // Destruction and repair

    /// Destroys a spring as a tool would, with the same cascade as breakage.
    pub fn destroy_spring(&mut self, spring: ElementIndex, context: &mut ShipUpdateContext<'_>) -> Result<ShipUpdateOutcome> {
        if spring >= self.springs.len() {
            return Err(SimulationError::index_out_of_bounds(spring, self.springs.len()));
        }

        let mut outcome = ShipUpdateOutcome::default();
        if self.springs.is_deleted(spring) {
            return Ok(outcome);
        }

        let options = SpringDestroyOptions {
            fire_break_event: false,
            destroy_all_triangles: true,
        };
        self.springs
            .destroy(spring, options, &mut self.points, context.environment, context.events);
        self.handle_destroyed_springs(&[spring], options, context, &mut outcome);
        if self.is_structure_dirty {
            outcome.connectivity_changed = self.update_connectivity();
        }
        Ok(outcome)
    }

    /// Destroys a single triangle, leaving its springs alone.
    pub fn destroy_triangle(&mut self, triangle: ElementIndex) -> Result<bool> {
        if triangle >= self.triangles.len() {
            return Err(SimulationError::index_out_of_bounds(triangle, self.triangles.len()));
        }
        let destroyed = self.triangles.destroy(triangle, &mut self.points, &mut self.springs);
        if destroyed {
            self.statistics.destroyed_triangles += 1;
        }
        Ok(destroyed)
    }

    /// Repairs a triangle: its vertices, its edge springs and the triangle itself.
    pub fn restore_triangle(&mut self, triangle: ElementIndex, params: &SimulationParameters) -> Result<bool> {
        if triangle >= self.triangles.len() {
            return Err(SimulationError::index_out_of_bounds(triangle, self.triangles.len()));
        }
        for vertex in self.triangles.vertices(triangle) {
            self.points.restore(vertex);
        }
        for spring in self.triangles.sub_springs(triangle) {
            self.springs.restore(spring, &mut self.points, params);
        }
        let restored = self.triangles.restore(triangle, &mut self.points, &mut self.springs);
        self.is_structure_dirty = true;
        self.update_connectivity();
        Ok(restored)
    }

    /// Destroys the triangles of freshly destroyed springs, damages their
    /// endpoints and detaches the particles left without springs.
    ///
    /// With `destroy_all_triangles` every triangle touching either endpoint
    /// goes; otherwise only the triangles spanning both endpoints.
    fn handle_destroyed_springs(
        &mut self,
        destroyed: &[ElementIndex],
        options: SpringDestroyOptions,
        context: &mut ShipUpdateContext<'_>,
        outcome: &mut ShipUpdateOutcome,
    ) {
        for &spring in destroyed {
            let (a, b) = self.springs.endpoints(spring);
            let mut doomed: Vec<ElementIndex> = self.points.connected_triangles(a).to_vec();
            if options.destroy_all_triangles {
                doomed.extend_from_slice(self.points.connected_triangles(b));
            } else {
                doomed.retain(|&triangle| self.triangles.vertices(triangle).contains(&b));
            }
            doomed.extend(self.springs.super_triangles(spring).iter());
            for triangle in doomed {
                if self.triangles.destroy(triangle, &mut self.points, &mut self.springs) {
                    outcome.destroyed_triangles.push(triangle);
                    self.statistics.destroyed_triangles += 1;
                }
            }

            for endpoint in [a, b] {
                self.points.damage(endpoint, context.materials);
                if self.points.connected_springs(endpoint).is_empty() {
                    let velocity = self.points.velocity(endpoint);
                    self.points.detach(
                        endpoint,
                        velocity,
                        DetachOptions {
                            generate_debris: true,
                            fire_destroy_event: true,
                        },
                        context.current_simulation_time,
                        context.environment,
                        context.materials,
                        context.events,
                    );
                    self.statistics.detached_points += 1;
                }
            }

            outcome.broken_springs.push(spring);
            self.statistics.broken_springs += 1;
        }

        if !destroyed.is_empty() {
            self.is_structure_dirty = true;
        }
    }

    /// Relabels components and planes if the structure changed.
    fn update_connectivity(&mut self) -> bool {
        if !self.is_structure_dirty {
            return false;
        }

        let visit = connectivity::run_connectivity_visit(&mut self.points);
        self.max_plane_id = visit.max_plane_id.unwrap_or(0);
        self.component_count = visit.component_count;
        self.is_structure_dirty = false;
        trace!(
            "Ship {}: {} connected components, max plane {}",
            self.id, self.component_count, self.max_plane_id
        );
        true
    }

    // Update

    /// Advances the ship by one simulation tick.
    pub fn update(&mut self, context: &mut ShipUpdateContext<'_>) -> ShipUpdateOutcome {
        let start = Instant::now();
        let params = context.params;
        let materials = context.materials;
        let environment = context.environment;
        let mut outcome = ShipUpdateOutcome::default();

        if self.points.partition_count() != params.spring_relaxation_parallelism.max(1) {
            self.recalculate_spring_relaxation_parallelism(params.spring_relaxation_parallelism);
        }

        // Masses and coefficients
        let changed_masses = self.points.update_masses(params, materials);
        self.points.recalculate_cached_coefficients(params, materials);
        self.springs.update_coefficients(&self.points, params);
        self.springs
            .update_dirty_coefficients(&changed_masses, &self.points, params);

        // Static forces
        let phase = Instant::now();
        self.points.reset_static_forces();
        self.apply_queued_interactions(params);
        world_forces::apply_world_forces(&mut self.points, environment, params);
        world_forces::apply_static_pressure_forces(&mut self.points, &self.triangles, environment, params);
        let static_forces_ms = phase.elapsed().as_secs_f64() * 1000.0;

        // Relaxation
        let phase = Instant::now();
        let dt = params.mechanical_simulation_step_time_duration();
        for iteration in 0..params.num_mechanical_dynamics_iterations {
            spring_relaxation::apply_springs_forces(&self.springs, &self.spring_partitions, &mut self.points);
            spring_relaxation::integrate_and_reset_dynamic_forces(&mut self.points, params);
            if iteration % 2 == 1 {
                collisions::handle_collisions_with_sea_floor(&mut self.points, environment, dt);
            }
        }
        collisions::trim_for_world_bounds(&mut self.points, WORLD_BOUNDS_ELASTICITY);
        let relaxation_ms = phase.elapsed().as_secs_f64() * 1000.0;

        // Strains
        let phase = Instant::now();
        let strains = self.springs.update_for_strains(
            &mut self.points,
            environment,
            self.stress_render_mode,
            context.events,
        );
        self.handle_destroyed_springs(&strains.broken, Springs::STRAIN_DESTROY_OPTIONS, context, &mut outcome);
        outcome.connectivity_changed = self.update_connectivity();
        let strains_ms = phase.elapsed().as_secs_f64() * 1000.0;

        // Water, heat, combustion
        let phase = Instant::now();
        self.statistics.water_taken += water::update_water_inflow(
            &mut self.points,
            environment,
            materials,
            params,
            SIMULATION_STEP_TIME_DURATION,
        );
        water::diffuse_water(&mut self.points, &self.springs, materials, params);
        heat::propagate_heat(
            &mut self.points,
            &self.springs,
            materials,
            params,
            SIMULATION_STEP_TIME_DURATION,
        );
        heat::dissipate_heat(&mut self.points, environment, params, SIMULATION_STEP_TIME_DURATION);
        if context.sequence_number % NPC_LOW_FREQUENCY_UPDATE_PERIOD == 0 {
            self.points.update_combustion_low_frequency(params, materials);
        }
        self.points.update_combustion_high_frequency(params);
        let thermal_ms = phase.elapsed().as_secs_f64() * 1000.0;

        self.points.update_ephemeral_particles(
            context.current_simulation_time,
            SIMULATION_STEP_TIME_DURATION,
            environment,
        );

        self.statistics.last_update_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            "Ship {}: static {:.3}ms, relaxation {:.3}ms, strains {:.3}ms, thermal {:.3}ms",
            self.id, static_forces_ms, relaxation_ms, strains_ms, thermal_ms
        );
        if !outcome.broken_springs.is_empty() {
            debug!(
                "Ship {}: {} springs broke, {} triangles destroyed",
                self.id,
                outcome.broken_springs.len(),
                outcome.destroyed_triangles.len()
            );
        }

        outcome
    }
}

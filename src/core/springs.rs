//! Spring network
//!
//! Damped springs between pairs of particles. Coefficients are derived from
//! the endpoint materials and masses and are only recomputed when an input
//! changes: a parameter change, an endpoint mass change, or an endpoint
//! temperature above the melting point.

use std::ops::Range;

use super::materials::{MaterialDatabase, MaterialId};
use super::points::{ElementIndex, Points};
use crate::config::{
    MAX_MELTED_REST_LENGTH_FACTOR, MELTED_STIFFNESS_MULTIPLIER, MELTING_DEPTH_RANGE,
    SPRING_DAMPING_COEFFICIENT, SPRING_STIFFNESS_COEFFICIENT, SPRING_STIFFNESS_GROWTH_RATE,
    SPRING_STRESS_EXIT_FRACTION, SimulationParameters, SpringCoefficientKey,
};
use crate::environment::Environment;
use crate::events::SimulationEventDispatcher;
use crate::math::{Real, Vector, mix, normalise_approx_with_length, smooth_step};

/// Direction of an endpoint's neighbor in the factory point grid, 0..8.
pub type Octant = u8;

/// How much farther than its breaking elongation a fully molten spring stretches.
const MELTING_INDUCED_TOLERANCE: Real = 10.0;

/// Strength compensation for the number of relaxation sub-steps.
///
/// `ratio` is the sub-step count over the basis count the material strengths
/// were tuned at. More sub-steps make springs effectively stiffer, so their
/// elongation under the same load shrinks; the breaking threshold shrinks
/// with it. The result is exactly 1 at the basis.
pub fn calculate_spring_strength_iterations_adjustment(ratio: Real) -> Real {
    4.0 / (1.0 + 3.0 * ratio.powf(1.3))
}

/// Stiffness and damping compensation for the number of relaxation sub-steps.
///
/// Coefficients are expressed per sub-step (`/ dt²` and `/ dt`); these factors
/// bring them back to per-tick quantities, so a loaded spring settles at the
/// same elongation whatever the sub-step count. Both are 1 with a single
/// sub-step.
pub fn calculate_spring_stiffness_iterations_adjustment(iterations: u32) -> (Real, Real) {
    let n = iterations.max(1) as Real;
    (1.0 / (n * n), 1.0 / n)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SuperTriangles([Option<ElementIndex>; 2]);

impl SuperTriangles {
    pub fn from_slice(triangles: &[ElementIndex]) -> Self {
        let mut result = Self::default();
        for &t in triangles.iter().take(2) {
            result.push(t);
        }
        result
    }

    pub fn push(&mut self, triangle: ElementIndex) -> bool {
        match self.0.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(triangle);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, triangle: ElementIndex) {
        for slot in &mut self.0 {
            if *slot == Some(triangle) {
                *slot = None;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = ElementIndex> + '_ {
        self.0.iter().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.0.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpringDestroyOptions {
    pub fire_break_event: bool,
    /// Destroy every triangle touching either endpoint, not only the ones
    /// spanning the spring.
    pub destroy_all_triangles: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StressRenderMode {
    #[default]
    None,
    /// Writes each particle's worst spring strain into its stress buffer.
    StressOverlay,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpringStrainState {
    pub breaking_elongation: Real,
    pub strain_threshold_fraction: Real,
    pub is_stressed: bool,
}

/// Result of one strain pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StrainOutcome {
    pub broken: Vec<ElementIndex>,
    pub newly_stressed: usize,
}

pub struct Springs {
    endpoints: Vec<(ElementIndex, ElementIndex)>,
    factory_octants: Vec<(Octant, Octant)>,
    super_triangles: Vec<SuperTriangles>,
    factory_super_triangles: Vec<SuperTriangles>,
    covering_triangles_count: Vec<u8>,

    factory_rest_length: Vec<Real>,
    rest_length: Vec<Real>,
    stiffness_coefficient: Vec<Real>,
    damping_coefficient: Vec<Real>,

    base_material: Vec<MaterialId>,
    material_stiffness: Vec<Real>,
    material_strength: Vec<Real>,
    material_melting_temperature: Vec<Real>,
    extra_melting_induced_tolerance: Vec<Real>,
    strain_state: Vec<SpringStrainState>,

    is_deleted: Vec<bool>,
    is_rope: Vec<bool>,
    needs_coefficient_update: Vec<bool>,
    coefficient_key: Option<SpringCoefficientKey>,
}

impl Default for Springs {
    fn default() -> Self {
        Self::new()
    }
}

impl Springs {
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            factory_octants: Vec::new(),
            super_triangles: Vec::new(),
            factory_super_triangles: Vec::new(),
            covering_triangles_count: Vec::new(),
            factory_rest_length: Vec::new(),
            rest_length: Vec::new(),
            stiffness_coefficient: Vec::new(),
            damping_coefficient: Vec::new(),
            base_material: Vec::new(),
            material_stiffness: Vec::new(),
            material_strength: Vec::new(),
            material_melting_temperature: Vec::new(),
            extra_melting_induced_tolerance: Vec::new(),
            strain_state: Vec::new(),
            is_deleted: Vec::new(),
            is_rope: Vec::new(),
            needs_coefficient_update: Vec::new(),
            coefficient_key: None,
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Registers a spring at its current length.
    ///
    /// Material properties are the average of the two endpoint materials;
    /// the stress threshold is randomized by the endpoints' strength seeds.
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        point_a: ElementIndex,
        point_b: ElementIndex,
        factory_octant_a: Octant,
        factory_octant_b: Octant,
        super_triangles: SuperTriangles,
        covering_triangles_count: u8,
        points: &mut Points,
        materials: &MaterialDatabase,
        params: &SimulationParameters,
    ) -> ElementIndex {
        debug_assert_ne!(point_a, point_b);
        let index = self.endpoints.len();

        let material_a = materials.structural(points.material(point_a));
        let material_b = materials.structural(points.material(point_b));
        let rest_length = (points.position(point_b) - points.position(point_a)).length();
        let seed = (points.strength(point_a) + points.strength(point_b)) / 2.0;
        let threshold_fraction = (material_a.strain_threshold_fraction
            + material_b.strain_threshold_fraction)
            / 2.0
            * (1.0 - 0.35 + 0.7 * seed);

        self.endpoints.push((point_a, point_b));
        self.factory_octants.push((factory_octant_a, factory_octant_b));
        self.super_triangles.push(super_triangles);
        self.factory_super_triangles.push(super_triangles);
        self.covering_triangles_count.push(covering_triangles_count);
        self.factory_rest_length.push(rest_length);
        self.rest_length.push(rest_length);
        // Anything below MAX means "already converging"; the first update sets it
        self.stiffness_coefficient.push(Real::MAX);
        self.damping_coefficient.push(0.0);
        self.base_material.push(if material_a.strength <= material_b.strength {
            points.material(point_a)
        } else {
            points.material(point_b)
        });
        self.material_stiffness
            .push((material_a.stiffness + material_b.stiffness) / 2.0);
        self.material_strength
            .push((material_a.strength + material_b.strength) / 2.0);
        self.material_melting_temperature
            .push((material_a.melting_temperature + material_b.melting_temperature) / 2.0);
        self.extra_melting_induced_tolerance.push(0.0);
        self.strain_state.push(SpringStrainState {
            breaking_elongation: 0.0,
            strain_threshold_fraction: threshold_fraction,
            is_stressed: false,
        });
        self.is_deleted.push(false);
        self.is_rope
            .push(points.is_rope(point_a) && points.is_rope(point_b));
        self.needs_coefficient_update.push(true);

        points.add_connected_spring(point_a, index, point_b);
        points.add_connected_spring(point_b, index, point_a);

        self.calculate_coefficients(index, points, params);
        index
    }

    // Accessors

    #[inline]
    pub fn endpoint_a(&self, index: ElementIndex) -> ElementIndex {
        self.endpoints[index].0
    }

    #[inline]
    pub fn endpoint_b(&self, index: ElementIndex) -> ElementIndex {
        self.endpoints[index].1
    }

    #[inline]
    pub fn endpoints(&self, index: ElementIndex) -> (ElementIndex, ElementIndex) {
        self.endpoints[index]
    }

    pub fn other_endpoint(&self, index: ElementIndex, point: ElementIndex) -> ElementIndex {
        let (a, b) = self.endpoints[index];
        if a == point { b } else { a }
    }

    pub fn factory_octants(&self, index: ElementIndex) -> (Octant, Octant) {
        self.factory_octants[index]
    }

    pub fn super_triangles(&self, index: ElementIndex) -> &SuperTriangles {
        &self.super_triangles[index]
    }

    pub fn add_super_triangle(&mut self, index: ElementIndex, triangle: ElementIndex) {
        if !self.super_triangles[index].iter().any(|t| t == triangle) {
            self.super_triangles[index].push(triangle);
        }
    }

    pub fn remove_super_triangle(&mut self, index: ElementIndex, triangle: ElementIndex) {
        self.super_triangles[index].remove(triangle);
    }

    pub fn covering_triangles_count(&self, index: ElementIndex) -> u8 {
        self.covering_triangles_count[index]
    }

    pub(crate) fn set_covering_triangles_count(&mut self, index: ElementIndex, count: u8) {
        self.covering_triangles_count[index] = count;
    }

    #[inline]
    pub fn factory_rest_length(&self, index: ElementIndex) -> Real {
        self.factory_rest_length[index]
    }

    #[inline]
    pub fn rest_length(&self, index: ElementIndex) -> Real {
        self.rest_length[index]
    }

    /// Changing the rest length invalidates the coefficients.
    pub fn set_rest_length(&mut self, index: ElementIndex, rest_length: Real) {
        self.rest_length[index] = rest_length;
        self.needs_coefficient_update[index] = true;
    }

    #[inline]
    pub fn stiffness_coefficient(&self, index: ElementIndex) -> Real {
        self.stiffness_coefficient[index]
    }

    #[inline]
    pub fn damping_coefficient(&self, index: ElementIndex) -> Real {
        self.damping_coefficient[index]
    }

    pub fn base_material(&self, index: ElementIndex) -> MaterialId {
        self.base_material[index]
    }

    pub fn strain_state(&self, index: ElementIndex) -> &SpringStrainState {
        &self.strain_state[index]
    }

    #[inline]
    pub fn is_deleted(&self, index: ElementIndex) -> bool {
        self.is_deleted[index]
    }

    pub fn is_rope(&self, index: ElementIndex) -> bool {
        self.is_rope[index]
    }

    pub fn length(&self, index: ElementIndex, points: &Points) -> Real {
        let (a, b) = self.endpoints[index];
        (points.position(b) - points.position(a)).length()
    }

    pub fn live_count(&self) -> usize {
        self.is_deleted.iter().filter(|deleted| !**deleted).count()
    }

    pub fn mark_endpoints_dirty(&mut self, point: ElementIndex, points: &Points) {
        for connected in points.connected_springs(point) {
            self.needs_coefficient_update[connected.spring] = true;
        }
    }

    // Forces

    /// Accumulates the forces of springs in `range` into `forces`.
    ///
    /// Deleted springs carry zero coefficients and are skipped outright.
    pub fn apply_spring_forces(
        &self,
        range: Range<usize>,
        positions: &[Vector],
        velocities: &[Vector],
        forces: &mut [Vector],
    ) {
        for index in range {
            if self.is_deleted[index] {
                continue;
            }

            let (a, b) = self.endpoints[index];
            let (direction, length) = normalise_approx_with_length(positions[b] - positions[a]);

            // Hooke's law, positive when stretched
            let f_spring = (length - self.rest_length[index]) * self.stiffness_coefficient[index];

            // Damping along the spring, positive when separating
            let relative_velocity = velocities[b] - velocities[a];
            let f_damp = relative_velocity.dot(direction) * self.damping_coefficient[index];

            let force = direction * (f_spring + f_damp);
            forces[a] += force;
            forces[b] -= force;
        }
    }

    // Coefficients

    /// Recomputes every spring's coefficients if the parameters they depend
    /// on changed since the last call.
    pub fn update_coefficients(&mut self, points: &Points, params: &SimulationParameters) -> bool {
        let key = params.spring_coefficient_key();
        if self.coefficient_key == Some(key) {
            return false;
        }

        for index in 0..self.len() {
            if !self.is_deleted[index] {
                // Parameter changes take effect at once rather than growing in
                self.stiffness_coefficient[index] = Real::MAX;
                self.calculate_coefficients(index, points, params);
            }
        }

        self.coefficient_key = Some(key);
        true
    }

    /// Recomputes coefficients of springs whose inputs moved: flagged springs,
    /// springs touching a heavier or lighter particle, and melting springs.
    pub fn update_dirty_coefficients(
        &mut self,
        changed_mass_points: &[ElementIndex],
        points: &Points,
        params: &SimulationParameters,
    ) -> usize {
        for &point in changed_mass_points {
            for connected in points.connected_springs(point) {
                self.needs_coefficient_update[connected.spring] = true;
            }
        }

        let melting_adjustment = params.melting_temperature_adjustment;
        let mut updated = 0;
        for index in 0..self.len() {
            if self.is_deleted[index] {
                continue;
            }

            let (a, b) = self.endpoints[index];
            let melting_temperature = self.material_melting_temperature[index] * melting_adjustment;
            let is_melting =
                points.temperature(a).max(points.temperature(b)) > melting_temperature;
            if self.needs_coefficient_update[index] || is_melting {
                self.calculate_coefficients(index, points, params);
                updated += 1;
            }
        }

        updated
    }

    fn calculate_coefficients(&mut self, index: ElementIndex, points: &Points, params: &SimulationParameters) {
        let (a, b) = self.endpoints[index];
        let (mass_a, mass_b) = (points.mass(a), points.mass(b));
        let mass_factor = mass_a * mass_b / (mass_a + mass_b);
        let dt = params.mechanical_simulation_step_time_duration();
        let (stiffness_adjustment, damping_adjustment) =
            calculate_spring_stiffness_iterations_adjustment(params.num_mechanical_dynamics_iterations);

        let melting_temperature =
            self.material_melting_temperature[index] * params.melting_temperature_adjustment;
        let overheat = points.temperature(a).max(points.temperature(b)) - melting_temperature;
        let melt_depth = smooth_step(0.0, MELTING_DEPTH_RANGE, overheat);
        let melt_multiplier = mix(1.0, MELTED_STIFFNESS_MULTIPLIER, melt_depth);

        let desired_stiffness = SPRING_STIFFNESS_COEFFICIENT
            * self.material_stiffness[index]
            * params.spring_stiffness_adjustment
            * mass_factor
            / (dt * dt)
            * stiffness_adjustment
            * melt_multiplier;
        let current = self.stiffness_coefficient[index];
        let still_converging = if desired_stiffness > current {
            // Recovering from a melt: stiffen gradually to avoid a kick
            self.stiffness_coefficient[index] =
                current + (desired_stiffness - current) * SPRING_STIFFNESS_GROWTH_RATE;
            (desired_stiffness - self.stiffness_coefficient[index]) > desired_stiffness * 1e-3
        } else {
            self.stiffness_coefficient[index] = desired_stiffness;
            false
        };

        self.damping_coefficient[index] =
            SPRING_DAMPING_COEFFICIENT * params.spring_damping_adjustment * mass_factor / dt * damping_adjustment;

        if melt_depth > 0.0 {
            let length = (points.position(b) - points.position(a)).length();
            let max_rest = self.factory_rest_length[index] * MAX_MELTED_REST_LENGTH_FACTOR;
            self.rest_length[index] = length.clamp(self.rest_length[index].min(max_rest), max_rest);
        }

        self.extra_melting_induced_tolerance[index] = MELTING_INDUCED_TOLERANCE * melt_depth;

        let decay = (points.decay(a) + points.decay(b)) / 2.0;
        let iterations_adjustment =
            calculate_spring_strength_iterations_adjustment(params.mechanical_iterations_ratio());
        self.strain_state[index].breaking_elongation = self.material_strength[index]
            * params.spring_strength_adjustment
            * iterations_adjustment
            * decay
            * self.rest_length[index]
            * (1.0 + self.extra_melting_induced_tolerance[index]);

        // Molten springs keep being revisited until they have fully cooled
        self.needs_coefficient_update[index] = still_converging || melt_depth > 0.0;
    }

    // Strains

    /// How over-stretched springs are destroyed.
    pub const STRAIN_DESTROY_OPTIONS: SpringDestroyOptions = SpringDestroyOptions {
        fire_break_event: true,
        destroy_all_triangles: true,
    };

    /// Breaks over-stretched springs and tracks the stressed flag of the rest.
    ///
    /// Broken springs are destroyed with `OnBreak` fired; the caller is
    /// responsible for the triangles they supported.
    pub fn update_for_strains(
        &mut self,
        points: &mut Points,
        environment: &Environment,
        stress_render_mode: StressRenderMode,
        events: &mut SimulationEventDispatcher,
    ) -> StrainOutcome {
        let mut outcome = StrainOutcome::default();

        if stress_render_mode == StressRenderMode::StressOverlay {
            for index in 0..points.element_count() {
                points.set_stress(index, 0.0);
            }
        }

        for index in 0..self.len() {
            if self.is_deleted[index] {
                continue;
            }

            let (a, b) = self.endpoints[index];
            let strain = (points.position(b) - points.position(a)).length() - self.rest_length[index];
            let absolute_strain = strain.abs();
            let state = self.strain_state[index];

            if absolute_strain > state.breaking_elongation {
                self.destroy(
                    index,
                    Self::STRAIN_DESTROY_OPTIONS,
                    points,
                    environment,
                    events,
                );
                outcome.broken.push(index);
                continue;
            }

            let stress_fraction = if state.breaking_elongation > 0.0 {
                absolute_strain / state.breaking_elongation
            } else {
                0.0
            };

            if state.is_stressed {
                if stress_fraction < SPRING_STRESS_EXIT_FRACTION {
                    self.strain_state[index].is_stressed = false;
                }
            } else if stress_fraction > state.strain_threshold_fraction {
                self.strain_state[index].is_stressed = true;
                outcome.newly_stressed += 1;
                events.on_stress(
                    self.base_material[index],
                    environment.is_underwater(points.position(a)),
                    1,
                );
            }

            if stress_render_mode == StressRenderMode::StressOverlay {
                let signed = strain.signum() * stress_fraction;
                for endpoint in [a, b] {
                    if signed.abs() > points.stress(endpoint).abs() {
                        points.set_stress(endpoint, signed);
                    }
                }
            }
        }

        outcome
    }

    /// Removes a spring from the simulation.
    pub fn destroy(
        &mut self,
        index: ElementIndex,
        options: SpringDestroyOptions,
        points: &mut Points,
        environment: &Environment,
        events: &mut SimulationEventDispatcher,
    ) {
        if self.is_deleted[index] {
            return;
        }

        let (a, b) = self.endpoints[index];
        if options.fire_break_event {
            events.on_break(
                self.base_material[index],
                environment.is_underwater(points.position(a)),
                1,
            );
        }

        self.is_deleted[index] = true;
        self.stiffness_coefficient[index] = 0.0;
        self.damping_coefficient[index] = 0.0;
        self.strain_state[index].is_stressed = false;
        points.remove_connected_spring(a, index);
        points.remove_connected_spring(b, index);
    }

    /// Brings a destroyed spring back at its factory rest length.
    pub fn restore(&mut self, index: ElementIndex, points: &mut Points, params: &SimulationParameters) {
        if !self.is_deleted[index] {
            return;
        }

        let (a, b) = self.endpoints[index];
        self.is_deleted[index] = false;
        self.rest_length[index] = self.factory_rest_length[index];
        self.stiffness_coefficient[index] = Real::MAX;
        self.strain_state[index].is_stressed = false;
        points.add_connected_spring(a, index, b);
        points.add_connected_spring(b, index, a);
        self.calculate_coefficients(index, points, params);
    }

    pub fn factory_super_triangles(&self, index: ElementIndex) -> &SuperTriangles {
        &self.factory_super_triangles[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::materials::StructuralMaterial;
    use crate::core::points::PointDefinition;
    use crate::events::{RecordingSink, SimulationEvent};
    use approx::assert_relative_eq;

    fn two_points(strength: Real) -> (Points, Springs, MaterialDatabase, SimulationParameters) {
        let mut materials = MaterialDatabase::new();
        let material = materials.add_structural(StructuralMaterial {
            name: "Test".to_string(),
            ..StructuralMaterial::iron().with_strength(strength)
        });
        let params = SimulationParameters::default();
        let mut points = Points::new(2, 0, 0, 1);
        let a = points
            .add(PointDefinition::new(Vector::ZERO, material), &materials)
            .unwrap();
        let b = points
            .add(PointDefinition::new(Vector::new(1.0, 0.0), material), &materials)
            .unwrap();
        points.recalculate_cached_coefficients(&params, &materials);
        let mut springs = Springs::new();
        springs.add(a, b, 0, 4, SuperTriangles::default(), 0, &mut points, &materials, &params);
        springs.update_coefficients(&points, &params);
        (points, springs, materials, params)
    }

    #[test]
    fn iterations_adjustment_is_one_at_basis_and_decreasing() {
        assert_relative_eq!(calculate_spring_strength_iterations_adjustment(1.0), 1.0);
        let mut previous = calculate_spring_strength_iterations_adjustment(1.0 / 30.0);
        for iterations in [2.0, 4.0, 8.0, 16.0, 30.0, 60.0] {
            let current = calculate_spring_strength_iterations_adjustment(iterations / 30.0);
            assert!(current < previous);
            previous = current;
        }
    }

    #[test]
    fn spring_constant_does_not_depend_on_sub_steps() {
        let (points, mut springs, _, params) = two_points(0.5);
        let reference = springs.stiffness_coefficient(0);
        let reference_damping = springs.damping_coefficient(0);
        for iterations in [1, 2, 4, 8, 16] {
            springs.update_coefficients(&points, &params.clone().with_iterations(iterations));
            assert_relative_eq!(springs.stiffness_coefficient(0), reference, max_relative = 1e-4);
            assert_relative_eq!(springs.damping_coefficient(0), reference_damping, max_relative = 1e-4);
        }
    }

    #[test]
    fn spring_at_rest_exerts_no_force() {
        let (points, mut springs, _, params) = two_points(0.5);
        for stiffness in [0.1, 1.0, 1000.0] {
            let adjusted = params.clone().with_spring_stiffness_adjustment(stiffness);
            springs.update_coefficients(&points, &adjusted);
            assert!(springs.stiffness_coefficient(0) > 0.0);
            let mut forces = vec![Vector::ZERO; 2];
            springs.apply_spring_forces(0..1, points.positions(), points.velocities(), &mut forces);
            assert_eq!(forces[0], Vector::ZERO);
            assert_eq!(forces[1], Vector::ZERO);
        }
    }

    #[test]
    fn stretched_spring_pulls_endpoints_together() {
        let (mut points, springs, _, _) = two_points(0.5);
        points.set_position(1, Vector::new(1.1, 0.0));
        let mut forces = vec![Vector::ZERO; 2];
        springs.apply_spring_forces(0..1, points.positions(), points.velocities(), &mut forces);
        assert!(forces[0].x > 0.0);
        assert!(forces[1].x < 0.0);
        assert_relative_eq!(forces[0].x, -forces[1].x);
    }

    #[test]
    fn breaking_elongation_scales_with_strength_and_rest_length() {
        let (_, springs, _, _) = two_points(0.5);
        assert_relative_eq!(springs.strain_state(0).breaking_elongation, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn overstretched_spring_breaks_once() {
        let (mut points, mut springs, _, params) = two_points(0.5);
        let environment = Environment::flat(-100.0, -200.0);
        let sink = RecordingSink::new();
        let mut events = SimulationEventDispatcher::new();
        events.register_sink(Box::new(sink.clone()));

        points.set_position(1, Vector::new(1.6, 0.0));
        let outcome = springs.update_for_strains(
            &mut points,
            &environment,
            StressRenderMode::None,
            &mut events,
        );
        assert_eq!(outcome.broken, vec![0]);
        assert!(springs.is_deleted(0));
        assert!(points.connected_springs(0).is_empty());

        // Deleted springs stay deleted and exert nothing
        springs.update_for_strains(&mut points, &environment, StressRenderMode::None, &mut events);
        let mut forces = vec![Vector::ZERO; 2];
        springs.apply_spring_forces(0..1, points.positions(), points.velocities(), &mut forces);
        assert_eq!(forces, vec![Vector::ZERO; 2]);
        assert_eq!(
            sink.count_matching(|e| matches!(e, SimulationEvent::Break { .. })),
            1
        );

        springs.restore(0, &mut points, &params);
        assert!(!springs.is_deleted(0));
        assert_eq!(points.connected_springs(0).len(), 1);
    }

    #[test]
    fn stress_flag_has_hysteresis() {
        let (mut points, mut springs, _, _) = two_points(0.5);
        let environment = Environment::flat(-100.0, -200.0);
        let mut events = SimulationEventDispatcher::new();
        let threshold = springs.strain_state(0).strain_threshold_fraction;
        let breaking = springs.strain_state(0).breaking_elongation;

        let stretch_to = |points: &mut Points, fraction: Real| {
            points.set_position(1, Vector::new(1.0 + fraction * breaking, 0.0));
        };

        stretch_to(&mut points, (threshold + 1.0) / 2.0);
        let outcome = springs.update_for_strains(&mut points, &environment, StressRenderMode::None, &mut events);
        assert_eq!(outcome.newly_stressed, 1);
        assert!(springs.strain_state(0).is_stressed);

        // Between exit and entry thresholds the flag holds
        stretch_to(&mut points, threshold / 2.0);
        springs.update_for_strains(&mut points, &environment, StressRenderMode::None, &mut events);
        assert!(springs.strain_state(0).is_stressed);

        stretch_to(&mut points, SPRING_STRESS_EXIT_FRACTION / 2.0);
        springs.update_for_strains(&mut points, &environment, StressRenderMode::StressOverlay, &mut events);
        assert!(!springs.strain_state(0).is_stressed);
        assert!(points.stress(0) > 0.0);
    }

    #[test]
    fn melting_weakens_and_lengthens() {
        let (mut points, mut springs, _, params) = two_points(0.5);
        let stiffness = springs.stiffness_coefficient(0);
        points.set_temperature(0, 5000.0);
        points.set_position(1, Vector::new(1.3, 0.0));
        springs.update_dirty_coefficients(&[], &points, &params);
        assert!(springs.stiffness_coefficient(0) < stiffness * 0.01);
        assert_relative_eq!(springs.rest_length(0), 1.3, epsilon = 1e-5);
        assert!(springs.strain_state(0).breaking_elongation > 0.5 * 1.3);

        // Cooling down stiffens again, but only gradually
        points.set_temperature(0, 300.0);
        springs.update_dirty_coefficients(&[], &points, &params);
        let recovering = springs.stiffness_coefficient(0);
        assert!(recovering < stiffness);
        springs.update_dirty_coefficients(&[], &points, &params);
        assert!(springs.stiffness_coefficient(0) > recovering);
    }
}

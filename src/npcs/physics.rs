//! NPC particle physics
//!
//! Free particles integrate ballistically. Constrained particles trace their
//! trajectory through the host mesh in barycentric space: they hop into the
//! neighbouring triangle across non-floor edges, bounce off floor edges,
//! slide along the floor they rest on and become free when they leave the
//! mesh.

use super::database::NpcParticleAttributes;
use super::human_behavior;
use super::state::{
    BarycentricPosition, BeingPlacedState, ConstrainedState, HumanBehavior, NpcCombustionState, NpcKind, NpcParticle,
    NpcState, ParticleMesh, RegimeType, VirtualFloor,
};
use crate::config::{
    GRAVITY, GRAVITY_MAGNITUDE, HALF_MAX_WORLD_HEIGHT, HALF_MAX_WORLD_WIDTH, MAX_NPC_TRAJECTORY_HOPS, NPC_DAMPING,
    NPC_MAX_WATERNESS_DEPTH, NPC_WATER_DRAG_COEFFICIENT, SIMULATION_STEP_TIME_DURATION, SimulationParameters,
    WATER_DENSITY,
};
use crate::core::{ElementIndex, MaterialDatabase, NpcFloorKind, Points, StructuralMaterial, Triangles};
use crate::environment::Environment;
use crate::math::{Real, Vector, converge, normalise_approx, normalise_approx_with_length, perp};
use crate::ship::Ship;
use crate::ship::collisions::bounce;
use crate::ship::world_forces::wind_force;

const FEET: usize = 0;
const HEAD: usize = 1;

/// Barycentric coordinate below which a particle lies on an edge.
const ON_EDGE_EPSILON: Real = 1e-4;
/// Relative speed along the floor above which kinetic friction applies.
const KINETIC_FRICTION_SPEED_THRESHOLD: Real = 0.01;
/// Sine of the steepest slope a human can walk up.
const MAX_WALK_SIN_SLOPE: Real = 0.5;
/// A sliding particle follows a floor it runs into unless it hits it more
/// squarely than this cosine.
const FLOOR_CONTINUATION_COSINE: Real = 0.7;
/// Portion of the body between the water line and the head particle when floating.
const HEAD_FLOAT_LINE_FRACTION: Real = 0.81;
const HEAD_LENGTH_FRACTION: Real = 0.13;
const WORLD_BOUNDS_ELASTICITY: Real = 0.5;

/// A constrained particle hitting a floor edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NpcImpact {
    pub particle_ordinal: usize,
    /// Mesh-relative speed into the floor at the moment of the impact.
    pub normal_response: Real,
    /// Floor edge normal, pointing out of the triangle the particle is in.
    pub bounce_normal: Vector,
}

#[inline]
pub fn particle_mass(attributes: &NpcParticleAttributes, params: &SimulationParameters) -> Real {
    attributes.mass * params.npc_size_multiplier * params.npc_size_multiplier
}

/// Derives masses, buoyancy and spring coefficients from the particle
/// attributes and the current parameters.
pub fn recalculate_mesh_parameters(mesh: &mut ParticleMesh, params: &SimulationParameters) {
    let dt = SIMULATION_STEP_TIME_DURATION;
    let size = params.npc_size_multiplier;

    for particle in &mut mesh.particles {
        particle.mass = particle_mass(&particle.attributes, params);
        particle.buoyancy_factor = GRAVITY_MAGNITUDE
            * WATER_DENSITY
            * params.water_density_adjustment
            * particle.attributes.buoyancy_volume_fill
            * size
            * size;
    }

    for spring in &mut mesh.springs {
        let (a, b) = spring.endpoints;
        let (pa, pb) = (&mesh.particles[a], &mesh.particles[b]);
        let reduced_mass = pa.mass * pb.mass / (pa.mass + pb.mass);
        let reduction_fraction = (pa.attributes.spring_reduction_fraction + pb.attributes.spring_reduction_fraction)
            / 2.0
            * params.npc_spring_reduction_fraction_adjustment;
        let damping_coefficient = (pa.attributes.spring_damping_coefficient + pb.attributes.spring_damping_coefficient)
            / 2.0
            * params.npc_spring_damping_coefficient_adjustment;

        spring.rest_length = spring.base_rest_length * size;
        spring.stiffness_factor = reduction_fraction * reduced_mass / (dt * dt);
        spring.damping_factor = damping_coefficient * reduced_mass / dt;
    }
}

/// Advances the NPC's own fire.
///
/// Progress moves towards -1 in water or when nothing burns around it, and
/// towards 1 while it stands on a burning triangle.
pub fn update_combustion(state: &mut NpcState, ship: &Ship, is_low_frequency_turn: bool) {
    if is_low_frequency_turn {
        let (points, triangles) = (ship.points(), ship.triangles());
        let particles = &state.particle_mesh.particles;

        let is_in_water = particles.iter().any(|particle| particle.waterness > 0.5);
        let is_on_fire = particles.iter().any(|particle| {
            particle.constrained.is_some_and(|constrained| {
                triangles
                    .vertices(constrained.position.triangle)
                    .iter()
                    .any(|&vertex| points.combustion_state(vertex).is_burning())
            })
        });

        let progress = state.combustion_progress;
        state.combustion_progress = if is_in_water {
            progress + (-1.0 - progress) * 0.1
        } else if is_on_fire {
            progress + (1.0 - progress) * 0.3
        } else {
            progress + (-1.0 - progress) * 0.007
        };
    }

    state.combustion_state = if state.combustion_progress > 0.0 {
        let flame_development = state.combustion_state.map_or(0.0, |combustion| combustion.flame_development);
        Some(NpcCombustionState {
            flame_development: converge(flame_development, 1.0, 0.1),
        })
    } else {
        None
    };
}

/// Runs one tick of particle dynamics for a single NPC.
///
/// Returns the floor impacts of its constrained particles, in particle order.
pub fn update_npc_particles(
    state: &mut NpcState,
    ship: &mut Ship,
    environment: &Environment,
    params: &SimulationParameters,
    materials: &MaterialDatabase,
) -> Vec<NpcImpact> {
    let (points, triangles) = ship.particles_and_mesh();

    let mut forces = Vec::with_capacity(state.particle_mesh.particles.len());
    for ordinal in 0..state.particle_mesh.particles.len() {
        let (force, waterness) = preliminary_force(state, ordinal, points, triangles, environment, params);
        let particle = &mut state.particle_mesh.particles[ordinal];
        particle.preliminary_force = force;
        particle.waterness = waterness;
        forces.push(force);
    }
    apply_spring_forces(&state.particle_mesh, points, &mut forces);
    if let Some(force) = equilibrium_torque_force(state, points, params) {
        forces[HEAD] += force;
    }

    let damping = (1.0 - NPC_DAMPING * params.npc_damping_adjustment).clamp(0.0, 1.0);

    let impacts = match (state.current_regime, state.being_placed) {
        (RegimeType::BeingPlaced, Some(being_placed)) => {
            update_being_placed(&state.particle_mesh, being_placed, &forces, points, damping);
            Vec::new()
        }
        _ => update_placed(state, &forces, damping, points, triangles, environment, params, materials),
    };

    for particle in &mut state.particle_mesh.particles {
        maintain_in_world_bounds(points, particle.index);
        particle.external_force = Vector::ZERO;
    }

    impacts
}

fn preliminary_force(
    state: &NpcState,
    ordinal: usize,
    points: &Points,
    triangles: &Triangles,
    environment: &Environment,
    params: &SimulationParameters,
) -> (Vector, Real) {
    let particle = &state.particle_mesh.particles[ordinal];
    let mut force = GRAVITY * particle.mass + particle.external_force;
    if state.current_regime == RegimeType::BeingPlaced {
        return (force, 0.0);
    }

    let position = points.position(particle.index);
    let waterness = match particle.constrained {
        Some(constrained) => mesh_waterness(&constrained.position, points, triangles),
        None => {
            let mut probe = position;
            if ordinal == HEAD && state.kind() == NpcKind::Human {
                let feet = points.position(state.particle_mesh.particles[FEET].index);
                probe.y += -NPC_MAX_WATERNESS_DEPTH * HEAD_FLOAT_LINE_FRACTION + (feet.y - position.y) * HEAD_LENGTH_FRACTION;
            }
            environment.depth(probe).clamp(0.0, NPC_MAX_WATERNESS_DEPTH) / NPC_MAX_WATERNESS_DEPTH
        }
    };

    let air_density = Points::air_density(params.air_temperature);
    let receptivity = particle.attributes.wind_receptivity.min(1.0);
    if !particle.is_constrained() {
        force += wind_force(environment.wind.current_speed(), air_density) * receptivity * (1.0 - waterness);
    }

    if waterness > 0.0 {
        force.y += particle.buoyancy_factor * waterness;
        force -= points.velocity(particle.index) * NPC_WATER_DRAG_COEFFICIENT * params.water_drag_adjustment;
    } else if let Some(field) = environment.wind.radial_wind_field() {
        force += wind_force(field.speed_at(position), air_density) * receptivity;
    }

    (force, waterness)
}

fn mesh_waterness(position: &BarycentricPosition, points: &Points, triangles: &Triangles) -> Real {
    triangles
        .vertices(position.triangle)
        .iter()
        .zip(position.coords)
        .map(|(&vertex, weight)| points.water(vertex) * weight)
        .sum::<Real>()
        .clamp(0.0, 1.0)
}

fn apply_spring_forces(mesh: &ParticleMesh, points: &Points, forces: &mut [Vector]) {
    for spring in &mesh.springs {
        let (a, b) = spring.endpoints;
        let (index_a, index_b) = (mesh.particles[a].index, mesh.particles[b].index);
        let (dir, length) = normalise_approx_with_length(points.position(index_b) - points.position(index_a));

        let spring_force = (length - spring.rest_length) * spring.stiffness_factor;
        let damping_force = (points.velocity(index_b) - points.velocity(index_a)).dot(dir) * spring.damping_factor;
        let force = dir * (spring_force + damping_force);

        forces[a] += force;
        forces[b] -= force;
    }
}

/// Force on the head that pulls an upright human back over its feet.
fn equilibrium_torque_force(state: &NpcState, points: &Points, params: &SimulationParameters) -> Option<Vector> {
    let human = state.human()?;
    let mesh = &state.particle_mesh;
    if human.equilibrium_torque == 0.0 || mesh.particles.len() <= HEAD {
        return None;
    }
    let rest_length = mesh.springs.first()?.rest_length;

    let dt = SIMULATION_STEP_TIME_DURATION;
    let (feet, head) = (&mesh.particles[FEET], &mesh.particles[HEAD]);
    let feet_position = points.position(feet.index);
    let head_velocity = points.velocity(head.index);
    let head_predicted = points.position(head.index) + head_velocity * dt;

    let human_dir = normalise_approx(head_predicted - feet_position);
    let mut radial_dir = perp(human_dir);
    if human_dir.x < 0.0 {
        radial_dir = -radial_dir;
    }

    let stiffness = params.human_npc_equilibrium_torque_stiffness + human.resultant_panic_level.min(1.0) * 0.0005;
    let spring_displacement = (feet_position + Vector::new(0.0, rest_length) - head_predicted).length() * stiffness;
    let damping_displacement =
        -(head_velocity - points.velocity(feet.index)).dot(radial_dir) * params.human_npc_equilibrium_torque_damping;

    Some(radial_dir * (spring_displacement + damping_displacement) * human.equilibrium_torque * head.mass / (dt * dt))
}

/// The anchor follows the pointer; the rest of the mesh dangles from it at
/// rest length.
fn update_being_placed(
    mesh: &ParticleMesh,
    being_placed: BeingPlacedState,
    forces: &[Vector],
    points: &mut Points,
    damping: Real,
) {
    let dt = SIMULATION_STEP_TIME_DURATION;
    let anchor_ordinal = being_placed.anchor_particle_ordinal;
    let Some(anchor) = mesh.particles.get(anchor_ordinal).map(|particle| points.position(particle.index)) else {
        return;
    };

    for (ordinal, particle) in mesh.particles.iter().enumerate() {
        if being_placed.move_whole_mesh || ordinal == anchor_ordinal {
            points.set_velocity(particle.index, Vector::ZERO);
            continue;
        }

        let start = points.position(particle.index);
        let mut end = start + points.velocity(particle.index) * dt + forces[ordinal] / particle.mass * dt * dt;
        if let Some(spring) = mesh
            .springs
            .iter()
            .find(|spring| spring.endpoints == (anchor_ordinal, ordinal) || spring.endpoints == (ordinal, anchor_ordinal))
        {
            let (dir, length) = normalise_approx_with_length(end - anchor);
            if length > 0.0 {
                end = anchor + dir * spring.rest_length;
            }
        }

        points.set_position(particle.index, end);
        points.set_velocity(particle.index, (end - start) / dt * damping);
    }
}

struct ConstrainedInputs {
    /// Signed horizontal walking speed of a walking human's feet.
    walking_speed: Option<Real>,
    damping: Real,
    friction_adjustment: Real,
    elasticity_adjustment: Real,
}

#[derive(Default)]
struct ConstrainedOutcome {
    impact: Option<NpcImpact>,
    distance: Real,
    on_floor: bool,
}

#[allow(clippy::too_many_arguments)]
fn update_placed(
    state: &mut NpcState,
    forces: &[Vector],
    damping: Real,
    points: &mut Points,
    triangles: &Triangles,
    environment: &Environment,
    params: &SimulationParameters,
    materials: &MaterialDatabase,
) -> Vec<NpcImpact> {
    let dt = SIMULATION_STEP_TIME_DURATION;

    let walking_speed = state
        .human()
        .filter(|human| matches!(human.behavior, HumanBehavior::ConstrainedWalking { .. }))
        .map(|human| human.current_face_direction_x * human_behavior::actual_walking_speed(human, params));
    let is_head_upheld = state.human().is_some_and(|human| human.equilibrium_torque != 0.0);

    let mut impacts = Vec::new();
    let mut on_edge_distance = 0.0;
    let mut off_edge_distance = 0.0;

    for (ordinal, particle) in state.particle_mesh.particles.iter_mut().enumerate() {
        if points.is_pinned(particle.index) {
            continue;
        }

        let start = points.position(particle.index);
        let physics_delta = points.velocity(particle.index) * dt + forces[ordinal] / particle.mass * dt * dt;
        let particle_damping = if ordinal == HEAD && is_head_upheld { 1.0 } else { damping };

        if !particle.is_constrained() {
            update_free(points, particle.index, start, start + physics_delta, particle_damping, environment);
            if ordinal == FEET {
                off_edge_distance += physics_delta.length();
            }
            continue;
        }

        let inputs = ConstrainedInputs {
            walking_speed: if ordinal == FEET { walking_speed } else { None },
            damping: particle_damping,
            friction_adjustment: particle.attributes.friction_surface_adjustment
                * params.npc_friction_adjustment
                * params.friction_adjustment,
            elasticity_adjustment: params.elasticity_adjustment,
        };
        let outcome = update_constrained(
            particle,
            ordinal,
            start,
            physics_delta,
            &inputs,
            points,
            triangles,
            materials,
            environment,
        );

        impacts.extend(outcome.impact);
        if ordinal == FEET {
            if outcome.on_floor {
                on_edge_distance += outcome.distance;
            } else {
                off_edge_distance += outcome.distance;
            }
        }
    }

    if let Some(human) = state.human_mut() {
        human.total_distance_traveled_on_edge += on_edge_distance;
        human.total_distance_traveled_off_edge += off_edge_distance;
    }

    impacts
}

fn update_free(points: &mut Points, index: ElementIndex, start: Vector, end: Vector, damping: Real, environment: &Environment) {
    let mut end = end;
    let mut velocity = (end - start) / SIMULATION_STEP_TIME_DURATION * damping;

    let floor = environment.ocean_floor.height_at(end.x);
    if end.y < floor {
        end.y = floor;
        velocity.y = velocity.y.max(0.0);
    }

    points.set_position(index, end);
    points.set_velocity(index, velocity);
}

#[allow(clippy::too_many_arguments)]
fn update_constrained(
    particle: &mut NpcParticle,
    ordinal: usize,
    start: Vector,
    physics_delta: Vector,
    inputs: &ConstrainedInputs,
    points: &mut Points,
    triangles: &Triangles,
    materials: &MaterialDatabase,
    environment: &Environment,
) -> ConstrainedOutcome {
    let dt = SIMULATION_STEP_TIME_DURATION;
    let Some(mut constrained) = particle.constrained else {
        return ConstrainedOutcome::default();
    };

    let mut position = constrained.position;
    let trajectory_start = triangles.from_barycentric(&position.coords, position.triangle, points);
    let mesh_velocity = (trajectory_start - start) / dt;

    let mut current = trajectory_start;
    let mut target = start + physics_delta;
    let mut excluded_edge = None;
    let mut virtual_floor = None;
    let mut is_sliding = false;

    if let Some(edge) = resting_floor_edge(&position, &constrained, target - current, triangles, points) {
        let triangle = position.triangle;
        let edge_dir = normalise_approx(triangles.sub_spring_vector(triangle, edge, points));
        let normal = triangles.edge_outward_normal(triangle, edge, points);
        let trajectory = target - current;

        // Friction eats into the tangential displacement, up to what the
        // pressure against the floor allows
        let material = mesh_material(materials, points, triangles, triangle);
        let particle_friction = if constrained.mesh_relative_velocity.dot(edge_dir).abs() > KINETIC_FRICTION_SPEED_THRESHOLD {
            particle.attributes.kinetic_friction
        } else {
            particle.attributes.static_friction
        };
        let friction = (particle_friction + material.kinetic_friction_coefficient) / 2.0 * inputs.friction_adjustment;
        let mut tangential = trajectory.dot(edge_dir);
        let friction_displacement = tangential.abs().min(friction * trajectory.dot(normal).max(0.0));
        tangential -= friction_displacement * tangential.signum();

        if let Some(walking_speed) = inputs.walking_speed {
            let ideal = walking_speed.abs() * dt;
            let (walk_dir, walked) = if walking_speed * edge_dir.x >= 0.0 {
                (edge_dir, (ideal - tangential).clamp(0.0, ideal))
            } else {
                (-edge_dir, (-ideal - tangential).clamp(-ideal, 0.0))
            };
            tangential += walked * gravity_resistance(walk_dir.y);
        }

        position.coords = snap_to_edge(position.coords, (edge + 2) % 3);
        current = triangles.from_barycentric(&position.coords, triangle, points);
        target = current + edge_dir * tangential;
        excluded_edge = Some(edge);
        virtual_floor = Some(VirtualFloor { triangle, edge });
        is_sliding = true;
    }

    let mut impact = None;
    let mut bounce_velocity = None;
    let mut became_free = false;

    for _ in 0..MAX_NPC_TRAJECTORY_HOPS {
        let triangle = position.triangle;
        let Some(target_coords) = triangles.to_barycentric(target, triangle, points) else {
            became_free = true;
            break;
        };

        let Some((edge, fraction)) = find_exit_edge(&position.coords, &target_coords, excluded_edge) else {
            position.coords = clamp_to_triangle(target_coords);
            current = triangles.from_barycentric(&position.coords, triangle, points);
            break;
        };

        let mut coords = [0.0; 3];
        for (i, coord) in coords.iter_mut().enumerate() {
            *coord = position.coords[i] + (target_coords[i] - position.coords[i]) * fraction;
        }
        position.coords = snap_to_edge(coords, (edge + 2) % 3);
        let intersection = triangles.from_barycentric(&position.coords, triangle, points);
        current = intersection;

        if triangles.floor_kind(triangle, edge) != NpcFloorKind::NotAFloor && !constrained.ghost_pulse {
            let normal = triangles.edge_outward_normal(triangle, edge, points);
            virtual_floor = Some(VirtualFloor { triangle, edge });

            let remaining = target - intersection;
            if is_sliding && remaining.dot(normal) < remaining.length() * FLOOR_CONTINUATION_COSINE {
                // Carry on along the new floor
                let edge_dir = normalise_approx(triangles.sub_spring_vector(triangle, edge, points));
                target = intersection + edge_dir * remaining.dot(edge_dir);
                excluded_edge = Some(edge);
                continue;
            }

            let apparent_velocity = (target - trajectory_start) / dt;
            let normal_speed = apparent_velocity.dot(normal);
            if normal_speed > 0.0 {
                let material = mesh_material(materials, points, triangles, triangle);
                let elasticity = ((particle.attributes.elasticity + material.elasticity_coefficient) / 2.0
                    * inputs.elasticity_adjustment)
                    .clamp(0.0, 1.0);
                let kinetic_friction = (particle.attributes.kinetic_friction + material.kinetic_friction_coefficient) / 2.0
                    * inputs.friction_adjustment;

                let normal_velocity = normal * normal_speed;
                let tangential_velocity = apparent_velocity - normal_velocity;
                let response = -normal_velocity * elasticity + tangential_velocity * (1.0 - kinetic_friction).max(0.0);
                bounce_velocity = Some(response * inputs.damping);
                impact = Some(NpcImpact {
                    particle_ordinal: ordinal,
                    normal_response: normal_speed,
                    bounce_normal: normal,
                });
            } else {
                bounce_velocity = Some(Vector::ZERO);
            }
            break;
        }

        match triangles.opposite_triangle(triangle, edge) {
            Some(opposite) if triangles.is_workable(opposite.triangle, points) => {
                // Shared edge runs the other way in the opposite triangle
                let entry_edge = opposite.edge_ordinal;
                let mut opposite_coords = [0.0; 3];
                opposite_coords[entry_edge] = position.coords[(edge + 1) % 3];
                opposite_coords[(entry_edge + 1) % 3] = position.coords[edge];
                position = BarycentricPosition {
                    triangle: opposite.triangle,
                    coords: opposite_coords,
                };
                excluded_edge = Some(entry_edge);
            }
            _ => {
                became_free = true;
                break;
            }
        }
    }

    if became_free {
        particle.constrained = None;
        update_free(points, particle.index, start, start + physics_delta, inputs.damping, environment);
        return ConstrainedOutcome {
            impact: None,
            distance: physics_delta.length(),
            on_floor: false,
        };
    }

    let relative_velocity = bounce_velocity.unwrap_or_else(|| (current - trajectory_start) / dt * inputs.damping);
    points.set_position(particle.index, current);
    points.set_velocity(particle.index, mesh_velocity + relative_velocity);

    constrained.position = position;
    constrained.mesh_relative_velocity = relative_velocity;
    constrained.current_virtual_floor = virtual_floor;
    constrained.ghost_pulse = false;
    particle.constrained = Some(constrained);

    ConstrainedOutcome {
        impact,
        distance: (current - trajectory_start).length(),
        on_floor: virtual_floor.is_some(),
    }
}

/// Floor edge the particle lies on and is being pushed against, if any.
fn resting_floor_edge(
    position: &BarycentricPosition,
    constrained: &ConstrainedState,
    trajectory: Vector,
    triangles: &Triangles,
    points: &Points,
) -> Option<usize> {
    if constrained.ghost_pulse {
        return None;
    }

    let mut best: Option<(usize, Real)> = None;
    for edge in 0..3 {
        if position.coords[(edge + 2) % 3] > ON_EDGE_EPSILON
            || triangles.floor_kind(position.triangle, edge) == NpcFloorKind::NotAFloor
        {
            continue;
        }
        let pressure = trajectory.dot(triangles.edge_outward_normal(position.triangle, edge, points));
        if pressure >= 0.0 && best.is_none_or(|(_, best_pressure)| pressure > best_pressure) {
            best = Some((edge, pressure));
        }
    }
    best.map(|(edge, _)| edge)
}

/// Walking effort left on a slope whose sine is `sin_slope`.
fn gravity_resistance(sin_slope: Real) -> Real {
    let neighborhood = 1.0 - MAX_WALK_SIN_SLOPE;
    let start = MAX_WALK_SIN_SLOPE - neighborhood / 2.0;
    if sin_slope < start {
        1.0
    } else {
        (1.0 - (sin_slope - start) / neighborhood).max(0.0)
    }
}

/// First edge crossed moving from `from` to `to`, with the crossing fraction.
fn find_exit_edge(from: &[Real; 3], to: &[Real; 3], excluded_edge: Option<usize>) -> Option<(usize, Real)> {
    let mut exit: Option<(usize, Real)> = None;
    for i in 0..3 {
        let edge = (i + 1) % 3;
        if to[i] >= 0.0 || excluded_edge == Some(edge) {
            continue;
        }
        let denominator = from[i] - to[i];
        let fraction = if denominator > 0.0 {
            (from[i] / denominator).clamp(0.0, 1.0)
        } else {
            0.0
        };
        if exit.is_none_or(|(_, best)| fraction < best) {
            exit = Some((edge, fraction));
        }
    }
    exit
}

fn snap_to_edge(mut coords: [Real; 3], zeroed: usize) -> [Real; 3] {
    coords[zeroed] = 0.0;
    let (a, b) = ((zeroed + 1) % 3, (zeroed + 2) % 3);
    coords[a] = coords[a].max(0.0);
    coords[b] = coords[b].max(0.0);
    let sum = coords[a] + coords[b];
    if sum > 0.0 {
        coords[a] /= sum;
        coords[b] /= sum;
    } else {
        coords[a] = 1.0;
    }
    coords
}

fn clamp_to_triangle(coords: [Real; 3]) -> [Real; 3] {
    let clamped = coords.map(|w| w.max(0.0));
    let sum: Real = clamped.iter().sum();
    if sum > 0.0 { clamped.map(|w| w / sum) } else { [1.0 / 3.0; 3] }
}

fn mesh_material<'a>(
    materials: &'a MaterialDatabase,
    points: &Points,
    triangles: &Triangles,
    triangle: ElementIndex,
) -> &'a StructuralMaterial {
    materials.structural(points.material(triangles.point_a(triangle)))
}

pub(crate) fn maintain_in_world_bounds(points: &mut Points, index: ElementIndex) {
    let mut position = points.position(index);
    let mut velocity = points.velocity(index);
    let mut bounced = false;

    if let Some((x, vx)) = bounce(position.x, velocity.x, HALF_MAX_WORLD_WIDTH, WORLD_BOUNDS_ELASTICITY) {
        position.x = x;
        velocity.x = vx;
        bounced = true;
    }
    if let Some((y, vy)) = bounce(position.y, velocity.y, HALF_MAX_WORLD_HEIGHT, WORLD_BOUNDS_ELASTICITY) {
        position.y = y;
        velocity.y = vy;
        bounced = true;
    }

    if bounced {
        points.set_position(index, position);
        points.set_velocity(index, velocity);
    }
}

#[cfg(test)]
mod tests {
    use super::super::Npcs;
    use super::super::test_support::*;
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn exit_edge_is_the_first_crossed() {
        // Leaving through coord 0 first, which is edge 1
        let exit = find_exit_edge(&[0.2, 0.4, 0.4], &[-0.2, -0.1, 1.3], None).unwrap();
        assert_eq!(exit.0, 1);
        assert_relative_eq!(exit.1, 0.5);
        assert!(find_exit_edge(&[0.2, 0.4, 0.4], &[-0.2, 0.4, 0.8], Some(1)).is_none());
    }

    #[test]
    fn snapping_keeps_the_point_on_the_edge() {
        let coords = snap_to_edge([0.3, -0.01, 0.71], 1);
        assert_eq!(coords[1], 0.0);
        assert_relative_eq!(coords[0] + coords[2], 1.0);
    }

    #[test]
    fn slopes_past_the_limit_are_not_walkable() {
        assert_eq!(gravity_resistance(0.0), 1.0);
        assert!(gravity_resistance(0.5) < 1.0);
        assert_eq!(gravity_resistance(0.8), 0.0);
    }

    #[test]
    fn mesh_parameters_scale_with_size() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let id = place_human(&mut npcs, &mut fixture, Vector::new(0.0, 0.5));
        let base_length = npcs.npc(id).unwrap().particle_mesh.springs[0].rest_length;
        let base_mass = npcs.npc(id).unwrap().particle_mesh.particles[0].mass;

        let mut mesh = npcs.npc(id).unwrap().particle_mesh.clone();
        recalculate_mesh_parameters(&mut mesh, &fixture.params.clone().with_npc_size_multiplier(2.0));
        assert_relative_eq!(mesh.springs[0].rest_length, base_length * 2.0, epsilon = 1e-5);
        assert_relative_eq!(mesh.particles[0].mass, base_mass * 4.0, epsilon = 1e-3);
    }

    #[test]
    fn free_particles_fall_under_gravity() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let id = place_human(&mut npcs, &mut fixture, Vector::new(40.0, 20.0));
        let feet = npcs.npc(id).unwrap().particle_mesh.particles[0].index;
        let start = fixture.ship().points().position(feet);

        fixture.tick(&mut npcs);

        let points = fixture.ship().points();
        assert!(points.position(feet).y < start.y);
        assert!(points.velocity(feet).y < 0.0);
    }

    #[test]
    fn pinned_particles_ignore_gravity() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let id = place_human(&mut npcs, &mut fixture, Vector::new(40.0, 20.0));
        let mesh = &npcs.npc(id).unwrap().particle_mesh;
        let (feet, head) = (mesh.particles[0].index, mesh.particles[1].index);
        let params = fixture.params.clone();
        fixture.ships[0].as_mut().unwrap().points_mut().pin(feet, &params);
        let start = fixture.ship().points().position(feet);

        fixture.tick(&mut npcs);

        let points = fixture.ship().points();
        assert_eq!(points.position(feet), start);
        assert_eq!(points.velocity(feet), Vector::ZERO);
        assert!(points.velocity(head).y < 0.0);
    }

    #[test]
    fn dropped_lamp_comes_to_rest_on_the_floor() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let lamp = npcs.database().furniture_id("Lamp").unwrap();
        let picked = npcs
            .begin_place_new_furniture_npc(lamp, Vector::new(0.0, 0.5), false, &mut fixture.ctx())
            .unwrap()
            .picked()
            .unwrap();
        npcs.complete_new_npc(picked.id, &mut fixture.ctx()).unwrap();

        for _ in 0..192 {
            fixture.tick(&mut npcs);
        }

        let state = npcs.npc(picked.id).unwrap();
        assert_eq!(state.current_regime, RegimeType::Constrained);
        let particle = &state.particle_mesh.particles[0];
        assert!(particle.virtual_floor().is_some());
        let points = fixture.ship().points();
        assert_relative_eq!(points.position(particle.index).y, 0.0, epsilon = 1e-3);
        assert!(points.velocity(particle.index).length() < 0.1);
    }

    #[test]
    fn unlit_npc_stays_extinguished() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let id = place_human(&mut npcs, &mut fixture, Vector::new(0.0, 0.5));
        let mut state = npcs.npc(id).unwrap().clone();
        let ship = fixture.ship();

        for _ in 0..50 {
            update_combustion(&mut state, ship, true);
        }
        assert!(state.combustion_state.is_none());
        assert!(state.combustion_progress < -0.2);
    }
}

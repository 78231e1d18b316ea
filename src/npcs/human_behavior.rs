//! Human behavior state machine
//!
//! Runs once per tick after the physics, reading the feet (particle 0) and
//! head (particle 1) and moving the human between its behaviors. Progress
//! accumulators converge exponentially, so every transition is gated by a
//! number of ticks rather than a wall-clock time.

use rand::{Rng, rngs::StdRng};

use super::physics::NpcImpact;
use super::state::{HumanBehavior, HumanNpcState, NpcParticle, NpcState, VirtualFloor};
use crate::config::{NPC_LOW_FREQUENCY_UPDATE_PERIOD, SimulationParameters};
use crate::core::{ElementIndex, Points};
use crate::math::{Real, Vector, converge, is_at_target, normalise_approx, perp, step};
use crate::ship::Ship;

/// Absolute cap on the total walking speed adjustment.
pub const MAX_WALKING_SPEED_ADJUSTMENT: Real = 2.5;

/// Mesh-relative speed above which an upright human loses equilibrium.
const MAX_RELATIVE_VELOCITY_FOR_EQUILIBRIUM: Real = 3.0;
/// Mesh-relative speed along the walk above which a walker loses equilibrium.
const MAX_ALIGNED_RELATIVE_VELOCITY_FOR_WALKING: Real = 5.0;
/// cos(pi / 5.5)
const COS_MAX_STATIC_ANGLE_FOR_EQUILIBRIUM: Real = 0.84;
/// Chord over dt of a human rotating by 0.01 rad.
const MAX_RADIAL_VELOCITY_WHILE_RISING: Real = 1.056;
const MIN_VELOCITY_AGREEMENT_TO_ACCEPT_WALK: Real = 0.025;

const ON_FIRE_PANIC_DECAY: Real = 0.01;
const BOMB_PROXIMITY_PANIC_DECAY: Real = 0.0025;
const MISC_PANIC_DECAY: Real = 0.02;

/// Kinematics of a human's two particles, sampled before the state machine runs.
struct Body {
    feet_position: Vector,
    head_position: Vector,
    /// Mesh-relative where constrained, absolute otherwise.
    feet_velocity: Vector,
    head_velocity: Vector,
    feet_absolute_velocity: Vector,
    head_absolute_velocity: Vector,
    feet_floor: Option<VirtualFloor>,
    head_floor: Option<VirtualFloor>,
    /// Direction of the floor under the feet, or +x.
    floor_vector: Vector,
    feet_waterness: Real,
    head_waterness: Real,
    is_free: bool,
    is_electrified: bool,
    is_bomb_in_proximity: bool,
}

impl Body {
    fn sample(state: &NpcState, ship: &Ship) -> Option<Self> {
        let mesh = &state.particle_mesh;
        let (feet, head) = (mesh.particles.first()?, mesh.particles.get(1)?);
        let (points, triangles) = (ship.points(), ship.triangles());

        let relative_velocity = |particle: &NpcParticle| match particle.constrained {
            Some(constrained) => constrained.mesh_relative_velocity,
            None => points.velocity(particle.index),
        };

        let feet_floor = feet.virtual_floor();
        let floor_vector = feet_floor
            .map(|floor| normalise_approx(triangles.sub_spring_vector(floor.triangle, floor.edge, points)))
            .unwrap_or(Vector::X);

        let any_vertex = |predicate: fn(&Points, ElementIndex) -> bool| {
            mesh.particles
                .iter()
                .filter_map(|particle| particle.constrained)
                .flat_map(|constrained| triangles.vertices(constrained.position.triangle))
                .any(|vertex| predicate(points, vertex))
        };

        Some(Self {
            feet_position: points.position(feet.index),
            head_position: points.position(head.index),
            feet_velocity: relative_velocity(feet),
            head_velocity: relative_velocity(head),
            feet_absolute_velocity: points.velocity(feet.index),
            head_absolute_velocity: points.velocity(head.index),
            feet_floor,
            head_floor: head.virtual_floor(),
            floor_vector,
            feet_waterness: feet.waterness,
            head_waterness: head.waterness,
            is_free: !feet.is_constrained(),
            is_electrified: any_vertex(Points::is_electrified),
            is_bomb_in_proximity: any_vertex(Points::is_bomb_in_proximity),
        })
    }

    #[inline]
    fn are_feet_on_floor(&self) -> bool {
        self.feet_floor.is_some()
    }

    #[inline]
    fn is_head_on_floor(&self) -> bool {
        self.head_floor.is_some()
    }

    #[inline]
    fn human_vector(&self) -> Vector {
        self.head_position - self.feet_position
    }
}

/// Walking speed multiplier from the walk ramp, the global adjustment and panic.
pub fn walking_speed_adjustment(human: &HumanNpcState, params: &SimulationParameters) -> Real {
    (human.current_walking_magnitude
        * params.human_npc_walking_speed_adjustment
        * (1.0 + human.resultant_panic_level.min(1.0) * 3.0))
        .min(MAX_WALKING_SPEED_ADJUSTMENT)
}

/// Walking speed in m/s; zero until the walk ramps up.
pub fn actual_walking_speed(human: &HumanNpcState, params: &SimulationParameters) -> Real {
    human.walking_speed_base * walking_speed_adjustment(human, params)
}

/// Turns a walker around, now or by growing the decision to.
pub fn flip_walk(human: &mut HumanNpcState, immediate: bool) {
    let HumanBehavior::ConstrainedWalking {
        current_flip_decision,
        target_flip_decision,
    } = &mut human.behavior
    else {
        return;
    };

    if immediate {
        human.current_face_direction_x *= -1.0;
        human.current_walking_magnitude = 0.0;
        *current_flip_decision = 0.0;
        *target_flip_decision = 0.0;
    } else {
        *target_flip_decision = 1.0;
    }
}

fn transition_to_free(human: &mut HumanNpcState, body: &Body, now: Real) {
    let behavior = if body.head_waterness > 0.0 && body.feet_waterness > 0.0 {
        HumanBehavior::free_in_water()
    } else {
        HumanBehavior::free_aerial()
    };
    human.transition_to(behavior, now);
}

fn falling_direction_x(body: &Body) -> Real {
    if body.head_velocity.x >= 0.0 { 1.0 } else { -1.0 }
}

fn random_sign(rng: &mut StdRng) -> Real {
    if rng.random_bool(0.5) { 1.0 } else { -1.0 }
}

/// Advances the human's behavior by one tick.
#[allow(clippy::too_many_arguments)]
pub fn update_human(
    state: &mut NpcState,
    ship: &Ship,
    generalized_panic_level: Real,
    params: &SimulationParameters,
    rng: &mut StdRng,
    now: Real,
    sequence_number: u64,
) {
    let Some(body) = Body::sample(state, ship) else {
        return;
    };
    let seed = state.random_normalized_uniform_seed;
    let is_on_fire = state.combustion_state.is_some();
    let is_low_frequency_turn = (u64::from(state.id) + sequence_number) % NPC_LOW_FREQUENCY_UPDATE_PERIOD == 0;

    let Some(human) = state.human_mut() else {
        return;
    };

    human.equilibrium_torque = 0.0;
    human.resultant_panic_level =
        human.on_fire_panic_level + human.bomb_proximity_panic_level + human.misc_panic_level + generalized_panic_level;
    human.on_fire_panic_level -= human.on_fire_panic_level * ON_FIRE_PANIC_DECAY;
    human.bomb_proximity_panic_level -= human.bomb_proximity_panic_level * BOMB_PROXIMITY_PANIC_DECAY;
    human.misc_panic_level -= human.misc_panic_level * MISC_PANIC_DECAY;

    let panic = human.resultant_panic_level.min(1.0);
    let mut ghost_pulse = false;

    match human.behavior {
        HumanBehavior::BeingPlaced => {}

        HumanBehavior::ConstrainedAerial {
            progress_to_falling,
            progress_to_rising,
        } => {
            if body.is_free {
                transition_to_free(human, &body, now);
                return;
            }

            let (target_falling, target_rising) = if body.are_feet_on_floor() || body.is_head_on_floor() {
                let head_along = body.head_velocity.dot(body.floor_vector);
                let feet_along = body.feet_velocity.dot(body.floor_vector);
                if head_along.abs() >= 0.05 || feet_along.abs() >= 0.05 {
                    (1.0, 0.0)
                } else {
                    (0.0, 1.0)
                }
            } else {
                (0.0, 0.0)
            };

            let progress_to_falling = converge(progress_to_falling, target_falling, 0.75);
            let progress_to_rising = converge(progress_to_rising, target_rising, 0.5);

            if target_falling == 1.0 && is_at_target(progress_to_falling, 1.0) {
                human.transition_to(HumanBehavior::constrained_falling(), now);
                if human.current_face_orientation != 0.0 {
                    human.current_face_orientation = 0.0;
                    human.current_face_direction_x = falling_direction_x(&body);
                }
            } else if target_rising == 1.0 && is_at_target(progress_to_rising, 1.0) {
                human.transition_to(HumanBehavior::constrained_rising(), now);
            } else if body.feet_waterness > 0.5 || body.head_waterness > 0.5 {
                human.transition_to(HumanBehavior::constrained_in_water(), now);
            } else {
                human.behavior = HumanBehavior::ConstrainedAerial {
                    progress_to_falling,
                    progress_to_rising,
                };
            }
        }

        HumanBehavior::ConstrainedFalling {
            progress_to_pre_rising,
            progress_to_aerial,
        } => {
            if body.is_free {
                transition_to_free(human, &body, now);
                return;
            }

            let increment = if body.are_feet_on_floor()
                && body.feet_velocity.length() < 0.5
                && body.head_velocity.length() < 0.5
            {
                1.0
            } else {
                -1.0
            };
            let progress_to_pre_rising = (progress_to_pre_rising + increment).max(0.0);
            let pre_rising_target = 20.0 - panic * 10.0;

            if progress_to_pre_rising >= pre_rising_target {
                human.transition_to(HumanBehavior::constrained_pre_rising(), now);
                return;
            }

            let progress_to_aerial = if !body.are_feet_on_floor() && !body.is_head_on_floor() {
                converge(progress_to_aerial, 1.0, 0.35)
            } else {
                0.0
            };
            if increment <= 0.0 && is_at_target(progress_to_aerial, 1.0) {
                human.transition_to(HumanBehavior::constrained_aerial(), now);
                return;
            }

            human.behavior = HumanBehavior::ConstrainedFalling {
                progress_to_pre_rising,
                progress_to_aerial,
            };
        }

        HumanBehavior::ConstrainedKnockedOut {
            progress_to_pre_rising,
            progress_to_aerial,
        } => {
            if body.is_free {
                transition_to_free(human, &body, now);
                return;
            }

            let increment = if body.are_feet_on_floor()
                && body.feet_velocity.length() < MAX_RELATIVE_VELOCITY_FOR_EQUILIBRIUM
                && body.head_velocity.length() < MAX_RELATIVE_VELOCITY_FOR_EQUILIBRIUM
            {
                1.0
            } else {
                -1.0
            };
            let mut progress_to_pre_rising = (progress_to_pre_rising + increment).max(0.0);
            let pre_rising_target = (40.0 + seed * 10.0) / (1.0 + panic);

            if progress_to_pre_rising >= pre_rising_target {
                let human_dir = normalise_approx(body.human_vector());
                if body.are_feet_on_floor() && !body.is_head_on_floor() && human_dir.y < -0.7 {
                    // Upside down with the head through the floor: let it pass
                    ghost_pulse = true;
                    progress_to_pre_rising = 0.0;
                } else {
                    human.transition_to(HumanBehavior::constrained_pre_rising(), now);
                    return;
                }
            }

            let progress_to_aerial = if !body.are_feet_on_floor() && !body.is_head_on_floor() {
                converge(progress_to_aerial, 1.0, 0.2)
            } else {
                0.0
            };
            if increment <= 0.0 && is_at_target(progress_to_aerial, 1.0) {
                human.transition_to(HumanBehavior::constrained_aerial(), now);
            } else {
                human.behavior = HumanBehavior::ConstrainedKnockedOut {
                    progress_to_pre_rising,
                    progress_to_aerial,
                };
            }
        }

        HumanBehavior::ConstrainedPreRising {
            progress_to_rising,
            progress_to_aerial,
        } => {
            if body.is_free {
                transition_to_free(human, &body, now);
                return;
            }

            let increment = if body.are_feet_on_floor()
                && body.feet_velocity.length() < MAX_RELATIVE_VELOCITY_FOR_EQUILIBRIUM
                && body.head_velocity.length() < MAX_RELATIVE_VELOCITY_FOR_EQUILIBRIUM
            {
                1.0
            } else {
                -1.0
            };
            let progress_to_rising = (progress_to_rising + increment).max(0.0);
            if progress_to_rising >= 13.0 + seed * 3.0 {
                human.transition_to(HumanBehavior::constrained_rising(), now);
                return;
            }

            let progress_to_aerial = if !body.are_feet_on_floor() && !body.is_head_on_floor() {
                converge(progress_to_aerial, 1.0, 0.2)
            } else {
                0.0
            };
            if increment <= 0.0 && is_at_target(progress_to_aerial, 1.0) {
                human.transition_to(HumanBehavior::constrained_aerial(), now);
                return;
            }

            human.behavior = HumanBehavior::ConstrainedPreRising {
                progress_to_rising,
                progress_to_aerial,
            };
        }

        HumanBehavior::ConstrainedRising { .. }
        | HumanBehavior::ConstrainedEquilibrium { .. }
        | HumanBehavior::ConstrainedWalking { .. } => {
            if body.is_free {
                transition_to_free(human, &body, now);
                return;
            }
            update_upright(human, &body, params, rng, now, is_low_frequency_turn, is_on_fire);
        }

        HumanBehavior::ConstrainedInWater { progress_to_swimming } => {
            if body.is_free {
                transition_to_free(human, &body, now);
                return;
            }
            if body.feet_waterness < 0.25 && body.head_waterness < 0.25 {
                human.transition_to(HumanBehavior::constrained_aerial(), now);
                return;
            }

            let progress_to_swimming = converge(progress_to_swimming, 1.0, 0.01);
            if progress_to_swimming >= 0.98 {
                let style = if human.current_face_orientation != 0.0 {
                    HumanBehavior::ConstrainedSwimmingStyle1
                } else {
                    HumanBehavior::ConstrainedSwimmingStyle2
                };
                human.transition_to(style, now);
            } else {
                human.behavior = HumanBehavior::ConstrainedInWater { progress_to_swimming };
            }
        }

        HumanBehavior::ConstrainedSwimmingStyle1 | HumanBehavior::ConstrainedSwimmingStyle2 => {
            if body.is_free {
                transition_to_free(human, &body, now);
            } else if body.feet_waterness < 0.25 && body.head_waterness < 0.25 {
                human.transition_to(HumanBehavior::constrained_aerial(), now);
            }
        }

        HumanBehavior::ConstrainedElectrified { progress_to_leaving } => {
            if body.is_free {
                transition_to_free(human, &body, now);
                return;
            }

            let increment = if body.is_electrified { -1.0 } else { 1.0 };
            let progress_to_leaving = (progress_to_leaving + increment).max(0.0);
            if progress_to_leaving >= 8.0 {
                human.transition_to(HumanBehavior::constrained_knocked_out(), now);
            } else {
                human.behavior = HumanBehavior::ConstrainedElectrified { progress_to_leaving };
                human.equilibrium_torque = 1.0;
            }
        }

        HumanBehavior::FreeAerial { progress_to_knocked_out } => {
            if !body.is_free {
                human.transition_to(HumanBehavior::constrained_knocked_out(), now);
                return;
            }
            if body.feet_waterness > 0.0 || body.head_waterness > 0.0 {
                human.transition_to(HumanBehavior::free_in_water(), now);
                return;
            }

            let average_speed = (body.feet_absolute_velocity.length() + body.head_absolute_velocity.length()) / 2.0;
            let target = if average_speed < 0.1 { 1.0 } else { 0.0 };
            let progress_to_knocked_out = converge(progress_to_knocked_out, target, 0.2);
            if target == 1.0 && is_at_target(progress_to_knocked_out, 1.0) {
                human.transition_to(HumanBehavior::free_knocked_out(), now);
            } else {
                human.behavior = HumanBehavior::FreeAerial { progress_to_knocked_out };
            }
        }

        HumanBehavior::FreeKnockedOut { progress_to_aerial } => {
            if !body.is_free {
                human.transition_to(HumanBehavior::constrained_knocked_out(), now);
                return;
            }

            let average_speed = (body.feet_absolute_velocity.length() + body.head_absolute_velocity.length()) / 2.0;
            let target = if average_speed > 0.5 { 1.0 } else { 0.0 };
            let progress_to_aerial = converge(progress_to_aerial, target, 0.2);
            if target == 1.0 && is_at_target(progress_to_aerial, 1.0) {
                human.transition_to(HumanBehavior::free_aerial(), now);
            } else {
                human.behavior = HumanBehavior::FreeKnockedOut { progress_to_aerial };
            }
        }

        HumanBehavior::FreeInWater { progress_to_swimming } => {
            if !body.is_free {
                human.transition_to(HumanBehavior::constrained_knocked_out(), now);
                return;
            }
            if body.feet_waterness == 0.0 && body.head_waterness == 0.0 {
                human.transition_to(HumanBehavior::free_aerial(), now);
                return;
            }

            // Swim once nearly still and with the head above the feet
            let relative_speed = (body.head_absolute_velocity - body.feet_absolute_velocity).length();
            let target = (1.0 - step(2.0, relative_speed)) * step(body.feet_position.y, body.head_position.y);
            let progress_to_swimming = converge(progress_to_swimming, target, 0.12);
            if progress_to_swimming >= 0.9 {
                let style = match rng.random_range(0..4) {
                    0 | 1 => HumanBehavior::FreeSwimmingStyle1,
                    2 => HumanBehavior::FreeSwimmingStyle2,
                    _ => HumanBehavior::FreeSwimmingStyle3,
                };
                human.transition_to(style, now);
                human.current_face_orientation = 1.0;
                human.current_face_direction_x = 0.0;
            } else {
                human.behavior = HumanBehavior::FreeInWater { progress_to_swimming };
            }
        }

        HumanBehavior::FreeSwimmingStyle1 | HumanBehavior::FreeSwimmingStyle2 | HumanBehavior::FreeSwimmingStyle3 => {
            if !body.is_free {
                human.transition_to(HumanBehavior::constrained_knocked_out(), now);
            } else if body.feet_waterness == 0.0 && body.head_waterness == 0.0 {
                human.transition_to(HumanBehavior::free_aerial(), now);
            }
        }
    }

    if ghost_pulse && let Some(constrained) = state.particle_mesh.particles[0].constrained.as_mut() {
        constrained.ghost_pulse = true;
    }
}

/// Rising, equilibrium and walking share the upright checks.
fn update_upright(
    human: &mut HumanNpcState,
    body: &Body,
    params: &SimulationParameters,
    rng: &mut StdRng,
    now: Real,
    is_low_frequency_turn: bool,
    is_on_fire: bool,
) {
    let is_standing = matches!(
        human.behavior,
        HumanBehavior::ConstrainedEquilibrium { .. } | HumanBehavior::ConstrainedWalking { .. }
    );

    if is_low_frequency_turn && is_standing {
        if body.is_electrified {
            human.transition_to(HumanBehavior::constrained_electrified(), now);
            human.current_face_orientation = random_sign(rng);
            human.current_face_direction_x = 0.0;
            human.equilibrium_torque = 1.0;
            return;
        }

        if body.is_bomb_in_proximity {
            if human.bomb_proximity_panic_level < 0.6 {
                human.current_face_direction_x *= -1.0;
            }
            human.bomb_proximity_panic_level = 1.0;
        }
    }

    if is_on_fire {
        if human.on_fire_panic_level < 0.6 {
            human.current_face_direction_x *= -1.0;
        }
        human.on_fire_panic_level = 1.0;
    }

    let panic = human.resultant_panic_level.min(1.0);
    let are_feet_on_floor = body.are_feet_on_floor();

    if let HumanBehavior::ConstrainedEquilibrium { progress_to_walking } = human.behavior
        && are_feet_on_floor
    {
        let progress_to_walking = converge(progress_to_walking, 1.0, 0.12 + panic * 0.12);
        if is_at_target(progress_to_walking, 1.0) {
            human.transition_to(HumanBehavior::constrained_walking(), now);
            human.current_face_orientation = 0.0;
            human.current_face_direction_x = random_sign(rng);
            // Keeps the torque of this tick
            human.equilibrium_torque = 1.0;
            return;
        }
        human.behavior = HumanBehavior::ConstrainedEquilibrium { progress_to_walking };
    }

    let is_walking = matches!(human.behavior, HumanBehavior::ConstrainedWalking { .. });

    // Feet off the floor for too long
    let mut is_state_maintained = if are_feet_on_floor {
        human.equilibrium_soft_termination_decision = 0.0;
        true
    } else {
        let rate = if is_walking {
            let relative_walking_speed = walking_speed_adjustment(human, params);
            (0.25 - (relative_walking_speed - 1.0) / 0.5 * 0.15).clamp(0.1, 0.25)
        } else {
            0.25
        };
        human.equilibrium_soft_termination_decision = converge(human.equilibrium_soft_termination_decision, 1.0, rate);
        !is_at_target(human.equilibrium_soft_termination_decision, 1.0)
    };

    // Sliding with the mesh
    if is_walking {
        let along_walk = body.feet_velocity.dot(Vector::new(human.current_face_direction_x, 0.0));
        if along_walk >= MAX_ALIGNED_RELATIVE_VELOCITY_FOR_WALKING {
            is_state_maintained = false;
        }
    } else if body.feet_velocity.length() >= MAX_RELATIVE_VELOCITY_FOR_EQUILIBRIUM {
        is_state_maintained = false;
    }

    if !is_state_maintained || !check_and_maintain_equilibrium(human, body, are_feet_on_floor) {
        if are_feet_on_floor {
            human.transition_to(HumanBehavior::constrained_falling(), now);
            human.current_face_orientation = 0.0;
            human.current_face_direction_x = falling_direction_x(body);
        } else {
            human.transition_to(HumanBehavior::constrained_aerial(), now);
        }
        return;
    }

    match human.behavior {
        HumanBehavior::ConstrainedRising { .. } => {
            let alignment = normalise_approx(body.human_vector()).y;
            if (alignment - 1.0).abs() < 0.004 {
                human.transition_to(HumanBehavior::constrained_equilibrium(), now);
            }
        }
        HumanBehavior::ConstrainedWalking { .. } if are_feet_on_floor => {
            run_walking_state_machine(human, body, params);
        }
        _ => {}
    }
}

/// False when the human leans out of the vertical sector and keeps rotating
/// away from it; otherwise asks for the upright torque when on a floor.
fn check_and_maintain_equilibrium(human: &mut HumanNpcState, body: &Body, do_maintain: bool) -> bool {
    let human_vector = body.human_vector();
    let human_dir = normalise_approx(human_vector);

    if human_dir.y < COS_MAX_STATIC_ANGLE_FOR_EQUILIBRIUM {
        let relative_velocity = body.head_absolute_velocity - body.feet_absolute_velocity;
        let radial_velocity = relative_velocity.dot(perp(human_dir));
        let max_radial_velocity = if matches!(human.behavior, HumanBehavior::ConstrainedRising { .. }) {
            MAX_RADIAL_VELOCITY_WHILE_RISING
        } else {
            0.0
        };
        if radial_velocity * -human_vector.x > max_radial_velocity {
            return false;
        }
    }

    if do_maintain {
        human.equilibrium_torque = 1.0;
    }
    true
}

fn run_walking_state_machine(human: &mut HumanNpcState, body: &Body, params: &SimulationParameters) {
    if human.current_walking_magnitude != 0.0 {
        let ideal_velocity = Vector::new(human.current_face_direction_x * actual_walking_speed(human, params), 0.0);
        if body.feet_velocity.dot(ideal_velocity) < MIN_VELOCITY_AGREEMENT_TO_ACCEPT_WALK {
            flip_walk(human, false);
        } else if let HumanBehavior::ConstrainedWalking {
            current_flip_decision,
            target_flip_decision,
        } = &mut human.behavior
        {
            *current_flip_decision = 0.0;
            *target_flip_decision = 0.0;
        }
    }

    let mut flip_now = false;
    if let HumanBehavior::ConstrainedWalking {
        current_flip_decision,
        target_flip_decision,
    } = &mut human.behavior
    {
        *current_flip_decision = converge(*current_flip_decision, *target_flip_decision, 0.1);
        flip_now = *current_flip_decision >= 0.95;
    }
    if flip_now {
        flip_walk(human, true);
    }

    let rate = 0.10 + human.resultant_panic_level.min(1.0) * 0.08;
    human.current_walking_magnitude = converge(human.current_walking_magnitude, 1.0, rate);
}

/// Reacts to a particle of the human bumping into a floor.
pub fn on_human_impact(human: &mut HumanNpcState, impact: &NpcImpact, now: Real) {
    const HEAD: usize = 1;
    const FEET: usize = 0;

    match human.behavior {
        HumanBehavior::ConstrainedRising { .. } => {
            if impact.particle_ordinal == HEAD && impact.normal_response.abs() > 0.4 {
                human.transition_to(HumanBehavior::constrained_knocked_out(), now);
            }
        }
        HumanBehavior::ConstrainedEquilibrium { .. } => {
            if impact.particle_ordinal == HEAD && impact.normal_response.abs() > 1.5 {
                human.transition_to(HumanBehavior::constrained_knocked_out(), now);
            }
        }
        HumanBehavior::ConstrainedWalking { .. } => {
            // 1 when walking straight into a wall
            let bounce_slope = impact.bounce_normal.dot(Vector::new(human.current_face_direction_x, 0.0));
            if ((impact.particle_ordinal == FEET && bounce_slope > 0.85)
                || (impact.particle_ordinal == HEAD && bounce_slope > 0.5))
                && human.current_walking_magnitude != 0.0
            {
                flip_walk(human, true);
            }
        }
        _ => {}
    }
}

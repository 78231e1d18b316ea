//! Human limb animation
//!
//! Limb angles are measured from the body axis pointing from head to feet:
//! 0 hangs along the body, positive angles rotate counter-clockwise. Every
//! behavior picks a target pose and a rate; angles and lengths then converge
//! exponentially toward it.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use super::human_behavior::actual_walking_speed;
use super::state::{HumanBehavior, LimbVector, NpcState, VirtualFloor};
use crate::config::{GRAVITY_DIR, SimulationParameters};
use crate::math::{Real, Vector, angle_cw, converge, linear_step, normalise_approx, perp, rotate, smooth_step};
use crate::ship::Ship;

/// Arm angle of a human standing at rest.
pub const INITIAL_ARM_ANGLE: Real = FRAC_PI_2 * 0.3;
/// Ticks a rising human remembers the floor it pushes against after losing it.
pub const RISING_EDGE_MEMORY_TICKS: u32 = 32;

/// Leg length as a fraction of body height.
pub const LEG_LENGTH_FRACTION: Real = 0.52;
/// Step length as a fraction of body height.
pub const STEP_LENGTH_FRACTION: Real = 0.26;

const MAX_HUMAN_EDGE_ANGLE_FOR_ARMS: Real = 0.40489;
const MIN_PRE_RISING_ARM_LENGTH_MULTIPLIER: Real = 0.35;
const MAX_LEG_LENGTH_MULTIPLIER: Real = 1.4;
const TRAPPELEN_EXTENT: Real = 0.3;

/// Floor endpoints and direction, as seen from the feet.
#[derive(Clone, Copy)]
struct FloorEdge {
    start: Vector,
    end: Vector,
}

impl FloorEdge {
    fn of(floor: VirtualFloor, ship: &Ship) -> Self {
        let (points, triangles) = (ship.points(), ship.triangles());
        let vertices = triangles.vertices(floor.triangle);
        Self {
            start: points.position(vertices[floor.edge]),
            end: points.position(vertices[(floor.edge + 1) % 3]),
        }
    }

    #[inline]
    fn vector(&self) -> Vector {
        self.end - self.start
    }
}

/// Triangle wave in [0, 1] with the given period.
#[inline]
fn triangle_wave(arg: Real, period: Real) -> Real {
    let in_period = arg.rem_euclid(period);
    let half = period / 2.0;
    if in_period < half {
        in_period / half
    } else {
        1.0 - (in_period - half) / half
    }
}

/// Updates the target pose of a human and converges its limbs toward it.
pub fn update_human_animation(state: &mut NpcState, ship: &Ship, params: &SimulationParameters, now: Real) {
    let mesh = &state.particle_mesh;
    let (Some(feet), Some(head)) = (mesh.particles.first(), mesh.particles.get(1)) else {
        return;
    };
    let Some(height) = mesh.springs.first().map(|spring| spring.rest_length) else {
        return;
    };

    let points = ship.points();
    let feet_position = points.position(feet.index);
    let head_position = points.position(head.index);
    let feet_velocity = points.velocity(feet.index);
    let head_velocity = points.velocity(head.index);
    let feet_relative_velocity = feet
        .constrained
        .map_or(feet_velocity, |constrained| constrained.mesh_relative_velocity);
    let feet_floor = feet.virtual_floor();
    let feet_edge = feet_floor.map(|floor| FloorEdge::of(floor, ship));
    let head_waterness = head.waterness;
    let seed = state.random_normalized_uniform_seed;

    let Some(human) = state.human_mut() else {
        return;
    };

    // From head to feet
    let body_vector = feet_position - head_position;
    let body_dir = normalise_approx(body_vector);
    let average_velocity = (feet_velocity + head_velocity) / 2.0;
    let elapsed = human.elapsed(now);
    let panic = human.resultant_panic_level;
    let animation = human.animation;

    let mut target = LimbVector::default();
    let rate: Real;
    let mut target_upper_leg_length_fraction = 1.0;
    let mut target_lengths = LimbVector::splat(1.0);
    let mut length_rate: Option<Real> = None;
    let mut target_crotch_height_multiplier = 1.0;
    let mut periodic_value: Option<Real> = None;

    if let HumanBehavior::ConstrainedRising {
        virtual_edge_rising_against,
        ticks_without_edge,
    } = &mut human.behavior
    {
        match feet_floor {
            Some(floor) => {
                *virtual_edge_rising_against = Some(floor);
                *ticks_without_edge = 0;
            }
            None => {
                *ticks_without_edge += 1;
                if *ticks_without_edge > RISING_EDGE_MEMORY_TICKS {
                    *virtual_edge_rising_against = None;
                }
            }
        }
    }

    match human.behavior {
        HumanBehavior::BeingPlaced => {
            let arg = (elapsed + human.total_distance_traveled_off_edge * 0.2) * (1.0 + panic * 0.2) * (TAU + seed * 4.0);
            target.right_arm = FRAC_PI_2 + FRAC_PI_2 * 0.7 * arg.sin();
            target.left_arm = -target.right_arm;
            target.right_leg = (1.0 + (arg + seed * TAU).sin()) / 2.0 * FRAC_PI_2 * 0.3;
            target.left_leg = -target.right_leg;
            rate = 0.3;
        }

        HumanBehavior::ConstrainedPreRising { .. } => {
            if let Some(edge) = feet_edge {
                // Push against the floor with the arms on the head's side
                if (head_position - feet_position).dot(edge.vector()) >= 0.0 {
                    target.left_arm = -FRAC_PI_2;
                    target.right_arm = -FRAC_PI_2 + 0.3;
                } else {
                    target.right_arm = FRAC_PI_2;
                    target.left_arm = FRAC_PI_2 - 0.3;
                }
            }
            rate = 0.09;
            target_lengths.right_arm = MIN_PRE_RISING_ARM_LENGTH_MULTIPLIER;
            target_lengths.left_arm = MIN_PRE_RISING_ARM_LENGTH_MULTIPLIER;
        }

        HumanBehavior::ConstrainedRising {
            virtual_edge_rising_against,
            ..
        } => {
            let edge = virtual_edge_rising_against
                .filter(|floor| !ship.triangles().is_deleted(floor.triangle))
                .map(|floor| FloorEdge::of(floor, ship));
            match edge {
                Some(edge) => {
                    let pose = rising_pose(
                        edge.vector(),
                        head_position - feet_position,
                        human.current_face_orientation,
                        human.current_face_direction_x,
                    );
                    target = pose.angles;
                    target_upper_leg_length_fraction = pose.upper_leg_length_fraction;
                    let arm_length = MIN_PRE_RISING_ARM_LENGTH_MULTIPLIER
                        + (pose.human_edge_angle / MAX_HUMAN_EDGE_ANGLE_FOR_ARMS).clamp(0.0, 1.0)
                            * (1.0 - MIN_PRE_RISING_ARM_LENGTH_MULTIPLIER);
                    target_lengths.right_arm = arm_length;
                    target_lengths.left_arm = arm_length;
                }
                None => {
                    target = animation.limb_angles;
                    target_upper_leg_length_fraction = animation.upper_leg_length_fraction;
                    target_lengths.right_arm = animation.limb_length_multipliers.right_arm;
                    target_lengths.left_arm = animation.limb_length_multipliers.left_arm;
                }
            }
            rate = 0.45;
        }

        HumanBehavior::ConstrainedEquilibrium { .. } => {
            target.right_arm = INITIAL_ARM_ANGLE;
            target.left_arm = -INITIAL_ARM_ANGLE;
            rate = 0.1;
        }

        HumanBehavior::ConstrainedWalking { .. } => {
            let speed = actual_walking_speed(human, params);
            let max_leg_angle = 0.41 * (speed * 0.9).sqrt();
            let step_length = STEP_LENGTH_FRACTION * height;
            let distance = human.total_distance_traveled_on_edge + 0.3 * human.total_distance_traveled_off_edge;
            let in_two_steps = (distance + 3.0 * step_length / 2.0).rem_euclid(step_length * 2.0);
            let leg_angle = (step_length - in_two_steps).abs() / step_length * 2.0 * max_leg_angle - max_leg_angle;
            target.right_leg = leg_angle;
            target.left_leg = -leg_angle;

            if panic < 0.32 {
                target.right_arm = target.left_leg * (1.4 + (speed - 1.0) * 0.4);
            } else {
                let half_period = 1.0 - 0.6 * panic.min(4.0) / 4.0;
                let in_period = elapsed.rem_euclid(half_period * 2.0);
                let angle = (half_period - in_period).abs() / half_period * 2.0 * FRAC_PI_2 - FRAC_PI_2;
                target.right_arm = PI - angle * (0.4 + 0.3 * (1.0 - panic.min(2.0) / 2.0));
            }
            target.left_arm = -target.right_arm;
            rate = 0.25;

            if let Some(edge) = feet_edge {
                // Shorter strides on slopes
                let alignment = normalise_approx(edge.vector()).dot(perp(body_dir)).abs();
                let factor = alignment * alignment * alignment;
                target.right_leg *= factor;
                target.left_leg *= factor;

                // Stretch legs down to the floor
                target_crotch_height_multiplier = animation.limb_angles.right_leg.cos();
                let leg_length = LEG_LENGTH_FRACTION * height;
                let crotch = feet_position - body_vector * (LEG_LENGTH_FRACTION * target_crotch_height_multiplier);
                let edge_vector = edge.vector();
                let numerator = (edge.start.y - crotch.y) * edge_vector.x + (crotch.x - edge.start.x) * edge_vector.y;
                let reach = |angle: Real| -> Option<Real> {
                    let leg = rotate(body_dir, angle.cos(), angle.sin()) * leg_length;
                    let cross = edge_vector.perp_dot(leg);
                    if cross.abs() <= 1e-7 {
                        return None;
                    }
                    let candidate = numerator / cross;
                    (candidate > 0.01).then(|| candidate.min(MAX_LEG_LENGTH_MULTIPLIER))
                };
                if let Some(length) = reach(animation.limb_angles.right_leg) {
                    target_lengths.right_leg = length;
                }
                if let Some(length) = reach(animation.limb_angles.left_leg) {
                    target_lengths.left_leg = length;
                }
                length_rate = Some(0.09);
            }
        }

        HumanBehavior::ConstrainedElectrified { .. } => {
            const RIGHT_ARMS: [Real; 5] = [FRAC_PI_2, PI * 3.0 / 4.0, PI / 5.0, PI - 0.01, PI / 4.0];
            const LEFT_ARMS: [Real; 5] = [PI - 0.01, PI / 4.0, FRAC_PI_2, PI / 5.0, PI * 3.0 / 4.0];
            const RIGHT_LEGS: [Real; 4] = [FRAC_PI_2, 0.0, PI / 4.0, 0.0];
            const LEFT_LEGS: [Real; 4] = [0.0, PI / 4.0, 0.0, FRAC_PI_2];

            let phase = ((elapsed + (2.0 + seed) * 3.0) / 0.09).max(0.0) as usize;
            target.right_arm = RIGHT_ARMS[phase % 5];
            target.left_arm = -LEFT_ARMS[phase % 5];
            target.right_leg = RIGHT_LEGS[phase % 4];
            target.left_leg = -LEFT_LEGS[phase % 4];
            rate = 0.5;
        }

        HumanBehavior::ConstrainedFalling { .. } => {
            let depth = linear_step(0.0, 0.8, average_velocity.dot(perp(body_dir)).abs());
            if human.current_face_direction_x >= 0.0 {
                target.right_arm = FRAC_PI_2 * depth + 0.04;
                target.left_arm = target.right_arm - 0.08;
            } else {
                target.left_arm = -FRAC_PI_2 * depth - 0.04;
                target.right_arm = target.left_arm + 0.08;
            }
            target.right_leg = 0.05;
            target.left_leg = -0.05;
            rate = 0.1;
        }

        HumanBehavior::ConstrainedKnockedOut { .. } | HumanBehavior::FreeKnockedOut { .. } => {
            // Arms fall to whichever side of the body is closest
            let rest = |angle: Real, flat: Real| if (-FRAC_PI_2..=FRAC_PI_2).contains(&angle) { 0.0 } else { flat };
            target.right_arm = rest(animation.limb_angles.right_arm, PI);
            target.left_arm = rest(animation.limb_angles.left_arm, -PI);
            rate = 0.2;
        }

        HumanBehavior::ConstrainedAerial { .. }
        | HumanBehavior::ConstrainedInWater { .. }
        | HumanBehavior::FreeAerial { .. }
        | HumanBehavior::FreeInWater { .. } => {
            let horizontality = body_dir.dot(GRAVITY_DIR).abs();
            let arm = if feet_floor.is_some() {
                PI * 2.0 / 3.0
            } else {
                PI - (PI - PI * 2.0 / 3.0) / (horizontality * 2.2).exp()
            };
            target.right_arm = arm;
            target.left_arm = -arm;

            let radial = average_velocity.dot(perp(body_dir));
            let leg = smooth_step(0.0, 4.0, radial.abs()) * 0.8 * if radial >= 0.0 { -1.0 } else { 1.0 };
            target.right_leg = leg + 0.3;
            target.left_leg = leg - 0.3;
            rate = 0.1;
        }

        HumanBehavior::ConstrainedSwimmingStyle1 | HumanBehavior::FreeSwimmingStyle1 => {
            const PERIOD_1: Real = 3.0;
            const PERIOD_2: Real = 1.0;
            const LEAD_IN_TIME: Real = 6.0;

            let elapsed = if elapsed < LEAD_IN_TIME {
                elapsed / LEAD_IN_TIME * PERIOD_1
            } else {
                elapsed - PERIOD_1
            };
            let accelerator = 1.0 + panic.min(2.0) / 2.0 * 4.0;
            let arg = PERIOD_1 / 2.0 + elapsed * 2.6 * accelerator + human.total_distance_traveled_off_edge * 0.7;
            let in_period = arg.rem_euclid(PERIOD_1 + PERIOD_2);
            let y = if in_period < PERIOD_1 {
                (in_period / PERIOD_1).sqrt()
            } else {
                let t = in_period - PERIOD_1 - PERIOD_2;
                t * t / PERIOD_2.sqrt()
            };
            let depth_damper = head_waterness.clamp(0.0, 1.0);

            target.right_arm = FRAC_PI_2 + (y * 2.0 - 1.0) * 1.45 * (depth_damper * 0.75 + 0.25);
            target.left_arm = -target.right_arm;
            target.right_leg = 0.25 * (depth_damper * 0.5 + 0.5) + (y * 2.0 - 1.0) * 0.25 * (depth_damper * 0.35 + 0.65);
            target.left_leg = -target.right_leg;
            rate = 0.01 + elapsed.clamp(0.0, 3.5) / 3.5 * 0.24;
        }

        HumanBehavior::ConstrainedSwimmingStyle2 => {
            let y = triangle_wave(elapsed * 2.3 + human.total_distance_traveled_off_edge * 0.7, 3.0);
            let arm_center = human.current_face_direction_x * FRAC_PI_2;
            let aperture = FRAC_PI_2 * (y - 0.5);
            target.right_arm = arm_center + aperture;
            target.left_arm = arm_center - aperture;

            // Legs trail the motion
            let velocity_angle = angle_cw(body_vector, feet_relative_velocity);
            let leg_center = if velocity_angle >= 0.0 {
                (PI - velocity_angle).min(PI / 3.0)
            } else {
                (-PI - velocity_angle).max(-PI / 3.0)
            } * linear_step(0.0, 3.0, feet_relative_velocity.length());
            target.right_leg = leg_center + aperture;
            target.left_leg = leg_center - aperture;
            rate = 0.01 + elapsed.clamp(0.0, 2.0) / 2.0 * 0.19;
        }

        HumanBehavior::FreeSwimmingStyle2 => {
            let accelerator = 1.0 + panic.min(2.0) / 2.0;
            let value = triangle_wave(elapsed * 2.6 * accelerator + human.total_distance_traveled_off_edge * 0.7, 2.0);
            target.right_arm = INITIAL_ARM_ANGLE + (value - 0.5) * PI / 8.0;
            target.left_arm = -target.right_arm;
            rate = 0.01 + elapsed.clamp(0.0, 3.5) / 3.5 * 0.24;
            periodic_value = Some(value);
        }

        HumanBehavior::FreeSwimmingStyle3 => {
            let accelerator = 1.0 + panic.min(2.0) / 2.0 * 2.0;
            let value = triangle_wave(elapsed * 2.6 * accelerator + human.total_distance_traveled_off_edge * 0.7, 2.0);
            let angle_1 = (PI - INITIAL_ARM_ANGLE) + (value - 0.5) * PI / 8.0;
            let angle_2 = -INITIAL_ARM_ANGLE;
            if seed >= 0.0 {
                target.right_arm = angle_1;
                target.left_arm = angle_2;
            } else {
                target.right_arm = -angle_2;
                target.left_arm = -angle_1;
            }
            rate = 0.01 + elapsed.clamp(0.0, 3.5) / 3.5 * 0.24;
            periodic_value = Some(value);
        }
    }

    if let Some(value) = periodic_value {
        target_lengths.right_leg = 1.0 - (1.0 - value) * TRAPPELEN_EXTENT;
        target_lengths.left_leg = 1.0 - value * TRAPPELEN_EXTENT;
    }

    let animation = &mut human.animation;
    animation.limb_angles.converge_to(&target, rate);
    animation.upper_leg_length_fraction = target_upper_leg_length_fraction;
    animation
        .limb_length_multipliers
        .converge_to(&target_lengths, length_rate.unwrap_or(rate));
    animation.crotch_height_multiplier = converge(animation.crotch_height_multiplier, target_crotch_height_multiplier, rate);
}

struct RisingPose {
    angles: LimbVector,
    upper_leg_length_fraction: Real,
    /// Angle between the floor and the body, mirrored to the near side.
    human_edge_angle: Real,
}

/// Pose of a human pushing itself up against a floor edge.
fn rising_pose(edge_vector: Vector, human_vector: Vector, face_orientation: Real, face_direction_x: Real) -> RisingPose {
    const MAX_ARM_ANGLE: Real = FRAC_PI_2;
    const REST_ARM_ANGLE: Real = INITIAL_ARM_ANGLE * 0.3;
    const OTHER_ARM_DELTA_ANGLE: Real = 0.3;
    const OTHER_LEG_ALPHA: Real = 0.87;

    // Also the angle between the edge and the vertical
    let mut max_human_edge_angle = angle_cw(edge_vector, Vector::Y);
    let mut human_edge_angle = angle_cw(edge_vector, human_vector);
    if human_edge_angle < 0.0 {
        human_edge_angle = if human_edge_angle >= -FRAC_PI_2 { 0.0 } else { PI };
    }

    // Head to the left of the edge, exploiting its clockwise winding
    let is_on_left_side = human_edge_angle <= max_human_edge_angle;
    if !is_on_left_side {
        human_edge_angle = PI - human_edge_angle;
        max_human_edge_angle = PI - max_human_edge_angle;
    }

    let arm = if human_edge_angle <= MAX_HUMAN_EDGE_ANGLE_FOR_ARMS {
        MAX_ARM_ANGLE
    } else {
        MAX_ARM_ANGLE
            + (MAX_HUMAN_EDGE_ANGLE_FOR_ARMS - human_edge_angle) / (MAX_HUMAN_EDGE_ANGLE_FOR_ARMS - max_human_edge_angle)
                * (REST_ARM_ANGLE - MAX_ARM_ANGLE)
    };

    let mut leg = 0.0;
    let mut upper_leg_length_fraction = 1.0;
    if face_orientation == 0.0 {
        const LEG_ANGLE_0: Real = PI * 0.37;
        let angle_1 = MAX_HUMAN_EDGE_ANGLE_FOR_ARMS * 0.9;
        let angle_2 = MAX_HUMAN_EDGE_ANGLE_FOR_ARMS * 1.5;
        let angle_3 = angle_2 + (max_human_edge_angle - angle_2) * 5.0 / 6.0;

        (leg, upper_leg_length_fraction) = if human_edge_angle < angle_1 {
            (human_edge_angle / angle_1 * LEG_ANGLE_0, 0.5)
        } else if human_edge_angle < angle_2 {
            (LEG_ANGLE_0, 0.5)
        } else if human_edge_angle < angle_3 {
            (LEG_ANGLE_0 * (1.0 - (human_edge_angle - angle_2) / (angle_3 - angle_2)), 0.5)
        } else {
            (0.0, 0.0)
        };

        if (face_direction_x > 0.0 && is_on_left_side) || (face_direction_x < 0.0 && !is_on_left_side) {
            leg *= -0.8;
        }
    }

    let mut angles = LimbVector::default();
    if is_on_left_side {
        angles.left_arm = -arm;
        angles.right_arm = angles.left_arm + OTHER_ARM_DELTA_ANGLE;
        angles.left_leg = -leg;
        angles.right_leg = angles.left_leg * OTHER_LEG_ALPHA;
    } else {
        angles.right_arm = arm;
        angles.left_arm = angles.right_arm - OTHER_ARM_DELTA_ANGLE;
        angles.right_leg = leg;
        angles.left_leg = angles.right_leg * OTHER_LEG_ALPHA;
    }

    RisingPose {
        angles,
        upper_leg_length_fraction,
        human_edge_angle,
    }
}

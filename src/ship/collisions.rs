//! Sea floor and world boundary handling for structural particles.

use crate::config::{HALF_MAX_WORLD_HEIGHT, HALF_MAX_WORLD_WIDTH, MAX_BOUNCE_VELOCITY};
use crate::core::Points;
use crate::environment::Environment;
use crate::math::Real;

/// Bounces particles off the sea floor.
///
/// A particle below the floor and moving into it is moved back along its
/// velocity; the normal part of its velocity is scaled by the (negative)
/// elastic factor and the tangential part is reduced by friction.
pub fn handle_collisions_with_sea_floor(points: &mut Points, environment: &Environment, dt: Real) {
    for index in 0..points.structural_count() {
        if points.is_pinned(index) {
            continue;
        }

        let mut position = points.position(index);
        position.x = position.x.clamp(-HALF_MAX_WORLD_WIDTH, HALF_MAX_WORLD_WIDTH);

        let floor_height = environment.ocean_floor.height_at(position.x);
        if position.y >= floor_height {
            continue;
        }

        let normal = environment.ocean_floor.normal_at(position.x);
        let velocity = points.velocity(index);
        if velocity.dot(-normal) <= 0.0 {
            continue;
        }

        let factors = points.ocean_floor_collision_factors(index);
        let normal_velocity = normal * velocity.dot(normal);
        let tangential_velocity = velocity - normal_velocity;

        points.set_position(index, position - velocity * dt);
        points.set_velocity(
            index,
            normal_velocity * factors.elastic_factor + tangential_velocity * (1.0 - factors.friction_factor),
        );
    }
}

/// Keeps particles inside the world box.
///
/// Overshooting particles are reflected back inside by `elasticity` times
/// the overshoot, with the offending velocity component flipped and capped.
pub fn trim_for_world_bounds(points: &mut Points, elasticity: Real) -> usize {
    let mut trimmed = 0;
    for index in 0..points.structural_count() {
        if points.is_pinned(index) {
            continue;
        }

        let mut position = points.position(index);
        let mut velocity = points.velocity(index);
        let mut is_out = false;

        if let Some((p, v)) = bounce(position.x, velocity.x, HALF_MAX_WORLD_WIDTH, elasticity) {
            (position.x, velocity.x) = (p, v);
            is_out = true;
        }
        if let Some((p, v)) = bounce(position.y, velocity.y, HALF_MAX_WORLD_HEIGHT, elasticity) {
            (position.y, velocity.y) = (p, v);
            is_out = true;
        }

        if is_out {
            points.set_position(index, position);
            points.set_velocity(index, velocity);
            trimmed += 1;
        }
    }

    trimmed
}

#[inline(always)]
pub(crate) fn bounce(p: Real, v: Real, half_extent: Real, elasticity: Real) -> Option<(Real, Real)> {
    if p < -half_extent {
        let overshoot = -half_extent - p;
        Some((-half_extent + elasticity * overshoot, v.abs().min(MAX_BOUNCE_VELOCITY)))
    } else if p > half_extent {
        let overshoot = p - half_extent;
        Some((half_extent - elasticity * overshoot, -v.abs().min(MAX_BOUNCE_VELOCITY)))
    } else {
        None
    }
}

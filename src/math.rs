//! Scalar and vector helpers shared by the mesh and NPC solvers.

use bevy::math::Vec2;
use nalgebra::{Matrix2, Vector2};

pub type Real = f32;
pub type Vector = Vec2;

/// Below this squared length a vector is treated as degenerate.
const NORMALISE_EPSILON: Real = 1e-12;

#[inline(always)]
pub fn zero_vector() -> Vector {
    Vec2::ZERO
}

/// Normalizes `v`, returning zero for (near) zero-length input instead of NaN.
#[inline(always)]
pub fn normalise_approx(v: Vector) -> Vector {
    let length_squared = v.length_squared();
    if length_squared < NORMALISE_EPSILON {
        Vec2::ZERO
    } else {
        v / length_squared.sqrt()
    }
}

/// Same as [`normalise_approx`] but also hands back the length it divided by.
#[inline(always)]
pub fn normalise_approx_with_length(v: Vector) -> (Vector, Real) {
    let length = v.length();
    if length * length < NORMALISE_EPSILON {
        (Vec2::ZERO, length)
    } else {
        (v / length, length)
    }
}

/// Counter-clockwise perpendicular.
#[inline(always)]
pub fn perp(v: Vector) -> Vector {
    Vec2::new(-v.y, v.x)
}

/// Signed angle, positive clockwise, that rotates `a` onto `b`.
#[inline(always)]
pub fn angle_cw(a: Vector, b: Vector) -> Real {
    -(a.x * b.y - a.y * b.x).atan2(a.x * b.x + a.y * b.y)
}

/// Rotates `v` by the angle whose cosine and sine are given.
#[inline(always)]
pub fn rotate(v: Vector, cos: Real, sin: Real) -> Vector {
    Vec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
}

#[inline(always)]
pub fn mix(a: Real, b: Real, t: Real) -> Real {
    a + (b - a) * t
}

#[inline(always)]
pub fn step(edge: Real, x: Real) -> Real {
    if x < edge { 0.0 } else { 1.0 }
}

#[inline(always)]
pub fn linear_step(edge0: Real, edge1: Real, x: Real) -> Real {
    ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0)
}

#[inline(always)]
pub fn smooth_step(edge0: Real, edge1: Real, x: Real) -> Real {
    let t = linear_step(edge0, edge1, x);
    t * t * (3.0 - 2.0 * t)
}

/// Exponential convergence of `current` toward `target`.
#[inline(always)]
pub fn converge(current: Real, target: Real, rate: Real) -> Real {
    current + (target - current) * rate
}

#[inline(always)]
pub fn is_at_target(value: Real, target: Real) -> bool {
    (target - value).abs() < 0.01
}

#[inline(always)]
pub fn are_vertices_in_cw_order(a: Vector, b: Vector, c: Vector) -> bool {
    (b - a).perp_dot(c - a) < 0.0
}

/// Barycentric coordinates of `p` with respect to triangle `(a, b, c)`.
///
/// Returns `None` for degenerate triangles.
pub fn barycentric_coordinates(p: Vector, a: Vector, b: Vector, c: Vector) -> Option<[Real; 3]> {
    let basis = Matrix2::new(b.x - a.x, c.x - a.x, b.y - a.y, c.y - a.y);
    let inverse = basis.try_inverse()?;
    let local = inverse * Vector2::new(p.x - a.x, p.y - a.y);
    let (b1, b2) = (local.x, local.y);
    if !b1.is_finite() || !b2.is_finite() {
        return None;
    }

    Some([1.0 - b1 - b2, b1, b2])
}

#[inline(always)]
pub fn from_barycentric(coords: &[Real; 3], a: Vector, b: Vector, c: Vector) -> Vector {
    a * coords[0] + b * coords[1] + c * coords[2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn normalise_approx_handles_zero() {
        assert_eq!(normalise_approx(Vec2::ZERO), Vec2::ZERO);
        let n = normalise_approx(Vec2::new(3.0, 4.0));
        assert_relative_eq!(n.x, 0.6, epsilon = 1e-6);
        assert_relative_eq!(n.y, 0.8, epsilon = 1e-6);
    }

    #[test]
    fn angle_cw_is_clockwise_positive() {
        // From the leftward floor to straight up is a quarter turn clockwise.
        assert_relative_eq!(angle_cw(Vec2::new(-1.0, 0.0), Vec2::Y), FRAC_PI_2, epsilon = 1e-6);
        assert_relative_eq!(angle_cw(Vec2::X, Vec2::Y), -FRAC_PI_2, epsilon = 1e-6);
        assert_relative_eq!(angle_cw(Vec2::X, -Vec2::X).abs(), PI, epsilon = 1e-6);
    }

    #[test]
    fn barycentric_round_trip_inside_triangle() {
        let (a, b, c) = (Vec2::new(-10.0, 0.0), Vec2::new(0.0, 4.0), Vec2::new(10.0, 0.0));
        let p = Vec2::new(1.0, 1.0);
        let coords = barycentric_coordinates(p, a, b, c).unwrap();
        assert!(coords.iter().all(|&w| w >= 0.0));
        assert_relative_eq!(coords.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        let back = from_barycentric(&coords, a, b, c);
        assert_relative_eq!(back.x, p.x, epsilon = 1e-5);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-5);
    }

    #[test]
    fn degenerate_triangle_has_no_barycentrics() {
        let a = Vec2::ZERO;
        assert!(barycentric_coordinates(Vec2::ONE, a, Vec2::X, Vec2::X * 2.0).is_none());
    }

    #[test]
    fn cw_order_detection() {
        let (a, b, c) = (Vec2::new(-10.0, 0.0), Vec2::new(0.0, 4.0), Vec2::new(10.0, 0.0));
        assert!(are_vertices_in_cw_order(a, b, c));
        assert!(!are_vertices_in_cw_order(a, c, b));
    }
}

//! Water inflow through leaking particles and diffusion along springs.

use crate::config::{GRAVITY_MAGNITUDE, SimulationParameters};
use crate::core::{MaterialDatabase, Points, Springs};
use crate::environment::Environment;
use crate::math::Real;

/// Lets water in (or out) of leaking particles.
///
/// The flow speed follows Torricelli, `√(2g·|external − internal|)`, signed
/// by the direction of the pressure difference. Returns the net water that
/// entered the ship.
pub fn update_water_inflow(
    points: &mut Points,
    environment: &Environment,
    materials: &MaterialDatabase,
    params: &SimulationParameters,
    dt: Real,
) -> Real {
    let mut net_inflow = 0.0;
    for index in 0..points.structural_count() {
        if !points.is_leaking(index) {
            continue;
        }

        let external = (environment.depth(points.position(index)) + 0.1).max(0.0);
        let internal = points.water(index);
        let difference = external - internal;
        let speed = (2.0 * GRAVITY_MAGNITUDE * difference.abs()).sqrt() * difference.signum();

        let intake = materials.structural(points.material(index)).water_intake;
        let delta = speed * dt * intake * params.water_intake_adjustment;
        let water = (internal + delta).max(0.0);
        net_inflow += water - internal;
        points.set_water(index, water);
    }

    net_inflow
}

/// Spreads water between spring-connected particles.
///
/// Each live spring moves a fraction of the water difference between its
/// endpoints; the fraction is kept small enough that a particle never gives
/// away more than it holds.
pub fn diffuse_water(
    points: &mut Points,
    springs: &Springs,
    materials: &MaterialDatabase,
    params: &SimulationParameters,
) {
    let count = points.structural_count();
    let mut delta = vec![0.0; count];

    for spring in 0..springs.len() {
        if springs.is_deleted(spring) {
            continue;
        }

        let (a, b) = springs.endpoints(spring);
        let speed = (materials.structural(points.material(a)).water_diffusion_speed
            + materials.structural(points.material(b)).water_diffusion_speed)
            / 2.0;
        let fraction = (speed * params.water_diffusion_speed_adjustment * 0.1).clamp(0.0, 0.1);
        let flow = (points.water(a) - points.water(b)) * fraction;
        delta[a] -= flow;
        delta[b] += flow;
    }

    for (index, change) in delta.into_iter().enumerate() {
        if change != 0.0 {
            points.set_water(index, (points.water(index) + change).max(0.0));
        }
    }
}

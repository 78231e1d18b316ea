//! Static world forces
//!
//! Gravity, buoyancy, drag and wind go into the static force buffer once per
//! tick, before the relaxation sub-steps.

use crate::config::{
    AIR_FRICTION_DRAG_COEFFICIENT, GRAVITY, GRAVITY_MAGNITUDE, SimulationParameters,
    WATER_FRICTION_DRAG_COEFFICIENT,
};
use crate::core::{Points, Triangles};
use crate::environment::Environment;
use crate::math::{Real, Vector, mix};

/// km/h to m/s.
const KMH_TO_MS: Real = 1000.0 / 3600.0;

/// Adds gravity, buoyancy, drag and wind to every structural particle.
pub fn apply_world_forces(points: &mut Points, environment: &Environment, params: &SimulationParameters) {
    let air_density = Points::air_density(params.air_temperature);
    let water_density = Points::water_density(params.water_temperature, params);
    let water_drag = WATER_FRICTION_DRAG_COEFFICIENT * params.water_drag_adjustment;
    let wind_speed = environment.wind.current_speed();
    let radial_field = environment.wind.radial_wind_field();

    for index in 0..points.structural_count() {
        let position = points.position(index);
        let velocity = points.velocity(index);
        let underwater_coefficient = environment.depth(position).clamp(0.0, 1.0);

        let mut force = GRAVITY * points.mass(index);

        let buoyancy = points.buoyancy_coefficients(index);
        let temperature = points.temperature(index);
        force.y += (buoyancy.coefficient1 + buoyancy.coefficient2 * temperature)
            * mix(air_density, water_density, underwater_coefficient);

        let drag_coefficient = mix(AIR_FRICTION_DRAG_COEFFICIENT, water_drag, underwater_coefficient);
        force -= velocity * drag_coefficient;

        let receptivity = points.wind_receptivity(index);
        if receptivity > 0.0 && underwater_coefficient < 1.0 {
            let mut wind = wind_speed;
            if let Some(field) = radial_field {
                wind += field.speed_at(position);
            }
            force += wind_force(wind, air_density) * receptivity * (1.0 - underwater_coefficient);
        }

        points.add_static_force(index, force);
    }
}

/// Dynamic pressure of a wind blowing at `speed` km/h, keeping its direction.
#[inline(always)]
pub(crate) fn wind_force(speed: Vector, air_density: Real) -> Vector {
    let speed = speed * KMH_TO_MS;
    speed * speed.abs() * 0.5 * air_density
}

/// Hydrostatic pressure on the submerged frontier of the mesh.
///
/// Each submerged frontier edge is pushed inward by the water column above
/// its midpoint, split evenly between its two endpoints.
pub fn apply_static_pressure_forces(
    points: &mut Points,
    triangles: &Triangles,
    environment: &Environment,
    params: &SimulationParameters,
) {
    let adjustment = params.static_pressure_force_adjustment;
    if adjustment <= 0.0 {
        return;
    }

    let water_density = Points::water_density(params.water_temperature, params);
    for (triangle, edge) in triangles.frontier_edges() {
        let vertices = triangles.vertices(triangle);
        let (a, b) = (vertices[edge], vertices[(edge + 1) % 3]);
        let midpoint = (points.position(a) + points.position(b)) / 2.0;
        let depth = environment.depth(midpoint);
        if depth <= 0.0 {
            continue;
        }

        let edge_length = triangles.sub_spring_vector(triangle, edge, points).length();
        let normal = triangles.edge_outward_normal(triangle, edge, points);
        let pressure = depth * water_density * GRAVITY_MAGNITUDE * adjustment;
        let force = -normal * (pressure * edge_length / 2.0);
        points.add_static_force(a, force);
        points.add_static_force(b, force);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MaterialDatabase, PointDefinition};
    use crate::environment::{RadialWindField, Wind};
    use approx::assert_relative_eq;

    fn setup(position: Vector, material: &str) -> (Points, SimulationParameters) {
        let materials = MaterialDatabase::new();
        let params = SimulationParameters::default();
        let mut points = Points::new(1, 0, 0, 1);
        let id = materials.structural_id(material).unwrap();
        points.add(PointDefinition::new(position, id), &materials).unwrap();
        points.recalculate_cached_coefficients(&params, &materials);
        (points, params)
    }

    #[test]
    fn iron_sinks_and_wood_floats_under_water() {
        let environment = Environment::flat(0.0, -800.0);

        let (mut iron, params) = setup(Vector::new(0.0, -5.0), "Iron");
        apply_world_forces(&mut iron, &environment, &params);
        assert!(iron.static_force(0).y < 0.0);

        let (mut wood, params) = setup(Vector::new(0.0, -5.0), "Wood");
        apply_world_forces(&mut wood, &environment, &params);
        assert!(wood.static_force(0).y > 0.0);
    }

    #[test]
    fn air_gives_almost_pure_gravity() {
        let environment = Environment::flat(-100.0, -800.0);
        let (mut points, params) = setup(Vector::new(0.0, 10.0), "Iron");
        apply_world_forces(&mut points, &environment, &params);

        let gravity = GRAVITY.y * points.mass(0);
        assert_relative_eq!(points.static_force(0).y, gravity, max_relative = 0.001);
    }

    #[test]
    fn wind_only_pushes_receptive_particles() {
        let environment = Environment::flat(-100.0, -800.0).with_wind(Wind {
            speed: Vector::new(36.0, 0.0),
            radial_field: Some(RadialWindField {
                source: Vector::new(1000.0, 0.0),
                radius: 10.0,
                speed: 100.0,
            }),
        });

        let (mut cloth, params) = setup(Vector::new(0.0, 10.0), "Cloth");
        apply_world_forces(&mut cloth, &environment, &params);
        // 10 m/s squared, halved, times air density
        let expected = 100.0 * 0.5 * Points::air_density(params.air_temperature);
        assert_relative_eq!(cloth.static_force(0).x, expected, max_relative = 1e-3);

        let (mut iron, params) = setup(Vector::new(0.0, 10.0), "Iron");
        apply_world_forces(&mut iron, &environment, &params);
        assert_eq!(iron.static_force(0).x, 0.0);
    }
}

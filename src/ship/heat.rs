//! Heat conduction along springs and dissipation into the surroundings.

use crate::config::SimulationParameters;
use crate::core::{MaterialDatabase, Points, Springs};
use crate::environment::Environment;
use crate::math::Real;

/// Fraction of the temperature gap to the surroundings lost per second.
const HEAT_DISSIPATION_RATE: Real = 0.03;

/// Conducts heat from hotter to colder endpoints of every live spring.
///
/// Each particle's outgoing heat is computed against its colder neighbors
/// and scaled down if it would exceed what the particle holds.
pub fn propagate_heat(
    points: &mut Points,
    springs: &Springs,
    materials: &MaterialDatabase,
    params: &SimulationParameters,
    dt: Real,
) {
    let count = points.structural_count();
    let conductivity_adjustment = params.thermal_conductivity_adjustment;

    // (destination, heat) per source particle
    let mut outgoing: Vec<Vec<(usize, Real)>> = vec![Vec::new(); count];
    for spring in 0..springs.len() {
        if springs.is_deleted(spring) {
            continue;
        }

        let (a, b) = springs.endpoints(spring);
        let (ta, tb) = (points.temperature(a), points.temperature(b));
        let (from, to, gap) = if ta >= tb { (a, b, ta - tb) } else { (b, a, tb - ta) };
        if gap <= 0.0 {
            continue;
        }

        let conductivity = (materials.structural(points.material(a)).thermal_conductivity
            + materials.structural(points.material(b)).thermal_conductivity)
            / 2.0;
        let heat = conductivity * conductivity_adjustment * gap * dt
            / springs.factory_rest_length(spring).max(0.01);
        outgoing[from].push((to, heat));
    }

    let mut delta_temperature = vec![0.0; count];
    for (from, flows) in outgoing.into_iter().enumerate() {
        if flows.is_empty() {
            continue;
        }

        let specific_heat = specific_heat_of(points, materials, from);
        let available = points.temperature(from) * specific_heat;
        let total: Real = flows.iter().map(|(_, heat)| heat).sum();
        let normalization = if total > available { available / total } else { 1.0 };

        for (to, heat) in flows {
            let heat = heat * normalization;
            delta_temperature[from] -= heat / specific_heat;
            delta_temperature[to] += heat / specific_heat_of(points, materials, to);
        }
    }

    for (index, change) in delta_temperature.into_iter().enumerate() {
        if change != 0.0 {
            points.set_temperature(index, (points.temperature(index) + change).max(0.0));
        }
    }
}

#[inline(always)]
fn specific_heat_of(points: &Points, materials: &MaterialDatabase, index: usize) -> Real {
    materials.structural(points.material(index)).specific_heat.max(1.0)
}

/// Moves every particle's temperature toward the water or air around it.
pub fn dissipate_heat(
    points: &mut Points,
    environment: &Environment,
    params: &SimulationParameters,
    dt: Real,
) {
    let rate = (HEAT_DISSIPATION_RATE * params.heat_dissipation_adjustment * dt).clamp(0.0, 1.0);
    for index in 0..points.structural_count() {
        let ambient = if environment.is_underwater(points.position(index)) {
            params.water_temperature
        } else {
            params.air_temperature
        };
        let temperature = points.temperature(index);
        points.set_temperature(index, temperature + (ambient - temperature) * rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PointDefinition, SuperTriangles};
    use crate::math::Vector;

    #[test]
    fn heat_flows_from_hot_to_cold() {
        let materials = MaterialDatabase::new();
        let params = SimulationParameters::default();
        let iron = materials.structural_id("Iron").unwrap();
        let mut points = Points::new(2, 0, 0, 1);
        points.add(PointDefinition::new(Vector::new(0.0, 0.0), iron), &materials).unwrap();
        points.add(PointDefinition::new(Vector::new(1.0, 0.0), iron), &materials).unwrap();
        let mut springs = Springs::new();
        springs.add(0, 1, 0, 4, SuperTriangles::default(), 0, &mut points, &materials, &params);
        points.set_temperature(0, 600.0);
        points.set_temperature(1, 300.0);

        propagate_heat(&mut points, &springs, &materials, &params, 1.0 / 64.0);

        assert!(points.temperature(0) < 600.0);
        assert!(points.temperature(1) > 300.0);
        let total = points.temperature(0) + points.temperature(1);
        approx::assert_relative_eq!(total, 900.0, epsilon = 1e-3);
    }

    #[test]
    fn dissipation_approaches_ambient() {
        let materials = MaterialDatabase::new();
        let params = SimulationParameters::default();
        let environment = Environment::flat(-10.0, -800.0);
        let iron = materials.structural_id("Iron").unwrap();
        let mut points = Points::new(1, 0, 0, 1);
        points.add(PointDefinition::new(Vector::ZERO, iron), &materials).unwrap();
        points.set_temperature(0, 1000.0);

        dissipate_heat(&mut points, &environment, &params, 1.0);

        let temperature = points.temperature(0);
        assert!(temperature < 1000.0 && temperature > params.air_temperature);
    }
}

//! Tool interactions
//!
//! Interactions are queued between ticks and turned into static forces once,
//! right after the static force buffer is cleared. Moving and rotating a
//! ship are immediate.

use bevy::log::debug;

use super::Ship;
use crate::config::SimulationParameters;
use crate::core::{ElementIndex, Points};
use crate::math::{Real, Vector, normalise_approx_with_length, perp, rotate};

/// Base blast force, scaled by the caller's multiplier.
pub(crate) const BLAST_FORCE: Real = 105.0 * 50_000.0;
/// Attraction of the draw tool at full strength.
pub(crate) const DRAW_FORCE: Real = 40_000.0;
/// Tangential force of the swirl tool at full strength.
pub(crate) const SWIRL_FORCE: Real = 600.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Interaction {
    Blast {
        center: Vector,
        radius: Real,
        magnitude: Real,
    },
    Draw {
        center: Vector,
        strength: Real,
    },
    Pull {
        point: ElementIndex,
        target: Vector,
    },
    Swirl {
        center: Vector,
        strength: Real,
    },
}

impl Ship {
    /// Pushes particles within `radius` away from `center`.
    pub fn apply_blast_at(&mut self, center: Vector, radius: Real, force_multiplier: Real) {
        self.queued_interactions.push(Interaction::Blast {
            center,
            radius,
            magnitude: BLAST_FORCE * force_multiplier,
        });
    }

    /// Pulls every particle toward `center`; `strength_fraction` in [0, 1].
    pub fn draw_to(&mut self, center: Vector, strength_fraction: Real) {
        self.queued_interactions.push(Interaction::Draw {
            center,
            strength: DRAW_FORCE * strength_fraction,
        });
    }

    /// Drags a single particle to `target` over the next tick.
    pub fn pull(&mut self, point: ElementIndex, target: Vector) {
        self.queued_interactions.push(Interaction::Pull { point, target });
    }

    /// Spins every particle around `center`; positive strength is counter-clockwise.
    pub fn swirl_at(&mut self, center: Vector, strength_fraction: Real) {
        self.queued_interactions.push(Interaction::Swirl {
            center,
            strength: SWIRL_FORCE * strength_fraction,
        });
    }

    pub fn queued_interaction_count(&self) -> usize {
        self.queued_interactions.len()
    }

    /// Translates the whole ship and gives it `inertial_velocity`.
    pub fn move_by(&mut self, offset: Vector, inertial_velocity: Vector) {
        for index in 0..self.points.structural_count() {
            self.points.set_position(index, self.points.position(index) + offset);
            if !self.points.is_pinned(index) {
                self.points.set_velocity(index, inertial_velocity);
            }
        }
    }

    /// Rotates the whole ship by `angle` radians (counter-clockwise) around `center`.
    pub fn rotate_by(&mut self, angle: Real, center: Vector) {
        let (sin, cos) = angle.sin_cos();
        for index in 0..self.points.structural_count() {
            let offset = self.points.position(index) - center;
            self.points.set_position(index, center + rotate(offset, cos, sin));
            if !self.points.is_pinned(index) {
                let velocity = self.points.velocity(index);
                self.points.set_velocity(index, rotate(velocity, cos, sin));
            }
        }
    }

    pub(super) fn apply_queued_interactions(&mut self, params: &SimulationParameters) {
        if self.queued_interactions.is_empty() {
            return;
        }

        debug!("Ship {}: applying {} queued interactions", self.id, self.queued_interactions.len());
        for interaction in std::mem::take(&mut self.queued_interactions) {
            apply_interaction(&interaction, &mut self.points, params);
        }
    }
}

pub fn apply_interaction(interaction: &Interaction, points: &mut Points, params: &SimulationParameters) {
    match *interaction {
        Interaction::Blast {
            center,
            radius,
            magnitude,
        } => {
            for index in 0..points.structural_count() {
                let (direction, distance) = normalise_approx_with_length(points.position(index) - center);
                if distance < radius {
                    points.add_static_force(index, direction / distance.max(1.0) * magnitude);
                }
            }
        }
        Interaction::Draw { center, strength } => {
            for index in 0..points.structural_count() {
                let displacement = center - points.position(index);
                let force = strength / (0.1 + displacement.length()).sqrt();
                points.add_static_force(index, displacement * force);
            }
        }
        Interaction::Pull { point, target } => {
            if point >= points.structural_count() || points.is_pinned(point) {
                return;
            }
            // Stiffness that covers the whole distance over one tick of sub-steps
            let n = params.num_mechanical_dynamics_iterations as Real;
            let dt = params.mechanical_simulation_step_time_duration();
            let stiffness = points.mass(point) / (dt * dt) / (n * (n + 1.0) / 2.0);
            let displacement = target - points.position(point);
            points.add_static_force(point, displacement * stiffness);
            points.set_velocity(point, Vector::ZERO);
        }
        Interaction::Swirl { center, strength } => {
            for index in 0..points.structural_count() {
                let displacement = points.position(index) - center;
                let force = strength / (0.1 + displacement.length()).sqrt();
                points.add_static_force(index, perp(displacement) * force);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MaterialDatabase, PointDefinition};

    fn two_points() -> (Points, SimulationParameters) {
        let materials = MaterialDatabase::new();
        let params = SimulationParameters::default();
        let iron = materials.structural_id("Iron").unwrap();
        let mut points = Points::new(2, 0, 0, 1);
        points.add(PointDefinition::new(Vector::new(0.0, 0.0), iron), &materials).unwrap();
        points.add(PointDefinition::new(Vector::new(10.0, 0.0), iron), &materials).unwrap();
        points.recalculate_cached_coefficients(&params, &materials);
        (points, params)
    }

    #[test]
    fn blast_only_reaches_points_within_radius() {
        let (mut points, params) = two_points();
        let blast = Interaction::Blast {
            center: Vector::new(-1.0, 0.0),
            radius: 5.0,
            magnitude: 100.0,
        };
        apply_interaction(&blast, &mut points, &params);

        assert!(points.static_force(0).x > 0.0);
        assert_eq!(points.static_force(1), Vector::ZERO);
    }

    #[test]
    fn draw_pulls_toward_center() {
        let (mut points, params) = two_points();
        let draw = Interaction::Draw {
            center: Vector::new(5.0, 0.0),
            strength: 1.0,
        };
        apply_interaction(&draw, &mut points, &params);

        assert!(points.static_force(0).x > 0.0);
        assert!(points.static_force(1).x < 0.0);
    }

    #[test]
    fn swirl_is_tangential() {
        let (mut points, params) = two_points();
        let swirl = Interaction::Swirl {
            center: Vector::new(5.0, 0.0),
            strength: 1.0,
        };
        apply_interaction(&swirl, &mut points, &params);

        let force = points.static_force(1);
        assert_eq!(force.x, 0.0);
        assert!(force.y > 0.0);
    }

    #[test]
    fn pull_stops_the_particle() {
        let (mut points, params) = two_points();
        points.set_velocity(0, Vector::new(3.0, 3.0));
        let pull = Interaction::Pull {
            point: 0,
            target: Vector::new(0.0, 1.0),
        };
        apply_interaction(&pull, &mut points, &params);

        assert_eq!(points.velocity(0), Vector::ZERO);
        assert!(points.static_force(0).y > 0.0);
    }
}

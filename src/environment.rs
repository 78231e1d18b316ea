//! Ocean and wind queries
//!
//! The core only ever asks these collaborators for heights, depths and wind
//! speeds; it never mutates them during a tick.

use crate::config::GRAVITY_DIR;
use crate::math::{Real, Vector, normalise_approx};

pub trait OceanSurface: Send + Sync {
    /// Water level at world x.
    fn height_at(&self, x: Real) -> Real;

    /// Positive below the surface.
    fn depth(&self, position: Vector) -> Real {
        self.height_at(position.x) - position.y
    }

    /// Advances the surface to the given simulation time.
    fn update(&mut self, _current_simulation_time: Real) {}
}

pub trait OceanFloor: Send + Sync {
    fn height_at(&self, x: Real) -> Real;

    /// Upward unit normal, from a central difference of the height field.
    fn normal_at(&self, x: Real) -> Vector {
        const DX: Real = 0.5;
        let dy = self.height_at(x + DX) - self.height_at(x - DX);
        normalise_approx(Vector::new(-dy, 2.0 * DX))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlatOceanSurface {
    pub level: Real,
}

impl OceanSurface for FlatOceanSurface {
    fn height_at(&self, _x: Real) -> Real {
        self.level
    }
}

/// Single travelling sine wave.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WavyOceanSurface {
    pub level: Real,
    pub amplitude: Real,
    pub wavelength: Real,
    pub speed: Real,
    phase: Real,
}

impl WavyOceanSurface {
    pub fn new(level: Real, amplitude: Real, wavelength: Real, speed: Real) -> Self {
        Self {
            level,
            amplitude,
            wavelength: wavelength.max(1.0),
            speed,
            phase: 0.0,
        }
    }
}

impl OceanSurface for WavyOceanSurface {
    fn height_at(&self, x: Real) -> Real {
        let k = std::f32::consts::TAU / self.wavelength;
        self.level + self.amplitude * (k * x - self.phase).sin()
    }

    fn update(&mut self, current_simulation_time: Real) {
        self.phase = current_simulation_time * self.speed * std::f32::consts::TAU / self.wavelength;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlatOceanFloor {
    pub height: Real,
}

impl OceanFloor for FlatOceanFloor {
    fn height_at(&self, _x: Real) -> Real {
        self.height
    }

    fn normal_at(&self, _x: Real) -> Vector {
        -GRAVITY_DIR
    }
}

/// Storm or explosion wind blowing outward from a source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RadialWindField {
    pub source: Vector,
    pub radius: Real,
    /// Speed at the source in km/h, fading linearly to zero at `radius`.
    pub speed: Real,
}

impl RadialWindField {
    /// Wind velocity (km/h) at `position`, zero outside the field.
    pub fn speed_at(&self, position: Vector) -> Vector {
        let offset = position - self.source;
        let distance = offset.length();
        if distance >= self.radius || self.radius <= 0.0 {
            return Vector::ZERO;
        }

        normalise_approx(offset) * self.speed * (1.0 - distance / self.radius)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Wind {
    /// Uniform wind velocity in km/h.
    pub speed: Vector,
    pub radial_field: Option<RadialWindField>,
}

impl Wind {
    pub fn current_speed(&self) -> Vector {
        self.speed
    }

    pub fn radial_wind_field(&self) -> Option<&RadialWindField> {
        self.radial_field.as_ref()
    }
}

/// Everything outside the ships that forces depend on.
pub struct Environment {
    pub ocean_surface: Box<dyn OceanSurface>,
    pub ocean_floor: Box<dyn OceanFloor>,
    pub wind: Wind,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(
            Box::new(FlatOceanSurface { level: 0.0 }),
            Box::new(FlatOceanFloor { height: -800.0 }),
        )
    }
}

impl Environment {
    pub fn new(ocean_surface: Box<dyn OceanSurface>, ocean_floor: Box<dyn OceanFloor>) -> Self {
        Self {
            ocean_surface,
            ocean_floor,
            wind: Wind::default(),
        }
    }

    pub fn with_wind(mut self, wind: Wind) -> Self {
        self.wind = wind;
        self
    }

    /// Flat sea at `surface`, flat floor at `floor`.
    pub fn flat(surface: Real, floor: Real) -> Self {
        Self::new(
            Box::new(FlatOceanSurface { level: surface }),
            Box::new(FlatOceanFloor { height: floor }),
        )
    }

    #[inline]
    pub fn depth(&self, position: Vector) -> Real {
        self.ocean_surface.depth(position)
    }

    #[inline]
    pub fn is_underwater(&self, position: Vector) -> bool {
        self.depth(position) > 0.0
    }

    pub fn update(&mut self, current_simulation_time: Real) {
        self.ocean_surface.update(current_simulation_time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn depth_is_positive_below_surface() {
        let env = Environment::flat(2.0, -50.0);
        assert_relative_eq!(env.depth(Vector::new(3.0, -1.0)), 3.0);
        assert!(!env.is_underwater(Vector::new(0.0, 5.0)));
    }

    #[test]
    fn radial_wind_fades_with_distance() {
        let field = RadialWindField {
            source: Vector::ZERO,
            radius: 10.0,
            speed: 100.0,
        };
        let near = field.speed_at(Vector::new(1.0, 0.0));
        let far = field.speed_at(Vector::new(9.0, 0.0));
        assert!(near.x > far.x);
        assert_eq!(field.speed_at(Vector::new(11.0, 0.0)), Vector::ZERO);
    }

    #[test]
    fn sloped_floor_normal_points_up_and_away_from_slope() {
        struct Slope;
        impl OceanFloor for Slope {
            fn height_at(&self, x: Real) -> Real {
                x
            }
        }
        let normal = Slope.normal_at(0.0);
        assert!(normal.y > 0.0);
        assert!(normal.x < 0.0);
        assert_relative_eq!(normal.length(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn wavy_surface_moves_with_time() {
        let mut surface = WavyOceanSurface::new(0.0, 1.0, 20.0, 5.0);
        let before = surface.height_at(3.0);
        surface.update(1.0);
        assert_ne!(before, surface.height_at(3.0));
    }
}

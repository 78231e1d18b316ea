// Physical and structural constants for the ship simulation
use bevy::prelude::*;

use crate::math::Real;

// Time
pub const SIMULATION_STEP_TIME_DURATION: Real = 1.0 / 64.0;
pub const MECHANICAL_DYNAMICS_ITERATIONS_BASIS: u32 = 30;

// Global physics
pub const GRAVITY: Vec2 = Vec2::new(0.0, -9.80);
pub const GRAVITY_MAGNITUDE: Real = 9.80;
pub const GRAVITY_DIR: Vec2 = Vec2::new(0.0, -1.0);

// Fluids
pub const WATER_DENSITY: Real = 1000.0;
pub const WATER_THERMAL_EXPANSION_COEFFICIENT: Real = 0.0002;
pub const AIR_DENSITY: Real = 1.2754;
pub const AIR_THERMAL_EXPANSION_COEFFICIENT: Real = 0.0034;
pub const STANDARD_TEMPERATURE: Real = 298.15;
pub const AIR_FRICTION_DRAG_COEFFICIENT: Real = 0.003;
pub const WATER_FRICTION_DRAG_COEFFICIENT: Real = 0.75;

// Damping applied to every structural particle's velocity at the basis iteration count
pub const GLOBAL_DAMPING: Real = 0.000_107_496_53;
pub const MAX_GLOBAL_DAMPING_ADJUSTMENT: Real = 10.0;

// Springs
pub const SPRING_STIFFNESS_COEFFICIENT: Real = 0.5;
pub const SPRING_DAMPING_COEFFICIENT: Real = 0.03;
pub const SPRING_STIFFNESS_GROWTH_RATE: Real = 0.03;
pub const SPRING_STRESS_EXIT_FRACTION: Real = 0.08;
pub const MELTING_DEPTH_RANGE: Real = 200.0;
pub const MELTED_STIFFNESS_MULTIPLIER: Real = 0.0002;
pub const MAX_MELTED_REST_LENGTH_FACTOR: Real = 2.0;

// Particles
pub const MIN_PARTICLE_MASS: Real = 1e-3;
pub const MASS_CONVERGENCE_RATE: Real = 0.12;

// World
pub const MAX_WORLD_WIDTH: Real = 5000.0;
pub const MAX_WORLD_HEIGHT: Real = 11000.0;
pub const HALF_MAX_WORLD_WIDTH: Real = MAX_WORLD_WIDTH / 2.0;
pub const HALF_MAX_WORLD_HEIGHT: Real = MAX_WORLD_HEIGHT / 2.0;
pub const MAX_BOUNCE_VELOCITY: Real = 150.0;

// Heat
pub const WATER_TEMPERATURE: Real = 288.15;
pub const AIR_TEMPERATURE: Real = 298.15;
pub const COMBUSTION_HEAT_PER_TICK: Real = 4.0;

// NPCs
pub const NPC_LOW_FREQUENCY_UPDATE_PERIOD: u64 = 4;
pub const MAX_NPC_TRAJECTORY_HOPS: usize = 16;
pub const NPC_DAMPING: Real = 0.0078;
pub const NPC_MAX_WATERNESS_DEPTH: Real = 0.4;
pub const NPC_WATER_DRAG_COEFFICIENT: Real = 0.75;
pub const MAX_PARTICLES_PER_NPC: usize = 4;

use bevy::prelude::*;

use super::constants::*;
use crate::math::Real;

/// Tunable parameters for the ship and NPC simulation.
///
/// Every adjustment defaults to the neutral value `1.0` unless noted.
#[derive(Resource, Clone, Debug, PartialEq)]
pub struct SimulationParameters {
    /// Spring relaxation sub-steps per tick.
    pub num_mechanical_dynamics_iterations: u32,
    /// Number of spring partitions whose forces are computed on the task pool.
    pub spring_relaxation_parallelism: usize,

    pub spring_stiffness_adjustment: Real,
    pub spring_damping_adjustment: Real,
    pub spring_strength_adjustment: Real,
    /// 0 disables global damping, 1 is nominal, 10 freezes every particle.
    pub global_damping_adjustment: Real,

    pub water_density_adjustment: Real,
    pub water_drag_adjustment: Real,
    /// Hydrostatic pressure on frontier edges; off by default.
    pub static_pressure_force_adjustment: Real,
    pub water_intake_adjustment: Real,
    pub water_diffusion_speed_adjustment: Real,
    pub water_temperature: Real,

    pub air_temperature: Real,
    pub thermal_conductivity_adjustment: Real,
    pub heat_dissipation_adjustment: Real,
    pub ignition_temperature_adjustment: Real,
    pub melting_temperature_adjustment: Real,
    pub combustion_heat_adjustment: Real,

    pub ocean_floor_elasticity_coefficient: Real,
    pub ocean_floor_friction_coefficient: Real,
    pub elasticity_adjustment: Real,
    pub friction_adjustment: Real,

    pub max_ephemeral_particles: usize,
    pub max_npcs: usize,
    pub npc_spring_reduction_fraction_adjustment: Real,
    pub npc_spring_damping_coefficient_adjustment: Real,
    pub npc_size_multiplier: Real,
    pub npc_friction_adjustment: Real,
    pub npc_damping_adjustment: Real,
    pub human_npc_walking_speed_adjustment: Real,
    pub human_npc_equilibrium_torque_stiffness: Real,
    pub human_npc_equilibrium_torque_damping: Real,

    /// Seed for every random draw in a world, so runs replay exactly.
    pub rng_seed: u64,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            num_mechanical_dynamics_iterations: MECHANICAL_DYNAMICS_ITERATIONS_BASIS,
            spring_relaxation_parallelism: 1,
            spring_stiffness_adjustment: 1.0,
            spring_damping_adjustment: 1.0,
            spring_strength_adjustment: 1.0,
            global_damping_adjustment: 1.0,
            water_density_adjustment: 1.0,
            water_drag_adjustment: 1.0,
            static_pressure_force_adjustment: 0.0,
            water_intake_adjustment: 1.0,
            water_diffusion_speed_adjustment: 1.0,
            water_temperature: WATER_TEMPERATURE,
            air_temperature: AIR_TEMPERATURE,
            thermal_conductivity_adjustment: 1.0,
            heat_dissipation_adjustment: 1.0,
            ignition_temperature_adjustment: 1.0,
            melting_temperature_adjustment: 1.0,
            combustion_heat_adjustment: 1.0,
            ocean_floor_elasticity_coefficient: 0.5,
            ocean_floor_friction_coefficient: 0.25,
            elasticity_adjustment: 1.0,
            friction_adjustment: 1.0,
            max_ephemeral_particles: 512,
            max_npcs: 64,
            npc_spring_reduction_fraction_adjustment: 1.0,
            npc_spring_damping_coefficient_adjustment: 1.0,
            npc_size_multiplier: 1.0,
            npc_friction_adjustment: 1.0,
            npc_damping_adjustment: 1.0,
            human_npc_walking_speed_adjustment: 1.0,
            human_npc_equilibrium_torque_stiffness: 0.02,
            human_npc_equilibrium_torque_damping: 0.004,
            rng_seed: 0x5EED_5A11,
        }
    }
}

impl SimulationParameters {
    /// Set the number of relaxation sub-steps per tick (at least 1)
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.num_mechanical_dynamics_iterations = iterations.max(1);
        self
    }

    /// Set how many spring partitions run in parallel (at least 1)
    pub fn with_parallelism(mut self, partitions: usize) -> Self {
        self.spring_relaxation_parallelism = partitions.max(1);
        self
    }

    pub fn with_spring_strength_adjustment(mut self, adjustment: Real) -> Self {
        self.spring_strength_adjustment = adjustment.max(0.0);
        self
    }

    pub fn with_spring_stiffness_adjustment(mut self, adjustment: Real) -> Self {
        self.spring_stiffness_adjustment = adjustment.max(0.0);
        self
    }

    /// Set global damping adjustment (0.0 to 10.0)
    pub fn with_global_damping_adjustment(mut self, adjustment: Real) -> Self {
        self.global_damping_adjustment = adjustment.clamp(0.0, MAX_GLOBAL_DAMPING_ADJUSTMENT);
        self
    }

    pub fn with_static_pressure_force_adjustment(mut self, adjustment: Real) -> Self {
        self.static_pressure_force_adjustment = adjustment.max(0.0);
        self
    }

    /// Set ocean floor bounce (0.0 to 1.0) and friction (0.0 to 1.0)
    pub fn with_ocean_floor(mut self, elasticity: Real, friction: Real) -> Self {
        self.ocean_floor_elasticity_coefficient = elasticity.clamp(0.0, 1.0);
        self.ocean_floor_friction_coefficient = friction.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_npcs(mut self, max_npcs: usize) -> Self {
        self.max_npcs = max_npcs;
        self
    }

    pub fn with_max_ephemeral_particles(mut self, count: usize) -> Self {
        self.max_ephemeral_particles = count;
        self
    }

    pub fn with_npc_size_multiplier(mut self, multiplier: Real) -> Self {
        self.npc_size_multiplier = multiplier.max(0.1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = seed;
        self
    }

    /// Duration of one relaxation sub-step.
    #[inline]
    pub fn mechanical_simulation_step_time_duration(&self) -> Real {
        SIMULATION_STEP_TIME_DURATION / self.num_mechanical_dynamics_iterations as Real
    }

    /// Iteration count relative to the basis the material strengths are tuned for.
    #[inline]
    pub fn mechanical_iterations_ratio(&self) -> Real {
        self.num_mechanical_dynamics_iterations as Real / MECHANICAL_DYNAMICS_ITERATIONS_BASIS as Real
    }

    /// Fraction of velocity preserved across one sub-step.
    ///
    /// The basis damping is re-expressed per sub-step so that the per-tick
    /// effect is independent of the iteration count, then bent by the
    /// adjustment: below 1 it fades out quadratically, above 1 it ramps
    /// toward total damping at the maximum adjustment.
    pub fn global_damping_coefficient(&self) -> Real {
        let iterations = self.num_mechanical_dynamics_iterations as Real;
        let damping = 1.0 - (1.0 - GLOBAL_DAMPING).powf(12.0 / iterations);
        let adjustment = self.global_damping_adjustment;
        let excess = adjustment - 1.0;
        if adjustment <= 1.0 {
            1.0 - damping * (1.0 - excess * excess)
        } else {
            let span = MAX_GLOBAL_DAMPING_ADJUSTMENT - 1.0;
            1.0 - (damping + excess * excess / (span * span) * (1.0 - damping))
        }
    }

    pub(crate) fn spring_coefficient_key(&self) -> SpringCoefficientKey {
        SpringCoefficientKey {
            iterations: self.num_mechanical_dynamics_iterations,
            stiffness_adjustment: self.spring_stiffness_adjustment,
            damping_adjustment: self.spring_damping_adjustment,
            strength_adjustment: self.spring_strength_adjustment,
            melting_temperature_adjustment: self.melting_temperature_adjustment,
        }
    }

    pub(crate) fn point_coefficient_key(&self) -> PointCoefficientKey {
        PointCoefficientKey {
            iterations: self.num_mechanical_dynamics_iterations,
            global_damping_adjustment: self.global_damping_adjustment,
            water_density_adjustment: self.water_density_adjustment,
            ocean_floor_elasticity_coefficient: self.ocean_floor_elasticity_coefficient,
            ocean_floor_friction_coefficient: self.ocean_floor_friction_coefficient,
            elasticity_adjustment: self.elasticity_adjustment,
            friction_adjustment: self.friction_adjustment,
        }
    }
}

/// Subset of parameters the spring coefficients depend on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SpringCoefficientKey {
    iterations: u32,
    stiffness_adjustment: Real,
    damping_adjustment: Real,
    strength_adjustment: Real,
    melting_temperature_adjustment: Real,
}

/// Subset of parameters the cached particle coefficients depend on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct PointCoefficientKey {
    iterations: u32,
    global_damping_adjustment: Real,
    water_density_adjustment: Real,
    ocean_floor_elasticity_coefficient: Real,
    ocean_floor_friction_coefficient: Real,
    elasticity_adjustment: Real,
    friction_adjustment: Real,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn damping_coefficient_is_neutral_at_zero_adjustment() {
        let params = SimulationParameters::default().with_global_damping_adjustment(0.0);
        assert_relative_eq!(params.global_damping_coefficient(), 1.0);
    }

    #[test]
    fn damping_coefficient_freezes_at_max_adjustment() {
        let params = SimulationParameters::default().with_global_damping_adjustment(25.0);
        assert_relative_eq!(params.global_damping_coefficient(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn nominal_damping_is_tiny() {
        let coefficient = SimulationParameters::default().global_damping_coefficient();
        assert!(coefficient < 1.0);
        assert!(coefficient > 0.999);
    }

    #[test]
    fn builders_clamp() {
        let params = SimulationParameters::default()
            .with_iterations(0)
            .with_parallelism(0)
            .with_ocean_floor(3.0, -1.0);
        assert_eq!(params.num_mechanical_dynamics_iterations, 1);
        assert_eq!(params.spring_relaxation_parallelism, 1);
        assert_relative_eq!(params.ocean_floor_elasticity_coefficient, 1.0);
        assert_relative_eq!(params.ocean_floor_friction_coefficient, 0.0);
    }
}

//! Spring relaxation
//!
//! Spring forces are computed per partition into per-partition force buffers,
//! then summed in partition order at integration time. With more than one
//! partition the force pass runs on the compute task pool.

use std::ops::Range;

use bevy::tasks::{ComputeTaskPool, TaskPool};

use crate::config::SimulationParameters;
use crate::core::{Points, Springs};
use crate::math::Vector;

/// Splits `spring_count` springs into `partitions` contiguous ranges.
pub fn partition_springs(spring_count: usize, partitions: usize) -> Vec<Range<usize>> {
    let partitions = partitions.max(1);
    let chunk = spring_count.div_ceil(partitions).max(1);
    (0..partitions)
        .map(|p| {
            let start = (p * chunk).min(spring_count);
            let end = ((p + 1) * chunk).min(spring_count);
            start..end
        })
        .collect()
}

/// Accumulates all spring forces into the dynamic force buffers.
pub fn apply_springs_forces(springs: &Springs, partitions: &[Range<usize>], points: &mut Points) {
    let view = points.spring_force_view();
    let positions = view.positions;
    let velocities = view.velocities;
    let buffers = view.dynamic_force_buffers;

    if partitions.len() <= 1 {
        if let (Some(range), Some(buffer)) = (partitions.first(), buffers.first_mut()) {
            springs.apply_spring_forces(range.clone(), positions, velocities, buffer);
        }
        return;
    }

    let pool = ComputeTaskPool::get_or_init(TaskPool::default);
    pool.scope(move |scope| {
        for (range, buffer) in partitions.iter().zip(buffers) {
            let range = range.clone();
            scope.spawn(async move {
                springs.apply_spring_forces(range, positions, velocities, buffer);
            });
        }
    });
}

/// Moves every structural particle by one sub-step and clears the dynamic forces.
///
/// `Δ = v·dt + (Σdynamic + static)·integration_factor`, `p += Δ`,
/// `v = Δ·velocity_factor`. Pinned particles have a zero integration factor
/// and zero velocity, so they do not move.
pub fn integrate_and_reset_dynamic_forces(points: &mut Points, params: &SimulationParameters) {
    let dt = params.mechanical_simulation_step_time_duration();
    let velocity_factor = params.global_damping_coefficient() / dt;

    let view = points.integration_view();
    for index in 0..view.positions.len() {
        let mut force = view.static_forces[index];
        for buffer in view.dynamic_force_buffers.iter_mut() {
            force += buffer[index];
            buffer[index] = Vector::ZERO;
        }

        let delta = view.velocities[index] * dt + force * view.integration_factors[index];
        view.positions[index] += delta;
        view.velocities[index] = delta * velocity_factor;
    }
}

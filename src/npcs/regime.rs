//! Regime classification
//!
//! Decides which NPC particles ride a ship triangle and which fly free, and
//! keeps the NPC's plane and connected component in step with its primary.

use bevy::log::{trace, warn};

use super::state::{ConstrainedState, NpcState, RegimeType};
use super::{NpcContext, Npcs, ship_mut, topmost_ship_id};
use crate::core::{ConnectedComponentId, ElementIndex, PlaneId};
use crate::error::Result;
use crate::math::{Real, Vector};
use crate::ship::{Ship, ShipId};

/// Topmost workable triangle containing `position` over all ships.
///
/// Ties are broken by `(ShipId, PlaneId)`, highest first.
pub fn find_topmost_triangle_across_ships(
    ships: &[Option<Ship>],
    position: Vector,
) -> Option<(ShipId, ElementIndex, [Real; 3])> {
    ships.iter().enumerate().rev().find_map(|(ship_id, ship)| {
        ship.as_ref()?
            .find_topmost_workable_triangle_containing(position)
            .map(|(triangle, coords)| (ship_id as ShipId, triangle, coords))
    })
}

/// `(ShipId, PlaneId)` of the topmost triangle at `position`, for depth comparisons.
pub fn probe_depth_at(ships: &[Option<Ship>], position: Vector) -> (ShipId, PlaneId) {
    find_topmost_triangle_across_ships(ships, position)
        .and_then(|(ship_id, triangle, _)| {
            let ship = ships.get(ship_id as usize)?.as_ref()?;
            Some((ship_id, ship.triangles().plane_id(triangle, ship.points())))
        })
        .unwrap_or((0, 0))
}

/// Topmost workable triangle containing `position` whose connected component is `component`.
pub fn find_triangle_in_component(
    ship: &Ship,
    position: Vector,
    component: ConnectedComponentId,
) -> Option<(ElementIndex, [Real; 3])> {
    let (points, triangles) = (ship.points(), ship.triangles());
    let mut best: Option<(ElementIndex, [Real; 3], PlaneId)> = None;
    for triangle in 0..triangles.len() {
        if !triangles.is_workable(triangle, points)
            || points.connected_component_id(triangles.point_a(triangle)) != component
        {
            continue;
        }
        let Some(coords) = triangles.to_barycentric(position, triangle, points) else {
            continue;
        };
        if coords.iter().any(|&w| w < 0.0) {
            continue;
        }
        let plane = triangles.plane_id(triangle, points);
        if best.is_none_or(|(_, _, best_plane)| plane >= best_plane) {
            best = Some((triangle, coords, plane));
        }
    }
    best.map(|(triangle, coords, _)| (triangle, coords))
}

fn constrained_at(ship: &Ship, index: ElementIndex, triangle: ElementIndex, coords: [Real; 3]) -> ConstrainedState {
    let (points, triangles) = (ship.points(), ship.triangles());
    let mut state = ConstrainedState::new(triangle, coords);
    state.mesh_relative_velocity = points.velocity(index) - triangles.velocity_at(&coords, triangle, points);
    state
}

/// Frees particles whose triangle stopped being workable and re-attaches
/// free particles that ended up inside the mesh.
pub fn validate_constrained_states(state: &mut NpcState, ship: &Ship) {
    let (points, triangles) = (ship.points(), ship.triangles());

    for (ordinal, particle) in state.particle_mesh.particles.iter_mut().enumerate() {
        if let Some(constrained) = particle.constrained {
            let triangle = constrained.position.triangle;
            if triangle >= triangles.len() {
                warn!("Npcs: NPC {} particle {} on dangling triangle {}", state.id, ordinal, triangle);
                particle.constrained = None;
            } else if !triangles.is_workable(triangle, points) {
                trace!("Npcs: NPC {} particle {} lost triangle {}", state.id, ordinal, triangle);
                particle.constrained = None;
            }
        }
    }

    let primary = &mut state.particle_mesh.particles[0];
    if primary.constrained.is_none()
        && let Some((triangle, coords)) = ship.find_topmost_workable_triangle_containing(points.position(primary.index))
    {
        trace!("Npcs: NPC {} primary attached to triangle {}", state.id, triangle);
        primary.constrained = Some(constrained_at(ship, primary.index, triangle, coords));
    }

    let Some(primary_triangle) = state.particle_mesh.particles[0].constrained.map(|c| c.position.triangle) else {
        return;
    };
    let component = points.connected_component_id(triangles.point_a(primary_triangle));
    for particle in state.particle_mesh.particles.iter_mut().skip(1) {
        if particle.constrained.is_none()
            && let Some((triangle, coords)) = find_triangle_in_component(ship, points.position(particle.index), component)
        {
            particle.constrained = Some(constrained_at(ship, particle.index, triangle, coords));
        }
    }
}

/// Re-derives plane, component and regime from the primary particle, and
/// frees secondaries stranded in another connected component.
pub fn refresh_regime(state: &mut NpcState, ship: &Ship) {
    let (points, triangles) = (ship.points(), ship.triangles());

    match state.particle_mesh.particles[0].constrained {
        Some(constrained) => {
            let triangle = constrained.position.triangle;
            let component = points.connected_component_id(triangles.point_a(triangle));
            state.current_plane_id = triangles.plane_id(triangle, points);
            state.current_connected_component_id = Some(component);

            for particle in state.particle_mesh.particles.iter_mut().skip(1) {
                if let Some(secondary) = particle.constrained
                    && points.connected_component_id(triangles.point_a(secondary.position.triangle)) != component
                {
                    particle.constrained = None;
                }
            }
        }
        None => {
            state.current_plane_id = ship.max_plane_id();
            state.current_connected_component_id = None;
        }
    }

    if state.current_regime != RegimeType::BeingPlaced {
        state.current_regime = state.calculate_regime();
    }
}

impl Npcs {
    /// Classifies a being placed NPC against every ship, moving it to the
    /// ship whose mesh it landed on.
    pub(crate) fn reset_npc_state_to_world(&mut self, state: &mut NpcState, ctx: &mut NpcContext<'_>) -> Result<()> {
        let primary_position = ship_mut(ctx.ships, state.current_ship_id)?
            .points()
            .position(state.particle_mesh.particles[0].index);

        let target_ship = match find_topmost_triangle_across_ships(ctx.ships, primary_position) {
            Some((ship_id, _, _)) => Some(ship_id),
            None => topmost_ship_id(ctx.ships),
        };
        if let Some(ship_id) = target_ship {
            self.transfer_npc_to_ship(state, ship_id, ctx)?;
        }

        let ship = ship_mut(ctx.ships, state.current_ship_id)?;
        let (points, triangles) = (ship.points(), ship.triangles());

        let primary_index = state.particle_mesh.particles[0].index;
        let primary = ship
            .find_topmost_workable_triangle_containing(points.position(primary_index))
            .map(|(triangle, coords)| constrained_at(ship, primary_index, triangle, coords));
        state.particle_mesh.particles[0].constrained = primary;

        let component = primary.map(|c| points.connected_component_id(triangles.point_a(c.position.triangle)));
        for particle in state.particle_mesh.particles.iter_mut().skip(1) {
            particle.constrained = component.and_then(|component| {
                find_triangle_in_component(ship, points.position(particle.index), component)
                    .map(|(triangle, coords)| constrained_at(ship, particle.index, triangle, coords))
            });
        }

        state.current_regime = state.calculate_regime();
        refresh_regime(state, ship);
        Ok(())
    }

    /// Frees secondaries whose triangle ended up in a different connected
    /// component than the primary's.
    pub fn on_ship_connectivity_changed(&mut self, ship_id: ShipId, ctx: &mut NpcContext<'_>) -> Result<()> {
        let ids = self.ship_npcs(ship_id).to_vec();
        for id in ids {
            self.with_npc(id, |npcs, state| {
                let before = state.effective_regime();
                let ship = ship_mut(ctx.ships, ship_id)?;
                refresh_regime(state, ship);
                npcs.on_regime_changed(state.kind(), before, state.effective_regime(), ctx.events);
                Ok(())
            })?;
        }
        Ok(())
    }
}

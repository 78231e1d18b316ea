//! Read-only views of the world for renderers.

use crate::core::{ElementIndex, PlaneId};
use crate::math::{Real, Vector};
use crate::npcs::{HumanAnimationState, NpcHighlight, NpcId, NpcKind, NpcState};
use crate::ship::{Ship, ShipId};
use crate::world::World;

#[derive(Clone, Debug, PartialEq)]
pub struct SpringView {
    pub endpoints: (ElementIndex, ElementIndex),
    pub is_stressed: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TriangleView {
    pub vertices: [ElementIndex; 3],
    pub plane_id: PlaneId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShipRenderSnapshot {
    pub ship_id: ShipId,
    /// Structural particles only.
    pub positions: Vec<Vector>,
    pub plane_ids: Vec<PlaneId>,
    pub water: Vec<Real>,
    pub stress: Vec<Real>,
    pub springs: Vec<SpringView>,
    /// Live triangles, back to front.
    pub triangles: Vec<TriangleView>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NpcRenderSnapshot {
    pub id: NpcId,
    pub kind: NpcKind,
    pub ship_id: ShipId,
    pub plane_id: PlaneId,
    pub positions: Vec<Vector>,
    pub highlight: NpcHighlight,
    pub face_orientation: Real,
    pub face_direction_x: Real,
    pub animation: Option<HumanAnimationState>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderSnapshot {
    pub ships: Vec<ShipRenderSnapshot>,
    /// Ordered by ship, then plane.
    pub npcs: Vec<NpcRenderSnapshot>,
}

impl ShipRenderSnapshot {
    pub fn of(ship: &Ship) -> Self {
        let (points, springs, triangles) = (ship.points(), ship.springs(), ship.triangles());
        let count = points.structural_count();

        let mut triangle_views: Vec<TriangleView> = (0..triangles.len())
            .filter(|&triangle| !triangles.is_deleted(triangle))
            .map(|triangle| TriangleView {
                vertices: triangles.vertices(triangle),
                plane_id: triangles.plane_id(triangle, points),
            })
            .collect();
        triangle_views.sort_by_key(|view| view.plane_id);

        Self {
            ship_id: ship.id(),
            positions: points.positions()[..count].to_vec(),
            plane_ids: (0..count).map(|point| points.plane_id(point)).collect(),
            water: (0..count).map(|point| points.water(point)).collect(),
            stress: (0..count).map(|point| points.stress(point)).collect(),
            springs: (0..springs.len())
                .filter(|&spring| !springs.is_deleted(spring))
                .map(|spring| SpringView {
                    endpoints: springs.endpoints(spring),
                    is_stressed: springs.strain_state(spring).is_stressed,
                })
                .collect(),
            triangles: triangle_views,
        }
    }
}

impl NpcRenderSnapshot {
    pub fn of(state: &NpcState, ship: &Ship) -> Self {
        let human = state.human();
        Self {
            id: state.id,
            kind: state.kind(),
            ship_id: state.current_ship_id,
            plane_id: state.current_plane_id,
            positions: state
                .particle_mesh
                .particles
                .iter()
                .map(|particle| ship.points().position(particle.index))
                .collect(),
            highlight: state.highlight,
            face_orientation: human.map_or(0.0, |human| human.current_face_orientation),
            face_direction_x: human.map_or(0.0, |human| human.current_face_direction_x),
            animation: human.map(|human| human.animation),
        }
    }
}

impl World {
    pub fn render_snapshot(&self) -> RenderSnapshot {
        let ships = self.ships().map(ShipRenderSnapshot::of).collect();

        let mut npcs: Vec<NpcRenderSnapshot> = self
            .npcs()
            .npcs()
            .filter_map(|state| {
                let ship = self.ship(state.current_ship_id).ok()?;
                Some(NpcRenderSnapshot::of(state, ship))
            })
            .collect();
        npcs.sort_by_key(|npc| (npc.ship_id, npc.plane_id));

        RenderSnapshot { ships, npcs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationParameters;
    use crate::ship::RectangularGrid;

    #[test]
    fn snapshot_lists_live_elements_only() {
        let params = SimulationParameters::default();
        let mut world = World::new(&params);
        let iron = world.materials().structural_id("Iron").unwrap_or(0);
        let builder = RectangularGrid::new(Vector::ZERO, 2, 1, 1.0, iron).into_builder();
        let ship_id = world.add_ship(builder, &params).unwrap();

        let before = world.render_snapshot();
        assert_eq!(before.ships.len(), 1);
        assert_eq!(before.ships[0].positions.len(), 6);
        assert_eq!(before.ships[0].triangles.len(), 4);
        assert!(before.npcs.is_empty());

        world.ship_mut(ship_id).unwrap().destroy_triangle(0).unwrap();
        let after = world.render_snapshot();
        assert_eq!(after.ships[0].triangles.len(), 3);
    }

    #[test]
    fn npcs_are_ordered_by_plane() {
        let params = SimulationParameters::default();
        let mut world = World::new(&params);
        let iron = world.materials().structural_id("Iron").unwrap_or(0);
        let builder = RectangularGrid::new(Vector::new(-4.0, 0.0), 4, 2, 2.0, iron).into_builder();
        world.add_ship(builder, &params).unwrap();
        let lamp = world.npcs().database().furniture_id("Lamp").unwrap();
        for x in [-2.0, 2.0] {
            let id = world
                .begin_place_new_furniture_npc(lamp, Vector::new(x, 1.0), false, &params)
                .unwrap()
                .picked()
                .unwrap()
                .id;
            world.complete_new_npc(id, &params).unwrap();
        }

        let snapshot = world.render_snapshot();
        assert_eq!(snapshot.npcs.len(), 2);
        assert!(
            snapshot
                .npcs
                .windows(2)
                .all(|pair| (pair[0].ship_id, pair[0].plane_id) <= (pair[1].ship_id, pair[1].plane_id))
        );
        assert!(snapshot.npcs.iter().all(|npc| npc.animation.is_none()));
    }
}

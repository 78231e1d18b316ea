//! NPC picking, selection and tool interactions
//!
//! Tools act on NPC particles directly (positions for moves, external forces
//! for the force tools); the forces are consumed by the next NPC update.

use bevy::log::debug;
use rand::Rng;

use super::human_behavior::flip_walk;
use super::physics::maintain_in_world_bounds;
use super::regime::probe_depth_at;
use super::state::{HumanBehavior, KindSpecificState, NpcHighlight, NpcKind, NpcState, RegimeType};
use super::{NpcContext, NpcId, Npcs, ParticleMeshKind, PickedNpc, ship_mut};
use crate::core::{ConnectedComponentId, ElementIndex};
use crate::error::{Result, SimulationError};
use crate::events::{SimulationEvent, SimulationEventDispatcher};
use crate::math::{Real, Vector, normalise_approx, normalise_approx_with_length, perp, rotate};
use crate::ship::{Ship, ShipId};

/// Walking humans within this distance of a first break get scared.
const TRIANGLE_DESTROYED_SCARE_RADIUS: Real = 10.0;
/// Blast radius multiplier for NPCs, which feel the blast as a gust of air.
const BLAST_RADIUS_MULTIPLIER: Real = 4.0;
/// Blast force yielding an acceleration of about 1000 on a human particle.
const BLAST_FORCE_TO_ACCELERATION: Real = 1.0 / 3750.0;
const DRAW_STRENGTH_MULTIPLIER: Real = 0.2;
const SWIRL_CENTRIPETAL_MULTIPLIER: Real = 8.5;

#[derive(Clone, Copy)]
struct Nearest {
    id: NpcId,
    particle_ordinal: usize,
    square_distance: Real,
}

fn keep_nearest(slot: &mut Option<Nearest>, candidate: Nearest) {
    if slot.is_none_or(|nearest| candidate.square_distance < nearest.square_distance) {
        *slot = Some(candidate);
    }
}

fn square_distance_to_segment(a: Vector, b: Vector, p: Vector) -> Real {
    let ab = b - a;
    let length_squared = ab.length_squared();
    let t = if length_squared > 0.0 {
        ((p - a).dot(ab) / length_squared).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (a + ab * t - p).length_squared()
}

/// Even-odd point-in-polygon test.
fn is_inside_polygon(vertices: &[Vector], p: Vector) -> bool {
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (vi, vj) = (vertices[i], vertices[j]);
        if (vi.y > p.y) != (vj.y > p.y) && p.x < (vj.x - vi.x) * (p.y - vi.y) / (vj.y - vi.y) + vi.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn primary_component(state: &NpcState, ship: &Ship) -> Option<ConnectedComponentId> {
    let constrained = state.particle_mesh.primary().constrained?;
    let point = ship.triangles().point_a(constrained.position.triangle);
    Some(ship.points().connected_component_id(point))
}

impl Npcs {
    /// Nearest NPC within `radius` of `position`, preferring NPCs on or above
    /// the plane under the probe. Quad furniture is also hit from inside.
    pub fn probe_npc_at(&self, position: Vector, radius: Real, ships: &[Option<Ship>], size_multiplier: Real) -> Option<PickedNpc> {
        let square_search_radius = radius * radius * size_multiplier;
        let probe_depth = probe_depth_at(ships, position);

        let mut on_plane: Option<Nearest> = None;
        let mut off_plane: Option<Nearest> = None;

        for state in self.npcs() {
            let Some(ship) = ships.get(state.current_ship_id as usize).and_then(Option::as_ref) else {
                continue;
            };
            let points = ship.points();
            let slot = if (state.current_ship_id, state.current_plane_id) >= probe_depth {
                &mut on_plane
            } else {
                &mut off_plane
            };

            match state.kind() {
                NpcKind::Furniture => {
                    let mut found = false;
                    for (ordinal, particle) in state.particle_mesh.particles.iter().enumerate() {
                        let square_distance = (points.position(particle.index) - position).length_squared();
                        if square_distance < square_search_radius {
                            keep_nearest(
                                slot,
                                Nearest {
                                    id: state.id,
                                    particle_ordinal: ordinal,
                                    square_distance,
                                },
                            );
                            found = true;
                        }
                    }

                    let is_quad = state.particle_mesh.particles.len() == 4;
                    if !found && is_quad {
                        let corners: Vec<Vector> = state
                            .particle_mesh
                            .particles
                            .iter()
                            .map(|particle| points.position(particle.index))
                            .collect();
                        if is_inside_polygon(&corners, position) {
                            keep_nearest(
                                slot,
                                Nearest {
                                    id: state.id,
                                    particle_ordinal: 0,
                                    square_distance: square_search_radius,
                                },
                            );
                        }
                    }
                }
                NpcKind::Human => {
                    let mesh = &state.particle_mesh;
                    let (Some(feet), Some(head)) = (mesh.particles.first(), mesh.particles.get(1)) else {
                        continue;
                    };
                    let square_distance =
                        square_distance_to_segment(points.position(feet.index), points.position(head.index), position);
                    if square_distance < square_search_radius {
                        // Humans are grabbed by the head
                        keep_nearest(
                            slot,
                            Nearest {
                                id: state.id,
                                particle_ordinal: 1,
                                square_distance,
                            },
                        );
                    }
                }
            }
        }

        let winner = on_plane.or(off_plane)?;
        let state = self.npc(winner.id).ok()?;
        let ship = ships.get(state.current_ship_id as usize)?.as_ref()?;
        let particle = state.particle_mesh.particles.get(winner.particle_ordinal)?;
        Some(PickedNpc {
            id: winner.id,
            particle_ordinal: winner.particle_ordinal,
            world_offset: position - ship.points().position(particle.index),
        })
    }

    /// Makes a human face the other way; walkers turn around on the spot.
    pub fn turnaround_npc(&mut self, id: NpcId) -> Result<()> {
        let state = self.npc_mut(id)?;
        if let Some(human) = state.human_mut() {
            if matches!(human.behavior, HumanBehavior::ConstrainedWalking { .. }) {
                flip_walk(human, true);
            } else if human.current_face_direction_x != 0.0 {
                human.current_face_direction_x *= -1.0;
            } else {
                human.current_face_orientation *= -1.0;
            }
        }
        Ok(())
    }

    pub fn select_npc(&mut self, id: Option<NpcId>, events: &mut SimulationEventDispatcher) -> Result<()> {
        if let Some(id) = id {
            self.npc(id)?;
        }
        self.selected_npc = id;
        events.publish(SimulationEvent::NpcSelectionChanged { selected: id });
        Ok(())
    }

    /// Selects the NPC after the current one, wrapping around; a no-op without NPCs.
    pub fn select_next_npc(&mut self, events: &mut SimulationEventDispatcher) -> Result<()> {
        let count = self.state_buffer.len();
        if self.npc_count == 0 || count == 0 {
            return Ok(());
        }

        let start = self.selected_npc.map_or(0, |id| id as usize + 1);
        let next = (0..count)
            .map(|offset| (start + offset) % count)
            .find(|&index| self.state_buffer[index].is_some())
            .map(|index| index as NpcId);
        self.select_npc(next, events)
    }

    pub fn highlight_npc(&mut self, id: NpcId, highlight: NpcHighlight) -> Result<()> {
        self.npc_mut(id)?.highlight = highlight;
        Ok(())
    }

    /// Translates the NPCs of a ship (or only those standing on one of its
    /// connected components) together with the ship.
    pub fn move_by(
        &mut self,
        ship_id: ShipId,
        component: Option<ConnectedComponentId>,
        offset: Vector,
        inertial_velocity: Vector,
        ships: &mut [Option<Ship>],
    ) -> Result<()> {
        self.transform_ship_npcs(ship_id, component, ships, |position, _| (position + offset, inertial_velocity))
    }

    /// Rotates the NPCs of a ship by `angle` radians (counter-clockwise) around `center`.
    pub fn rotate_by(
        &mut self,
        ship_id: ShipId,
        component: Option<ConnectedComponentId>,
        angle: Real,
        center: Vector,
        ships: &mut [Option<Ship>],
    ) -> Result<()> {
        let (sin, cos) = angle.sin_cos();
        self.transform_ship_npcs(ship_id, component, ships, |position, velocity| {
            (center + rotate(position - center, cos, sin), rotate(velocity, cos, sin))
        })
    }

    fn transform_ship_npcs(
        &mut self,
        ship_id: ShipId,
        component: Option<ConnectedComponentId>,
        ships: &mut [Option<Ship>],
        transform: impl Fn(Vector, Vector) -> (Vector, Vector),
    ) -> Result<()> {
        let ship = ship_mut(ships, ship_id)?;
        let ids = self.ship_npcs(ship_id).to_vec();
        for id in ids {
            let state = self.npc_mut(id)?;
            if component.is_some() && primary_component(state, ship) != component {
                continue;
            }
            let points = ship.points_mut();
            for particle in &mut state.particle_mesh.particles {
                let (position, velocity) = transform(points.position(particle.index), points.velocity(particle.index));
                points.set_position(particle.index, position);
                points.set_velocity(particle.index, velocity);
                particle.external_force = Vector::ZERO;
                maintain_in_world_bounds(points, particle.index);
            }
        }
        Ok(())
    }

    /// Knocks out every human with a particle within `radius` of `position`.
    pub fn smash_at(&mut self, position: Vector, radius: Real, ctx: &mut NpcContext<'_>) {
        let square_radius = radius * radius;
        let now = ctx.current_simulation_time;

        for state in self.state_buffer.iter_mut().flatten() {
            if state.kind() != NpcKind::Human || state.current_regime == RegimeType::BeingPlaced {
                continue;
            }
            let Some(ship) = ctx.ships.get(state.current_ship_id as usize).and_then(Option::as_ref) else {
                continue;
            };
            let is_hit = state
                .particle_mesh
                .particles
                .iter()
                .any(|particle| (ship.points().position(particle.index) - position).length_squared() < square_radius);
            if !is_hit {
                continue;
            }

            let is_free = state.current_regime == RegimeType::Free;
            let Some(human) = state.human_mut() else {
                continue;
            };
            let behavior = if is_free {
                HumanBehavior::free_knocked_out()
            } else {
                HumanBehavior::constrained_knocked_out()
            };
            human.transition_to(behavior, now);
            if human.current_face_orientation == 0.0 {
                human.current_face_orientation = if ctx.rng.random_bool(0.5) { 1.0 } else { -1.0 };
                human.current_face_direction_x = 0.0;
            }
            debug!("Npcs: human {} smashed", state.id);
        }
    }

    /// Attracts every NPC particle toward `position` with a force decaying
    /// with the square root of the distance.
    pub fn draw_to(&mut self, position: Vector, strength: Real, ships: &[Option<Ship>]) {
        let strength = strength * DRAW_STRENGTH_MULTIPLIER;
        self.add_external_forces(ships, |particle_position, _| {
            let (direction, distance) = normalise_approx_with_length(position - particle_position);
            direction * (strength / (0.1 + distance).sqrt())
        });
    }

    /// Spins NPC particles around `position` while pulling them in.
    pub fn swirl_at(&mut self, position: Vector, strength: Real, ships: &[Option<Ship>]) {
        let centripetal = strength.abs() * SWIRL_CENTRIPETAL_MULTIPLIER;
        self.add_external_forces(ships, |particle_position, _| {
            let direction = normalise_approx(position - particle_position);
            perp(direction) * strength + direction * centripetal
        });
    }

    /// Pushes NPC particles away from a blast on `ship_id`. Free particles
    /// of any ship feel it too.
    pub fn apply_blast(&mut self, ship_id: ShipId, center: Vector, radius: Real, force: Real, ships: &[Option<Ship>]) {
        let actual_radius = radius * BLAST_RADIUS_MULTIPLIER;
        let square_radius = actual_radius * actual_radius;
        let acceleration = force * BLAST_FORCE_TO_ACCELERATION;

        for state in self.state_buffer.iter_mut().flatten() {
            let Some(ship) = ships.get(state.current_ship_id as usize).and_then(Option::as_ref) else {
                continue;
            };
            let is_home_ship = state.current_ship_id == ship_id;
            for particle in &mut state.particle_mesh.particles {
                if particle.is_constrained() && !is_home_ship {
                    continue;
                }
                let radial = ship.points().position(particle.index) - center;
                if radial.length_squared() >= square_radius {
                    continue;
                }
                let (direction, distance) = normalise_approx_with_length(radial);
                let particle_force = acceleration * 6.0 * particle.mass.sqrt();
                particle.external_force += direction * particle_force / (distance + 2.0);
            }
        }
    }

    fn add_external_forces(&mut self, ships: &[Option<Ship>], force: impl Fn(Vector, Real) -> Vector) {
        for state in self.state_buffer.iter_mut().flatten() {
            if state.current_regime == RegimeType::BeingPlaced {
                continue;
            }
            let Some(ship) = ships.get(state.current_ship_id as usize).and_then(Option::as_ref) else {
                continue;
            };
            for particle in &mut state.particle_mesh.particles {
                particle.external_force += force(ship.points().position(particle.index), particle.mass);
            }
        }
    }

    /// Scares walking humans near the first break of an area.
    pub fn on_ship_triangle_destroyed(&mut self, ship_id: ShipId, triangle: ElementIndex, ships: &[Option<Ship>]) -> Result<()> {
        self.on_ship_triangles_destroyed(ship_id, &[triangle], ships)
    }

    /// Same as [`Self::on_ship_triangle_destroyed`] for a batch destroyed in
    /// one tick, in destruction order: a triangle only counts as a neighbor's
    /// earlier break if it comes first in `destroyed`.
    pub fn on_ship_triangles_destroyed(&mut self, ship_id: ShipId, destroyed: &[ElementIndex], ships: &[Option<Ship>]) -> Result<()> {
        let ship = ships
            .get(ship_id as usize)
            .and_then(Option::as_ref)
            .ok_or(SimulationError::UnknownShip(ship_id))?;
        let triangles = ship.triangles();

        for (ordinal, &triangle) in destroyed.iter().enumerate() {
            if triangle >= triangles.len() {
                return Err(SimulationError::index_out_of_bounds(triangle, triangles.len()));
            }
            let later = &destroyed[ordinal + 1..];

            // Only the first break of an area
            let is_neighbor_broken = (0..3).any(|edge| {
                triangles.opposite_triangle(triangle, edge).is_some_and(|opposite| {
                    triangles.is_deleted(opposite.triangle) && !later.contains(&opposite.triangle)
                })
            });
            if !is_neighbor_broken {
                self.scare_walkers_near(ship_id, ship, triangle)?;
            }
        }
        Ok(())
    }

    fn scare_walkers_near(&mut self, ship_id: ShipId, ship: &Ship, triangle: ElementIndex) -> Result<()> {
        let triangles = ship.triangles();

        let point = triangles.point_a(triangle);
        let component = ship.points().connected_component_id(point);
        let triangle_position = ship.points().position(point);
        let square_radius = TRIANGLE_DESTROYED_SCARE_RADIUS * TRIANGLE_DESTROYED_SCARE_RADIUS;

        for id in self.ship_npcs(ship_id).to_vec() {
            let state = self.npc_mut(id)?;
            if state.current_connected_component_id != Some(component) {
                continue;
            }
            let Some(head) = state.particle_mesh.particles.get(1).map(|particle| particle.index) else {
                continue;
            };
            let head_position = ship.points().position(head);
            let Some(human) = state.human_mut() else {
                continue;
            };
            if !matches!(human.behavior, HumanBehavior::ConstrainedWalking { .. })
                || (head_position - triangle_position).length_squared() > square_radius
            {
                continue;
            }

            if human.misc_panic_level < 0.6
                && (triangle_position.x - head_position.x) * human.current_face_direction_x >= 0.0
            {
                // Walking toward the break
                human.current_face_direction_x *= -1.0;
            }
            human.misc_panic_level = 1.0;
        }
        Ok(())
    }

    pub(crate) fn npc_mut(&mut self, id: NpcId) -> Result<&mut NpcState> {
        self.state_buffer
            .get_mut(id as usize)
            .and_then(Option::as_mut)
            .ok_or(SimulationError::UnknownNpc(id))
    }

    /// Whether the NPC is quad furniture, for callers that draw outlines.
    pub fn is_quad(&self, id: NpcId) -> bool {
        self.npc(id).is_ok_and(|state| {
            matches!(&state.kind_specific, KindSpecificState::Furniture(furniture) if furniture.mesh_kind == ParticleMeshKind::Quad)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::events::RecordingSink;
    use approx::assert_relative_eq;

    fn place_crate(npcs: &mut Npcs, fixture: &mut Fixture, position: Vector) -> NpcId {
        let sub_kind = npcs.database().furniture_id("Crate").unwrap();
        let picked = npcs
            .begin_place_new_furniture_npc(sub_kind, position, true, &mut fixture.ctx())
            .unwrap()
            .picked()
            .unwrap();
        npcs.complete_new_npc(picked.id, &mut fixture.ctx()).unwrap();
        picked.id
    }

    #[test]
    fn probe_finds_the_nearest_human() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let near = place_human(&mut npcs, &mut fixture, Vector::new(0.0, 0.5));
        let far = place_human(&mut npcs, &mut fixture, Vector::new(3.0, 0.5));

        let picked = npcs.probe_npc_at(Vector::new(0.2, 1.0), 1.0, &fixture.ships, 1.0).unwrap();
        assert_eq!(picked.id, near);
        assert_eq!(picked.particle_ordinal, 1);

        let picked = npcs.probe_npc_at(Vector::new(2.7, 1.0), 1.0, &fixture.ships, 1.0).unwrap();
        assert_eq!(picked.id, far);

        assert!(npcs.probe_npc_at(Vector::new(-6.0, 1.0), 1.0, &fixture.ships, 1.0).is_none());
    }

    #[test]
    fn probe_hits_crates_from_inside() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let id = place_crate(&mut npcs, &mut fixture, Vector::new(0.0, 1.0));
        assert!(npcs.is_quad(id));

        // Center of the crate, far from every corner
        let picked = npcs.probe_npc_at(Vector::new(0.0, 1.0), 0.2, &fixture.ships, 1.0).unwrap();
        assert_eq!(picked.id, id);
        assert_eq!(picked.particle_ordinal, 0);
    }

    #[test]
    fn polygon_test_is_even_odd() {
        let square = [
            Vector::new(0.0, 0.0),
            Vector::new(0.0, 1.0),
            Vector::new(1.0, 1.0),
            Vector::new(1.0, 0.0),
        ];
        assert!(is_inside_polygon(&square, Vector::new(0.5, 0.5)));
        assert!(!is_inside_polygon(&square, Vector::new(1.5, 0.5)));
        assert_relative_eq!(square_distance_to_segment(square[0], square[1], Vector::new(2.0, 0.5)), 4.0);
    }

    #[test]
    fn selection_cycles_and_publishes() {
        let mut fixture = Fixture::triangle();
        let sink = RecordingSink::new();
        fixture.events.register_sink(Box::new(sink.clone()));
        let mut npcs = Npcs::default();
        let first = place_human(&mut npcs, &mut fixture, Vector::new(0.0, 0.5));
        let second = place_human(&mut npcs, &mut fixture, Vector::new(2.0, 0.5));

        npcs.select_next_npc(&mut fixture.events).unwrap();
        assert_eq!(npcs.selected_npc(), Some(first));
        npcs.select_next_npc(&mut fixture.events).unwrap();
        assert_eq!(npcs.selected_npc(), Some(second));
        npcs.select_next_npc(&mut fixture.events).unwrap();
        assert_eq!(npcs.selected_npc(), Some(first));

        assert!(matches!(
            npcs.select_npc(Some(42), &mut fixture.events),
            Err(SimulationError::UnknownNpc(42))
        ));
        assert_eq!(npcs.selected_npc(), Some(first));

        fixture.events.flush();
        let selections = sink
            .events()
            .into_iter()
            .filter(|event| matches!(event, SimulationEvent::NpcSelectionChanged { .. }))
            .count();
        assert_eq!(selections, 3);
    }

    #[test]
    fn turnaround_flips_the_face() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let id = place_human(&mut npcs, &mut fixture, Vector::new(0.0, 0.5));
        let before = npcs.npc(id).unwrap().human().unwrap().current_face_orientation;
        npcs.turnaround_npc(id).unwrap();
        assert_eq!(npcs.npc(id).unwrap().human().unwrap().current_face_orientation, -before);
    }

    #[test]
    fn move_by_carries_the_npcs_along() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let id = place_human(&mut npcs, &mut fixture, Vector::new(0.0, 0.5));
        let feet = npcs.npc(id).unwrap().particle_mesh.particles[0].index;
        let before = fixture.ship().points().position(feet);

        npcs.move_by(0, None, Vector::new(1.0, 2.0), Vector::new(0.5, 0.0), &mut fixture.ships)
            .unwrap();
        let after = fixture.ship().points().position(feet);
        assert_relative_eq!(after.x, before.x + 1.0);
        assert_relative_eq!(after.y, before.y + 2.0);
        assert_relative_eq!(fixture.ship().points().velocity(feet).x, 0.5);
    }

    #[test]
    fn rotate_by_turns_around_the_center() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let id = place_human(&mut npcs, &mut fixture, Vector::new(1.0, 0.5));
        let feet = npcs.npc(id).unwrap().particle_mesh.particles[0].index;
        let center = Vector::new(0.0, 0.5);

        npcs.rotate_by(0, None, std::f32::consts::FRAC_PI_2, center, &mut fixture.ships)
            .unwrap();
        let after = fixture.ship().points().position(feet);
        assert_relative_eq!(after.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(after.y, 1.5, epsilon = 1e-5);
    }

    #[test]
    fn smash_knocks_humans_out() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let hit = place_human(&mut npcs, &mut fixture, Vector::new(0.0, 0.5));
        let missed = place_human(&mut npcs, &mut fixture, Vector::new(6.0, 0.5));

        npcs.smash_at(Vector::new(0.0, 0.5), 1.0, &mut fixture.ctx());
        assert_eq!(
            npcs.npc(hit).unwrap().human().unwrap().behavior,
            HumanBehavior::constrained_knocked_out()
        );
        assert_ne!(
            npcs.npc(missed).unwrap().human().unwrap().behavior,
            HumanBehavior::constrained_knocked_out()
        );
    }

    #[test]
    fn force_tools_accumulate_external_forces() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let id = place_human(&mut npcs, &mut fixture, Vector::new(2.0, 0.5));

        npcs.draw_to(Vector::new(0.0, 0.5), 100.0, &fixture.ships);
        let feet_force = npcs.npc(id).unwrap().particle_mesh.particles[0].external_force;
        assert!(feet_force.x < 0.0);
        assert_relative_eq!(feet_force.y, 0.0, epsilon = 1e-5);

        npcs.apply_blast(0, Vector::new(0.0, 0.5), 1.0, 35_000.0, &fixture.ships);
        let after_blast = npcs.npc(id).unwrap().particle_mesh.particles[0].external_force;
        assert!(after_blast.x > feet_force.x);

        // Forces are consumed by the next update
        fixture.tick(&mut npcs);
        assert_eq!(npcs.npc(id).unwrap().particle_mesh.particles[0].external_force, Vector::ZERO);
    }

    #[test]
    fn blast_skips_constrained_npcs_of_other_ships() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let id = place_human(&mut npcs, &mut fixture, Vector::new(0.0, 0.5));
        npcs.apply_blast(3, Vector::new(0.0, 0.0), 5.0, 35_000.0, &fixture.ships);
        assert!(
            npcs.npc(id)
                .unwrap()
                .particle_mesh
                .particles
                .iter()
                .filter(|particle| particle.is_constrained())
                .all(|particle| particle.external_force == Vector::ZERO)
        );
    }

    #[test]
    fn triangle_break_scares_walkers() {
        let mut fixture = Fixture::triangle();
        let mut npcs = Npcs::default();
        let id = place_human(&mut npcs, &mut fixture, Vector::new(-5.0, 0.5));
        npcs.npc_mut(id).map(|state| {
            let human = state.human_mut().unwrap();
            human.transition_to(HumanBehavior::constrained_walking(), 0.0);
            human.current_face_orientation = 0.0;
            // Walking toward the break, reported at the first vertex (-10, 0)
            human.current_face_direction_x = -1.0;
        })
        .unwrap();

        npcs.on_ship_triangle_destroyed(0, 0, &fixture.ships).unwrap();
        let human = npcs.npc(id).unwrap().human().unwrap();
        assert_eq!(human.misc_panic_level, 1.0);
        assert_eq!(human.current_face_direction_x, 1.0);
    }
}

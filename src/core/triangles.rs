//! Triangle mesh
//!
//! Triangles are stored with clockwise vertices. Edge `e` runs from vertex
//! `e` to vertex `(e + 1) % 3` and lies opposite vertex `(e + 2) % 3`, so a
//! barycentric coordinate `b[i]` dropping to zero means the point is leaving
//! through edge `(i + 1) % 3`.

use super::points::{ElementIndex, PlaneId, Points};
use super::springs::Springs;
use crate::math::{
    Real, Vector, are_vertices_in_cw_order, barycentric_coordinates, from_barycentric, perp,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NpcFloorKind {
    #[default]
    NotAFloor,
    DefaultFloor,
}

/// Shape of a floor edge within the factory point grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NpcFloorGeometry {
    #[default]
    NotAFloor,
    /// Horizontal side of a grid square.
    Depth1H,
    /// Vertical side of a grid square.
    Depth1V,
    /// Diagonal, first slope.
    Depth2S1,
    /// Diagonal, second slope.
    Depth2S2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NpcFloorGeometryDepth {
    NotAFloor,
    Depth1,
    Depth2,
}

impl NpcFloorGeometry {
    pub fn depth(self) -> NpcFloorGeometryDepth {
        match self {
            Self::NotAFloor => NpcFloorGeometryDepth::NotAFloor,
            Self::Depth1H | Self::Depth1V => NpcFloorGeometryDepth::Depth1,
            Self::Depth2S1 | Self::Depth2S2 => NpcFloorGeometryDepth::Depth2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OppositeTriangle {
    pub triangle: ElementIndex,
    pub edge_ordinal: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TriangleFloors {
    pub kinds: [NpcFloorKind; 3],
    pub geometries: [NpcFloorGeometry; 3],
}

#[derive(Default)]
pub struct Triangles {
    vertices: Vec<[ElementIndex; 3]>,
    sub_springs: Vec<[ElementIndex; 3]>,
    opposite: Vec<[Option<OppositeTriangle>; 3]>,
    floors: Vec<TriangleFloors>,
    covered_traverse_spring: Vec<Option<ElementIndex>>,
    is_deleted: Vec<bool>,
}

impl Triangles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Adds a triangle; opposite links are wired separately by the builder.
    pub fn add(
        &mut self,
        vertices: [ElementIndex; 3],
        sub_springs: [ElementIndex; 3],
        covered_traverse_spring: Option<ElementIndex>,
        floors: TriangleFloors,
        points: &mut Points,
    ) -> ElementIndex {
        let index = self.vertices.len();
        self.vertices.push(vertices);
        self.sub_springs.push(sub_springs);
        self.opposite.push([None; 3]);
        self.floors.push(floors);
        self.covered_traverse_spring.push(covered_traverse_spring);
        self.is_deleted.push(false);
        for vertex in vertices {
            points.add_connected_triangle(vertex, index);
        }
        index
    }

    pub(crate) fn set_opposite(&mut self, triangle: ElementIndex, edge: usize, opposite: Option<OppositeTriangle>) {
        self.opposite[triangle][edge] = opposite;
    }

    pub(crate) fn set_covered_traverse_spring(&mut self, triangle: ElementIndex, spring: Option<ElementIndex>) {
        self.covered_traverse_spring[triangle] = spring;
    }

    // Accessors

    #[inline]
    pub fn vertices(&self, triangle: ElementIndex) -> [ElementIndex; 3] {
        self.vertices[triangle]
    }

    #[inline]
    pub fn point_a(&self, triangle: ElementIndex) -> ElementIndex {
        self.vertices[triangle][0]
    }

    #[inline]
    pub fn point_b(&self, triangle: ElementIndex) -> ElementIndex {
        self.vertices[triangle][1]
    }

    #[inline]
    pub fn point_c(&self, triangle: ElementIndex) -> ElementIndex {
        self.vertices[triangle][2]
    }

    #[inline]
    pub fn sub_springs(&self, triangle: ElementIndex) -> [ElementIndex; 3] {
        self.sub_springs[triangle]
    }

    #[inline]
    pub fn opposite_triangle(&self, triangle: ElementIndex, edge: usize) -> Option<OppositeTriangle> {
        self.opposite[triangle][edge]
    }

    #[inline]
    pub fn floor_kind(&self, triangle: ElementIndex, edge: usize) -> NpcFloorKind {
        self.floors[triangle].kinds[edge]
    }

    #[inline]
    pub fn floor_geometry(&self, triangle: ElementIndex, edge: usize) -> NpcFloorGeometry {
        self.floors[triangle].geometries[edge]
    }

    pub fn covered_traverse_spring(&self, triangle: ElementIndex) -> Option<ElementIndex> {
        self.covered_traverse_spring[triangle]
    }

    /// Edges plus the traverse spring, if any.
    pub fn covered_springs(&self, triangle: ElementIndex) -> impl Iterator<Item = ElementIndex> + '_ {
        self.sub_springs[triangle]
            .into_iter()
            .chain(self.covered_traverse_spring[triangle])
    }

    #[inline]
    pub fn is_deleted(&self, triangle: ElementIndex) -> bool {
        self.is_deleted[triangle]
    }

    pub fn live_count(&self) -> usize {
        self.is_deleted.iter().filter(|deleted| !**deleted).count()
    }

    /// Plane of the triangle, taken from its first vertex.
    pub fn plane_id(&self, triangle: ElementIndex, points: &Points) -> PlaneId {
        points.plane_id(self.vertices[triangle][0])
    }

    // Geometry

    pub fn positions(&self, triangle: ElementIndex, points: &Points) -> [Vector; 3] {
        let [a, b, c] = self.vertices[triangle];
        [points.position(a), points.position(b), points.position(c)]
    }

    /// Vector from edge vertex `edge` to vertex `edge + 1`.
    pub fn sub_spring_vector(&self, triangle: ElementIndex, edge: usize, points: &Points) -> Vector {
        let vertices = self.vertices[triangle];
        points.position(vertices[(edge + 1) % 3]) - points.position(vertices[edge])
    }

    /// Unit normal of an edge pointing out of the triangle.
    pub fn edge_outward_normal(&self, triangle: ElementIndex, edge: usize, points: &Points) -> Vector {
        crate::math::normalise_approx(perp(self.sub_spring_vector(triangle, edge, points)))
    }

    /// A triangle whose winding flipped under deformation.
    pub fn is_folded(&self, triangle: ElementIndex, points: &Points) -> bool {
        let [a, b, c] = self.positions(triangle, points);
        !are_vertices_in_cw_order(a, b, c)
    }

    pub fn area(&self, triangle: ElementIndex, points: &Points) -> Real {
        let [a, b, c] = self.positions(triangle, points);
        (b - a).perp_dot(c - a).abs() / 2.0
    }

    /// Live and unfolded: NPC particles may be constrained to it.
    pub fn is_workable(&self, triangle: ElementIndex, points: &Points) -> bool {
        !self.is_deleted[triangle] && !self.is_folded(triangle, points)
    }

    pub fn to_barycentric(&self, position: Vector, triangle: ElementIndex, points: &Points) -> Option<[Real; 3]> {
        let [a, b, c] = self.positions(triangle, points);
        barycentric_coordinates(position, a, b, c)
    }

    pub fn from_barycentric(&self, coords: &[Real; 3], triangle: ElementIndex, points: &Points) -> Vector {
        let [a, b, c] = self.positions(triangle, points);
        from_barycentric(coords, a, b, c)
    }

    /// Barycentric-weighted velocity of the triangle at the given coordinates.
    pub fn velocity_at(&self, coords: &[Real; 3], triangle: ElementIndex, points: &Points) -> Vector {
        let [a, b, c] = self.vertices[triangle];
        points.velocity(a) * coords[0] + points.velocity(b) * coords[1] + points.velocity(c) * coords[2]
    }

    pub fn contains(&self, triangle: ElementIndex, position: Vector, points: &Points, tolerance: Real) -> bool {
        self.to_barycentric(position, triangle, points)
            .is_some_and(|coords| coords.iter().all(|&w| w >= -tolerance))
    }

    /// Edges without a live triangle on the other side.
    pub fn frontier_edges(&self) -> Vec<(ElementIndex, usize)> {
        let mut edges = Vec::new();
        for triangle in (0..self.len()).filter(|&t| !self.is_deleted[t]) {
            for edge in 0..3 {
                let is_open = match self.opposite[triangle][edge] {
                    Some(opposite) => self.is_deleted[opposite.triangle],
                    None => true,
                };
                if is_open {
                    edges.push((triangle, edge));
                }
            }
        }
        edges
    }

    /// Topmost workable triangle containing `position`, by plane id.
    pub fn find_topmost_workable_containing(&self, position: Vector, points: &Points) -> Option<(ElementIndex, [Real; 3])> {
        let mut best: Option<(ElementIndex, [Real; 3], PlaneId)> = None;
        for triangle in 0..self.len() {
            if !self.is_workable(triangle, points) {
                continue;
            }
            let Some(coords) = self.to_barycentric(position, triangle, points) else {
                continue;
            };
            if coords.iter().any(|&w| w < 0.0) {
                continue;
            }
            let plane = self.plane_id(triangle, points);
            if best.is_none_or(|(_, _, best_plane)| plane >= best_plane) {
                best = Some((triangle, coords, plane));
            }
        }
        best.map(|(triangle, coords, _)| (triangle, coords))
    }

    // Lifecycle

    /// Removes a triangle from the mesh.
    pub fn destroy(&mut self, triangle: ElementIndex, points: &mut Points, springs: &mut Springs) -> bool {
        if self.is_deleted[triangle] {
            return false;
        }

        self.is_deleted[triangle] = true;
        for vertex in self.vertices[triangle] {
            points.remove_connected_triangle(vertex, triangle);
        }
        for spring in self.sub_springs[triangle] {
            springs.remove_super_triangle(spring, triangle);
        }
        for spring in self.covered_springs(triangle) {
            let count = springs.covering_triangles_count(spring).saturating_sub(1);
            springs.set_covering_triangles_count(spring, count);
        }
        true
    }

    /// Brings a triangle back, provided all its sub-springs are alive.
    pub fn restore(&mut self, triangle: ElementIndex, points: &mut Points, springs: &mut Springs) -> bool {
        if !self.is_deleted[triangle] {
            return false;
        }
        if self.sub_springs[triangle].iter().any(|&s| springs.is_deleted(s)) {
            return false;
        }

        self.is_deleted[triangle] = false;
        for vertex in self.vertices[triangle] {
            points.add_connected_triangle(vertex, triangle);
        }
        for spring in self.sub_springs[triangle] {
            springs.add_super_triangle(spring, triangle);
        }
        for spring in self.covered_springs(triangle) {
            let count = (springs.covering_triangles_count(spring) + 1).min(2);
            springs.set_covering_triangles_count(spring, count);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationParameters;
    use crate::core::materials::MaterialDatabase;
    use crate::core::points::PointDefinition;
    use crate::core::springs::SuperTriangles;
    use approx::assert_relative_eq;

    fn single_triangle() -> (Points, Springs, Triangles) {
        let materials = MaterialDatabase::new();
        let params = SimulationParameters::default();
        let mut points = Points::new(3, 0, 0, 1);
        let a = points.add(PointDefinition::new(Vector::new(-10.0, 0.0), 0), &materials).unwrap();
        let b = points.add(PointDefinition::new(Vector::new(0.0, 4.0), 0), &materials).unwrap();
        let c = points.add(PointDefinition::new(Vector::new(10.0, 0.0), 0), &materials).unwrap();
        let mut springs = Springs::new();
        let edges = [(a, b), (b, c), (c, a)].map(|(p, q)| {
            springs.add(p, q, 0, 0, SuperTriangles::from_slice(&[0]), 1, &mut points, &materials, &params)
        });
        let mut triangles = Triangles::new();
        let mut floors = TriangleFloors::default();
        floors.kinds[2] = NpcFloorKind::DefaultFloor;
        floors.geometries[2] = NpcFloorGeometry::Depth1H;
        triangles.add([a, b, c], edges, None, floors, &mut points);
        (points, springs, triangles)
    }

    #[test]
    fn bottom_edge_runs_right_to_left_with_outward_normal_down() {
        let (points, _, triangles) = single_triangle();
        let edge = triangles.sub_spring_vector(0, 2, &points);
        assert!(edge.x < 0.0);
        let normal = triangles.edge_outward_normal(0, 2, &points);
        assert_relative_eq!(normal.y, -1.0, epsilon = 1e-6);
        assert_eq!(triangles.floor_kind(0, 2), NpcFloorKind::DefaultFloor);
        assert_eq!(triangles.floor_geometry(0, 2).depth(), NpcFloorGeometryDepth::Depth1);
    }

    #[test]
    fn barycentric_zero_maps_to_the_next_edge() {
        let (points, _, triangles) = single_triangle();
        // Straight below the triangle: only the coordinate of the apex goes negative
        let coords = triangles.to_barycentric(Vector::new(0.0, -1.0), 0, &points).unwrap();
        assert!(coords[1] < 0.0);
        assert!(coords[0] > 0.0 && coords[2] > 0.0);
        // ...and b[1] = 0 is edge 2, the bottom one
        assert_eq!((1 + 1) % 3, 2);
    }

    #[test]
    fn containment_and_topmost_search() {
        let (points, _, triangles) = single_triangle();
        assert!(triangles.contains(0, Vector::new(0.0, 1.0), &points, 0.0));
        assert!(!triangles.contains(0, Vector::new(0.0, 5.0), &points, 0.0));
        let (triangle, coords) = triangles
            .find_topmost_workable_containing(Vector::new(1.0, 1.0), &points)
            .unwrap();
        assert_eq!(triangle, 0);
        let back = triangles.from_barycentric(&coords, 0, &points);
        assert_relative_eq!(back.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(back.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn folded_triangles_are_not_workable() {
        let (mut points, _, triangles) = single_triangle();
        assert!(triangles.is_workable(0, &points));
        points.set_position(1, Vector::new(0.0, -4.0));
        assert!(triangles.is_folded(0, &points));
        assert!(triangles.find_topmost_workable_containing(Vector::new(0.0, -1.0), &points).is_none());
    }

    #[test]
    fn destroy_and_restore_maintain_bookkeeping() {
        let (mut points, mut springs, mut triangles) = single_triangle();
        assert_eq!(triangles.frontier_edges().len(), 3);
        assert!(triangles.destroy(0, &mut points, &mut springs));
        assert!(!triangles.destroy(0, &mut points, &mut springs));
        assert!(points.connected_triangles(0).is_empty());
        assert!(springs.super_triangles(0).is_empty());
        assert_eq!(springs.covering_triangles_count(0), 0);
        assert!(triangles.frontier_edges().is_empty());

        assert!(triangles.restore(0, &mut points, &mut springs));
        assert_eq!(points.connected_triangles(0), &[0]);
        assert_eq!(springs.super_triangles(0).len(), 1);
        assert_eq!(springs.covering_triangles_count(0), 1);
    }
}

//! Programmatic ship construction
//!
//! A [`ShipBuilder`] collects points, extra springs, triangles, floor edges
//! and pins, validates them and produces a [`Ship`]. Every triangle edge gets
//! a spring; an extra spring joining the far vertices of two adjacent
//! triangles becomes their covered traverse spring.

use indexmap::IndexMap;

use super::{FloorEdge, Ship, ShipId};
use crate::config::{MAX_PARTICLES_PER_NPC, SimulationParameters};
use crate::core::{
    ElementIndex, MaterialDatabase, MaterialId, NpcFloorGeometry, NpcFloorKind, Octant,
    OppositeTriangle, PointDefinition, Points, Springs, SuperTriangles, TriangleFloors, Triangles,
};
use crate::error::{Result, SimulationError};
use crate::math::{Real, Vector, are_vertices_in_cw_order};

type EdgeKey = (ElementIndex, ElementIndex);

#[inline(always)]
fn edge_key(a: ElementIndex, b: ElementIndex) -> EdgeKey {
    if a <= b { (a, b) } else { (b, a) }
}

/// Octant of the direction from `from` to `to`: 0 is east, counting clockwise.
pub fn octant_of(from: Vector, to: Vector) -> Octant {
    let d = to - from;
    let angle_cw = (-d.y).atan2(d.x);
    let octant = (angle_cw / std::f32::consts::FRAC_PI_4).round() as i32;
    octant.rem_euclid(8) as Octant
}

#[derive(Default)]
pub struct ShipBuilder {
    points: Vec<PointDefinition>,
    springs: Vec<EdgeKey>,
    triangles: Vec<[ElementIndex; 3]>,
    floors: IndexMap<EdgeKey, FloorEdge>,
    pinned: Vec<ElementIndex>,
}

#[derive(Default)]
struct SpringSeed {
    endpoints: (ElementIndex, ElementIndex),
    super_triangles: Vec<ElementIndex>,
    is_traverse: bool,
}

impl ShipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_point(&mut self, definition: PointDefinition) -> ElementIndex {
        self.points.push(definition);
        self.points.len() - 1
    }

    /// Adds a spring that is not a triangle edge, such as a rope or a traverse.
    pub fn add_spring(&mut self, a: ElementIndex, b: ElementIndex) -> &mut Self {
        self.springs.push((a, b));
        self
    }

    /// Adds a triangle; vertices must be in clockwise order.
    pub fn add_triangle(&mut self, vertices: [ElementIndex; 3]) -> &mut Self {
        self.triangles.push(vertices);
        self
    }

    /// Marks the edge between two points as an NPC floor.
    pub fn set_floor(&mut self, a: ElementIndex, b: ElementIndex, geometry: NpcFloorGeometry) -> &mut Self {
        self.floors.insert(
            edge_key(a, b),
            FloorEdge {
                kind: NpcFloorKind::DefaultFloor,
                geometry,
            },
        );
        self
    }

    pub fn pin(&mut self, point: ElementIndex) -> &mut Self {
        self.pinned.push(point);
        self
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    fn validate(&self) -> Result<()> {
        let count = self.points.len();
        if count == 0 {
            return Err(SimulationError::invalid_ship("ship has no points"));
        }

        for &(a, b) in &self.springs {
            if a >= count || b >= count {
                return Err(SimulationError::invalid_ship(format!("spring ({a}, {b}) references a missing point")));
            }
            if a == b {
                return Err(SimulationError::invalid_ship(format!("spring ({a}, {b}) joins a point to itself")));
            }
        }

        for (t, vertices) in self.triangles.iter().enumerate() {
            if vertices.iter().any(|&v| v >= count) {
                return Err(SimulationError::invalid_ship(format!("triangle {t} references a missing point")));
            }
            let [a, b, c] = *vertices;
            if a == b || b == c || a == c {
                return Err(SimulationError::invalid_ship(format!("triangle {t} has repeated vertices")));
            }
            let (pa, pb, pc) = (self.points[a].position, self.points[b].position, self.points[c].position);
            if !are_vertices_in_cw_order(pa, pb, pc) {
                return Err(SimulationError::invalid_ship(format!("triangle {t} is not in clockwise order")));
            }
        }

        if let Some((a, b)) = self.floors.keys().find(|(a, b)| *a >= count || *b >= count) {
            return Err(SimulationError::invalid_ship(format!("floor ({a}, {b}) references a missing point")));
        }
        if let Some(point) = self.pinned.iter().find(|&&p| p >= count) {
            return Err(SimulationError::invalid_ship(format!("pinned point {point} does not exist")));
        }

        Ok(())
    }

    /// Validates the definition and builds the ship.
    pub fn build(
        self,
        id: ShipId,
        materials: &MaterialDatabase,
        params: &SimulationParameters,
    ) -> Result<Ship> {
        self.validate()?;

        let mut points = Points::new(
            self.points.len(),
            params.max_ephemeral_particles,
            params.max_npcs * MAX_PARTICLES_PER_NPC,
            params.spring_relaxation_parallelism,
        );
        for definition in &self.points {
            points.add(*definition, materials)?;
        }

        // Springs: triangle edges first, in triangle order, then the extras
        let mut seeds: IndexMap<EdgeKey, SpringSeed> = IndexMap::new();
        let mut edge_owners: IndexMap<EdgeKey, Vec<(ElementIndex, usize)>> = IndexMap::new();
        for (t, vertices) in self.triangles.iter().enumerate() {
            for edge in 0..3 {
                let (a, b) = (vertices[edge], vertices[(edge + 1) % 3]);
                let key = edge_key(a, b);
                seeds
                    .entry(key)
                    .or_insert_with(|| SpringSeed {
                        endpoints: (a, b),
                        ..Default::default()
                    })
                    .super_triangles
                    .push(t);
                edge_owners.entry(key).or_default().push((t, edge));
            }
        }
        for &(a, b) in &self.springs {
            seeds.entry(edge_key(a, b)).or_insert_with(|| SpringSeed {
                endpoints: (a, b),
                ..Default::default()
            });
        }

        // Adjacent triangle pairs and the traverse springs they cover
        let mut opposites = Vec::new();
        let mut traverses: Vec<Option<ElementIndex>> = vec![None; self.triangles.len()];
        for owners in edge_owners.values() {
            if owners.len() > 2 {
                return Err(SimulationError::invalid_ship("an edge is shared by more than two triangles"));
            }
            let &[(t1, e1), (t2, e2)] = owners.as_slice() else {
                continue;
            };
            opposites.push((t1, e1, t2, e2));

            let far1 = self.triangles[t1][(e1 + 2) % 3];
            let far2 = self.triangles[t2][(e2 + 2) % 3];
            if let Some((spring, _, seed)) = seeds.get_full_mut(&edge_key(far1, far2))
                && seed.super_triangles.is_empty()
            {
                seed.is_traverse = true;
                traverses[t1] = Some(spring);
                traverses[t2] = Some(spring);
            }
        }

        let mut springs = Springs::new();
        for seed in seeds.values() {
            let (a, b) = seed.endpoints;
            let octant_a = octant_of(points.position(a), points.position(b));
            let covering = if seed.is_traverse { 2 } else { seed.super_triangles.len() as u8 };
            springs.add(
                a,
                b,
                octant_a,
                (octant_a + 4) % 8,
                SuperTriangles::from_slice(&seed.super_triangles),
                covering,
                &mut points,
                materials,
                params,
            );
        }

        let mut triangles = Triangles::new();
        for (t, vertices) in self.triangles.iter().enumerate() {
            let mut sub_springs = [0; 3];
            let mut floors = TriangleFloors::default();
            for edge in 0..3 {
                let key = edge_key(vertices[edge], vertices[(edge + 1) % 3]);
                sub_springs[edge] = seeds.get_index_of(&key).unwrap_or_default();
                if let Some(floor) = self.floors.get(&key) {
                    floors.kinds[edge] = floor.kind;
                    floors.geometries[edge] = floor.geometry;
                }
            }
            triangles.add(*vertices, sub_springs, traverses[t], floors, &mut points);
        }
        for (t1, e1, t2, e2) in opposites {
            triangles.set_opposite(
                t1,
                e1,
                Some(OppositeTriangle {
                    triangle: t2,
                    edge_ordinal: e2,
                }),
            );
            triangles.set_opposite(
                t2,
                e2,
                Some(OppositeTriangle {
                    triangle: t1,
                    edge_ordinal: e1,
                }),
            );
        }

        points.recalculate_cached_coefficients(params, materials);
        for &point in &self.pinned {
            points.pin(point, params);
        }

        Ok(Ship::from_parts(id, points, springs, triangles, self.floors, params))
    }
}

/// Rectangular block of square cells, each split into two triangles along
/// the rising diagonal, with the falling diagonal as a traverse spring.
#[derive(Clone, Debug)]
pub struct RectangularGrid {
    pub origin: Vector,
    pub columns: usize,
    pub rows: usize,
    pub spacing: Real,
    pub material: MaterialId,
    decks: Vec<usize>,
    walls: Vec<usize>,
}

impl RectangularGrid {
    pub fn new(origin: Vector, columns: usize, rows: usize, spacing: Real, material: MaterialId) -> Self {
        Self {
            origin,
            columns: columns.max(1),
            rows: rows.max(1),
            spacing,
            material,
            decks: Vec::new(),
            walls: Vec::new(),
        }
    }

    /// Makes every horizontal edge of grid row `row` (0 = bottom) a floor.
    pub fn with_deck(mut self, row: usize) -> Self {
        self.decks.push(row);
        self
    }

    /// Makes every vertical edge of grid column `column` (0 = left) a floor.
    pub fn with_wall(mut self, column: usize) -> Self {
        self.walls.push(column);
        self
    }

    #[inline]
    pub fn point_index(&self, column: usize, row: usize) -> ElementIndex {
        row * (self.columns + 1) + column
    }

    pub fn into_builder(self) -> ShipBuilder {
        let mut builder = ShipBuilder::new();
        for row in 0..=self.rows {
            for column in 0..=self.columns {
                let position = self.origin + Vector::new(column as Real, row as Real) * self.spacing;
                builder.add_point(PointDefinition::new(position, self.material));
            }
        }

        for row in 0..self.rows {
            for column in 0..self.columns {
                let bottom_left = self.point_index(column, row);
                let bottom_right = self.point_index(column + 1, row);
                let top_left = self.point_index(column, row + 1);
                let top_right = self.point_index(column + 1, row + 1);
                builder
                    .add_triangle([top_left, top_right, bottom_left])
                    .add_triangle([top_right, bottom_right, bottom_left])
                    .add_spring(top_left, bottom_right);
            }
        }

        for &row in self.decks.iter().filter(|&&r| r <= self.rows) {
            for column in 0..self.columns {
                builder.set_floor(
                    self.point_index(column, row),
                    self.point_index(column + 1, row),
                    NpcFloorGeometry::Depth1H,
                );
            }
        }
        for &column in self.walls.iter().filter(|&&c| c <= self.columns) {
            for row in 0..self.rows {
                builder.set_floor(
                    self.point_index(column, row),
                    self.point_index(column, row + 1),
                    NpcFloorGeometry::Depth1V,
                );
            }
        }

        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimulationError;

    fn setup() -> (MaterialDatabase, SimulationParameters, MaterialId) {
        let materials = MaterialDatabase::new();
        let iron = materials.structural_id("Iron").unwrap();
        (materials, SimulationParameters::default(), iron)
    }

    #[test]
    fn octants_go_clockwise_from_east() {
        let o = Vector::ZERO;
        assert_eq!(octant_of(o, Vector::new(1.0, 0.0)), 0);
        assert_eq!(octant_of(o, Vector::new(1.0, -1.0)), 1);
        assert_eq!(octant_of(o, Vector::new(0.0, -1.0)), 2);
        assert_eq!(octant_of(o, Vector::new(-1.0, 0.0)), 4);
        assert_eq!(octant_of(o, Vector::new(0.0, 1.0)), 6);
    }

    #[test]
    fn counter_clockwise_triangle_is_rejected() {
        let (materials, params, iron) = setup();
        let mut builder = ShipBuilder::new();
        let a = builder.add_point(PointDefinition::new(Vector::new(0.0, 0.0), iron));
        let b = builder.add_point(PointDefinition::new(Vector::new(1.0, 0.0), iron));
        let c = builder.add_point(PointDefinition::new(Vector::new(0.0, 1.0), iron));
        builder.add_triangle([a, b, c]);

        let result = builder.build(0, &materials, &params);
        assert!(matches!(result, Err(SimulationError::InvalidShipDefinition(_))));
    }

    #[test]
    fn self_spring_is_rejected() {
        let (materials, params, iron) = setup();
        let mut builder = ShipBuilder::new();
        let a = builder.add_point(PointDefinition::new(Vector::ZERO, iron));
        builder.add_spring(a, a);

        assert!(builder.build(0, &materials, &params).is_err());
    }

    #[test]
    fn grid_cell_shares_diagonal_and_covers_traverse() {
        let (materials, params, iron) = setup();
        let ship = RectangularGrid::new(Vector::ZERO, 1, 1, 1.0, iron)
            .with_deck(0)
            .into_builder()
            .build(0, &materials, &params)
            .unwrap();

        let triangles = ship.triangles();
        assert_eq!(triangles.len(), 2);
        // Four sides, the shared diagonal and the traverse
        assert_eq!(ship.springs().len(), 6);

        let opposite = triangles.opposite_triangle(0, 1).unwrap();
        assert_eq!(opposite.triangle, 1);
        assert_eq!(opposite.edge_ordinal, 2);

        let traverse = triangles.covered_traverse_spring(0).unwrap();
        assert_eq!(triangles.covered_traverse_spring(1), Some(traverse));
        assert_eq!(ship.springs().covering_triangles_count(traverse), 2);

        // Bottom edge of the lower triangle is the deck
        assert_eq!(triangles.floor_kind(1, 1), NpcFloorKind::DefaultFloor);
        assert_eq!(triangles.floor_geometry(1, 1), NpcFloorGeometry::Depth1H);
        assert_eq!(triangles.floor_kind(0, 0), NpcFloorKind::NotAFloor);
    }

    #[test]
    fn edge_springs_know_their_triangles() {
        let (materials, params, iron) = setup();
        let ship = RectangularGrid::new(Vector::ZERO, 2, 1, 1.0, iron)
            .into_builder()
            .build(0, &materials, &params)
            .unwrap();

        for t in 0..ship.triangles().len() {
            for spring in ship.triangles().sub_springs(t) {
                assert!(ship.springs().super_triangles(spring).iter().any(|s| s == t));
            }
        }
    }
}

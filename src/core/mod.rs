pub mod ephemeral;
pub mod materials;
pub mod points;
pub mod springs;
pub mod triangles;

pub use ephemeral::{EphemeralHandle, EphemeralParticle, EphemeralPool, EphemeralState, EphemeralType};
pub use materials::{CombustionType, MaterialDatabase, MaterialId, StructuralMaterial};
pub use points::{
    CombustionState, ConnectedComponentId, DetachOptions, ElementIndex, PlaneId, PointDefinition,
    Points,
};
pub use springs::{
    Octant, SpringDestroyOptions, Springs, StrainOutcome, StressRenderMode, SuperTriangles,
    calculate_spring_strength_iterations_adjustment,
};
pub use triangles::{
    NpcFloorGeometry, NpcFloorGeometryDepth, NpcFloorKind, OppositeTriangle, TriangleFloors,
    Triangles,
};

//! Built-in NPC sub-kinds
//!
//! Each sub-kind fixes the particle mesh of the NPCs made from it and the
//! physical attributes of their particles. Ids are insertion indices.

use indexmap::IndexMap;

use super::ParticleMeshKind;
use crate::error::{Result, SimulationError};
use crate::math::Real;

pub type NpcSubKindId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HumanRole {
    Captain,
    Crew,
    Passenger,
    Other,
}

/// Physical attributes of one NPC particle, before size scaling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NpcParticleAttributes {
    /// Mass in kg at size multiplier 1.
    pub mass: Real,
    /// Fraction of a unit square that displaces water.
    pub buoyancy_volume_fill: Real,
    pub static_friction: Real,
    pub kinetic_friction: Real,
    /// Lower contact surface makes for less friction.
    pub friction_surface_adjustment: Real,
    pub elasticity: Real,
    pub wind_receptivity: Real,
    /// Fraction of the spring elongation recovered per tick.
    pub spring_reduction_fraction: Real,
    pub spring_damping_coefficient: Real,
}

impl NpcParticleAttributes {
    fn human_feet() -> Self {
        Self {
            mass: 45.0,
            buoyancy_volume_fill: 0.04,
            static_friction: 0.55,
            kinetic_friction: 0.45,
            friction_surface_adjustment: 1.0,
            elasticity: 0.05,
            wind_receptivity: 0.1,
            spring_reduction_fraction: 0.8,
            spring_damping_coefficient: 0.4,
        }
    }

    fn human_head() -> Self {
        Self {
            mass: 25.0,
            buoyancy_volume_fill: 0.03,
            static_friction: 0.4,
            kinetic_friction: 0.3,
            friction_surface_adjustment: 0.5,
            elasticity: 0.3,
            wind_receptivity: 0.2,
            ..Self::human_feet()
        }
    }

    fn furniture(mass: Real, buoyancy_volume_fill: Real) -> Self {
        Self {
            mass,
            buoyancy_volume_fill,
            static_friction: 0.5,
            kinetic_friction: 0.4,
            friction_surface_adjustment: 1.0,
            elasticity: 0.2,
            wind_receptivity: 0.05,
            spring_reduction_fraction: 0.5,
            spring_damping_coefficient: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HumanSubKind {
    pub name: String,
    pub role: HumanRole,
    /// Scales the randomly drawn body height.
    pub size_multiplier: Real,
    pub feet: NpcParticleAttributes,
    pub head: NpcParticleAttributes,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FurnitureGeometry {
    pub width: Real,
    pub height: Real,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FurnitureSubKind {
    pub name: String,
    pub mesh_kind: ParticleMeshKind,
    pub geometry: FurnitureGeometry,
    pub particle: NpcParticleAttributes,
}

#[derive(Clone, Debug)]
pub struct NpcDatabase {
    humans: IndexMap<String, HumanSubKind>,
    furniture: IndexMap<String, FurnitureSubKind>,
}

impl Default for NpcDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl NpcDatabase {
    pub fn new() -> Self {
        let mut database = Self {
            humans: IndexMap::new(),
            furniture: IndexMap::new(),
        };

        for (name, role, size_multiplier) in [
            ("Captain", HumanRole::Captain, 1.0),
            ("Sailor", HumanRole::Crew, 1.0),
            ("Passenger", HumanRole::Passenger, 1.0),
            ("Child", HumanRole::Passenger, 0.7),
        ] {
            database.add_human(HumanSubKind {
                name: name.to_string(),
                role,
                size_multiplier,
                feet: NpcParticleAttributes::human_feet(),
                head: NpcParticleAttributes::human_head(),
            });
        }

        database.add_furniture(FurnitureSubKind {
            name: "Crate".to_string(),
            mesh_kind: ParticleMeshKind::Quad,
            geometry: FurnitureGeometry {
                width: 1.0,
                height: 1.0,
            },
            particle: NpcParticleAttributes::furniture(15.0, 0.025),
        });
        database.add_furniture(FurnitureSubKind {
            name: "Barrel".to_string(),
            mesh_kind: ParticleMeshKind::Quad,
            geometry: FurnitureGeometry {
                width: 0.7,
                height: 1.0,
            },
            particle: NpcParticleAttributes::furniture(30.0, 0.02),
        });
        database.add_furniture(FurnitureSubKind {
            name: "Lamp".to_string(),
            mesh_kind: ParticleMeshKind::Particle,
            geometry: FurnitureGeometry {
                width: 0.3,
                height: 0.3,
            },
            particle: NpcParticleAttributes::furniture(5.0, 0.002),
        });
        database.add_furniture(FurnitureSubKind {
            name: "Oar".to_string(),
            mesh_kind: ParticleMeshKind::Dipole,
            geometry: FurnitureGeometry {
                width: 0.1,
                height: 2.0,
            },
            particle: NpcParticleAttributes::furniture(4.0, 0.004),
        });

        database
    }

    /// Inserts or replaces a human sub-kind, returning its id.
    pub fn add_human(&mut self, sub_kind: HumanSubKind) -> NpcSubKindId {
        let (index, _) = self.humans.insert_full(sub_kind.name.clone(), sub_kind);
        index as NpcSubKindId
    }

    /// Inserts or replaces a furniture sub-kind, returning its id.
    pub fn add_furniture(&mut self, sub_kind: FurnitureSubKind) -> NpcSubKindId {
        let (index, _) = self.furniture.insert_full(sub_kind.name.clone(), sub_kind);
        index as NpcSubKindId
    }

    pub fn human(&self, id: NpcSubKindId) -> Result<&HumanSubKind> {
        self.humans
            .get_index(id as usize)
            .map(|(_, sub_kind)| sub_kind)
            .ok_or_else(|| SimulationError::UnknownNpcSubKind(format!("human #{id}")))
    }

    pub fn furniture(&self, id: NpcSubKindId) -> Result<&FurnitureSubKind> {
        self.furniture
            .get_index(id as usize)
            .map(|(_, sub_kind)| sub_kind)
            .ok_or_else(|| SimulationError::UnknownNpcSubKind(format!("furniture #{id}")))
    }

    pub fn human_id(&self, name: &str) -> Option<NpcSubKindId> {
        self.humans.get_index_of(name).map(|index| index as NpcSubKindId)
    }

    pub fn furniture_id(&self, name: &str) -> Option<NpcSubKindId> {
        self.furniture.get_index_of(name).map(|index| index as NpcSubKindId)
    }

    /// Human sub-kinds grouped by role, in insertion order.
    pub fn human_sub_kinds_by_role(&self, role: HumanRole) -> Vec<NpcSubKindId> {
        self.humans
            .values()
            .enumerate()
            .filter(|(_, sub_kind)| sub_kind.role == role)
            .map(|(index, _)| index as NpcSubKindId)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_addressable_by_name() {
        let database = NpcDatabase::new();
        let crate_id = database.furniture_id("Crate").unwrap();
        assert_eq!(database.furniture(crate_id).unwrap().mesh_kind, ParticleMeshKind::Quad);
        let captain = database.human_id("Captain").unwrap();
        assert_eq!(database.human(captain).unwrap().role, HumanRole::Captain);
        assert_eq!(database.human_sub_kinds_by_role(HumanRole::Passenger).len(), 2);
    }

    #[test]
    fn unknown_sub_kinds_are_errors() {
        let database = NpcDatabase::new();
        assert!(matches!(
            database.human(99),
            Err(SimulationError::UnknownNpcSubKind(_))
        ));
    }

    #[test]
    fn replacing_keeps_the_id() {
        let mut database = NpcDatabase::new();
        let id = database.furniture_id("Lamp").unwrap();
        let mut lamp = database.furniture(id).unwrap().clone();
        lamp.particle.mass = 9.0;
        assert_eq!(database.add_furniture(lamp), id);
        assert_eq!(database.furniture(id).unwrap().particle.mass, 9.0);
    }
}

//! Structural and electrical materials
//!
//! Materials are immutable after the database is built; points refer to
//! them by [`MaterialId`].

use indexmap::IndexMap;

use crate::math::Real;

pub type MaterialId = u16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CombustionType {
    Combustion,
    Explosion,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructuralMaterial {
    pub name: String,
    /// Mass of one particle made of this material, in kg.
    pub mass: Real,
    pub stiffness: Real,
    /// Spring breaking elongation as a fraction of rest length.
    pub strength: Real,
    /// Fraction of the breaking elongation above which a spring is stressed.
    pub strain_threshold_fraction: Real,
    pub buoyancy_volume_fill: Real,
    pub thermal_expansion_coefficient: Real,
    pub specific_heat: Real,
    pub thermal_conductivity: Real,
    pub ignition_temperature: Real,
    pub melting_temperature: Real,
    pub combustion_type: CombustionType,
    pub wind_receptivity: Real,
    pub elasticity_coefficient: Real,
    pub kinetic_friction_coefficient: Real,
    pub water_intake: Real,
    pub water_diffusion_speed: Real,
    pub is_hull: bool,
    pub is_rope: bool,
}

impl StructuralMaterial {
    fn preset(name: &str, mass: Real, strength: Real, stiffness: Real) -> Self {
        Self {
            name: name.to_string(),
            mass,
            stiffness,
            strength,
            strain_threshold_fraction: 0.5,
            buoyancy_volume_fill: 1.0,
            thermal_expansion_coefficient: 0.0,
            specific_heat: 500.0,
            thermal_conductivity: 0.5,
            ignition_temperature: 1000.0,
            melting_temperature: 1800.0,
            combustion_type: CombustionType::Combustion,
            wind_receptivity: 0.0,
            elasticity_coefficient: 0.5,
            kinetic_friction_coefficient: 0.25,
            water_intake: 1.0,
            water_diffusion_speed: 0.5,
            is_hull: false,
            is_rope: false,
        }
    }

    pub fn iron() -> Self {
        Self {
            thermal_expansion_coefficient: 0.000012,
            thermal_conductivity: 0.8,
            ignition_temperature: 2100.0,
            melting_temperature: 1811.0,
            is_hull: true,
            ..Self::preset("Iron", 7874.0, 0.8, 1.0)
        }
    }

    pub fn wood() -> Self {
        Self {
            thermal_expansion_coefficient: 0.00003,
            specific_heat: 1700.0,
            thermal_conductivity: 0.12,
            ignition_temperature: 573.0,
            melting_temperature: 1273.0,
            wind_receptivity: 0.1,
            ..Self::preset("Wood", 750.0, 0.4, 1.0)
        }
    }

    pub fn glass() -> Self {
        Self {
            strain_threshold_fraction: 0.8,
            thermal_conductivity: 0.9,
            ignition_temperature: 3000.0,
            melting_temperature: 1673.0,
            ..Self::preset("Glass", 2500.0, 0.05, 1.0)
        }
    }

    pub fn rope() -> Self {
        Self {
            wind_receptivity: 0.3,
            ignition_temperature: 500.0,
            is_rope: true,
            ..Self::preset("Rope", 1200.0, 2.0, 0.5)
        }
    }

    pub fn cloth() -> Self {
        Self {
            wind_receptivity: 1.0,
            ignition_temperature: 480.0,
            ..Self::preset("Cloth", 100.0, 0.6, 0.4)
        }
    }

    pub fn air_bubble() -> Self {
        Self {
            buoyancy_volume_fill: 1.0,
            water_intake: 0.0,
            ..Self::preset("AirBubble", 0.1, 1.0, 1.0)
        }
    }

    pub fn debris() -> Self {
        Self::preset("Debris", 50.0, 1.0, 1.0)
    }

    pub fn smoke() -> Self {
        Self {
            buoyancy_volume_fill: 0.0,
            wind_receptivity: 1.0,
            ..Self::preset("Smoke", 0.01, 1.0, 1.0)
        }
    }

    pub fn sparkle() -> Self {
        Self::preset("Sparkle", 0.05, 1.0, 1.0)
    }

    /// NPC particles reserve slots in the same store and need a material too.
    pub fn npc() -> Self {
        Self {
            water_intake: 0.0,
            ..Self::preset("Npc", 70.0, 1.0, 1.0)
        }
    }

    pub fn with_strength(mut self, strength: Real) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_mass(mut self, mass: Real) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_stiffness(mut self, stiffness: Real) -> Self {
        self.stiffness = stiffness;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ElectricalMaterial {
    pub name: String,
    pub is_self_powered: bool,
    pub heat_generated: Real,
}

/// Well-known materials every database carries, used for particles that are
/// not built from ship content.
#[derive(Clone, Copy, Debug)]
pub struct UniqueMaterials {
    pub air_bubble: MaterialId,
    pub debris: MaterialId,
    pub smoke: MaterialId,
    pub sparkle: MaterialId,
    pub npc: MaterialId,
}

#[derive(Clone, Debug)]
pub struct MaterialDatabase {
    structural: IndexMap<String, StructuralMaterial>,
    electrical: Vec<ElectricalMaterial>,
    unique: UniqueMaterials,
}

impl Default for MaterialDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MaterialDatabase {
    /// Database with the built-in structural presets.
    pub fn new() -> Self {
        let mut structural = IndexMap::new();
        for material in [
            StructuralMaterial::iron(),
            StructuralMaterial::wood(),
            StructuralMaterial::glass(),
            StructuralMaterial::rope(),
            StructuralMaterial::cloth(),
            StructuralMaterial::air_bubble(),
            StructuralMaterial::debris(),
            StructuralMaterial::smoke(),
            StructuralMaterial::sparkle(),
            StructuralMaterial::npc(),
        ] {
            structural.insert(material.name.clone(), material);
        }

        let index_of = |map: &IndexMap<String, StructuralMaterial>, name: &str| {
            map.get_index_of(name).unwrap_or(0) as MaterialId
        };
        let unique = UniqueMaterials {
            air_bubble: index_of(&structural, "AirBubble"),
            debris: index_of(&structural, "Debris"),
            smoke: index_of(&structural, "Smoke"),
            sparkle: index_of(&structural, "Sparkle"),
            npc: index_of(&structural, "Npc"),
        };

        Self {
            structural,
            electrical: vec![ElectricalMaterial {
                name: "Cable".to_string(),
                is_self_powered: false,
                heat_generated: 0.0,
            }],
            unique,
        }
    }

    /// Inserts or replaces a structural material, returning its id.
    pub fn add_structural(&mut self, material: StructuralMaterial) -> MaterialId {
        let (index, _) = self.structural.insert_full(material.name.clone(), material);
        index as MaterialId
    }

    pub fn structural(&self, id: MaterialId) -> &StructuralMaterial {
        // Ids are only produced by this database, so the fallback never triggers
        // for well-formed content.
        self.structural
            .get_index(id as usize)
            .map(|(_, material)| material)
            .unwrap_or_else(|| &self.structural[0])
    }

    pub fn structural_id(&self, name: &str) -> Option<MaterialId> {
        self.structural.get_index_of(name).map(|index| index as MaterialId)
    }

    pub fn electrical(&self, id: MaterialId) -> Option<&ElectricalMaterial> {
        self.electrical.get(id as usize)
    }

    pub fn unique(&self) -> &UniqueMaterials {
        &self.unique
    }

    pub fn structural_count(&self) -> usize {
        self.structural.len()
    }
}

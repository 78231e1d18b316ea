//! NPC state
//!
//! An NPC is a small particle mesh (1, 2 or 4 particles plus the springs
//! between them) living in the NPC region of its host ship's particle store,
//! together with the kind-specific state of furniture or humans.

use super::database::{HumanRole, NpcParticleAttributes, NpcSubKindId};
use super::{NpcId, ParticleMeshKind};
use crate::core::{ConnectedComponentId, ElementIndex, PlaneId};
use crate::math::{Real, Vector, converge};
use crate::ship::ShipId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NpcKind {
    Furniture,
    Human,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegimeType {
    BeingPlaced,
    Constrained,
    Free,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NpcHighlight {
    #[default]
    None,
    Candidate,
    Selected,
}

/// Position of a particle inside a ship triangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BarycentricPosition {
    pub triangle: ElementIndex,
    pub coords: [Real; 3],
}

/// A triangle edge acting as floor under a particle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VirtualFloor {
    pub triangle: ElementIndex,
    pub edge: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstrainedState {
    pub position: BarycentricPosition,
    /// Velocity relative to the mesh at the particle's position.
    pub mesh_relative_velocity: Vector,
    pub current_virtual_floor: Option<VirtualFloor>,
    /// Set for one tick to let the particle pass through the floor it rests on.
    pub ghost_pulse: bool,
}

impl ConstrainedState {
    pub fn new(triangle: ElementIndex, coords: [Real; 3]) -> Self {
        Self {
            position: BarycentricPosition { triangle, coords },
            mesh_relative_velocity: Vector::ZERO,
            current_virtual_floor: None,
            ghost_pulse: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NpcParticle {
    /// Slot in the host ship's particle store.
    pub index: ElementIndex,
    pub attributes: NpcParticleAttributes,
    /// Size-scaled mass.
    pub mass: Real,
    /// Upward force at full submersion.
    pub buoyancy_factor: Real,
    pub constrained: Option<ConstrainedState>,
    /// How much of the particle is under water, in [0, 1].
    pub waterness: Real,
    pub preliminary_force: Vector,
    /// Tool forces, consumed by the next update.
    pub external_force: Vector,
}

impl NpcParticle {
    pub fn new(index: ElementIndex, attributes: NpcParticleAttributes) -> Self {
        Self {
            index,
            attributes,
            mass: attributes.mass,
            buoyancy_factor: 0.0,
            constrained: None,
            waterness: 0.0,
            preliminary_force: Vector::ZERO,
            external_force: Vector::ZERO,
        }
    }

    #[inline]
    pub fn is_constrained(&self) -> bool {
        self.constrained.is_some()
    }

    #[inline]
    pub fn virtual_floor(&self) -> Option<VirtualFloor> {
        self.constrained.and_then(|state| state.current_virtual_floor)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NpcSpring {
    /// Particle ordinals within the mesh.
    pub endpoints: (usize, usize),
    /// Rest length at size multiplier 1.
    pub base_rest_length: Real,
    pub rest_length: Real,
    pub stiffness_factor: Real,
    pub damping_factor: Real,
}

impl NpcSpring {
    pub fn new(a: usize, b: usize, base_rest_length: Real) -> Self {
        Self {
            endpoints: (a, b),
            base_rest_length,
            rest_length: base_rest_length,
            stiffness_factor: 0.0,
            damping_factor: 0.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParticleMesh {
    pub particles: Vec<NpcParticle>,
    pub springs: Vec<NpcSpring>,
}

impl ParticleMesh {
    #[inline]
    pub fn primary(&self) -> &NpcParticle {
        &self.particles[0]
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BeingPlacedState {
    pub anchor_particle_ordinal: usize,
    pub move_whole_mesh: bool,
    /// Regime before the move started; `None` for brand new NPCs.
    pub previous_regime: Option<RegimeType>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NpcCombustionState {
    /// Flame size in (0, 1].
    pub flame_development: Real,
}

/// Right leg, left leg, right arm, left arm.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LimbVector {
    pub right_leg: Real,
    pub left_leg: Real,
    pub right_arm: Real,
    pub left_arm: Real,
}

impl LimbVector {
    pub const fn new(right_leg: Real, left_leg: Real, right_arm: Real, left_arm: Real) -> Self {
        Self {
            right_leg,
            left_leg,
            right_arm,
            left_arm,
        }
    }

    pub const fn splat(value: Real) -> Self {
        Self::new(value, value, value, value)
    }

    pub fn converge_to(&mut self, target: &LimbVector, rate: Real) {
        self.right_leg = converge(self.right_leg, target.right_leg, rate);
        self.left_leg = converge(self.left_leg, target.left_leg, rate);
        self.right_arm = converge(self.right_arm, target.right_arm, rate);
        self.left_arm = converge(self.left_arm, target.left_arm, rate);
    }

    pub fn as_array(&self) -> [Real; 4] {
        [self.right_leg, self.left_leg, self.right_arm, self.left_arm]
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HumanAnimationState {
    pub limb_angles: LimbVector,
    pub limb_length_multipliers: LimbVector,
    pub upper_leg_length_fraction: Real,
    pub crotch_height_multiplier: Real,
}

impl Default for HumanAnimationState {
    fn default() -> Self {
        Self {
            limb_angles: LimbVector::default(),
            limb_length_multipliers: LimbVector::splat(1.0),
            upper_leg_length_fraction: 1.0,
            crotch_height_multiplier: 1.0,
        }
    }
}

/// Human behaviors, each carrying its own progress accumulators.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HumanBehavior {
    BeingPlaced,

    ConstrainedFalling {
        progress_to_pre_rising: Real,
        progress_to_aerial: Real,
    },
    ConstrainedAerial {
        progress_to_falling: Real,
        progress_to_rising: Real,
    },
    ConstrainedKnockedOut {
        progress_to_pre_rising: Real,
        progress_to_aerial: Real,
    },
    ConstrainedPreRising {
        progress_to_rising: Real,
        progress_to_aerial: Real,
    },
    ConstrainedRising {
        /// Last floor seen under the feet, kept through short gaps.
        virtual_edge_rising_against: Option<VirtualFloor>,
        ticks_without_edge: u32,
    },
    ConstrainedEquilibrium {
        progress_to_walking: Real,
    },
    ConstrainedWalking {
        current_flip_decision: Real,
        target_flip_decision: Real,
    },
    ConstrainedInWater {
        progress_to_swimming: Real,
    },
    ConstrainedSwimmingStyle1,
    ConstrainedSwimmingStyle2,
    ConstrainedElectrified {
        /// Ticks without electrification, decremented while electrified.
        progress_to_leaving: Real,
    },

    FreeAerial {
        progress_to_knocked_out: Real,
    },
    FreeKnockedOut {
        progress_to_aerial: Real,
    },
    FreeInWater {
        progress_to_swimming: Real,
    },
    FreeSwimmingStyle1,
    FreeSwimmingStyle2,
    FreeSwimmingStyle3,
}

impl HumanBehavior {
    pub fn constrained_falling() -> Self {
        Self::ConstrainedFalling {
            progress_to_pre_rising: 0.0,
            progress_to_aerial: 0.0,
        }
    }

    pub fn constrained_aerial() -> Self {
        Self::ConstrainedAerial {
            progress_to_falling: 0.0,
            progress_to_rising: 0.0,
        }
    }

    pub fn constrained_knocked_out() -> Self {
        Self::ConstrainedKnockedOut {
            progress_to_pre_rising: 0.0,
            progress_to_aerial: 0.0,
        }
    }

    pub fn constrained_pre_rising() -> Self {
        Self::ConstrainedPreRising {
            progress_to_rising: 0.0,
            progress_to_aerial: 0.0,
        }
    }

    pub fn constrained_rising() -> Self {
        Self::ConstrainedRising {
            virtual_edge_rising_against: None,
            ticks_without_edge: 0,
        }
    }

    pub fn constrained_equilibrium() -> Self {
        Self::ConstrainedEquilibrium {
            progress_to_walking: 0.0,
        }
    }

    pub fn constrained_walking() -> Self {
        Self::ConstrainedWalking {
            current_flip_decision: 0.0,
            target_flip_decision: 0.0,
        }
    }

    pub fn constrained_in_water() -> Self {
        Self::ConstrainedInWater {
            progress_to_swimming: 0.0,
        }
    }

    pub fn constrained_electrified() -> Self {
        Self::ConstrainedElectrified {
            progress_to_leaving: 0.0,
        }
    }

    pub fn free_aerial() -> Self {
        Self::FreeAerial {
            progress_to_knocked_out: 0.0,
        }
    }

    pub fn free_knocked_out() -> Self {
        Self::FreeKnockedOut {
            progress_to_aerial: 0.0,
        }
    }

    pub fn free_in_water() -> Self {
        Self::FreeInWater {
            progress_to_swimming: 0.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BeingPlaced => "BeingPlaced",
            Self::ConstrainedFalling { .. } => "Constrained_Falling",
            Self::ConstrainedAerial { .. } => "Constrained_Aerial",
            Self::ConstrainedKnockedOut { .. } => "Constrained_KnockedOut",
            Self::ConstrainedPreRising { .. } => "Constrained_PreRising",
            Self::ConstrainedRising { .. } => "Constrained_Rising",
            Self::ConstrainedEquilibrium { .. } => "Constrained_Equilibrium",
            Self::ConstrainedWalking { .. } => "Constrained_Walking",
            Self::ConstrainedInWater { .. } => "Constrained_InWater",
            Self::ConstrainedSwimmingStyle1 => "Constrained_Swimming_Style1",
            Self::ConstrainedSwimmingStyle2 => "Constrained_Swimming_Style2",
            Self::ConstrainedElectrified { .. } => "Constrained_Electrified",
            Self::FreeAerial { .. } => "Free_Aerial",
            Self::FreeKnockedOut { .. } => "Free_KnockedOut",
            Self::FreeInWater { .. } => "Free_InWater",
            Self::FreeSwimmingStyle1 => "Free_Swimming_Style1",
            Self::FreeSwimmingStyle2 => "Free_Swimming_Style2",
            Self::FreeSwimmingStyle3 => "Free_Swimming_Style3",
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(
            self,
            Self::FreeAerial { .. }
                | Self::FreeKnockedOut { .. }
                | Self::FreeInWater { .. }
                | Self::FreeSwimmingStyle1
                | Self::FreeSwimmingStyle2
                | Self::FreeSwimmingStyle3
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HumanNpcState {
    pub sub_kind: NpcSubKindId,
    pub role: HumanRole,
    /// Body height at size multiplier 1.
    pub height: Real,
    /// Walking speed at walking adjustment 1, in m/s.
    pub walking_speed_base: Real,

    pub behavior: HumanBehavior,
    pub behavior_transition_time: Real,

    pub resultant_panic_level: Real,
    pub on_fire_panic_level: Real,
    pub bomb_proximity_panic_level: Real,
    pub misc_panic_level: Real,

    /// 1 front, -1 back, 0 side.
    pub current_face_orientation: Real,
    /// Only meaningful when looking sideways: -1 or 1.
    pub current_face_direction_x: Real,
    /// Ramps from 0 to 1 after every transition and walk flip.
    pub current_walking_magnitude: Real,
    /// Grows while the feet are off the floor; shared by the upright behaviors.
    pub equilibrium_soft_termination_decision: Real,
    /// Non-zero while the head is pulled upright.
    pub equilibrium_torque: Real,

    pub total_distance_traveled_on_edge: Real,
    pub total_distance_traveled_off_edge: Real,

    pub animation: HumanAnimationState,
}

impl HumanNpcState {
    pub fn new(sub_kind: NpcSubKindId, role: HumanRole, height: Real, walking_speed_base: Real, current_simulation_time: Real) -> Self {
        Self {
            sub_kind,
            role,
            height,
            walking_speed_base,
            behavior: HumanBehavior::BeingPlaced,
            behavior_transition_time: current_simulation_time,
            resultant_panic_level: 0.0,
            on_fire_panic_level: 0.0,
            bomb_proximity_panic_level: 0.0,
            misc_panic_level: 0.0,
            current_face_orientation: 1.0,
            current_face_direction_x: 0.0,
            current_walking_magnitude: 0.0,
            equilibrium_soft_termination_decision: 0.0,
            equilibrium_torque: 0.0,
            total_distance_traveled_on_edge: 0.0,
            total_distance_traveled_off_edge: 0.0,
            animation: HumanAnimationState::default(),
        }
    }

    pub fn transition_to(&mut self, behavior: HumanBehavior, current_simulation_time: Real) {
        if matches!(behavior, HumanBehavior::ConstrainedRising { .. }) {
            self.equilibrium_soft_termination_decision = 0.0;
        }
        self.behavior = behavior;
        self.behavior_transition_time = current_simulation_time;
        self.current_walking_magnitude = 0.0;
        self.total_distance_traveled_on_edge = 0.0;
        self.total_distance_traveled_off_edge = 0.0;
    }

    /// Seconds spent in the current behavior.
    #[inline]
    pub fn elapsed(&self, current_simulation_time: Real) -> Real {
        current_simulation_time - self.behavior_transition_time
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FurnitureNpcState {
    pub sub_kind: NpcSubKindId,
    pub mesh_kind: ParticleMeshKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum KindSpecificState {
    Furniture(FurnitureNpcState),
    Human(HumanNpcState),
}

#[derive(Clone, Debug, PartialEq)]
pub struct NpcState {
    pub id: NpcId,
    pub current_ship_id: ShipId,
    pub current_plane_id: PlaneId,
    pub current_connected_component_id: Option<ConnectedComponentId>,
    pub current_regime: RegimeType,
    pub particle_mesh: ParticleMesh,
    pub kind_specific: KindSpecificState,
    pub being_placed: Option<BeingPlacedState>,
    /// -1 fully extinguished, 1 fully burning.
    pub combustion_progress: Real,
    pub combustion_state: Option<NpcCombustionState>,
    pub highlight: NpcHighlight,
    /// Uniform in [-1, 1], drawn once at creation.
    pub random_normalized_uniform_seed: Real,
}

impl NpcState {
    pub fn kind(&self) -> NpcKind {
        match self.kind_specific {
            KindSpecificState::Furniture(_) => NpcKind::Furniture,
            KindSpecificState::Human(_) => NpcKind::Human,
        }
    }

    pub fn human(&self) -> Option<&HumanNpcState> {
        match &self.kind_specific {
            KindSpecificState::Human(human) => Some(human),
            KindSpecificState::Furniture(_) => None,
        }
    }

    pub fn human_mut(&mut self) -> Option<&mut HumanNpcState> {
        match &mut self.kind_specific {
            KindSpecificState::Human(human) => Some(human),
            KindSpecificState::Furniture(_) => None,
        }
    }

    /// Regime the NPC counts under: being placed NPCs count as what they were.
    pub fn effective_regime(&self) -> Option<RegimeType> {
        match self.current_regime {
            RegimeType::BeingPlaced => self.being_placed.and_then(|state| state.previous_regime),
            regime => Some(regime),
        }
    }

    /// Constrained iff the primary particle is.
    pub fn calculate_regime(&self) -> RegimeType {
        if self.particle_mesh.primary().is_constrained() {
            RegimeType::Constrained
        } else {
            RegimeType::Free
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limb_vector_converges_geometrically() {
        let mut limbs = LimbVector::default();
        let target = LimbVector::new(1.0, -1.0, 2.0, -2.0);
        limbs.converge_to(&target, 0.5);
        assert_eq!(limbs.as_array(), [0.5, -0.5, 1.0, -1.0]);
        limbs.converge_to(&target, 0.5);
        assert_eq!(limbs.as_array(), [0.75, -0.75, 1.5, -1.5]);
    }

    #[test]
    fn behavior_names_are_distinct() {
        let names = [
            HumanBehavior::constrained_falling().name(),
            HumanBehavior::constrained_aerial().name(),
            HumanBehavior::free_aerial().name(),
            HumanBehavior::FreeSwimmingStyle3.name(),
        ];
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(HumanBehavior::free_in_water().is_free());
        assert!(!HumanBehavior::constrained_in_water().is_free());
    }
}

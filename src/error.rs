//! Error types for ship construction and NPC management.
//!
//! Per-tick outcomes (spring breakage, failed placements, regime changes) are
//! modelled as data and never surface here.

use thiserror::Error;

use crate::core::ElementIndex;
use crate::npcs::{NpcId, ParticleMeshKind};
use crate::ship::ShipId;

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimulationError>;

/// Errors raised by load-time content checks and by handle lookups.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SimulationError {
    /// The ship definition handed to the builder is inconsistent.
    #[error("invalid ship definition: {0}")]
    InvalidShipDefinition(String),

    /// The NPC sub-kind requests a particle mesh the solver cannot simulate.
    #[error("NPC particle mesh kind {0:?} is not supported")]
    UnsupportedNpcMesh(ParticleMeshKind),

    /// A particle store region ran out of slots.
    #[error("particle capacity exhausted in the {region} region (capacity {capacity})")]
    ParticleCapacityExhausted {
        /// Which region of the store was full.
        region: &'static str,
        /// Total slots in that region.
        capacity: usize,
    },

    /// No ship lives at the given id.
    #[error("unknown ship {0}")]
    UnknownShip(ShipId),

    /// No NPC lives at the given id.
    #[error("unknown NPC {0}")]
    UnknownNpc(NpcId),

    /// The NPC sub-kind id is not in the NPC database.
    #[error("unknown NPC sub-kind '{0}'")]
    UnknownNpcSubKind(String),

    /// An element index is outside the store it refers to.
    #[error("element index {index} out of bounds ({count} elements)")]
    IndexOutOfBounds {
        /// The offending index.
        index: ElementIndex,
        /// Number of elements in the store.
        count: usize,
    },

    /// The NPC is not in a state that allows the requested operation.
    #[error("NPC {npc} cannot {operation} while {state}")]
    InvalidNpcState {
        /// NPC the operation targeted.
        npc: NpcId,
        /// Operation that was attempted.
        operation: &'static str,
        /// Current state description.
        state: &'static str,
    },
}

impl SimulationError {
    /// Create an invalid ship definition error.
    pub fn invalid_ship(msg: impl Into<String>) -> Self {
        Self::InvalidShipDefinition(msg.into())
    }

    /// Create an index out of bounds error.
    pub fn index_out_of_bounds(index: ElementIndex, count: usize) -> Self {
        Self::IndexOutOfBounds { index, count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimulationError::invalid_ship("triangle 3 is not clockwise");
        assert_eq!(
            err.to_string(),
            "invalid ship definition: triangle 3 is not clockwise"
        );

        let err = SimulationError::UnsupportedNpcMesh(ParticleMeshKind::Dipole);
        assert!(err.to_string().contains("Dipole"));

        let err = SimulationError::ParticleCapacityExhausted {
            region: "npc",
            capacity: 8,
        };
        assert!(err.to_string().contains("npc region"));

        let err = SimulationError::index_out_of_bounds(12, 4);
        assert!(err.to_string().contains("12"));
    }
}

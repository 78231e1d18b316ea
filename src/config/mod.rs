//! Configuration and parameters
//!
//! Physical constants and the tunable simulation parameters resource.

pub mod constants;
pub mod simulation_params;

pub use constants::*;
pub use simulation_params::*;

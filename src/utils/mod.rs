//! Utility modules for the trivault core.
//!
//! - Fixed-point arithmetic
//! - Identifiers and hashing
//! - Protocol constants
//! - Logging setup

pub mod constants;
pub mod ids;
pub mod logging;
pub mod math;

pub use constants::*;
pub use ids::*;
pub use math::*;

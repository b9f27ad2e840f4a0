//! Rebase, zone routing and the backstop waterfall.
//!
//! - [`engine`]: the monthly state transition and its side-effect-free preview
//! - [`apy`]: yield tier selection
//! - [`zone`]: backing-ratio classification
//! - [`waterfall`]: reserve-then-junior deficit coverage and spillover split
//! - [`interfaces`]: collaborator capabilities and in-memory tranches

pub mod apy;
pub mod engine;
pub mod interfaces;
pub mod waterfall;
pub mod zone;

pub use apy::*;
pub use engine::*;
pub use interfaces::*;
pub use waterfall::*;
pub use zone::*;

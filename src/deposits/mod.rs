//! Pending LP deposits awaiting admin pricing.

pub mod queue;

pub use queue::*;

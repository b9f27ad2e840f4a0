//! Protocol module - orchestration of the senior vault and its tranches.
//!
//! [`TrancheProtocol`] applies every operation atomically and emits one
//! [`ProtocolEvent`] per committed change. [`SharedProtocol`] puts it behind
//! a lock for multi-threaded callers.

pub mod events;
pub mod guard;
pub mod system;

pub use events::*;
pub use guard::*;
pub use system::*;

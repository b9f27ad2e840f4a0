//! Persistence for vault state.
//!
//! ## Backends
//!
//! - **InMemoryStore**: ephemeral, for tests
//! - **FileStore**: JSON file persistence
//!
//! ## Usage
//!
//! ```rust,ignore
//! use trivault::storage::{InMemoryStore, StateManager};
//!
//! let state = StateManager::new(InMemoryStore::new());
//! state.save_vault(&vault, value)?;
//! state.flush()?;
//! ```

pub mod backend;
pub mod state;

pub use backend::*;
pub use state::*;

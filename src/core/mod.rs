//! Core modules for the senior tranche.
//!
//! This module contains the fundamental building blocks:
//! - Vault configuration and its loading
//! - Share/balance conversion at a rebase index
//! - Withdrawal cooldown and penalty
//! - The senior vault share ledger

pub mod config;
pub mod cooldown;
pub mod shares;
pub mod vault;

pub use config::*;
pub use cooldown::*;
pub use shares::*;
pub use vault::*;

//! # trivault
//!
//! Core of a three-tranche yield vault. Senior holders receive a rebasing
//! yield drawn from a fixed set of tiers; junior and reserve tranches absorb
//! excess backing as spillover and cover deficits through a backstop
//! waterfall.
//!
//! ## Architecture
//!
//! - **Core**: configuration, share math, cooldowns and the senior vault ledger
//! - **Rebase**: tier selection, zone routing, the waterfall and the engine
//! - **Deposits**: LP deposits awaiting admin pricing
//! - **Protocol**: atomic orchestration and events
//! - **Storage**: key-value persistence of the whole state
//!
//! ## Example
//!
//! ```rust,ignore
//! use trivault::prelude::*;
//!
//! let mut protocol = TrancheProtocol::open(
//!     VaultConfig::default(),
//!     AccountId::from_label("treasury"),
//!     InMemoryStore::new(),
//!     now,
//! )?;
//! protocol.fund_reserve(200_000 * PRECISION)?;
//! protocol.deposit_senior(holder, 1_000 * PRECISION, now)?;
//! let outcome = protocol.rebase(now + 30 * SECONDS_PER_DAY)?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod core;
pub mod deposits;
pub mod error;
pub mod protocol;
pub mod rebase;
pub mod storage;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        config::VaultConfig,
        cooldown::{CooldownPolicy, WithdrawalQuote},
        vault::{AccountPosition, RebaseState, SeniorVault, WithdrawalReceipt},
    };
    pub use crate::deposits::{Approval, DepositStatus, PendingDeposit, PendingDepositQueue, Refund};
    pub use crate::error::{Error, Result};
    pub use crate::protocol::{EventLog, ProtocolEvent, SharedProtocol, TrancheProtocol};
    pub use crate::rebase::{
        ApyTier, BackstopOutcome, RebaseEngine, RebaseOutcome, RebasePreview, SeniorValue,
        StaticValue, TranchePool, Zone,
    };
    pub use crate::storage::{FileStore, InMemoryStore, StateManager, StorageBackend};
    pub use crate::utils::{
        constants::{PRECISION, SECONDS_PER_DAY},
        ids::{AccountId, Hash, TokenId},
        math::{Amount, Index, Rate, Shares},
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

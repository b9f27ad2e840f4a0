//! Shared handle for driving one protocol instance from several threads.
//!
//! Every operation takes the write lock for its whole duration, so callers
//! observe operations as serialized.

use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::protocol::system::TrancheProtocol;
use crate::rebase::RebaseOutcome;
use crate::storage::backend::StorageBackend;
use crate::utils::ids::AccountId;
use crate::utils::math::{Amount, Rate, Shares};

/// Cloneable, thread-safe handle to a [`TrancheProtocol`]
pub struct SharedProtocol<B: StorageBackend> {
    inner: Arc<RwLock<TrancheProtocol<B>>>,
}

impl<B: StorageBackend> Clone for SharedProtocol<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: StorageBackend> SharedProtocol<B> {
    /// Wrap a protocol instance
    pub fn new(protocol: TrancheProtocol<B>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(protocol)),
        }
    }

    /// Run `f` with exclusive access
    pub fn with<T>(&self, f: impl FnOnce(&mut TrancheProtocol<B>) -> Result<T>) -> Result<T> {
        let mut guard = self.inner.write().map_err(|_| Error::Lock)?;
        f(&mut guard)
    }

    /// Run `f` with shared access
    pub fn read<T>(&self, f: impl FnOnce(&TrancheProtocol<B>) -> T) -> Result<T> {
        let guard = self.inner.read().map_err(|_| Error::Lock)?;
        Ok(f(&guard))
    }

    /// See [`TrancheProtocol::deposit_senior`]
    pub fn deposit_senior(&self, account: AccountId, amount: Amount, now: u64) -> Result<Shares> {
        self.with(|p| p.deposit_senior(account, amount, now))
    }

    /// See [`TrancheProtocol::approve_lp_deposit`]
    pub fn approve_lp_deposit(&self, id: u64, price: Rate, now: u64) -> Result<Shares> {
        self.with(|p| p.approve_lp_deposit(id, price, now).map(|a| a.shares))
    }

    /// See [`TrancheProtocol::rebase`]
    pub fn rebase(&self, now: u64) -> Result<RebaseOutcome> {
        self.with(|p| p.rebase(now))
    }

    /// Senior balance of `account`
    pub fn balance_of(&self, account: &AccountId) -> Result<Amount> {
        self.read(|p| p.vault().balance_of(account))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::VaultConfig;
    use crate::storage::backend::InMemoryStore;
    use crate::utils::constants::PRECISION;
    use std::thread;

    #[test]
    fn test_concurrent_deposits_serialize() {
        let mut protocol = TrancheProtocol::open(
            VaultConfig::default(),
            AccountId::from_label("treasury"),
            InMemoryStore::new(),
            0,
        )
        .unwrap();
        protocol.fund_reserve(1_000_000 * PRECISION).unwrap();
        let shared = SharedProtocol::new(protocol);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let handle = shared.clone();
                thread::spawn(move || {
                    let account = AccountId::from_label(&format!("holder-{}", i));
                    for _ in 0..10 {
                        handle.deposit_senior(account, 100 * PRECISION, 1).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let supply = shared.read(|p| p.vault().total_supply()).unwrap().unwrap();
        assert_eq!(supply, 8_000 * PRECISION);
        let value = shared.read(|p| p.senior_value()).unwrap();
        assert_eq!(value, supply);
        assert_eq!(
            shared.balance_of(&AccountId::from_label("holder-3")).unwrap(),
            1_000 * PRECISION
        );
    }
}

//! Persisted protocol layout.
//!
//! | key                      | value                                  |
//! |--------------------------|----------------------------------------|
//! | `cfg:vault`              | [`VaultConfig`]                        |
//! | `vault:state`            | [`VaultRecord`]                        |
//! | `vault:queue`            | [`QueueRecord`]                        |
//! | `acct:<account>`         | [`AccountPosition`]                    |
//! | `pend:<id, big endian>`  | [`PendingDeposit`]                     |
//! | `didx:<account>`         | `BTreeSet<u64>` of that depositor's ids |
//! | `tranche:<name>`         | [`TranchePool`]                        |

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::core::config::VaultConfig;
use crate::core::vault::{AccountPosition, RebaseState, SeniorVault};
use crate::deposits::{PendingDeposit, PendingDepositQueue};
use crate::error::{Error, Result};
use crate::rebase::TranchePool;
use crate::storage::backend::{make_key, prefixes, StorageBackend, TypedStore};
use crate::utils::ids::{AccountId, Hash, ID_LENGTH};
use crate::utils::math::{Amount, Index, Shares};

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Vault-wide state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRecord {
    /// Rebase index
    pub rebase_index: Index,
    /// Total shares
    pub total_shares: Shares,
    /// Completed epochs
    pub epoch: u64,
    /// Last rebase timestamp
    pub last_rebase_time: u64,
    /// Externally tracked senior value
    pub vault_value: Amount,
    /// Fee share recipient
    pub treasury: AccountId,
}

impl VaultRecord {
    /// Snapshot a vault and its value
    pub fn capture(vault: &SeniorVault, vault_value: Amount) -> Self {
        let state = vault.state();
        Self {
            rebase_index: state.rebase_index,
            total_shares: state.total_shares,
            epoch: state.epoch,
            last_rebase_time: state.last_rebase_time,
            vault_value,
            treasury: vault.treasury(),
        }
    }

    /// The rebase portion
    pub fn rebase_state(&self) -> RebaseState {
        RebaseState {
            rebase_index: self.rebase_index,
            total_shares: self.total_shares,
            epoch: self.epoch,
            last_rebase_time: self.last_rebase_time,
        }
    }
}

/// Queue counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRecord {
    /// Next id to assign
    pub next_id: u64,
    /// Expiry window
    pub expiry: u64,
}

fn account_from_key(key: &[u8], prefix: &[u8]) -> Result<AccountId> {
    let raw = &key[prefix.len()..];
    if raw.len() != ID_LENGTH {
        return Err(Error::Deserialization(format!(
            "account key has {} bytes",
            raw.len()
        )));
    }
    let mut bytes = [0u8; ID_LENGTH];
    bytes.copy_from_slice(raw);
    Ok(AccountId::new(bytes))
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATE MANAGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Loads and saves protocol state over a storage backend
pub struct StateManager<B: StorageBackend> {
    store: TypedStore<B>,
}

impl<B: StorageBackend> StateManager<B> {
    /// Create a new state manager
    pub fn new(backend: B) -> Self {
        Self {
            store: TypedStore::new(backend),
        }
    }

    /// Underlying typed store
    pub fn store(&self) -> &TypedStore<B> {
        &self.store
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CONFIG
    // ═══════════════════════════════════════════════════════════════════════════

    /// Save the vault configuration
    pub fn save_config(&self, config: &VaultConfig) -> Result<()> {
        self.store.set(&make_key(prefixes::CONFIG, b"vault"), config)
    }

    /// Load the vault configuration, if saved
    pub fn load_config(&self) -> Result<Option<VaultConfig>> {
        self.store.get(&make_key(prefixes::CONFIG, b"vault"))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SENIOR VAULT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Save vault state and every account position, dropping stale accounts
    pub fn save_vault(&self, vault: &SeniorVault, vault_value: Amount) -> Result<()> {
        let record = VaultRecord::capture(vault, vault_value);
        self.store.set(&make_key(prefixes::VAULT, b"state"), &record)?;

        self.store.delete_prefix(prefixes::ACCOUNT)?;
        for (account, position) in vault.accounts() {
            self.store
                .set(&make_key(prefixes::ACCOUNT, account.as_bytes()), position)?;
        }
        debug!(accounts = vault.accounts().len(), epoch = record.epoch, "Saved senior vault");
        Ok(())
    }

    /// Load the vault record, if saved
    pub fn load_vault_record(&self) -> Result<Option<VaultRecord>> {
        self.store.get(&make_key(prefixes::VAULT, b"state"))
    }

    /// Load every account position
    pub fn load_accounts(&self) -> Result<HashMap<AccountId, AccountPosition>> {
        let mut accounts = HashMap::new();
        for (key, position) in self.store.values_with_prefix::<AccountPosition>(prefixes::ACCOUNT)? {
            accounts.insert(account_from_key(&key, prefixes::ACCOUNT)?, position);
        }
        Ok(accounts)
    }

    /// Rebuild the vault and its value, if saved
    pub fn load_vault(&self, config: &VaultConfig) -> Result<Option<(SeniorVault, Amount)>> {
        let record = match self.load_vault_record()? {
            Some(record) => record,
            None => return Ok(None),
        };
        let vault = SeniorVault::from_parts(
            config,
            record.treasury,
            record.rebase_state(),
            self.load_accounts()?,
        )?;
        Ok(Some((vault, record.vault_value)))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PENDING DEPOSITS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Save the ledger, the depositor index and the counters
    pub fn save_queue(&self, queue: &PendingDepositQueue) -> Result<()> {
        let record = QueueRecord {
            next_id: queue.next_id(),
            expiry: queue.expiry(),
        };
        self.store.set(&make_key(prefixes::VAULT, b"queue"), &record)?;

        self.store.delete_prefix(prefixes::PENDING)?;
        self.store.delete_prefix(prefixes::DEPOSITOR_INDEX)?;

        let mut index: HashMap<AccountId, BTreeSet<u64>> = HashMap::new();
        for deposit in queue.iter() {
            self.store
                .set(&make_key(prefixes::PENDING, &deposit.id.to_be_bytes()), deposit)?;
            index.entry(deposit.depositor).or_default().insert(deposit.id);
        }
        for (depositor, ids) in &index {
            self.store
                .set(&make_key(prefixes::DEPOSITOR_INDEX, depositor.as_bytes()), ids)?;
        }
        debug!(entries = queue.len(), next_id = record.next_id, "Saved pending deposit queue");
        Ok(())
    }

    /// Load the queue, checking the stored index against the ledger
    pub fn load_queue(&self, default_expiry: u64) -> Result<PendingDepositQueue> {
        let record = self
            .store
            .get::<QueueRecord>(&make_key(prefixes::VAULT, b"queue"))?
            .unwrap_or(QueueRecord {
                next_id: 1,
                expiry: default_expiry,
            });

        let entries: Vec<PendingDeposit> = self
            .store
            .values_with_prefix(prefixes::PENDING)?
            .into_iter()
            .map(|(_, deposit)| deposit)
            .collect();
        let queue = PendingDepositQueue::from_ledger(record.expiry, record.next_id, entries)?;

        for (key, ids) in self
            .store
            .values_with_prefix::<BTreeSet<u64>>(prefixes::DEPOSITOR_INDEX)?
        {
            let depositor = account_from_key(&key, prefixes::DEPOSITOR_INDEX)?;
            if queue.ids_of(&depositor) != Some(&ids) {
                return Err(Error::InvariantViolation(format!(
                    "depositor index for {} disagrees with the ledger",
                    depositor.short()
                )));
            }
        }
        Ok(queue)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TRANCHES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Save a tranche pool under its name
    pub fn save_tranche(&self, pool: &TranchePool) -> Result<()> {
        self.store
            .set(&make_key(prefixes::TRANCHE, pool.name.as_bytes()), pool)
    }

    /// Load a tranche pool by name
    pub fn load_tranche(&self, name: &str) -> Result<Option<TranchePool>> {
        self.store.get(&make_key(prefixes::TRANCHE, name.as_bytes()))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // UTILITY METHODS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Flush all pending writes
    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    /// Merkle root over the vault record, accounts and pending deposits
    pub fn compute_state_root(&self) -> Result<Hash> {
        let mut hashes = Vec::new();
        for prefix in [prefixes::VAULT, prefixes::ACCOUNT, prefixes::PENDING] {
            for key in self.store.backend().list_prefix(prefix)? {
                if let Some(value) = self.store.backend().get(&key)? {
                    let mut leaf = key.clone();
                    leaf.extend_from_slice(&value);
                    hashes.push(Hash::sha256(&leaf));
                }
            }
        }
        Ok(Hash::merkle_root(&hashes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::InMemoryStore;
    use crate::utils::constants::PRECISION;
    use crate::utils::ids::TokenId;

    fn manager() -> StateManager<InMemoryStore> {
        StateManager::new(InMemoryStore::new())
    }

    #[test]
    fn test_vault_roundtrip() {
        let config = VaultConfig::default();
        let mut vault = SeniorVault::new(&config, AccountId::from_label("treasury"), 7);
        vault
            .deposit(AccountId::from_label("alice"), 10 * PRECISION, 10 * PRECISION)
            .unwrap();
        vault.initiate_cooldown(AccountId::from_label("alice"), 9).unwrap();

        let sm = manager();
        sm.save_vault(&vault, 10 * PRECISION).unwrap();
        let (loaded, value) = sm.load_vault(&config).unwrap().unwrap();

        assert_eq!(value, 10 * PRECISION);
        assert_eq!(loaded.state_hash(), vault.state_hash());
        assert_eq!(loaded.cooldown_start(&AccountId::from_label("alice")), 9);
    }

    #[test]
    fn test_stale_accounts_removed() {
        let config = VaultConfig::default();
        let alice = AccountId::from_label("alice");
        let mut vault = SeniorVault::new(&config, AccountId::from_label("treasury"), 0);
        vault.deposit(alice, PRECISION, PRECISION).unwrap();

        let sm = manager();
        sm.save_vault(&vault, PRECISION).unwrap();
        vault.withdraw(alice, PRECISION, 1).unwrap();
        sm.save_vault(&vault, 0).unwrap();

        assert!(sm.load_accounts().unwrap().is_empty());
    }

    #[test]
    fn test_missing_vault() {
        assert!(manager().load_vault(&VaultConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_queue_roundtrip() {
        let mut queue = PendingDepositQueue::new(100);
        let alice = AccountId::from_label("alice");
        let lp = TokenId::from_symbol("LP");
        queue.deposit_lp(alice, lp, 5, 0).unwrap();
        let id = queue.deposit_lp(alice, lp, 6, 0).unwrap();
        queue.reject_lp_deposit(id, "stale price", 1).unwrap();

        let sm = manager();
        sm.save_queue(&queue).unwrap();
        let loaded = sm.load_queue(999).unwrap();
        assert_eq!(loaded, queue);
        assert_eq!(loaded.next_id(), 3);
    }

    #[test]
    fn test_corrupt_index_detected() {
        let mut queue = PendingDepositQueue::new(100);
        let alice = AccountId::from_label("alice");
        queue.deposit_lp(alice, TokenId::from_symbol("LP"), 5, 0).unwrap();

        let sm = manager();
        sm.save_queue(&queue).unwrap();
        let bogus: BTreeSet<u64> = [1, 2].into_iter().collect();
        sm.store()
            .set(&make_key(prefixes::DEPOSITOR_INDEX, alice.as_bytes()), &bogus)
            .unwrap();

        assert!(matches!(sm.load_queue(100), Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn test_state_root_changes() {
        let sm = manager();
        let empty = sm.compute_state_root().unwrap();
        sm.save_tranche(&TranchePool::reserve(5)).unwrap();
        assert_eq!(sm.compute_state_root().unwrap(), empty);

        let vault = SeniorVault::new(&VaultConfig::default(), AccountId::from_label("t"), 0);
        sm.save_vault(&vault, 0).unwrap();
        assert_ne!(sm.compute_state_root().unwrap(), empty);
        assert_eq!(sm.load_tranche("reserve").unwrap(), Some(TranchePool::reserve(5)));
    }
}

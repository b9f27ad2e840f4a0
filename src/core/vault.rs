//! Senior vault: rebasing share ledger.
//!
//! The vault owns the [`RebaseState`] and every account's share balance and
//! cooldown timestamp. Balances are never stored; they are derived from shares
//! and the rebase index, so a rebase touches O(1) state regardless of holder
//! count.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::config::VaultConfig;
use crate::core::cooldown::{CooldownPolicy, WithdrawalQuote};
use crate::core::shares::{
    balance_from_shares, deposit_cap, ensure_within_cap, shares_from_balance,
    shares_from_balance_ceil, total_supply,
};
use crate::error::{Error, Result};
use crate::utils::constants::INITIAL_INDEX;
use crate::utils::ids::{AccountId, Hash};
use crate::utils::math::{safe_add, safe_sub, Amount, Index, Shares};

// ═══════════════════════════════════════════════════════════════════════════════
// REBASE STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Share-accounting state advanced once per epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseState {
    /// Share-to-balance multiplier
    pub rebase_index: Index,
    /// Total shares outstanding (holders and treasury)
    pub total_shares: Shares,
    /// Completed rebase count
    pub epoch: u64,
    /// Timestamp of the last committed rebase (or genesis)
    pub last_rebase_time: u64,
}

impl RebaseState {
    /// Fresh state at index 1.0
    pub fn genesis(now: u64) -> Self {
        Self {
            rebase_index: INITIAL_INDEX,
            total_shares: 0,
            epoch: 0,
            last_rebase_time: now,
        }
    }

    /// `total_shares × index / PRECISION`
    pub fn total_supply(&self) -> Result<Amount> {
        total_supply(self.total_shares, self.rebase_index)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACCOUNT POSITION
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-account persisted state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPosition {
    /// Shares held
    pub shares: Shares,
    /// Cooldown start timestamp (0 = not initiated)
    pub cooldown_start: u64,
}

/// Result of a senior withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReceipt {
    /// Gross/penalty/net breakdown
    pub quote: WithdrawalQuote,
    /// Shares burned (rounded up)
    pub shares_burned: Shares,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SENIOR VAULT
// ═══════════════════════════════════════════════════════════════════════════════

/// The senior tranche's rebasing share ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeniorVault {
    /// Index, shares, epoch, timing
    state: RebaseState,
    /// Positions by account
    accounts: HashMap<AccountId, AccountPosition>,
    /// Recipient of fee shares minted on rebase
    treasury: AccountId,
    /// Cooldown parameters
    cooldown: CooldownPolicy,
    /// Supply cap multiple of reserve value
    cap_multiplier: u128,
}

impl SeniorVault {
    /// Create an empty vault whose first rebase is gated from `now`
    pub fn new(config: &VaultConfig, treasury: AccountId, now: u64) -> Self {
        Self {
            state: RebaseState::genesis(now),
            accounts: HashMap::new(),
            treasury,
            cooldown: CooldownPolicy::from(config),
            cap_multiplier: config.deposit_cap_multiplier,
        }
    }

    /// Rebuild a vault from persisted parts
    pub fn from_parts(
        config: &VaultConfig,
        treasury: AccountId,
        state: RebaseState,
        accounts: HashMap<AccountId, AccountPosition>,
    ) -> Result<Self> {
        let vault = Self {
            state,
            accounts,
            treasury,
            cooldown: CooldownPolicy::from(config),
            cap_multiplier: config.deposit_cap_multiplier,
        };
        vault.verify_invariant()?;
        Ok(vault)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DEPOSIT/WITHDRAW
    // ═══════════════════════════════════════════════════════════════════════════

    /// Mint floored shares worth `amount` to `account`.
    ///
    /// Rejected once senior supply would exceed `reserve_value × multiplier`.
    pub fn deposit(
        &mut self,
        account: AccountId,
        amount: Amount,
        reserve_value: Amount,
    ) -> Result<Shares> {
        if amount == 0 {
            return Err(Error::InvalidAmount("deposit amount is zero".into()));
        }

        let cap = deposit_cap(reserve_value, self.cap_multiplier)?;
        ensure_within_cap(self.total_supply()?, amount, cap)?;

        let shares = shares_from_balance(amount, self.state.rebase_index)?;
        if shares == 0 {
            return Err(Error::InvalidAmount(format!(
                "deposit of {} mints zero shares",
                amount
            )));
        }

        let new_total = safe_add(self.state.total_shares, shares)?;
        let position = self.accounts.entry(account).or_default();
        position.shares = safe_add(position.shares, shares)?;
        self.state.total_shares = new_total;

        Ok(shares)
    }

    /// Credit `shares` already priced elsewhere, without a cap check.
    ///
    /// Used for approved pending deposits, checked against the cap when they
    /// were priced. Zero shares are rejected. Nothing changes on error.
    pub fn credit_shares(&mut self, account: AccountId, shares: Shares) -> Result<()> {
        if shares == 0 {
            return Err(Error::InvalidAmount("credit of zero shares".into()));
        }
        let new_total = safe_add(self.state.total_shares, shares)?;
        let held = safe_add(self.shares_of(&account), shares)?;
        self.accounts.entry(account).or_default().shares = held;
        self.state.total_shares = new_total;
        Ok(())
    }

    /// Burn rounded-up shares to redeem `amount`, charging the cooldown penalty
    pub fn withdraw(&mut self, account: AccountId, amount: Amount, now: u64) -> Result<WithdrawalReceipt> {
        if amount == 0 {
            return Err(Error::InvalidAmount("withdrawal amount is zero".into()));
        }

        let position = self.accounts.get(&account).copied().unwrap_or_default();
        let shares_burned = shares_from_balance_ceil(amount, self.state.rebase_index)?;
        if shares_burned > position.shares {
            return Err(Error::InsufficientShares {
                required: shares_burned,
                available: position.shares,
            });
        }

        let quote = WithdrawalQuote::new(&self.cooldown, position.cooldown_start, amount, now)?;
        let new_total = safe_sub(self.state.total_shares, shares_burned)?;

        let remaining = position.shares - shares_burned;
        if remaining == 0 && position.cooldown_start == 0 {
            self.accounts.remove(&account);
        } else if let Some(p) = self.accounts.get_mut(&account) {
            p.shares = remaining;
        }
        self.state.total_shares = new_total;

        Ok(WithdrawalReceipt {
            quote,
            shares_burned,
        })
    }

    /// Preview a withdrawal without touching state
    pub fn quote_withdrawal(&self, account: &AccountId, amount: Amount, now: u64) -> Result<WithdrawalQuote> {
        let start = self.cooldown_start(account);
        WithdrawalQuote::new(&self.cooldown, start, amount, now)
    }

    /// Start (or restart) the cooldown clock for `account`
    pub fn initiate_cooldown(&mut self, account: AccountId, now: u64) -> Result<()> {
        let position = self
            .accounts
            .get_mut(&account)
            .filter(|p| p.shares > 0)
            .ok_or_else(|| Error::InsufficientShares {
                required: 1,
                available: 0,
            })?;
        if now == 0 {
            return Err(Error::InvalidAmount(
                "cooldown cannot start at timestamp zero".into(),
            ));
        }
        position.cooldown_start = now;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REBASE COMMIT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Install a rebase result: new index/epoch/time and the treasury's fee shares
    pub fn commit_rebase(&mut self, next: RebaseState, treasury_shares: Shares) -> Result<()> {
        let expected = safe_add(self.state.total_shares, treasury_shares)?;
        if next.total_shares != expected {
            return Err(Error::InvariantViolation(format!(
                "rebase shares {} != {} + {}",
                next.total_shares, self.state.total_shares, treasury_shares
            )));
        }

        if treasury_shares > 0 {
            let position = self.accounts.entry(self.treasury).or_default();
            position.shares = safe_add(position.shares, treasury_shares)?;
        }
        self.state = next;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Current rebase state
    pub fn state(&self) -> &RebaseState {
        &self.state
    }

    /// Current rebase index
    pub fn index(&self) -> Index {
        self.state.rebase_index
    }

    /// Completed epochs
    pub fn epoch(&self) -> u64 {
        self.state.epoch
    }

    /// Total shares outstanding
    pub fn total_shares(&self) -> Shares {
        self.state.total_shares
    }

    /// Nominal supply
    pub fn total_supply(&self) -> Result<Amount> {
        self.state.total_supply()
    }

    /// Shares held by `account`
    pub fn shares_of(&self, account: &AccountId) -> Shares {
        self.accounts.get(account).map(|p| p.shares).unwrap_or(0)
    }

    /// Spendable balance of `account`
    pub fn balance_of(&self, account: &AccountId) -> Result<Amount> {
        balance_from_shares(self.shares_of(account), self.state.rebase_index)
    }

    /// Cooldown start of `account` (0 = not initiated)
    pub fn cooldown_start(&self, account: &AccountId) -> u64 {
        self.accounts.get(account).map(|p| p.cooldown_start).unwrap_or(0)
    }

    /// Seconds until `account` can withdraw without penalty
    pub fn cooldown_remaining(&self, account: &AccountId, now: u64) -> u64 {
        self.cooldown.remaining(self.cooldown_start(account), now)
    }

    /// Fee recipient
    pub fn treasury(&self) -> AccountId {
        self.treasury
    }

    /// All positions
    pub fn accounts(&self) -> &HashMap<AccountId, AccountPosition> {
        &self.accounts
    }

    /// Supply cap for the given reserve value
    pub fn deposit_cap(&self, reserve_value: Amount) -> Result<Amount> {
        deposit_cap(reserve_value, self.cap_multiplier)
    }

    /// Account shares sum to total shares, and floored balances never exceed supply
    pub fn verify_invariant(&self) -> Result<()> {
        let mut sum: Shares = 0;
        let mut balances: Amount = 0;
        for position in self.accounts.values() {
            sum = safe_add(sum, position.shares)?;
            balances = safe_add(
                balances,
                balance_from_shares(position.shares, self.state.rebase_index)?,
            )?;
        }
        if sum != self.state.total_shares {
            return Err(Error::InvariantViolation(format!(
                "account shares {} != total shares {}",
                sum, self.state.total_shares
            )));
        }
        let supply = self.total_supply()?;
        if balances > supply {
            return Err(Error::InvariantViolation(format!(
                "balances {} exceed supply {}",
                balances, supply
            )));
        }
        Ok(())
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Deterministic hash of the ledger
    pub fn state_hash(&self) -> Hash {
        let mut data = Vec::new();
        data.extend_from_slice(&self.state.rebase_index.to_be_bytes());
        data.extend_from_slice(&self.state.total_shares.to_be_bytes());
        data.extend_from_slice(&self.state.epoch.to_be_bytes());
        data.extend_from_slice(&self.state.last_rebase_time.to_be_bytes());

        let mut sorted: Vec<_> = self.accounts.iter().collect();
        sorted.sort_by_key(|(k, _)| **k);

        for (account, position) in sorted {
            data.extend_from_slice(account.as_bytes());
            data.extend_from_slice(&position.shares.to_be_bytes());
            data.extend_from_slice(&position.cooldown_start.to_be_bytes());
        }

        Hash::sha256(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::{PRECISION, SECONDS_PER_DAY};

    fn alice() -> AccountId {
        AccountId::from_label("alice")
    }

    fn bob() -> AccountId {
        AccountId::from_label("bob")
    }

    fn vault() -> SeniorVault {
        SeniorVault::new(&VaultConfig::default(), AccountId::from_label("treasury"), 0)
    }

    const RESERVE: Amount = 1_000_000 * PRECISION;

    #[test]
    fn test_deposit_mints_shares() {
        let mut v = vault();
        let shares = v.deposit(alice(), 1_000 * PRECISION, RESERVE).unwrap();

        assert_eq!(shares, 1_000 * PRECISION);
        assert_eq!(v.balance_of(&alice()).unwrap(), 1_000 * PRECISION);
        assert_eq!(v.total_supply().unwrap(), 1_000 * PRECISION);
        assert!(v.verify_invariant().is_ok());
    }

    #[test]
    fn test_deposit_zero_rejected() {
        let mut v = vault();
        assert!(matches!(
            v.deposit(alice(), 0, RESERVE),
            Err(Error::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_deposit_cap_enforced() {
        let mut v = vault();
        let reserve = 100 * PRECISION;
        v.deposit(alice(), 1_000 * PRECISION, reserve).unwrap();

        let err = v.deposit(bob(), 1, reserve).unwrap_err();
        assert!(matches!(err, Error::DepositCapExceeded { .. }));
        assert_eq!(v.shares_of(&bob()), 0);
    }

    #[test]
    fn test_withdraw_without_cooldown_pays_penalty() {
        let mut v = vault();
        v.deposit(alice(), 1_000 * PRECISION, RESERVE).unwrap();

        let receipt = v.withdraw(alice(), 100 * PRECISION, 10).unwrap();
        assert_eq!(receipt.shares_burned, 100 * PRECISION);
        assert_eq!(receipt.quote.penalty, 5 * PRECISION);
        assert_eq!(receipt.quote.net, 95 * PRECISION);
        assert_eq!(v.balance_of(&alice()).unwrap(), 900 * PRECISION);
    }

    #[test]
    fn test_withdraw_after_cooldown_is_free_and_keeps_timestamp() {
        let mut v = vault();
        v.deposit(alice(), 1_000 * PRECISION, RESERVE).unwrap();
        v.initiate_cooldown(alice(), 100).unwrap();

        let later = 100 + 7 * SECONDS_PER_DAY;
        let receipt = v.withdraw(alice(), 100 * PRECISION, later).unwrap();
        assert_eq!(receipt.quote.penalty, 0);
        assert_eq!(v.cooldown_start(&alice()), 100);

        let again = v.withdraw(alice(), 100 * PRECISION, later + 1).unwrap();
        assert_eq!(again.quote.penalty, 0);
    }

    #[test]
    fn test_withdraw_more_than_held() {
        let mut v = vault();
        v.deposit(alice(), 10 * PRECISION, RESERVE).unwrap();
        let err = v.withdraw(alice(), 11 * PRECISION, 0).unwrap_err();
        assert!(matches!(err, Error::InsufficientShares { .. }));
        assert_eq!(v.balance_of(&alice()).unwrap(), 10 * PRECISION);
    }

    #[test]
    fn test_cooldown_requires_position() {
        let mut v = vault();
        assert!(v.initiate_cooldown(bob(), 5).is_err());
    }

    #[test]
    fn test_cooldown_rejects_zero_timestamp() {
        let mut v = vault();
        v.deposit(alice(), 1_000 * PRECISION, RESERVE).unwrap();

        let err = v.initiate_cooldown(alice(), 0).unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));
        assert_eq!(v.cooldown_start(&alice()), 0);

        v.initiate_cooldown(alice(), 1).unwrap();
        assert_eq!(v.cooldown_start(&alice()), 1);
    }

    #[test]
    fn test_credit_shares_rejects_zero() {
        let mut v = vault();
        assert!(matches!(
            v.credit_shares(alice(), 0),
            Err(Error::InvalidAmount(_))
        ));
        v.credit_shares(alice(), 5 * PRECISION).unwrap();
        assert_eq!(v.shares_of(&alice()), 5 * PRECISION);
        assert_eq!(v.state().total_shares, 5 * PRECISION);
    }

    #[test]
    fn test_commit_rebase_credits_treasury() {
        let mut v = vault();
        v.deposit(alice(), 1_000 * PRECISION, RESERVE).unwrap();

        let mut next = *v.state();
        next.rebase_index = 1_010_000_000_000_000_000;
        next.total_shares += 5 * PRECISION;
        next.epoch += 1;
        v.commit_rebase(next, 5 * PRECISION).unwrap();

        assert_eq!(v.balance_of(&alice()).unwrap(), 1_010 * PRECISION);
        assert_eq!(v.shares_of(&v.treasury()), 5 * PRECISION);
        assert!(v.verify_invariant().is_ok());
    }

    #[test]
    fn test_commit_rebase_rejects_mismatched_shares() {
        let mut v = vault();
        let next = RebaseState {
            total_shares: 1,
            ..*v.state()
        };
        assert!(matches!(
            v.commit_rebase(next, 0),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_state_hash_deterministic() {
        let mut v1 = vault();
        let mut v2 = vault();
        v1.deposit(alice(), PRECISION, RESERVE).unwrap();
        v1.deposit(bob(), 2 * PRECISION, RESERVE).unwrap();
        v2.deposit(bob(), 2 * PRECISION, RESERVE).unwrap();
        v2.deposit(alice(), PRECISION, RESERVE).unwrap();

        assert_eq!(v1.state_hash(), v2.state_hash());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let mut v = vault();
        v.deposit(alice(), 3 * PRECISION, RESERVE).unwrap();
        let restored = SeniorVault::from_bytes(&v.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.state_hash(), v.state_hash());
    }
}

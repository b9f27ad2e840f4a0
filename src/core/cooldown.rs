//! Withdrawal cooldown and early-exit penalty.
//!
//! A cooldown is a single timestamp per account (`0` = never initiated). A
//! withdrawal reads it but does not clear it, so once a cooldown completes
//! later withdrawals stay penalty-free until the account re-initiates.

use serde::{Deserialize, Serialize};

use crate::core::config::VaultConfig;
use crate::error::Result;
use crate::utils::math::{bps_of, Amount};

/// Cooldown parameters extracted from the vault config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownPolicy {
    /// Seconds from initiation until withdrawals are penalty-free
    pub period: u64,
    /// Penalty charged otherwise, basis points of the withdrawn amount
    pub penalty_bps: u64,
}

impl From<&VaultConfig> for CooldownPolicy {
    fn from(config: &VaultConfig) -> Self {
        Self {
            period: config.cooldown_period,
            penalty_bps: config.early_withdrawal_penalty_bps,
        }
    }
}

impl CooldownPolicy {
    /// True once a cooldown started at `start` has fully elapsed at `now`
    pub fn is_complete(&self, start: u64, now: u64) -> bool {
        start != 0 && now >= start.saturating_add(self.period)
    }

    /// Seconds left before a penalty-free withdrawal (`period` if never started)
    pub fn remaining(&self, start: u64, now: u64) -> u64 {
        if start == 0 {
            return self.period;
        }
        start.saturating_add(self.period).saturating_sub(now)
    }

    /// Penalty owed on withdrawing `amount` at `now`
    pub fn penalty(&self, start: u64, amount: Amount, now: u64) -> Result<Amount> {
        if self.is_complete(start, now) {
            Ok(0)
        } else {
            bps_of(amount, self.penalty_bps)
        }
    }
}

/// Breakdown of a withdrawal after the cooldown penalty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalQuote {
    /// Balance redeemed
    pub gross: Amount,
    /// Penalty retained by the vault
    pub penalty: Amount,
    /// Amount paid out
    pub net: Amount,
}

impl WithdrawalQuote {
    /// Quote a withdrawal of `gross` under `policy`
    pub fn new(policy: &CooldownPolicy, start: u64, gross: Amount, now: u64) -> Result<Self> {
        let penalty = policy.penalty(start, gross, now)?;
        Ok(Self {
            gross,
            penalty,
            net: gross - penalty,
        })
    }
}

//! Vault configuration.
//!
//! A [`VaultConfig`] is an immutable value injected into every engine at
//! construction. Nothing in the core reads process-wide mutable parameters,
//! so independent instances with different parameter sets can run side by
//! side (notably in tests).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::math::{monthly_rate_from_annual_bps, Rate};

// ═══════════════════════════════════════════════════════════════════════════════
// VAULT CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Governance-supplied parameters for one senior vault and its tranches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Lowest yield tier, annual basis points
    pub min_apy_bps: u64,
    /// Middle yield tier, annual basis points
    pub mid_apy_bps: u64,
    /// Highest yield tier, annual basis points
    pub max_apy_bps: u64,

    /// Backing ratio below which the backstop waterfall runs
    pub trigger_backing: Rate,
    /// Backing ratio that deficits and excesses are measured against
    pub target_backing: Rate,
    /// Backing ratio above which excess spills over
    pub restore_backing: Rate,

    /// Management fee, annual basis points of vault value
    pub mgmt_fee_annual_bps: u64,
    /// Performance fee, basis points of holder yield
    pub perf_fee_bps: u64,

    /// Junior's share of spillover, basis points
    pub junior_spillover_share_bps: u64,
    /// Reserve's share of spillover, basis points
    pub reserve_spillover_share_bps: u64,

    /// Minimum seconds between rebases
    pub min_rebase_interval: u64,
    /// Senior supply cap as a multiple of reserve value
    pub deposit_cap_multiplier: u128,
    /// Seconds a pending deposit stays approvable
    pub pending_deposit_expiry: u64,

    /// Seconds between cooldown start and a penalty-free withdrawal
    pub cooldown_period: u64,
    /// Penalty on withdrawals without a completed cooldown, basis points
    pub early_withdrawal_penalty_bps: u64,
    /// Fraction of junior value available as backstop, basis points
    pub junior_backstop_capacity_bps: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            min_apy_bps: MIN_APY_BPS,
            mid_apy_bps: MID_APY_BPS,
            max_apy_bps: MAX_APY_BPS,
            trigger_backing: TRIGGER_BACKING,
            target_backing: TARGET_BACKING,
            restore_backing: RESTORE_BACKING,
            mgmt_fee_annual_bps: MGMT_FEE_ANNUAL_BPS,
            perf_fee_bps: PERF_FEE_BPS,
            junior_spillover_share_bps: JUNIOR_SPILLOVER_SHARE_BPS,
            reserve_spillover_share_bps: RESERVE_SPILLOVER_SHARE_BPS,
            min_rebase_interval: MIN_REBASE_INTERVAL,
            deposit_cap_multiplier: DEPOSIT_CAP_MULTIPLIER,
            pending_deposit_expiry: PENDING_DEPOSIT_EXPIRY,
            cooldown_period: COOLDOWN_PERIOD,
            early_withdrawal_penalty_bps: EARLY_WITHDRAWAL_PENALTY_BPS,
            junior_backstop_capacity_bps: JUNIOR_BACKSTOP_CAPACITY_BPS,
        }
    }
}

impl VaultConfig {
    /// Override the backing thresholds
    pub fn with_thresholds(mut self, trigger: Rate, target: Rate, restore: Rate) -> Self {
        self.trigger_backing = trigger;
        self.target_backing = target;
        self.restore_backing = restore;
        self
    }

    /// Override the yield tiers (annual bps)
    pub fn with_tiers(mut self, min_bps: u64, mid_bps: u64, max_bps: u64) -> Self {
        self.min_apy_bps = min_bps;
        self.mid_apy_bps = mid_bps;
        self.max_apy_bps = max_bps;
        self
    }

    /// Override the fee schedule
    pub fn with_fees(mut self, mgmt_annual_bps: u64, perf_bps: u64) -> Self {
        self.mgmt_fee_annual_bps = mgmt_annual_bps;
        self.perf_fee_bps = perf_bps;
        self
    }

    /// Override the pending deposit expiry window
    pub fn with_expiry(mut self, seconds: u64) -> Self {
        self.pending_deposit_expiry = seconds;
        self
    }

    /// Per-epoch rates for `[Min, Mid, Max]`
    pub fn monthly_rates(&self) -> Result<[Rate; 3]> {
        Ok([
            monthly_rate_from_annual_bps(self.min_apy_bps)?,
            monthly_rate_from_annual_bps(self.mid_apy_bps)?,
            monthly_rate_from_annual_bps(self.max_apy_bps)?,
        ])
    }

    /// Check parameter consistency
    pub fn validate(&self) -> Result<()> {
        if !(self.min_apy_bps < self.mid_apy_bps && self.mid_apy_bps < self.max_apy_bps) {
            return Err(Error::InvalidConfig(
                "yield tiers must be strictly ascending".into(),
            ));
        }
        if !(self.trigger_backing < self.target_backing
            && self.target_backing < self.restore_backing)
        {
            return Err(Error::InvalidConfig(
                "backing thresholds must satisfy trigger < target < restore".into(),
            ));
        }
        if self.junior_spillover_share_bps as u128 + self.reserve_spillover_share_bps as u128
            != BPS_DENOMINATOR
        {
            return Err(Error::InvalidConfig(
                "spillover shares must sum to 10000 bps".into(),
            ));
        }
        if self.min_rebase_interval == 0 {
            return Err(Error::InvalidConfig("rebase interval must be positive".into()));
        }
        if self.deposit_cap_multiplier == 0 {
            return Err(Error::InvalidConfig("deposit cap multiplier must be positive".into()));
        }
        if self.early_withdrawal_penalty_bps as u128 > BPS_DENOMINATOR
            || self.perf_fee_bps as u128 > BPS_DENOMINATOR
            || self.junior_backstop_capacity_bps as u128 > BPS_DENOMINATOR
        {
            return Err(Error::InvalidConfig(
                "penalty, performance fee and junior capacity are capped at 10000 bps".into(),
            ));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LOADING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Load from a JSON file; missing fields take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Storage(format!("Failed to read config: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Deserialization(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Storage(format!("Failed to write config: {}", e)))
    }

    /// Defaults overlaid with `TRIVAULT_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        fn read<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
            match std::env::var(name) {
                Ok(raw) => raw
                    .parse()
                    .map(Some)
                    .map_err(|_| Error::InvalidConfig(format!("{} is not a valid number", name))),
                Err(_) => Ok(None),
            }
        }

        if let Some(v) = read("TRIVAULT_MIN_APY_BPS")? {
            config.min_apy_bps = v;
        }
        if let Some(v) = read("TRIVAULT_MID_APY_BPS")? {
            config.mid_apy_bps = v;
        }
        if let Some(v) = read("TRIVAULT_MAX_APY_BPS")? {
            config.max_apy_bps = v;
        }
        if let Some(v) = read("TRIVAULT_TRIGGER_BACKING")? {
            config.trigger_backing = v;
        }
        if let Some(v) = read("TRIVAULT_TARGET_BACKING")? {
            config.target_backing = v;
        }
        if let Some(v) = read("TRIVAULT_RESTORE_BACKING")? {
            config.restore_backing = v;
        }
        if let Some(v) = read("TRIVAULT_JUNIOR_SPILLOVER_BPS")? {
            config.junior_spillover_share_bps = v;
        }
        if let Some(v) = read("TRIVAULT_RESERVE_SPILLOVER_BPS")? {
            config.reserve_spillover_share_bps = v;
        }
        if let Some(v) = read("TRIVAULT_MGMT_FEE_BPS")? {
            config.mgmt_fee_annual_bps = v;
        }
        if let Some(v) = read("TRIVAULT_PERF_FEE_BPS")? {
            config.perf_fee_bps = v;
        }
        if let Some(v) = read("TRIVAULT_PENDING_DEPOSIT_EXPIRY")? {
            config.pending_deposit_expiry = v;
        }
        if let Some(v) = read("TRIVAULT_COOLDOWN_PERIOD")? {
            config.cooldown_period = v;
        }

        config.validate()?;
        Ok(config)
    }
}

//! Dynamic yield tier selection.
//!
//! Tiers are tried from the highest rate down. The first whose projected
//! post-mint backing ratio stays at or above the trigger wins; if none does,
//! the lowest tier is used and the deficit is left to the backstop.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::config::VaultConfig;
use crate::core::shares::{shares_from_balance, total_supply};
use crate::core::vault::RebaseState;
use crate::error::{Error, Result};
use crate::rebase::zone::backing_ratio;
use crate::utils::constants::PRECISION;
use crate::utils::math::{bps_of, mul_div, safe_add, Amount, Index, Rate, Shares};

// ═══════════════════════════════════════════════════════════════════════════════
// TIERS
// ═══════════════════════════════════════════════════════════════════════════════

/// One of the three fixed yield tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ApyTier {
    /// Lowest rate
    Min,
    /// Middle rate
    Mid,
    /// Highest rate
    Max,
}

impl ApyTier {
    /// Annual rate of this tier in basis points
    pub fn annual_bps(&self, config: &VaultConfig) -> u64 {
        match self {
            ApyTier::Min => config.min_apy_bps,
            ApyTier::Mid => config.mid_apy_bps,
            ApyTier::Max => config.max_apy_bps,
        }
    }
}

impl fmt::Display for ApyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApyTier::Min => "MinAPY",
            ApyTier::Mid => "MidAPY",
            ApyTier::Max => "MaxAPY",
        };
        write!(f, "{}", s)
    }
}

/// Candidate `(tier, monthly rate)` pairs, highest first
pub fn candidates(config: &VaultConfig) -> Result<Vec<(ApyTier, Rate)>> {
    let [min, mid, max] = config.monthly_rates()?;
    Ok(vec![
        (ApyTier::Max, max),
        (ApyTier::Mid, mid),
        (ApyTier::Min, min),
    ])
}

// ═══════════════════════════════════════════════════════════════════════════════
// SELECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Mint amounts and projected state for one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApySelection {
    /// Tier
    pub tier: ApyTier,
    /// Rate applied this epoch (monthly rate pro-rated to elapsed time), PRECISION-scaled
    pub epoch_rate: Rate,
    /// Yield distributed to holders through the index
    pub holder_yield: Amount,
    /// Performance fee minted to the treasury
    pub performance_fee: Amount,
    /// Management fee minted to the treasury
    pub management_fee: Amount,
    /// Index after the mint
    pub new_index: Index,
    /// Fee shares credited to the treasury
    pub treasury_shares: Shares,
    /// Supply after the mint
    pub new_supply: Amount,
    /// `value / new_supply`
    pub projected_ratio: Rate,
}

/// Picks the highest candidate whose projection keeps the ratio at or above `trigger`.
///
/// `candidates` must be ordered highest rate first; the last entry is the
/// fallback. `project` computes the mint for one candidate.
pub fn select_tier<F>(candidates: &[(ApyTier, Rate)], trigger: Rate, mut project: F) -> Result<ApySelection>
where
    F: FnMut(ApyTier, Rate) -> Result<ApySelection>,
{
    let mut fallback = None;
    for &(tier, rate) in candidates {
        let selection = project(tier, rate)?;
        if selection.projected_ratio >= trigger {
            return Ok(selection);
        }
        fallback = Some(selection);
    }
    fallback.ok_or_else(|| Error::InvalidConfig("no yield tiers configured".into()))
}

/// Projects the mint for a tier against a fixed pre-rebase state
#[derive(Debug, Clone, Copy)]
pub struct TierProjector {
    /// State before the rebase
    pub state: RebaseState,
    /// Senior value, unchanged by the mint
    pub value: Amount,
    /// Management fee already accrued for the epoch
    pub management_fee: Amount,
    /// Performance fee, bps of holder yield
    pub perf_fee_bps: u64,
    /// Ratio reported for an empty vault
    pub target: Rate,
}

impl TierProjector {
    /// Mint `rate` on the current supply and price the fees in new-index shares
    pub fn project(&self, tier: ApyTier, rate: Rate) -> Result<ApySelection> {
        let supply = self.state.total_supply()?;
        let holder_yield = mul_div(supply, rate)?;
        let performance_fee = bps_of(holder_yield, self.perf_fee_bps)?;

        let new_index = mul_div(self.state.rebase_index, safe_add(PRECISION, rate)?)?;
        let fees = safe_add(self.management_fee, performance_fee)?;
        let treasury_shares = shares_from_balance(fees, new_index)?;
        let new_supply = total_supply(safe_add(self.state.total_shares, treasury_shares)?, new_index)?;
        let projected_ratio = backing_ratio(self.value, new_supply, self.target)?;

        Ok(ApySelection {
            tier,
            epoch_rate: rate,
            holder_yield,
            performance_fee,
            management_fee: self.management_fee,
            new_index,
            treasury_shares,
            new_supply,
            projected_ratio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::INITIAL_INDEX;

    fn fake(tier: ApyTier, rate: Rate, ratio: Rate) -> ApySelection {
        ApySelection {
            tier,
            epoch_rate: rate,
            holder_yield: 0,
            performance_fee: 0,
            management_fee: 0,
            new_index: INITIAL_INDEX,
            treasury_shares: 0,
            new_supply: 0,
            projected_ratio: ratio,
        }
    }

    #[test]
    fn test_picks_highest_solvent_tier() {
        let cands = [(ApyTier::Max, 3), (ApyTier::Mid, 2), (ApyTier::Min, 1)];
        // Ratio falls as the rate rises
        let sel = select_tier(&cands, 96, |t, r| Ok(fake(t, r, 100 - 2 * r as u128))).unwrap();
        assert_eq!(sel.tier, ApyTier::Mid);
    }

    #[test]
    fn test_falls_back_to_min() {
        let cands = [(ApyTier::Max, 3), (ApyTier::Mid, 2), (ApyTier::Min, 1)];
        let sel = select_tier(&cands, 99, |t, r| Ok(fake(t, r, 80))).unwrap();
        assert_eq!(sel.tier, ApyTier::Min);
        assert_eq!(sel.epoch_rate, 1);
    }

    #[test]
    fn test_stops_at_first_match() {
        let cands = [(ApyTier::Max, 3), (ApyTier::Mid, 2), (ApyTier::Min, 1)];
        let mut calls = 0;
        let sel = select_tier(&cands, 0, |t, r| {
            calls += 1;
            Ok(fake(t, r, 1))
        })
        .unwrap();
        assert_eq!(sel.tier, ApyTier::Max);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_empty_candidates() {
        assert!(select_tier(&[], 0, |t, r| Ok(fake(t, r, 0))).is_err());
    }

    #[test]
    fn test_candidates_descending() {
        let cands = candidates(&VaultConfig::default()).unwrap();
        assert_eq!(cands[0].0, ApyTier::Max);
        assert!(cands[0].1 > cands[1].1 && cands[1].1 > cands[2].1);
    }

    #[test]
    fn test_projection_mints_yield_through_index() {
        let state = RebaseState {
            rebase_index: INITIAL_INDEX,
            total_shares: 1_000 * PRECISION,
            epoch: 0,
            last_rebase_time: 0,
        };
        let projector = TierProjector {
            state,
            value: 1_000 * PRECISION,
            management_fee: 0,
            perf_fee_bps: 0,
            target: PRECISION,
        };
        let sel = projector.project(ApyTier::Mid, PRECISION / 100).unwrap();
        assert_eq!(sel.new_index, PRECISION + PRECISION / 100);
        assert_eq!(sel.holder_yield, 10 * PRECISION);
        assert_eq!(sel.new_supply, 1_010 * PRECISION);
        assert_eq!(sel.treasury_shares, 0);
        assert!(sel.projected_ratio < PRECISION);
    }

    #[test]
    fn test_performance_fee_is_fraction_of_yield() {
        let state = RebaseState {
            rebase_index: INITIAL_INDEX,
            total_shares: 1_000 * PRECISION,
            epoch: 0,
            last_rebase_time: 0,
        };
        let projector = TierProjector {
            state,
            value: 1_000 * PRECISION,
            management_fee: 0,
            perf_fee_bps: 200,
            target: PRECISION,
        };
        let sel = projector.project(ApyTier::Mid, PRECISION / 100).unwrap();
        assert_eq!(sel.holder_yield, 10 * PRECISION);
        assert_eq!(sel.performance_fee, PRECISION / 5);
        assert!(sel.performance_fee < sel.holder_yield);
        assert!(sel.treasury_shares > 0);
    }
}

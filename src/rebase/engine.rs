//! Monthly rebase state transition.
//!
//! A rebase runs in a fixed order:
//! 1. Gate on the minimum interval
//! 2. Accrue the management fee over the elapsed time
//! 3. Select the highest sustainable yield tier, its rate pro-rated to the elapsed time
//! 4. Mint holder yield through the index and fee shares to the treasury
//! 5. Recompute the backing ratio against post-mint supply
//! 6. Route spillover or run the backstop waterfall
//! 7. Commit the new index, shares, epoch and timestamp
//!
//! Steps 1-5 are pure and shared with [`RebaseEngine::simulate_rebase`].
//! [`RebaseEngine::execute`] adds the collaborator calls of step 6 and
//! [`RebaseEngine::commit`] performs step 7, so the vault is only written
//! after every collaborator call succeeded.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::config::VaultConfig;
use crate::core::vault::{RebaseState, SeniorVault};
use crate::error::{Error, Result};
use crate::rebase::apy::{candidates, select_tier, ApySelection, ApyTier, TierProjector};
use crate::rebase::interfaces::{Counterparties, ValueSource};
use crate::rebase::waterfall::{plan_waterfall, run_waterfall, split_spillover, BackstopOutcome};
use crate::rebase::zone::{classify, Zone};
use crate::utils::constants::{BPS_DENOMINATOR, SECONDS_PER_YEAR};
use crate::utils::math::{mul_div_by, safe_add, Amount, Index, Rate};

// ═══════════════════════════════════════════════════════════════════════════════
// RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Spillover amounts routed to each tranche
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpilloverSplit {
    /// To junior
    pub to_junior: Amount,
    /// To reserve
    pub to_reserve: Amount,
}

/// Everything a rebase would do, computed without side effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebasePreview {
    /// Epoch number the rebase would record
    pub epoch: u64,
    /// Seconds since the last rebase
    pub elapsed: u64,
    /// Senior value used for the ratio
    pub vault_value: Amount,
    /// Index before
    pub old_index: Index,
    /// Supply before
    pub old_supply: Amount,
    /// Chosen tier and its mint
    pub selection: ApySelection,
    /// Post-mint backing ratio
    pub backing_ratio: Rate,
    /// Zone for this epoch
    pub zone: Zone,
    /// Deficit (backstop) or excess (spillover) against target
    pub magnitude: Amount,
    /// Spillover split, if in the spillover zone
    pub spillover: Option<SpilloverSplit>,
    /// State to commit
    pub next_state: RebaseState,
}

impl RebasePreview {
    /// Index after the rebase
    pub fn new_index(&self) -> Index {
        self.selection.new_index
    }

    /// Supply after the rebase
    pub fn new_supply(&self) -> Amount {
        self.selection.new_supply
    }

    /// Tier chosen
    pub fn tier(&self) -> ApyTier {
        self.selection.tier
    }

    /// Expected waterfall given the tranches' current capacities
    pub fn plan_backstop(&self, reserve_capacity: Amount, junior_capacity: Amount) -> Option<BackstopOutcome> {
        match self.zone {
            Zone::Backstop => Some(plan_waterfall(self.magnitude, reserve_capacity, junior_capacity)),
            _ => None,
        }
    }
}

/// An executed rebase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseOutcome {
    /// Numbers computed for the epoch
    pub preview: RebasePreview,
    /// Waterfall result, if in the backstop zone
    pub backstop: Option<BackstopOutcome>,
}

impl RebaseOutcome {
    /// Whether senior ends the epoch with its deficit covered
    pub fn fully_restored(&self) -> bool {
        self.backstop.map(|b| b.fully_restored).unwrap_or(true)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Rebase engine for one senior vault configuration
#[derive(Debug, Clone)]
pub struct RebaseEngine {
    config: VaultConfig,
    candidates: Vec<(ApyTier, Rate)>,
}

impl RebaseEngine {
    /// Validate `config` and precompute the tier rates
    pub fn new(config: VaultConfig) -> Result<Self> {
        config.validate()?;
        let candidates = candidates(&config)?;
        Ok(Self { config, candidates })
    }

    /// Parameters in use
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Seconds elapsed, or [`Error::RebaseTooSoon`] inside the minimum interval
    pub fn check_gate(&self, state: &RebaseState, now: u64) -> Result<u64> {
        let elapsed = now.saturating_sub(state.last_rebase_time);
        if elapsed < self.config.min_rebase_interval {
            return Err(Error::RebaseTooSoon {
                elapsed,
                required: self.config.min_rebase_interval,
            });
        }
        Ok(elapsed)
    }

    /// Management fee on `value` pro-rated over `elapsed` seconds
    pub fn management_fee(&self, value: Amount, elapsed: u64) -> Result<Amount> {
        let numerator = (self.config.mgmt_fee_annual_bps as u128)
            .checked_mul(elapsed as u128)
            .ok_or_else(|| Error::overflow("management_fee"))?;
        mul_div_by(value, numerator, BPS_DENOMINATOR * SECONDS_PER_YEAR as u128)
    }

    /// Monthly tier rate scaled to `elapsed` seconds; exactly the monthly
    /// rate when `elapsed` equals the minimum rebase interval
    pub fn epoch_rate(&self, monthly_rate: Rate, elapsed: u64) -> Result<Rate> {
        mul_div_by(
            monthly_rate,
            elapsed as u128,
            self.config.min_rebase_interval as u128,
        )
    }

    /// Compute the rebase at `now` without touching anything
    pub fn simulate_rebase(&self, state: &RebaseState, now: u64, vault_value: Amount) -> Result<RebasePreview> {
        let elapsed = self.check_gate(state, now)?;
        let old_supply = state.total_supply()?;

        let selection = if state.total_shares == 0 {
            self.empty_selection(state, elapsed)?
        } else {
            let projector = TierProjector {
                state: *state,
                value: vault_value,
                management_fee: self.management_fee(vault_value, elapsed)?,
                perf_fee_bps: self.config.perf_fee_bps,
                target: self.config.target_backing,
            };
            select_tier(&self.candidates, self.config.trigger_backing, |tier, monthly_rate| {
                let rate = self.epoch_rate(monthly_rate, elapsed)?;
                let projection = projector.project(tier, rate)?;
                debug!(
                    tier = %tier,
                    epoch_rate = rate,
                    projected_ratio = projection.projected_ratio,
                    "Projected tier"
                );
                Ok(projection)
            })?
        };

        let backing_ratio = selection.projected_ratio;
        let (zone, magnitude) = classify(backing_ratio, selection.new_supply, &self.config)?;

        let spillover = match zone {
            Zone::Spillover => {
                let (to_junior, to_reserve) =
                    split_spillover(magnitude, self.config.junior_spillover_share_bps)?;
                Some(SpilloverSplit {
                    to_junior,
                    to_reserve,
                })
            }
            _ => None,
        };

        let next_state = RebaseState {
            rebase_index: selection.new_index,
            total_shares: safe_add(state.total_shares, selection.treasury_shares)?,
            epoch: state.epoch + 1,
            last_rebase_time: now,
        };

        Ok(RebasePreview {
            epoch: next_state.epoch,
            elapsed,
            vault_value,
            old_index: state.rebase_index,
            old_supply,
            selection,
            backing_ratio,
            zone,
            magnitude,
            spillover,
            next_state,
        })
    }

    /// Run steps 1-6 against the collaborators without writing `vault`.
    ///
    /// Any collaborator failure aborts. Undoing what an earlier collaborator
    /// already accepted is the caller's job.
    pub fn execute(
        &self,
        vault: &SeniorVault,
        now: u64,
        value: &dyn ValueSource,
        parties: Counterparties<'_>,
    ) -> Result<RebaseOutcome> {
        let preview = self.simulate_rebase(vault.state(), now, value.current_value())?;
        let mut backstop = None;

        match preview.zone {
            Zone::Spillover => {
                if let Some(split) = preview.spillover {
                    if split.to_junior > 0 {
                        parties
                            .junior
                            .receive_spillover(split.to_junior)
                            .map_err(|e| collaborator_failed("junior", e))?;
                    }
                    if split.to_reserve > 0 {
                        parties
                            .reserve
                            .receive_spillover(split.to_reserve)
                            .map_err(|e| collaborator_failed("reserve", e))?;
                    }
                    info!(
                        epoch = preview.epoch,
                        to_junior = split.to_junior,
                        to_reserve = split.to_reserve,
                        "Spillover routed"
                    );
                }
            }
            Zone::Backstop => {
                let outcome = run_waterfall(preview.magnitude, &mut *parties.reserve, &mut *parties.junior)
                    .map_err(|e| collaborator_failed("backstop", e))?;
                info!(
                    epoch = preview.epoch,
                    requested = outcome.requested,
                    from_reserve = outcome.from_reserve,
                    from_junior = outcome.from_junior,
                    fully_restored = outcome.fully_restored,
                    "Backstop executed"
                );
                backstop = Some(outcome);
            }
            Zone::Healthy => {}
        }

        Ok(RebaseOutcome { preview, backstop })
    }

    /// Install an executed rebase into `vault`
    pub fn commit(&self, vault: &mut SeniorVault, outcome: &RebaseOutcome) -> Result<()> {
        let preview = &outcome.preview;
        if vault.epoch() + 1 != preview.epoch {
            return Err(Error::InvariantViolation(format!(
                "rebase for epoch {} applied at epoch {}",
                preview.epoch,
                vault.epoch()
            )));
        }
        vault.commit_rebase(preview.next_state, preview.selection.treasury_shares)?;

        info!(
            epoch = preview.epoch,
            tier = %preview.tier(),
            old_index = preview.old_index,
            new_index = preview.new_index(),
            new_supply = preview.new_supply(),
            zone = %preview.zone,
            "Rebase committed"
        );
        Ok(())
    }

    /// Execute and commit in one step
    pub fn rebase(
        &self,
        vault: &mut SeniorVault,
        now: u64,
        value: &dyn ValueSource,
        parties: Counterparties<'_>,
    ) -> Result<RebaseOutcome> {
        let outcome = self.execute(vault, now, value, parties)?;
        self.commit(vault, &outcome)?;
        Ok(outcome)
    }

    fn empty_selection(&self, state: &RebaseState, elapsed: u64) -> Result<ApySelection> {
        let (tier, monthly_rate) = self
            .candidates
            .last()
            .copied()
            .ok_or_else(|| Error::InvalidConfig("no yield tiers configured".into()))?;
        Ok(ApySelection {
            tier,
            epoch_rate: self.epoch_rate(monthly_rate, elapsed)?,
            holder_yield: 0,
            performance_fee: 0,
            management_fee: 0,
            new_index: state.rebase_index,
            treasury_shares: 0,
            new_supply: 0,
            projected_ratio: self.config.target_backing,
        })
    }
}

fn collaborator_failed(party: &str, error: Error) -> Error {
    warn!(party, error = %error, "Collaborator call failed, rebase aborted");
    error
}

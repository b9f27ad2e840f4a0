//! Backstop waterfall: reserve first, then junior.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::rebase::interfaces::BackstopProvider;
use crate::utils::math::{bps_of, safe_add, Amount};

/// What the waterfall collected for one deficit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackstopOutcome {
    /// Deficit to cover
    pub requested: Amount,
    /// Provided by the reserve
    pub from_reserve: Amount,
    /// Provided by the junior tranche
    pub from_junior: Amount,
    /// Whether the full deficit was covered
    pub fully_restored: bool,
}

impl BackstopOutcome {
    /// Total provided by both tranches
    pub fn provided(&self) -> Amount {
        self.from_reserve.saturating_add(self.from_junior)
    }

    /// Deficit left uncovered
    pub fn shortfall(&self) -> Amount {
        self.requested.saturating_sub(self.provided())
    }

    /// Convert a partial outcome into [`Error::InsufficientBackstopFunds`]
    pub fn ensure_restored(&self) -> Result<()> {
        if self.fully_restored {
            Ok(())
        } else {
            Err(Error::InsufficientBackstopFunds {
                requested: self.requested,
                provided: self.provided(),
            })
        }
    }
}

/// Split a spillover between junior and reserve.
///
/// Junior gets its basis-point share floored; reserve gets the remainder, so
/// the two always sum to `magnitude`.
pub fn split_spillover(magnitude: Amount, junior_share_bps: u64) -> Result<(Amount, Amount)> {
    let junior = bps_of(magnitude, junior_share_bps)?;
    Ok((junior, magnitude - junior))
}

/// Plan the waterfall against known capacities without calling anyone
pub fn plan_waterfall(deficit: Amount, reserve_capacity: Amount, junior_capacity: Amount) -> BackstopOutcome {
    let from_reserve = deficit.min(reserve_capacity);
    let from_junior = (deficit - from_reserve).min(junior_capacity);
    BackstopOutcome {
        requested: deficit,
        from_reserve,
        from_junior,
        fully_restored: from_reserve + from_junior >= deficit,
    }
}

/// Pull `deficit` from the reserve, then any remainder from junior.
///
/// A provider handing back more than it was asked for is a collaborator fault.
pub fn run_waterfall<R, J>(deficit: Amount, reserve: &mut R, junior: &mut J) -> Result<BackstopOutcome>
where
    R: BackstopProvider + ?Sized,
    J: BackstopProvider + ?Sized,
{
    let from_reserve = request(deficit, reserve, "reserve")?;
    let remaining = deficit - from_reserve;
    let from_junior = request(remaining, junior, "junior")?;

    let provided = safe_add(from_reserve, from_junior)?;
    let outcome = BackstopOutcome {
        requested: deficit,
        from_reserve,
        from_junior,
        fully_restored: provided >= deficit,
    };

    if !outcome.fully_restored {
        warn!(
            requested = deficit,
            provided,
            shortfall = outcome.shortfall(),
            "Backstop could not restore target backing"
        );
    }
    Ok(outcome)
}

fn request<P: BackstopProvider + ?Sized>(needed: Amount, provider: &mut P, party: &str) -> Result<Amount> {
    let ask = needed.min(provider.backstop_capacity());
    if ask == 0 {
        return Ok(0);
    }
    let provided = provider.provide_backstop(ask)?;
    if provided > ask {
        return Err(Error::CollaboratorFailed {
            party: party.into(),
            reason: format!("provided {} for a request of {}", provided, ask),
        });
    }
    Ok(provided)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rebase::interfaces::TranchePool;

    struct Greedy;

    impl BackstopProvider for Greedy {
        fn backstop_capacity(&self) -> Amount {
            100
        }

        fn provide_backstop(&mut self, amount: Amount) -> Result<Amount> {
            Ok(amount + 1)
        }
    }

    #[test]
    fn test_reserve_then_junior() {
        let mut reserve = TranchePool::reserve(150_000);
        let mut junior = TranchePool::junior(1_000_000, 10_000);

        let outcome = run_waterfall(200_000, &mut reserve, &mut junior).unwrap();
        assert_eq!(outcome.from_reserve, 150_000);
        assert_eq!(outcome.from_junior, 50_000);
        assert!(outcome.fully_restored);
        assert!(outcome.ensure_restored().is_ok());
        assert_eq!(reserve.value, 0);
        assert_eq!(junior.value, 950_000);
    }

    #[test]
    fn test_reserve_alone_suffices() {
        let mut reserve = TranchePool::reserve(500);
        let mut junior = TranchePool::junior(500, 10_000);

        let outcome = run_waterfall(200, &mut reserve, &mut junior).unwrap();
        assert_eq!(outcome.from_reserve, 200);
        assert_eq!(outcome.from_junior, 0);
        assert_eq!(junior.total_provided, 0);
    }

    #[test]
    fn test_reserve_wipeout_is_partial() {
        let mut reserve = TranchePool::reserve(10_000);
        let mut junior = TranchePool::junior(1_000_000, 0);

        let outcome = run_waterfall(200_000, &mut reserve, &mut junior).unwrap();
        assert_eq!(outcome.provided(), 10_000);
        assert!(!outcome.fully_restored);
        assert_eq!(outcome.shortfall(), 190_000);
        assert_eq!(
            outcome.ensure_restored(),
            Err(Error::InsufficientBackstopFunds {
                requested: 200_000,
                provided: 10_000,
            })
        );
    }

    #[test]
    fn test_over_provision_is_rejected() {
        let mut junior = TranchePool::junior(0, 0);
        let err = run_waterfall(50, &mut Greedy, &mut junior).unwrap_err();
        assert!(matches!(err, Error::CollaboratorFailed { .. }));
    }

    #[test]
    fn test_plan_matches_run() {
        let mut reserve = TranchePool::reserve(70);
        let mut junior = TranchePool::junior(100, 5_000);
        let plan = plan_waterfall(150, reserve.backstop_capacity(), junior.backstop_capacity());
        let run = run_waterfall(150, &mut reserve, &mut junior).unwrap();
        assert_eq!(plan, run);
        assert!(!run.fully_restored);
    }

    #[test]
    fn test_split_conserves_value() {
        let (junior, reserve) = split_spillover(1_001, 8_000).unwrap();
        assert_eq!(junior, 800);
        assert_eq!(reserve, 201);
    }
}

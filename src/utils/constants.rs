//! Protocol constants and default parameters.
//!
//! Defaults only: the engine reads every tunable through an injected
//! [`VaultConfig`](crate::core::config::VaultConfig).

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED-POINT SCALES
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed-point scale for amounts, indices and ratios (1e18)
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

/// Basis points divisor (10000 = 100%)
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Lowest valid signed basis-point adjustment (-100%)
pub const MIN_PERCENTAGE_BPS: i64 = -10_000;

/// Initial rebase index (1.0)
pub const INITIAL_INDEX: u128 = PRECISION;

// ═══════════════════════════════════════════════════════════════════════════════
// TIME CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Seconds in one day
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Seconds in a 365-day year (management fee pro-ration)
pub const SECONDS_PER_YEAR: u64 = 365 * SECONDS_PER_DAY;

/// Rebase epochs per year (monthly)
pub const EPOCHS_PER_YEAR: u128 = 12;

/// Minimum interval between rebases - 30 days
pub const MIN_REBASE_INTERVAL: u64 = 30 * SECONDS_PER_DAY;

/// Window in which a pending deposit can be approved - 7 days
pub const PENDING_DEPOSIT_EXPIRY: u64 = 7 * SECONDS_PER_DAY;

/// Cooldown before a penalty-free withdrawal - 7 days
pub const COOLDOWN_PERIOD: u64 = 7 * SECONDS_PER_DAY;

// ═══════════════════════════════════════════════════════════════════════════════
// YIELD TIERS (annual, basis points)
// ═══════════════════════════════════════════════════════════════════════════════

/// Lowest tier - 11% APY
pub const MIN_APY_BPS: u64 = 1_100;

/// Middle tier - 12% APY
pub const MID_APY_BPS: u64 = 1_200;

/// Highest tier - 13% APY
pub const MAX_APY_BPS: u64 = 1_300;

// ═══════════════════════════════════════════════════════════════════════════════
// BACKING THRESHOLDS (PRECISION-scaled)
// ═══════════════════════════════════════════════════════════════════════════════

/// Below this backing ratio the backstop waterfall runs - 95%
pub const TRIGGER_BACKING: u128 = 950_000_000_000_000_000;

/// Target backing ratio - 100%
pub const TARGET_BACKING: u128 = PRECISION;

/// Above this backing ratio excess spills over - 110%
pub const RESTORE_BACKING: u128 = 1_100_000_000_000_000_000;

// ═══════════════════════════════════════════════════════════════════════════════
// FEES AND SPLITS (basis points)
// ═══════════════════════════════════════════════════════════════════════════════

/// Annual management fee on vault value - 1%
pub const MGMT_FEE_ANNUAL_BPS: u64 = 100;

/// Performance fee as a fraction of holder yield - 2%
pub const PERF_FEE_BPS: u64 = 200;

/// Junior's share of spillover - 80%
pub const JUNIOR_SPILLOVER_SHARE_BPS: u64 = 8_000;

/// Reserve's share of spillover - 20%
pub const RESERVE_SPILLOVER_SHARE_BPS: u64 = 2_000;

/// Penalty on withdrawals made without a completed cooldown - 5%
pub const EARLY_WITHDRAWAL_PENALTY_BPS: u64 = 500;

/// Fraction of junior value that may be drawn as backstop - 100%
pub const JUNIOR_BACKSTOP_CAPACITY_BPS: u64 = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// CAPS
// ═══════════════════════════════════════════════════════════════════════════════

/// Senior supply may not exceed this multiple of reserve value
pub const DEPOSIT_CAP_MULTIPLIER: u128 = 10;

/// Maximum events retained by an event log
pub const MAX_EVENT_LOG: usize = 1_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(MIN_APY_BPS < MID_APY_BPS);
        assert!(MID_APY_BPS < MAX_APY_BPS);
    }

    #[test]
    fn test_threshold_ordering() {
        assert!(TRIGGER_BACKING < TARGET_BACKING);
        assert!(TARGET_BACKING < RESTORE_BACKING);
    }

    #[test]
    fn test_spillover_split_sums_to_whole() {
        assert_eq!(
            (JUNIOR_SPILLOVER_SHARE_BPS + RESERVE_SPILLOVER_SHARE_BPS) as u128,
            BPS_DENOMINATOR
        );
        assert!(JUNIOR_SPILLOVER_SHARE_BPS > RESERVE_SPILLOVER_SHARE_BPS);
    }
}

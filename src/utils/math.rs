//! Fixed-point arithmetic primitives.
//!
//! All monetary quantities are `u128` integers scaled by [`PRECISION`];
//! basis-point quantities are scaled by [`BPS_DENOMINATOR`]. Products are
//! widened to 256 bits so a multiply-divide only fails when the quotient
//! itself does not fit.

use ethnum::U256;

use crate::error::{Error, Result};
use crate::utils::constants::{BPS_DENOMINATOR, EPOCHS_PER_YEAR, MIN_PERCENTAGE_BPS, PRECISION};

/// Amount in the unit of account, PRECISION-scaled
pub type Amount = u128;

/// Share count, PRECISION-scaled
pub type Shares = u128;

/// Rebase index, PRECISION-scaled (1e18 = 1.0)
pub type Index = u128;

/// Rate or ratio, PRECISION-scaled (1e18 = 100%)
pub type Rate = u128;

// ═══════════════════════════════════════════════════════════════════════════════
// ROUNDING
// ═══════════════════════════════════════════════════════════════════════════════

/// Rounding direction for division
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Floor
    Down,
    /// Ceiling
    Up,
}

fn narrow(value: U256, operation: &str) -> Result<u128> {
    let (hi, lo) = value.into_words();
    if hi != 0 {
        return Err(Error::overflow(operation));
    }
    Ok(lo)
}

/// Computes `a × b / c` with a 256-bit intermediate and the given rounding
pub fn mul_div_rounding(a: u128, b: u128, c: u128, rounding: Rounding) -> Result<u128> {
    if c == 0 {
        return Err(Error::DivisionByZero {
            operation: format!("({} * {}) / 0", a, b),
        });
    }
    let product = U256::new(a) * U256::new(b);
    let divisor = U256::new(c);
    let mut quotient = product / divisor;
    if rounding == Rounding::Up && product % divisor != U256::ZERO {
        quotient = quotient + U256::ONE;
    }
    narrow(quotient, "mul_div")
}

// ═══════════════════════════════════════════════════════════════════════════════
// MULTIPLY-DIVIDE
// ═══════════════════════════════════════════════════════════════════════════════

/// `a × b / c`, floored
pub fn mul_div_by(a: u128, b: u128, c: u128) -> Result<u128> {
    mul_div_rounding(a, b, c, Rounding::Down)
}

/// `a × b / c`, rounded up
pub fn mul_div_by_up(a: u128, b: u128, c: u128) -> Result<u128> {
    mul_div_rounding(a, b, c, Rounding::Up)
}

/// `a × b / PRECISION`, floored
pub fn mul_div(a: u128, b: u128) -> Result<u128> {
    mul_div_rounding(a, b, PRECISION, Rounding::Down)
}

/// `a × b / PRECISION`, rounded up
pub fn mul_div_up(a: u128, b: u128) -> Result<u128> {
    mul_div_rounding(a, b, PRECISION, Rounding::Up)
}

/// `a × PRECISION / b`, floored
pub fn div_precision(a: u128, b: u128) -> Result<u128> {
    mul_div_rounding(a, PRECISION, b, Rounding::Down)
}

/// `a × PRECISION / b`, rounded up
pub fn div_precision_up(a: u128, b: u128) -> Result<u128> {
    mul_div_rounding(a, PRECISION, b, Rounding::Up)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PERCENTAGES
// ═══════════════════════════════════════════════════════════════════════════════

/// Adjusts `value` by a signed basis-point percentage, floored.
///
/// `-10000` yields zero, `0` yields `value`, `+500` yields `value × 1.05`.
/// Anything below `-10000` is rejected with [`Error::InvalidPercentage`].
pub fn apply_percentage(value: Amount, percentage_bps: i64) -> Result<Amount> {
    if percentage_bps < MIN_PERCENTAGE_BPS {
        return Err(Error::InvalidPercentage(percentage_bps));
    }
    // Non-negative after the bounds check above
    let factor = (BPS_DENOMINATOR as i128 + percentage_bps as i128) as u128;
    mul_div_by(value, factor, BPS_DENOMINATOR)
}

/// Plain basis-point fraction of a value: `value × bps / 10000`, floored
pub fn bps_of(value: Amount, bps: u64) -> Result<Amount> {
    mul_div_by(value, bps as u128, BPS_DENOMINATOR)
}

/// Converts an annual rate in basis points to a PRECISION-scaled per-epoch rate
pub fn monthly_rate_from_annual_bps(annual_bps: u64) -> Result<Rate> {
    let annual = mul_div_by(annual_bps as u128, PRECISION, BPS_DENOMINATOR)?;
    Ok(annual / EPOCHS_PER_YEAR)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHECKED ARITHMETIC
// ═══════════════════════════════════════════════════════════════════════════════

/// Addition that fails instead of wrapping
pub fn safe_add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b)
        .ok_or_else(|| Error::overflow(format!("{} + {}", a, b)))
}

/// Subtraction that fails instead of wrapping
pub fn safe_sub(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b)
        .ok_or_else(|| Error::overflow(format!("{} - {}", a, b)))
}

/// Smaller of two values
pub fn min<T: Ord>(a: T, b: T) -> T {
    std::cmp::min(a, b)
}

/// Larger of two values
pub fn max<T: Ord>(a: T, b: T) -> T {
    std::cmp::max(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_basic() {
        assert_eq!(mul_div(2 * PRECISION, 3 * PRECISION).unwrap(), 6 * PRECISION);
        assert_eq!(mul_div(PRECISION, PRECISION / 2).unwrap(), PRECISION / 2);
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // Product exceeds u128 but the quotient fits
        let a = u128::MAX / 2;
        let b = 2 * PRECISION;
        assert_eq!(mul_div(a, b).unwrap(), a * 2);
    }

    #[test]
    fn test_mul_div_unrepresentable() {
        let err = mul_div(u128::MAX, 2 * PRECISION).unwrap_err();
        assert!(matches!(err, Error::ArithmeticOverflow { .. }));
    }

    #[test]
    fn test_mul_div_floor_and_ceil() {
        assert_eq!(mul_div_by(10, 1, 3).unwrap(), 3);
        assert_eq!(mul_div_by_up(10, 1, 3).unwrap(), 4);
        assert_eq!(mul_div_by_up(9, 1, 3).unwrap(), 3);
        assert_eq!(mul_div_up(1, 1).unwrap(), 1);
        assert_eq!(mul_div(1, 1).unwrap(), 0);
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(
            mul_div_by(1, 1, 0),
            Err(Error::DivisionByZero { .. })
        ));
        assert!(div_precision(1, 0).is_err());
    }

    #[test]
    fn test_apply_percentage() {
        let v = 1_000 * PRECISION;
        assert_eq!(apply_percentage(v, 0).unwrap(), v);
        assert_eq!(apply_percentage(v, -10_000).unwrap(), 0);
        assert_eq!(apply_percentage(v, 500).unwrap(), 1_050 * PRECISION);
        assert_eq!(apply_percentage(v, -2_500).unwrap(), 750 * PRECISION);
        assert_eq!(apply_percentage(v, 20_000).unwrap(), 3_000 * PRECISION);
    }

    #[test]
    fn test_apply_percentage_rejects_below_full_loss() {
        assert_eq!(
            apply_percentage(1, -10_001),
            Err(Error::InvalidPercentage(-10_001))
        );
    }

    #[test]
    fn test_bps_of() {
        assert_eq!(bps_of(10_000, 200).unwrap(), 200);
        assert_eq!(bps_of(99, 100).unwrap(), 0);
    }

    #[test]
    fn test_monthly_rate() {
        // 12% annual = 1% monthly
        assert_eq!(monthly_rate_from_annual_bps(1_200).unwrap(), PRECISION / 100);
        // 13% / 12, floored
        assert_eq!(
            monthly_rate_from_annual_bps(1_300).unwrap(),
            130_000_000_000_000_000 / 12
        );
    }

    #[test]
    fn test_safe_arithmetic() {
        assert_eq!(safe_add(1, 2).unwrap(), 3);
        assert!(safe_add(u128::MAX, 1).is_err());
        assert_eq!(safe_sub(5, 3).unwrap(), 2);
        assert!(safe_sub(3, 5).is_err());
    }

    #[test]
    fn test_min_max() {
        assert_eq!(min(3u128, 7), 3);
        assert_eq!(max(3u128, 7), 7);
    }
}

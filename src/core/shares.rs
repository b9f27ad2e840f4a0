//! Conversion between shares, balances and the rebase index.
//!
//! Rounding always favors the vault: reads and mints floor, burns ceil. The
//! sum of every holder's floored balance can therefore never exceed the
//! supply computed from total shares, and repeated deposit/withdraw cycles
//! cannot drain value.

use crate::error::{Error, Result};
use crate::utils::math::{div_precision, div_precision_up, mul_div, safe_add, Amount, Index, Shares};

/// Spendable balance for a share count at `index`, floored
pub fn balance_from_shares(shares: Shares, index: Index) -> Result<Amount> {
    mul_div(shares, index)
}

/// Shares minted for a deposit of `balance`, floored
pub fn shares_from_balance(balance: Amount, index: Index) -> Result<Shares> {
    if index == 0 {
        return Err(Error::InvariantViolation("rebase index is zero".into()));
    }
    div_precision(balance, index)
}

/// Shares burned to redeem `balance`, rounded up
pub fn shares_from_balance_ceil(balance: Amount, index: Index) -> Result<Shares> {
    if index == 0 {
        return Err(Error::InvariantViolation("rebase index is zero".into()));
    }
    div_precision_up(balance, index)
}

/// Nominal supply represented by `total_shares` at `index`
pub fn total_supply(total_shares: Shares, index: Index) -> Result<Amount> {
    mul_div(total_shares, index)
}

/// Maximum senior supply a reserve of `reserve_value` can back
pub fn deposit_cap(reserve_value: Amount, multiplier: u128) -> Result<Amount> {
    reserve_value
        .checked_mul(multiplier)
        .ok_or_else(|| Error::overflow("deposit_cap"))
}

/// Fails with [`Error::DepositCapExceeded`] if `incoming` would push supply past the cap
pub fn ensure_within_cap(supply: Amount, incoming: Amount, cap: Amount) -> Result<()> {
    let after = safe_add(supply, incoming)?;
    if after > cap {
        return Err(Error::DepositCapExceeded {
            cap,
            requested: after,
        });
    }
    Ok(())
}

//! Backing-ratio zone classification.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::config::VaultConfig;
use crate::error::Result;
use crate::utils::math::{div_precision, mul_div, Amount, Rate};

/// Health of the senior vault for one epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    /// Below trigger; deficit is pulled from reserve then junior
    Backstop,
    /// Between trigger and restore; nothing moves
    Healthy,
    /// Above restore; excess is pushed to junior and reserve
    Spillover,
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Zone::Backstop => "backstop",
            Zone::Healthy => "healthy",
            Zone::Spillover => "spillover",
        };
        write!(f, "{}", s)
    }
}

/// `value / supply`, PRECISION-scaled. An empty vault reports `target`.
pub fn backing_ratio(value: Amount, supply: Amount, target: Rate) -> Result<Rate> {
    if supply == 0 {
        return Ok(target);
    }
    div_precision(value, supply)
}

/// Classify `ratio` and size the deficit or excess against the target.
///
/// Both magnitudes are measured from `target_backing`, never from the
/// trigger or restore thresholds.
pub fn classify(ratio: Rate, supply: Amount, config: &VaultConfig) -> Result<(Zone, Amount)> {
    let target = config.target_backing;
    if ratio < config.trigger_backing {
        let magnitude = mul_div(target.saturating_sub(ratio), supply)?;
        Ok((Zone::Backstop, magnitude))
    } else if ratio > config.restore_backing {
        let magnitude = mul_div(ratio.saturating_sub(target), supply)?;
        Ok((Zone::Spillover, magnitude))
    } else {
        Ok((Zone::Healthy, 0))
    }
}

//! Collaborator interfaces consumed by the rebase engine.
//!
//! The senior vault never holds references to the junior or reserve
//! tranches. Each rebase borrows them through these one-directional
//! capabilities, and nothing here can call back into the engine.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::math::{bps_of, safe_add, safe_sub, Amount};

// ═══════════════════════════════════════════════════════════════════════════════
// TRAITS
// ═══════════════════════════════════════════════════════════════════════════════

/// Externally tracked asset value of the senior vault
pub trait ValueSource {
    /// Current value backing the senior supply
    fn current_value(&self) -> Amount;
}

/// A tranche that accepts excess senior value
pub trait SpilloverReceiver {
    /// Accept `amount` of spillover
    fn receive_spillover(&mut self, amount: Amount) -> Result<()>;
}

/// A tranche that covers senior deficits
pub trait BackstopProvider {
    /// Largest amount this provider would hand over right now
    fn backstop_capacity(&self) -> Amount;

    /// Hand over up to `amount`, returning what was actually provided.
    ///
    /// Never returns more than requested. Zero requests are invalid.
    fn provide_backstop(&mut self, amount: Amount) -> Result<Amount>;
}

/// Both roles on one tranche, so the engine takes a single handle per tranche
pub trait TrancheCounterparty: SpilloverReceiver + BackstopProvider {}

impl<T: SpilloverReceiver + BackstopProvider + ?Sized> TrancheCounterparty for T {}

/// The two counterparties of one senior vault
pub struct Counterparties<'a> {
    /// First-loss, majority spillover
    pub junior: &'a mut dyn TrancheCounterparty,
    /// Primary backstop, minority spillover
    pub reserve: &'a mut dyn TrancheCounterparty,
}

impl<'a> Counterparties<'a> {
    /// Bundle the junior and reserve handles
    pub fn new(
        junior: &'a mut dyn TrancheCounterparty,
        reserve: &'a mut dyn TrancheCounterparty,
    ) -> Self {
        Self { junior, reserve }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY TRANCHE
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory junior or reserve tranche
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranchePool {
    /// Label for logs and errors
    pub name: String,
    /// Value held
    pub value: Amount,
    /// Share of `value` available to backstop calls (10000 = all of it)
    pub backstop_capacity_bps: u64,
    /// Cumulative spillover received
    pub total_received: Amount,
    /// Cumulative backstop provided
    pub total_provided: Amount,
    /// Paused pools reject every call
    pub paused: bool,
}

impl TranchePool {
    /// Create a pool holding `value`
    pub fn new(name: impl Into<String>, value: Amount, backstop_capacity_bps: u64) -> Self {
        Self {
            name: name.into(),
            value,
            backstop_capacity_bps,
            total_received: 0,
            total_provided: 0,
            paused: false,
        }
    }

    /// Junior pool with the given backstop capacity
    pub fn junior(value: Amount, backstop_capacity_bps: u64) -> Self {
        Self::new("junior", value, backstop_capacity_bps)
    }

    /// Reserve pool; its entire value backs senior
    pub fn reserve(value: Amount) -> Self {
        Self::new("reserve", value, 10_000)
    }

    /// Add value (direct deposit into the tranche)
    pub fn fund(&mut self, amount: Amount) -> Result<()> {
        self.value = safe_add(self.value, amount)?;
        Ok(())
    }

    /// Stop accepting calls
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume accepting calls
    pub fn unpause(&mut self) {
        self.paused = false;
    }

    fn ensure_active(&self) -> Result<()> {
        if self.paused {
            return Err(Error::CollaboratorFailed {
                party: self.name.clone(),
                reason: "tranche is paused".into(),
            });
        }
        Ok(())
    }
}

impl SpilloverReceiver for TranchePool {
    fn receive_spillover(&mut self, amount: Amount) -> Result<()> {
        self.ensure_active()?;
        self.value = safe_add(self.value, amount)?;
        self.total_received = safe_add(self.total_received, amount)?;
        Ok(())
    }
}

impl BackstopProvider for TranchePool {
    fn backstop_capacity(&self) -> Amount {
        if self.paused {
            return 0;
        }
        bps_of(self.value, self.backstop_capacity_bps).unwrap_or(self.value)
    }

    fn provide_backstop(&mut self, amount: Amount) -> Result<Amount> {
        self.ensure_active()?;
        if amount == 0 {
            return Err(Error::InvalidAmount(format!(
                "{} backstop request is zero",
                self.name
            )));
        }
        let provided = amount.min(self.backstop_capacity());
        self.value = safe_sub(self.value, provided)?;
        self.total_provided = safe_add(self.total_provided, provided)?;
        Ok(provided)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUE SOURCES
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed value, for previews and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticValue(pub Amount);

impl ValueSource for StaticValue {
    fn current_value(&self) -> Amount {
        self.0
    }
}

/// Senior value ledger maintained by the asset custodian
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeniorValue {
    value: Amount,
}

impl SeniorValue {
    /// Ledger starting at `value`
    pub fn new(value: Amount) -> Self {
        Self { value }
    }

    /// Value moved in
    pub fn credit(&mut self, amount: Amount) -> Result<()> {
        self.value = safe_add(self.value, amount)?;
        Ok(())
    }

    /// Value moved out
    pub fn debit(&mut self, amount: Amount) -> Result<()> {
        self.value = self.value.checked_sub(amount).ok_or_else(|| {
            Error::InvariantViolation(format!(
                "senior value {} cannot cover debit of {}",
                self.value, amount
            ))
        })?;
        Ok(())
    }

    /// Overwrite with an externally marked value (oracle repricing)
    pub fn set(&mut self, value: Amount) {
        self.value = value;
    }
}

impl ValueSource for SeniorValue {
    fn current_value(&self) -> Amount {
        self.value
    }
}

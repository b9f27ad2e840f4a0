//! Error types for the trivault core.
//!
//! Every fatal condition has its own variant so callers and tests can assert
//! on the cause. Only [`Error::InsufficientBackstopFunds`] is ever folded into
//! protocol state instead of aborting an operation.

use thiserror::Error;

use crate::deposits::DepositStatus;

/// Result type alias for trivault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the trivault core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Math Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Result of a fixed-point operation cannot be represented
    #[error("Arithmetic overflow in {operation}")]
    ArithmeticOverflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Divisor was zero
    #[error("Division by zero in {operation}")]
    DivisionByZero {
        /// Operation that divided by zero
        operation: String,
    },

    /// Signed basis-point adjustment below -10000
    #[error("Invalid percentage: {0} bps (must be >= -10000)")]
    InvalidPercentage(i64),

    /// Malformed amount supplied by the caller
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    // ═══════════════════════════════════════════════════════════════════
    // Rebase Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Minimum interval between rebases has not elapsed
    #[error("Rebase too soon: {elapsed}s elapsed, {required}s required")]
    RebaseTooSoon {
        /// Seconds since the last rebase
        elapsed: u64,
        /// Minimum interval in seconds
        required: u64,
    },

    /// A backstop provider could not fully cover a request
    #[error("Insufficient backstop funds: requested {requested}, provided {provided}")]
    InsufficientBackstopFunds {
        /// Deficit requested
        requested: u128,
        /// Amount actually provided
        provided: u128,
    },

    /// A junior/reserve collaborator rejected a call
    #[error("Collaborator {party} failed: {reason}")]
    CollaboratorFailed {
        /// Which tranche failed
        party: String,
        /// Failure reason
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Pending Deposit Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Pending deposit id does not exist
    #[error("Pending deposit not found: {0}")]
    DepositNotFound(u64),

    /// Transition attempted from a status that does not allow it
    #[error("Pending deposit {id} is {status:?}, expected Pending")]
    InvalidState {
        /// Deposit id
        id: u64,
        /// Current status
        status: DepositStatus,
    },

    /// Deposit passed its expiry time
    #[error("Pending deposit {id} expired at {expires_at}")]
    Expired {
        /// Deposit id
        id: u64,
        /// Expiry timestamp
        expires_at: u64,
    },

    /// Deposit cannot be claimed as expired yet
    #[error("Pending deposit {id} does not expire until {expires_at}")]
    DepositNotExpired {
        /// Deposit id
        id: u64,
        /// Expiry timestamp
        expires_at: u64,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Vault Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Deposit would push supply above the reserve-derived cap
    #[error("Deposit cap exceeded: cap {cap}, supply after deposit {requested}")]
    DepositCapExceeded {
        /// Current cap
        cap: u128,
        /// Supply the deposit would produce
        requested: u128,
    },

    /// Account does not hold enough shares
    #[error("Insufficient shares: required {required}, available {available}")]
    InsufficientShares {
        /// Shares required
        required: u128,
        /// Shares held
        available: u128,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Configuration / Authorization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Caller may not perform this action
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Configuration violates a constraint
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ═══════════════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invariant violation detected
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Lock acquisition failed
    #[error("Failed to acquire lock")]
    Lock,
}

impl Error {
    /// Shorthand for an overflow in a named operation
    pub fn overflow(operation: impl Into<String>) -> Self {
        Error::ArithmeticOverflow {
            operation: operation.into(),
        }
    }

    /// Returns true if retrying later (or folding into state) is meaningful
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InsufficientBackstopFunds { .. }
                | Error::RebaseTooSoon { .. }
                | Error::DepositNotExpired { .. }
        )
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::ArithmeticOverflow { .. } | Error::InvariantViolation(_)
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Math errors: 1xxx
            Error::ArithmeticOverflow { .. } => 1001,
            Error::DivisionByZero { .. } => 1002,
            Error::InvalidPercentage(_) => 1003,
            Error::InvalidAmount(_) => 1004,

            // Rebase errors: 2xxx
            Error::RebaseTooSoon { .. } => 2001,
            Error::InsufficientBackstopFunds { .. } => 2002,
            Error::CollaboratorFailed { .. } => 2003,

            // Pending deposit errors: 3xxx
            Error::DepositNotFound(_) => 3001,
            Error::InvalidState { .. } => 3002,
            Error::Expired { .. } => 3003,
            Error::DepositNotExpired { .. } => 3004,

            // Vault errors: 4xxx
            Error::DepositCapExceeded { .. } => 4001,
            Error::InsufficientShares { .. } => 4002,

            // Config / auth errors: 5xxx
            Error::Unauthorized(_) => 5001,
            Error::InvalidConfig(_) => 5002,

            // Internal errors: 9xxx
            Error::InvariantViolation(_) => 9001,
            Error::Serialization(_) => 9002,
            Error::Deserialization(_) => 9003,
            Error::Storage(_) => 9004,
            Error::Lock => 9005,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_unique() {
        let codes = vec![
            Error::overflow("x").code(),
            Error::DivisionByZero { operation: "x".into() }.code(),
            Error::InvalidPercentage(-10001).code(),
            Error::InvalidAmount("".into()).code(),
            Error::RebaseTooSoon { elapsed: 0, required: 1 }.code(),
            Error::InsufficientBackstopFunds { requested: 1, provided: 0 }.code(),
            Error::CollaboratorFailed { party: "".into(), reason: "".into() }.code(),
            Error::DepositNotFound(1).code(),
            Error::InvalidState { id: 1, status: DepositStatus::Approved }.code(),
            Error::Expired { id: 1, expires_at: 0 }.code(),
            Error::DepositNotExpired { id: 1, expires_at: 0 }.code(),
            Error::DepositCapExceeded { cap: 0, requested: 1 }.code(),
            Error::InsufficientShares { required: 1, available: 0 }.code(),
            Error::Unauthorized("".into()).code(),
            Error::InvalidConfig("".into()).code(),
            Error::InvariantViolation("".into()).code(),
            Error::Lock.code(),
        ];

        let mut unique_codes = codes.clone();
        unique_codes.sort();
        unique_codes.dedup();

        assert_eq!(codes.len(), unique_codes.len(), "Error codes must be unique");
    }

    #[test]
    fn test_error_display() {
        let err = Error::RebaseTooSoon {
            elapsed: 100,
            required: 2_592_000,
        };
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("2592000"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::InsufficientBackstopFunds { requested: 10, provided: 5 }.is_recoverable());
        assert!(!Error::DepositNotFound(7).is_recoverable());
    }

    #[test]
    fn test_is_critical() {
        assert!(Error::overflow("mul_div").is_critical());
        assert!(!Error::InvalidPercentage(-20000).is_critical());
    }
}

//! # Error Types
//!
//! Domain-specific error types for rydex-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  rydex-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule rejections                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  rydex-db errors (separate crate)                                      │
//! │  └── DbError          - Infrastructure failures (transient or not)     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → (store outcome | DbError) → caller │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Business rejections never escape the store as `DbError`. The store turns
//! them into outcome enums (`TransitionOutcome`, `DebitOutcome`, ...) so the
//! caller branches on them like any other value.

use thiserror::Error;

use crate::availability::Unavailability;
use crate::money::Money;
use crate::ride::{RideAction, RideStatus};

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The action is not legal from the current status.
    ///
    /// ## When This Occurs
    /// - Completing a ride that was never started
    /// - Starting or cancelling a ride that already reached a terminal state
    #[error("cannot {action} a ride that is {from}")]
    InvalidTransition { from: RideStatus, action: RideAction },

    /// The action was already applied; repeating it has no effect.
    ///
    /// ## When This Occurs
    /// ```text
    /// Driver taps "Complete" twice
    ///      │
    ///      ├── 1st: InProgress → Completed, earnings += fare
    ///      │
    ///      └── 2nd: AlreadyHandled { status: Completed }  (no second credit)
    /// ```
    #[error("ride is already {status}, {action} has no effect")]
    AlreadyHandled { status: RideStatus, action: RideAction },

    /// A driver tried to act on a ride assigned to someone else.
    #[error("ride is assigned to driver {assigned}, not {requested}")]
    DriverMismatch { assigned: String, requested: String },

    /// Wallet balance is below the amount to debit.
    #[error("insufficient wallet balance: available {balance}, required {required}")]
    InsufficientFunds { balance: Money, required: Money },

    /// Route distance is zero, negative, not a number, or too large to price.
    #[error("invalid route distance: {distance_km} km")]
    InvalidDistance { distance_km: f64 },

    /// Driver failed the availability gate.
    #[error("driver is unavailable: {0}")]
    DriverUnavailable(Unavailability),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These are raised before any store access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, non-numeric card number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidTransition {
            from: RideStatus::Pending,
            action: RideAction::Complete,
        };
        assert_eq!(err.to_string(), "cannot complete a ride that is pending");

        let err = CoreError::DriverMismatch {
            assigned: "drv-y".to_string(),
            requested: "drv-x".to_string(),
        };
        assert_eq!(err.to_string(), "ride is assigned to driver drv-y, not drv-x");

        let err = CoreError::InsufficientFunds {
            balance: Money::from_cents(10_000),
            required: Money::from_cents(22_500),
        };
        assert_eq!(
            err.to_string(),
            "insufficient wallet balance: available PKR 100.00, required PKR 225.00"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "ride_id".to_string(),
        };
        assert_eq!(err.to_string(), "ride_id is required");

        let err = ValidationError::MustBePositive {
            field: "amount".to_string(),
        };
        assert_eq!(err.to_string(), "amount must be positive");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "driver_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}

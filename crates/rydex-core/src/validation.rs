//! # Validation Module
//!
//! Input validation for Rydex. Everything here runs before the store is
//! touched, so a rejected request never opens a transaction.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Engine entry points                                          │
//! │  ├── THIS MODULE: ids, amounts, distances, card numbers                │
//! │  └── Fails fast with ValidationError                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: State machine (ride.rs)                                      │
//! │  └── Driver assignment, legal transitions                              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE (payments.ride_id)                                         │
//! │  ├── one in_progress ride per driver (partial index)                   │
//! │  └── CHECK balance_cents >= 0, total_earnings_cents >= 0               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use rydex_core::validation::{validate_amount_cents, validate_entity_id};
//!
//! validate_entity_id("ride_id", "550e8400-e29b-41d4-a716-446655440000").unwrap();
//! assert!(validate_amount_cents("top-up amount", 0).is_err());
//! ```

use chrono::NaiveTime;

use crate::error::ValidationError;
use crate::MAX_ID_LEN;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates an entity id (ride, payment, driver, rider, route).
///
/// ## Rules
/// - Must not be blank
/// - At most [`MAX_ID_LEN`] characters
/// - Letters, digits, hyphens and underscores only
///
/// ## Example
/// ```rust
/// use rydex_core::validation::validate_entity_id;
///
/// assert!(validate_entity_id("ride_id", "a1b2-c3").is_ok());
/// assert!(validate_entity_id("ride_id", "").is_err());
/// assert!(validate_entity_id("ride_id", "1; DROP TABLE rides").is_err());
/// ```
pub fn validate_entity_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if id.len() > MAX_ID_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_ID_LEN,
        });
    }

    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use rydex_core::validation::validate_uuid;
///
/// assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("id", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

/// Validates a required free-text field such as a name or a plate number.
pub fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a money amount in minor units.
///
/// ## Rules
/// - Must be positive (> 0). Top-ups, debits and fares of zero are rejected.
pub fn validate_amount_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a route distance in kilometres.
pub fn validate_distance_km(distance_km: f64) -> ValidationResult<()> {
    if !distance_km.is_finite() || distance_km <= 0.0 {
        return Err(ValidationError::MustBePositive {
            field: "distance_km".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Card Validators
// =============================================================================

/// Validates a card number.
///
/// ## Rules
/// - Must not be blank
/// - Spaces are ignored; everything else must be a digit
/// - 12 to 19 digits
///
/// ## Example
/// ```rust
/// use rydex_core::validation::validate_card_number;
///
/// assert!(validate_card_number("4111 1111 1111 1111").is_ok());
/// assert!(validate_card_number("4111-abcd").is_err());
/// assert!(validate_card_number("").is_err());
/// ```
pub fn validate_card_number(card_number: &str) -> ValidationResult<()> {
    let digits: String = card_number.chars().filter(|c| !c.is_whitespace()).collect();

    if digits.is_empty() {
        return Err(ValidationError::Required {
            field: "card_number".to_string(),
        });
    }

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "card_number".to_string(),
            reason: "must contain only digits".to_string(),
        });
    }

    if !(12..=19).contains(&digits.len()) {
        return Err(ValidationError::OutOfRange {
            field: "card_number length".to_string(),
            min: 12,
            max: 19,
        });
    }

    Ok(())
}

/// Masks a card number down to its last four characters for display and logs.
///
/// ```rust
/// use rydex_core::validation::mask_card_number;
///
/// assert_eq!(mask_card_number("4111111111111234"), "**** **** **** 1234");
/// assert_eq!(mask_card_number("12"), "****");
/// ```
pub fn mask_card_number(card_number: &str) -> String {
    let digits: Vec<char> = card_number.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() < 4 {
        return "****".to_string();
    }

    let last_four: String = digits[digits.len() - 4..].iter().collect();
    format!("**** **** **** {last_four}")
}

// =============================================================================
// Shift Validators
// =============================================================================

/// Validates that a shift window does not end before it starts.
pub fn validate_shift_window(start: NaiveTime, end: NaiveTime) -> ValidationResult<()> {
    if end < start {
        return Err(ValidationError::InvalidFormat {
            field: "shift".to_string(),
            reason: "end time is before start time".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_entity_id() {
        assert!(validate_entity_id("ride_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_entity_id("ride_id", "driver_2").is_ok());

        assert!(validate_entity_id("ride_id", "").is_err());
        assert!(validate_entity_id("ride_id", "   ").is_err());
        assert!(validate_entity_id("ride_id", "has space").is_err());
        assert!(validate_entity_id("ride_id", &"a".repeat(MAX_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("id", "").is_err());
        assert!(validate_uuid("id", "123").is_err());
    }

    #[test]
    fn test_validate_text() {
        assert!(validate_text("name", "Bilal", 100).is_ok());
        assert!(validate_text("name", " ", 100).is_err());
        assert!(validate_text("name", &"x".repeat(101), 100).is_err());
    }

    #[test]
    fn test_validate_amount_cents() {
        assert!(validate_amount_cents("amount", 1).is_ok());
        assert_eq!(
            validate_amount_cents("amount", 0),
            Err(ValidationError::MustBePositive {
                field: "amount".to_string()
            })
        );
        assert!(validate_amount_cents("amount", -500).is_err());
    }

    #[test]
    fn test_validate_distance_km() {
        assert!(validate_distance_km(2.5).is_ok());
        assert!(validate_distance_km(0.0).is_err());
        assert!(validate_distance_km(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_card_number() {
        assert!(validate_card_number("4111111111111111").is_ok());
        assert!(validate_card_number("4111 1111 1111 1111").is_ok());

        assert!(validate_card_number("").is_err());
        assert!(validate_card_number("41111111").is_err());
        assert!(validate_card_number("4111-1111-1111-1111").is_err());
        assert!(validate_card_number(&"4".repeat(20)).is_err());
    }

    #[test]
    fn test_mask_card_number() {
        assert_eq!(mask_card_number("4111 1111 1111 9876"), "**** **** **** 9876");
        assert_eq!(mask_card_number(""), "****");
    }

    #[test]
    fn test_validate_shift_window() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let five = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
        assert!(validate_shift_window(nine, five).is_ok());
        assert!(validate_shift_window(nine, nine).is_ok());
        assert!(validate_shift_window(five, nine).is_err());
    }
}

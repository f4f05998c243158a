//! # Fare Calculator
//!
//! Maps a route distance to a fare: a fixed base amount plus a per-kilometre
//! rate. The policy values come from configuration; the formula does not.
//!
//! ```text
//! fare(d) = base + round(d × per_km)
//!
//! default policy: base = PKR 100.00, per_km = PKR 50.00
//!   fare(2.5) = 100 + 2.5 × 50 = PKR 225.00
//! ```
//!
//! Distance is the only floating point value in Rydex. It is converted to
//! minor units here, once, and the result is frozen on the ride.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

/// Default base fare in minor units (PKR 100.00).
pub const DEFAULT_BASE_CENTS: i64 = 10_000;

/// Default per-kilometre rate in minor units (PKR 50.00).
pub const DEFAULT_PER_KM_CENTS: i64 = 5_000;

// =============================================================================
// Fare Policy
// =============================================================================

/// Base amount plus per-kilometre rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarePolicy {
    pub base: Money,
    pub per_km: Money,
}

impl FarePolicy {
    pub const fn new(base: Money, per_km: Money) -> Self {
        FarePolicy { base, per_km }
    }

    /// Computes the fare for a route distance.
    ///
    /// ## Errors
    /// [`CoreError::InvalidDistance`] when the distance is zero, negative,
    /// NaN or infinite, or so large the fare does not fit in minor units.
    ///
    /// ## Example
    /// ```rust
    /// use rydex_core::fare::FarePolicy;
    /// use rydex_core::money::Money;
    ///
    /// let fare = FarePolicy::default().fare(2.5).unwrap();
    /// assert_eq!(fare, Money::from_cents(22_500));
    /// ```
    pub fn fare(&self, distance_km: f64) -> CoreResult<Money> {
        if !distance_km.is_finite() || distance_km <= 0.0 {
            return Err(CoreError::InvalidDistance { distance_km });
        }

        let distance_cents = (distance_km * self.per_km.cents() as f64).round();
        // `as i64` saturates; anything at or past 2^63 is out of range.
        if !distance_cents.is_finite() || distance_cents >= i64::MAX as f64 {
            return Err(CoreError::InvalidDistance { distance_km });
        }

        self.base
            .checked_add(Money::from_cents(distance_cents as i64))
            .ok_or(CoreError::InvalidDistance { distance_km })
    }
}

impl Default for FarePolicy {
    fn default() -> Self {
        FarePolicy::new(
            Money::from_cents(DEFAULT_BASE_CENTS),
            Money::from_cents(DEFAULT_PER_KM_CENTS),
        )
    }
}

/// Fare under the default policy.
pub fn calculate_fare(distance_km: f64) -> CoreResult<Money> {
    FarePolicy::default().fare(distance_km)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        assert_eq!(calculate_fare(2.5).unwrap(), Money::from_cents(22_500));
        assert_eq!(calculate_fare(1.0).unwrap(), Money::from_cents(15_000));
    }

    #[test]
    fn test_fare_is_deterministic() {
        let policy = FarePolicy::default();
        let first = policy.fare(7.3).unwrap();
        for _ in 0..100 {
            assert_eq!(policy.fare(7.3).unwrap(), first);
        }
    }

    #[test]
    fn test_fractional_distance_rounds_to_minor_unit() {
        // 0.333 km × 5000 = 1665 paisa
        assert_eq!(calculate_fare(0.333).unwrap(), Money::from_cents(11_665));
    }

    #[test]
    fn test_custom_policy() {
        let policy = FarePolicy::new(Money::from_cents(5_000), Money::from_cents(2_000));
        assert_eq!(policy.fare(10.0).unwrap(), Money::from_cents(25_000));
    }

    #[test]
    fn test_rejects_non_positive_distance() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                calculate_fare(bad),
                Err(CoreError::InvalidDistance { .. })
            ));
        }
    }

    #[test]
    fn test_huge_distance_is_rejected_not_overflowed() {
        for huge in [1.0e18, f64::MAX] {
            assert!(matches!(
                calculate_fare(huge),
                Err(CoreError::InvalidDistance { .. })
            ));
        }

        // Product fits, base pushes it over.
        let policy = FarePolicy::new(Money::from_cents(i64::MAX / 2 + 10), Money::from_cents(1));
        let km = (i64::MAX / 2) as f64;
        assert!(policy.fare(km).is_err());
    }
}

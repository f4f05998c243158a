//! # Money Module
//!
//! Provides the `Money` type for fares, earnings and wallet balances.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Driver earnings accumulate over thousands of rides:                    │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ drifts on every credit           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units (paisa)                              │
//! │    22500 + 22500 = 45000  ✅ exact, forever                             │
//! │                                                                         │
//! │  The only float in the system is the route distance in km, which the   │
//! │  fare policy converts to Money exactly once.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use rydex_core::money::Money;
//!
//! let fare = Money::from_major_minor(225, 0); // PKR 225.00
//! let balance = Money::from_cents(10_000);    // PKR 100.00
//!
//! assert!(balance < fare);
//! assert_eq!(balance.checked_sub(fare), None);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Currency code used when displaying amounts.
pub const CURRENCY: &str = "PKR";

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (paisa for PKR).
///
/// ## Where Money is Used
/// ```text
/// Route.distance_km ──► FarePolicy::fare ──► Ride.fare_cents (frozen)
///                                                │
///                     ┌──────────────────────────┼───────────────────────┐
///                     ▼                          ▼                       ▼
///            Payment.amount_cents     Driver.total_earnings   Rider.balance_cents
///                                      (credited on complete)  (debited on wallet pay)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use rydex_core::money::Money;
    ///
    /// let fare = Money::from_cents(22_500);
    /// assert_eq!(fare.cents(), 22_500);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts only the major unit should be negative:
    /// `from_major_minor(-5, 50)` is -5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Adds `other`, returning `None` on overflow.
    #[inline]
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Subtracts `other`, returning `None` if the result would go below zero.
    ///
    /// ## Wallet Debit
    /// ```text
    /// balance 100.00 - fare 225.00  →  None        (insufficient funds)
    /// balance 300.00 - fare 225.00  →  Some(75.00)
    /// ```
    ///
    /// ## Example
    /// ```rust
    /// use rydex_core::money::Money;
    ///
    /// let balance = Money::from_cents(30_000);
    /// let fare = Money::from_cents(22_500);
    /// assert_eq!(balance.checked_sub(fare), Some(Money::from_cents(7_500)));
    /// assert_eq!(fare.checked_sub(balance), None);
    /// ```
    #[inline]
    pub fn checked_sub(&self, other: Money) -> Option<Money> {
        let rest = self.0.checked_sub(other.0)?;
        if rest < 0 {
            None
        } else {
            Some(Money(rest))
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Renders as `PKR 225.00`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}{} {}.{:02}",
            sign,
            CURRENCY,
            self.major().abs(),
            self.minor_part()
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

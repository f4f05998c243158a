//! # Domain Types
//!
//! Directory data the engine reads: users, their role profiles, vehicles
//! and routes.
//!
//! ## Identity and Roles
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Account                                         │
//! │                                                                         │
//! │   ┌─────────────────┐                                                   │
//! │   │      User       │   one identity, any combination of roles          │
//! │   │  ─────────────  │                                                   │
//! │   │  user_id (UUID) │                                                   │
//! │   │  name, email    │                                                   │
//! │   └────────┬────────┘                                                   │
//! │            ├──────────────────────────┐                                 │
//! │            ▼ Option                   ▼ Option                          │
//! │   ┌─────────────────────┐    ┌─────────────────────┐                   │
//! │   │   DriverProfile     │    │    RiderProfile     │                   │
//! │   │  license_number     │    │  balance_cents      │                   │
//! │   │  total_earnings     │    │  (wallet, ≥ 0)      │                   │
//! │   └──────────┬──────────┘    └─────────────────────┘                   │
//! │              │ 0..1                                                     │
//! │              ▼                                                          │
//! │        ┌───────────┐                                                    │
//! │        │  Vehicle  │                                                    │
//! │        └───────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `total_earnings_cents` and `balance_cents` are shown here for display
//! only. The ride store and the wallet are the only writers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// User
// =============================================================================

/// A registered person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Driver Profile
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DriverProfile {
    /// Same value as the owning `User::user_id`.
    pub driver_id: String,
    pub license_number: String,
    /// Sum of fares of every completed ride. Never decreases.
    pub total_earnings_cents: i64,
}

impl DriverProfile {
    #[inline]
    pub fn total_earnings(&self) -> Money {
        Money::from_cents(self.total_earnings_cents)
    }
}

// =============================================================================
// Rider Profile
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RiderProfile {
    /// Same value as the owning `User::user_id`.
    pub rider_id: String,
    /// Wallet balance. Never negative.
    pub balance_cents: i64,
}

impl RiderProfile {
    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_cents(self.balance_cents)
    }

    pub fn can_afford(&self, amount: Money) -> bool {
        self.balance() >= amount
    }
}

// =============================================================================
// Account
// =============================================================================

/// A user together with whichever role profiles they hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user: User,
    pub driver: Option<DriverProfile>,
    pub rider: Option<RiderProfile>,
}

impl Account {
    pub fn is_driver(&self) -> bool {
        self.driver.is_some()
    }

    pub fn is_rider(&self) -> bool {
        self.rider.is_some()
    }
}

// =============================================================================
// Vehicle
// =============================================================================

/// A vehicle assigned to a driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Vehicle {
    pub vehicle_id: String,
    pub driver_id: String,
    pub model: String,
    pub plate_number: String,
    pub capacity: i64,
    pub color: Option<String>,
}

// =============================================================================
// Route
// =============================================================================

/// An origin/destination pair from the route catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Route {
    pub route_id: String,
    pub origin: String,
    pub destination: String,
    /// Road distance in kilometres, always > 0.
    pub distance_km: f64,
}

// =============================================================================
// Unit Tests
// =============================================================================

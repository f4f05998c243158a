//! # rydex-core: Pure Business Logic for Rydex
//!
//! This crate holds the rules of the ride lifecycle as pure functions with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Rydex Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Presentation (CLI menus, desktop wizard)           │   │
//! │  │    Book ride ──► Start ride ──► Complete ride ──► Top up       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                rydex-db (RideEngine + stores)                   │   │
//! │  │    transactions, row locks, wallet debits, availability        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ calls                                  │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ rydex-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌────────┐ │   │
//! │  │   │  fare   │ │  ride   │ │ payment │ │ availa-  │ │ valid- │ │   │
//! │  │   │ Policy  │ │ Status  │ │ Request │ │ bility   │ │ ation  │ │   │
//! │  │   │         │ │ Action  │ │ Plan    │ │ Shift    │ │        │ │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └──────────┘ └────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type with integer arithmetic (paisa)
//! - [`fare`] - Fare policy: base + per-km rate
//! - [`ride`] - Ride statuses, actions, and the transition table
//! - [`payment`] - Payment methods and settlement plans
//! - [`availability`] - Shift windows and the availability verdict
//! - [`types`] - Users, role profiles, vehicles, routes
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use rydex_core::fare::calculate_fare;
//! use rydex_core::money::Money;
//! use rydex_core::ride::{RideAction, RideStatus};
//!
//! let fare = calculate_fare(2.5).unwrap();
//! assert_eq!(fare, Money::from_cents(22_500));
//!
//! let next = RideStatus::Pending.apply(RideAction::Start).unwrap();
//! assert_eq!(next, RideStatus::InProgress);
//! assert!(RideStatus::Completed.apply(RideAction::Cancel).is_err());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod availability;
pub mod error;
pub mod fare;
pub mod money;
pub mod payment;
pub mod ride;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use availability::{AvailabilitySignals, DriverShift, Unavailability};
pub use error::{CoreError, CoreResult, ValidationError};
pub use fare::FarePolicy;
pub use money::Money;
pub use payment::{Payment, PaymentMethod, PaymentRequest, PaymentStatus, SettlementPlan};
pub use ride::{Ride, RideAction, RideStatus, TransitionOutcome};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Longest accepted entity id. UUIDs are 36 characters.
pub const MAX_ID_LEN: usize = 64;

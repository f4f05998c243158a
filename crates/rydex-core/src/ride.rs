//! # Ride State Machine
//!
//! Ride status, the legal transitions between statuses, and the in-memory
//! ride snapshot.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Ride Lifecycle                                  │
//! │                                                                         │
//! │   book_ride()                                                           │
//! │       │                                                                 │
//! │       ▼           confirm (payment ledger)                              │
//! │   ┌─────────┐ ─────────────────────────► ┌───────────┐                 │
//! │   │ Pending │                            │ Confirmed │                 │
//! │   └────┬────┘                            └─────┬─────┘                 │
//! │        │ start (assigned driver)               │ start                 │
//! │        └──────────────────┬────────────────────┘                       │
//! │                           ▼                                             │
//! │                    ┌────────────┐  complete (assigned driver)          │
//! │                    │ InProgress │ ─────────────────► ┌───────────┐     │
//! │                    └────────────┘                    │ Completed │ ■   │
//! │                                                      └───────────┘     │
//! │   cancel: Pending | Confirmed | InProgress ──► ┌───────────┐           │
//! │                                                │ Cancelled │ ■         │
//! │                                                └───────────┘           │
//! │   ■ = terminal, nothing leaves it                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Enforcement Points
//! The same [`authorize_transition`] rule runs twice:
//! 1. On the caller's in-memory [`Ride`] for fast local rejection.
//! 2. Inside the store's transaction, on the row read under the write lock.
//!    Only this second check is authoritative: the snapshot may be stale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::availability::Unavailability;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Ride Status
// =============================================================================

/// The status of a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    /// Booked, waiting for the driver.
    Pending,
    /// Booking confirmed by a settled payment.
    Confirmed,
    /// Driver has picked the rider up.
    InProgress,
    /// Trip finished and driver credited.
    Completed,
    /// Cancelled by rider or system.
    Cancelled,
}

impl RideStatus {
    /// Storage representation (matches the `rides.status` column).
    pub const fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Pending => "pending",
            RideStatus::Confirmed => "confirmed",
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        }
    }

    /// Completed and Cancelled rides never change again.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    /// Applies an action to this status and returns the next status.
    ///
    /// ## Transition Table
    /// ```text
    ///              │ Start        Complete     Cancel       Confirm
    /// ─────────────┼──────────────────────────────────────────────────
    /// Pending      │ InProgress   invalid      Cancelled    Confirmed
    /// Confirmed    │ InProgress   invalid      Cancelled    handled
    /// InProgress   │ handled      Completed    Cancelled    invalid
    /// Completed    │ handled      handled      invalid      invalid
    /// Cancelled    │ invalid      invalid      handled      invalid
    /// ```
    /// "handled" is [`CoreError::AlreadyHandled`]: a benign repeat, not a bug.
    pub fn apply(self, action: RideAction) -> CoreResult<RideStatus> {
        use RideAction::*;
        use RideStatus::*;

        match (self, action) {
            (Pending | Confirmed, Start) => Ok(InProgress),
            (InProgress | Completed, Start) => Err(CoreError::AlreadyHandled { status: self, action }),

            (InProgress, Complete) => Ok(Completed),
            (Completed, Complete) => Err(CoreError::AlreadyHandled { status: self, action }),

            (Pending | Confirmed | InProgress, Cancel) => Ok(Cancelled),
            (Cancelled, Cancel) => Err(CoreError::AlreadyHandled { status: self, action }),

            (Pending, Confirm) => Ok(Confirmed),
            (Confirmed, Confirm) => Err(CoreError::AlreadyHandled { status: self, action }),

            (from, action) => Err(CoreError::InvalidTransition { from, action }),
        }
    }
}

impl Default for RideStatus {
    fn default() -> Self {
        RideStatus::Pending
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RideStatus::Pending => "pending",
            RideStatus::Confirmed => "confirmed",
            RideStatus::InProgress => "in progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

// =============================================================================
// Ride Action
// =============================================================================

/// Something that moves a ride between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideAction {
    /// Driver picks the rider up.
    Start,
    /// Driver drops the rider off.
    Complete,
    /// Rider or system cancels.
    Cancel,
    /// Payment ledger confirms the booking.
    Confirm,
}

impl RideAction {
    /// Whether only the assigned driver may perform this action.
    pub const fn requires_assigned_driver(&self) -> bool {
        matches!(self, RideAction::Start | RideAction::Complete)
    }

    /// The ride status a payment outcome may move a ride to.
    ///
    /// A payment can confirm or cancel a booking. It can never start or
    /// complete one: fare settlement and the physical trip are independent.
    pub const fn from_payment_target(status: RideStatus) -> Option<RideAction> {
        match status {
            RideStatus::Confirmed => Some(RideAction::Confirm),
            RideStatus::Cancelled => Some(RideAction::Cancel),
            RideStatus::Pending | RideStatus::InProgress | RideStatus::Completed => None,
        }
    }
}

impl fmt::Display for RideAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RideAction::Start => "start",
            RideAction::Complete => "complete",
            RideAction::Cancel => "cancel",
            RideAction::Confirm => "confirm",
        };
        f.write_str(label)
    }
}

/// Checks driver assignment, then the transition table.
///
/// `requesting_driver` is `None` for rider/system actions (cancel, confirm).
pub fn authorize_transition(
    current: RideStatus,
    assigned_driver: &str,
    requesting_driver: Option<&str>,
    action: RideAction,
) -> CoreResult<RideStatus> {
    if action.requires_assigned_driver() {
        let requested = requesting_driver.unwrap_or_default();
        if requested != assigned_driver {
            return Err(CoreError::DriverMismatch {
                assigned: assigned_driver.to_string(),
                requested: requested.to_string(),
            });
        }
    }

    current.apply(action)
}

// =============================================================================
// Ride
// =============================================================================

/// An advisory snapshot of a persisted ride.
///
/// `fare_cents`, `driver_id` and `created_at` are fixed when the store creates
/// the ride, so they are only readable here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Ride {
    ride_id: String,
    rider_id: String,
    driver_id: String,
    route_id: String,
    fare_cents: i64,
    status: RideStatus,
    created_at: DateTime<Utc>,
}

impl Ride {
    /// Builds a freshly booked ride in status Pending.
    pub fn new(
        ride_id: impl Into<String>,
        rider_id: impl Into<String>,
        driver_id: impl Into<String>,
        route_id: impl Into<String>,
        fare: Money,
        created_at: DateTime<Utc>,
    ) -> Self {
        Ride {
            ride_id: ride_id.into(),
            rider_id: rider_id.into(),
            driver_id: driver_id.into(),
            route_id: route_id.into(),
            fare_cents: fare.cents(),
            status: RideStatus::Pending,
            created_at,
        }
    }

    pub fn ride_id(&self) -> &str {
        &self.ride_id
    }

    pub fn rider_id(&self) -> &str {
        &self.rider_id
    }

    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    /// The fare frozen at booking time.
    #[inline]
    pub fn fare(&self) -> Money {
        Money::from_cents(self.fare_cents)
    }

    #[inline]
    pub fn status(&self) -> RideStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Marks the ride InProgress if `driver_id` is the assigned driver.
    pub fn start(&mut self, driver_id: &str) -> CoreResult<()> {
        self.transition(RideAction::Start, Some(driver_id))
    }

    /// Marks the ride Completed and returns the fare owed to the driver.
    pub fn complete(&mut self, driver_id: &str) -> CoreResult<Money> {
        self.transition(RideAction::Complete, Some(driver_id))?;
        Ok(self.fare())
    }

    /// Cancels the ride unless it is already Completed.
    pub fn cancel(&mut self) -> CoreResult<()> {
        self.transition(RideAction::Cancel, None)
    }

    fn transition(&mut self, action: RideAction, driver_id: Option<&str>) -> CoreResult<()> {
        self.status = authorize_transition(self.status, &self.driver_id, driver_id, action)?;
        Ok(())
    }
}

// =============================================================================
// Transition Outcome
// =============================================================================

/// What a store transition did.
///
/// Every variant except `Applied` left the ride, the driver's earnings and
/// any payment exactly as they were.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// The transition committed.
    Applied { from: RideStatus, to: RideStatus },
    /// No ride with that id.
    NotFound,
    /// The ride belongs to another driver.
    DriverMismatch { assigned_driver_id: String },
    /// The action was already applied (e.g. a duplicate "complete").
    AlreadyHandled { status: RideStatus },
    /// The action is not legal from the persisted status.
    InvalidTransition { from: RideStatus },
    /// The driver already has another ride in progress.
    DriverBusy { active_ride_id: String },
    /// The driver failed the start-ride admission check.
    DriverUnavailable { reason: Unavailability },
    /// The fare offered for crediting differs from the fare on the ride.
    FareMismatch { recorded: Money },
}

impl TransitionOutcome {
    /// True only when the transition committed.
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }

    /// Maps a state-machine rejection to its outcome.
    ///
    /// Errors that are not transition rejections are handed back unchanged.
    pub fn from_rejection(err: CoreError) -> Result<Self, CoreError> {
        match err {
            CoreError::DriverMismatch { assigned, .. } => Ok(TransitionOutcome::DriverMismatch {
                assigned_driver_id: assigned,
            }),
            CoreError::AlreadyHandled { status, .. } => {
                Ok(TransitionOutcome::AlreadyHandled { status })
            }
            CoreError::InvalidTransition { from, .. } => {
                Ok(TransitionOutcome::InvalidTransition { from })
            }
            other => Err(other),
        }
    }
}

impl fmt::Display for TransitionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionOutcome::Applied { from, to } => write!(f, "ride moved from {from} to {to}"),
            TransitionOutcome::NotFound => f.write_str("ride not found"),
            TransitionOutcome::DriverMismatch { assigned_driver_id } => {
                write!(f, "ride is assigned to driver {assigned_driver_id}")
            }
            TransitionOutcome::AlreadyHandled { status } => write!(f, "ride is already {status}"),
            TransitionOutcome::InvalidTransition { from } => {
                write!(f, "not allowed while ride is {from}")
            }
            TransitionOutcome::DriverBusy { active_ride_id } => {
                write!(f, "driver already has ride {active_ride_id} in progress")
            }
            TransitionOutcome::DriverUnavailable { reason } => {
                write!(f, "driver is unavailable: {reason}")
            }
            TransitionOutcome::FareMismatch { recorded } => {
                write!(f, "fare does not match the booked fare of {recorded}")
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn booked_ride() -> Ride {
        Ride::new(
            "ride-1",
            "rider-1",
            "driver-2",
            "route-1",
            Money::from_cents(22_500),
            Utc::now(),
        )
    }

    #[test]
    fn test_new_ride_is_pending() {
        let ride = booked_ride();
        assert_eq!(ride.status(), RideStatus::Pending);
        assert_eq!(ride.fare(), Money::from_cents(22_500));
    }

    #[test]
    fn test_happy_path() {
        let mut ride = booked_ride();
        ride.start("driver-2").unwrap();
        assert_eq!(ride.status(), RideStatus::InProgress);

        let owed = ride.complete("driver-2").unwrap();
        assert_eq!(owed, Money::from_cents(22_500));
        assert_eq!(ride.status(), RideStatus::Completed);
    }

    #[test]
    fn test_start_from_confirmed() {
        assert_eq!(
            RideStatus::Confirmed.apply(RideAction::Start).unwrap(),
            RideStatus::InProgress
        );
    }

    #[test]
    fn test_wrong_driver_rejected_and_status_unchanged() {
        let mut ride = booked_ride();
        let err = ride.start("driver-9").unwrap_err();
        assert!(matches!(err, CoreError::DriverMismatch { .. }));
        assert_eq!(ride.status(), RideStatus::Pending);
    }

    #[test]
    fn test_second_complete_is_already_handled() {
        let mut ride = booked_ride();
        ride.start("driver-2").unwrap();
        ride.complete("driver-2").unwrap();

        let err = ride.complete("driver-2").unwrap_err();
        assert!(matches!(
            err,
            CoreError::AlreadyHandled {
                status: RideStatus::Completed,
                action: RideAction::Complete
            }
        ));
    }

    #[test]
    fn test_complete_requires_in_progress() {
        let mut ride = booked_ride();
        let err = ride.complete("driver-2").unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(ride.status(), RideStatus::Pending);
    }

    #[test]
    fn test_completed_ride_cannot_be_cancelled() {
        let mut ride = booked_ride();
        ride.start("driver-2").unwrap();
        ride.complete("driver-2").unwrap();

        assert!(ride.cancel().is_err());
        assert_eq!(ride.status(), RideStatus::Completed);
    }

    #[test]
    fn test_cancel_from_every_open_status() {
        for status in [RideStatus::Pending, RideStatus::Confirmed, RideStatus::InProgress] {
            assert_eq!(status.apply(RideAction::Cancel).unwrap(), RideStatus::Cancelled);
        }
    }

    #[test]
    fn test_nothing_leaves_a_terminal_status() {
        for status in [RideStatus::Completed, RideStatus::Cancelled] {
            for action in [
                RideAction::Start,
                RideAction::Complete,
                RideAction::Cancel,
                RideAction::Confirm,
            ] {
                assert!(status.apply(action).is_err(), "{status} allowed {action}");
            }
        }
    }

    #[test]
    fn test_cancel_does_not_check_driver() {
        assert_eq!(
            authorize_transition(RideStatus::Pending, "driver-2", None, RideAction::Cancel).unwrap(),
            RideStatus::Cancelled
        );
    }

    #[test]
    fn test_payment_targets() {
        assert_eq!(
            RideAction::from_payment_target(RideStatus::Confirmed),
            Some(RideAction::Confirm)
        );
        assert_eq!(
            RideAction::from_payment_target(RideStatus::Cancelled),
            Some(RideAction::Cancel)
        );
        assert_eq!(RideAction::from_payment_target(RideStatus::Completed), None);
        assert_eq!(RideAction::from_payment_target(RideStatus::InProgress), None);
    }

    #[test]
    fn test_outcome_from_rejection() {
        let err = RideStatus::Completed.apply(RideAction::Complete).unwrap_err();
        assert_eq!(
            TransitionOutcome::from_rejection(err).unwrap(),
            TransitionOutcome::AlreadyHandled {
                status: RideStatus::Completed
            }
        );

        let other = CoreError::InvalidDistance { distance_km: -1.0 };
        assert!(TransitionOutcome::from_rejection(other).is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&RideStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!(RideStatus::InProgress.as_str(), "in_progress");
    }
}

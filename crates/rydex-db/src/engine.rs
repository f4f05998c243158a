//! # Ride Engine
//!
//! The booking flow and the driver actions, composed from the repositories.
//!
//! ## Booking Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  book_ride(rider, driver, route, payment)                               │
//! │                                                                         │
//! │  FarePolicy::fare(route.distance_km)       quote, frozen on the ride   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PaymentRequest::validate()                card number checked here    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  availability().check(driver, now)  ──unavailable──► DriverUnavailable │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  rides().create(...)                       status Pending              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  payments().settle(...)                    Completed | Failed          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Booked(BookingReceipt)                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed wallet payment does not undo the booking. The ride stays Pending
//! with a Failed payment, and [`RideEngine::pay_for_ride`] can settle it
//! later with another method. Once a payment has settled it is final:
//! paying again reports `AlreadySettled` and charges nothing.
//!
//! ## Driver Actions
//! ```text
//! start_ride(ride, driver)
//!   vehicle? on shift? ──no──► DriverUnavailable
//!       │
//!       ▼
//!   rides().start(ride, driver)      locked; DriverBusy if another ride runs
//!
//! complete_ride(ride, driver)
//!   rides().get_fare(ride) ──► rides().complete(ride, driver, fare)
//! ```

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::payment::SettlementOutcome;
use rydex_core::validation::{validate_amount_cents, validate_entity_id};
use rydex_core::{
    DriverProfile, FarePolicy, Money, PaymentRequest, PaymentStatus, TransitionOutcome,
    Unavailability,
};

// =============================================================================
// Clock
// =============================================================================

/// Source of the local wall-clock time used for shift checks.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> NaiveDateTime;
}

/// The machine's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Always the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

// =============================================================================
// Booking Outcome
// =============================================================================

/// What the rider gets back from a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingReceipt {
    pub ride_id: String,
    pub fare: Money,
    pub payment_id: String,
    pub payment_status: PaymentStatus,
    /// Wallet balance after the payment, for wallet payments.
    pub remaining_balance: Option<Money>,
}

impl BookingReceipt {
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Completed
    }
}

#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BookingOutcome {
    Booked(BookingReceipt),
    DriverUnavailable { reason: Unavailability },
    /// The ride was created but cancelled before its fare could be settled.
    CancelledBeforePayment { ride_id: String },
}

impl BookingOutcome {
    pub fn receipt(&self) -> Option<&BookingReceipt> {
        match self {
            BookingOutcome::Booked(receipt) => Some(receipt),
            BookingOutcome::DriverUnavailable { .. }
            | BookingOutcome::CancelledBeforePayment { .. } => None,
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Ride lifecycle operations over one database.
///
/// ## Usage
/// ```rust,ignore
/// let engine = RideEngine::from_config(&EngineConfig::load(None)?).await?;
/// let outcome = engine.book_ride(&rider_id, &driver_id, &route_id, &PaymentRequest::Cash).await?;
/// ```
#[derive(Debug, Clone)]
pub struct RideEngine {
    db: Database,
    fare: FarePolicy,
    clock: Arc<dyn Clock>,
}

impl RideEngine {
    pub fn new(db: Database, fare: FarePolicy) -> Self {
        RideEngine {
            db,
            fare,
            clock: Arc::new(SystemClock),
        }
    }

    /// Opens the configured database and applies the configured fare policy.
    pub async fn from_config(config: &EngineConfig) -> DbResult<Self> {
        let db = Database::new(config.db_config()).await?;
        Ok(RideEngine::new(db, config.fare_policy()))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn fare_policy(&self) -> FarePolicy {
        self.fare
    }

    // =========================================================================
    // Booking
    // =========================================================================

    /// Fare for a route under this engine's policy.
    pub async fn quote_fare(&self, route_id: &str) -> DbResult<Money> {
        validate_entity_id("route_id", route_id)?;

        let route = self
            .db
            .directory()
            .get_route(route_id)
            .await?
            .ok_or_else(|| DbError::not_found("Route", route_id))?;

        Ok(self.fare.fare(route.distance_km)?)
    }

    /// Drivers that pass the availability gate right now.
    pub async fn bookable_drivers(&self) -> DbResult<Vec<DriverProfile>> {
        let now = self.clock.now();
        let gate = self.db.availability();

        let mut bookable = Vec::new();
        for driver in self.db.directory().list_drivers().await? {
            if gate.is_available_now(&driver.driver_id, now).await? {
                bookable.push(driver);
            }
        }
        Ok(bookable)
    }

    /// Books a ride and settles its fare.
    ///
    /// The driver is re-checked immediately before the ride is created, so a
    /// driver who went off shift or started another ride since being offered
    /// is refused with the reason.
    pub async fn book_ride(
        &self,
        rider_id: &str,
        driver_id: &str,
        route_id: &str,
        payment: &PaymentRequest,
    ) -> DbResult<BookingOutcome> {
        validate_entity_id("rider_id", rider_id)?;
        validate_entity_id("driver_id", driver_id)?;

        let fare = self.quote_fare(route_id).await?;
        payment.validate()?;

        if let Err(reason) = self.db.availability().check(driver_id, self.clock.now()).await? {
            warn!(driver_id = %driver_id, %reason, "Booking refused, driver unavailable");
            return Ok(BookingOutcome::DriverUnavailable { reason });
        }

        let ride = self.db.rides().create(rider_id, driver_id, route_id, fare).await?;
        let settlement = self.db.payments().settle(ride.ride_id(), payment).await?;

        let Some(receipt) = receipt_for(ride.ride_id(), fare, &settlement) else {
            warn!(ride_id = %ride.ride_id(), "Ride cancelled before its fare was settled");
            return Ok(BookingOutcome::CancelledBeforePayment {
                ride_id: ride.ride_id().to_string(),
            });
        };
        info!(
            ride_id = %receipt.ride_id,
            fare = %fare,
            method = %payment.method(),
            payment_status = %receipt.payment_status,
            "Ride booked"
        );
        Ok(BookingOutcome::Booked(receipt))
    }

    /// Settles the fare of an existing ride, charging the ride's own rider.
    ///
    /// A Failed or Pending payment is retried in place and keeps its id. A
    /// settled payment is left alone, and a cancelled ride is not charged.
    pub async fn pay_for_ride(
        &self,
        ride_id: &str,
        payment: &PaymentRequest,
    ) -> DbResult<SettlementOutcome> {
        self.db.payments().settle(ride_id, payment).await
    }

    // =========================================================================
    // Driver and Rider Actions
    // =========================================================================

    /// Starts a ride after checking the driver has a vehicle and is on shift.
    pub async fn start_ride(&self, ride_id: &str, driver_id: &str) -> DbResult<TransitionOutcome> {
        validate_entity_id("ride_id", ride_id)?;
        validate_entity_id("driver_id", driver_id)?;

        let gate = self.db.availability();
        if !gate.has_vehicle(driver_id).await? {
            return Ok(TransitionOutcome::DriverUnavailable {
                reason: Unavailability::NoVehicle,
            });
        }
        if !gate.has_active_shift(driver_id, self.clock.now()).await? {
            return Ok(TransitionOutcome::DriverUnavailable {
                reason: Unavailability::OffShift,
            });
        }

        self.db.rides().start(ride_id, driver_id).await
    }

    /// Completes a ride at its booked fare and credits the driver once.
    pub async fn complete_ride(
        &self,
        ride_id: &str,
        driver_id: &str,
    ) -> DbResult<TransitionOutcome> {
        let Some(fare) = self.db.rides().get_fare(ride_id).await? else {
            return Ok(TransitionOutcome::NotFound);
        };
        self.db.rides().complete(ride_id, driver_id, fare).await
    }

    pub async fn cancel_ride(&self, ride_id: &str) -> DbResult<TransitionOutcome> {
        self.db.rides().cancel(ride_id).await
    }

    /// Adds funds to a rider's wallet. Returns the new balance.
    pub async fn top_up(&self, rider_id: &str, amount: Money) -> DbResult<Money> {
        validate_amount_cents("amount", amount.cents())?;
        self.db.wallets().credit(rider_id, amount).await
    }
}

fn receipt_for(
    ride_id: &str,
    fare: Money,
    settlement: &SettlementOutcome,
) -> Option<BookingReceipt> {
    let payment = settlement.payment()?;
    let remaining_balance = match settlement {
        SettlementOutcome::Settled {
            remaining_balance, ..
        } => *remaining_balance,
        SettlementOutcome::InsufficientFunds { balance, .. } => Some(*balance),
        SettlementOutcome::AlreadySettled { .. } | SettlementOutcome::RideNotPayable { .. } => None,
    };

    Some(BookingReceipt {
        ride_id: ride_id.to_string(),
        fare,
        payment_id: payment.payment_id.clone(),
        payment_status: payment.status,
        remaining_balance,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use crate::repository::test_support::{cast, noon, Cast, FARE};
    use chrono::Duration;
    use rydex_core::{PaymentMethod, RideStatus};

    async fn engine_at(now: NaiveDateTime) -> (RideEngine, Cast) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let c = cast(&db, noon()).await;
        let engine = RideEngine::new(db, FarePolicy::default()).with_clock(Arc::new(FixedClock(now)));
        (engine, c)
    }

    fn booked(outcome: BookingOutcome) -> BookingReceipt {
        match outcome {
            BookingOutcome::Booked(receipt) => receipt,
            other => panic!("expected a booking, got {other:?}"),
        }
    }

    async fn earnings(engine: &RideEngine, driver_id: &str) -> Money {
        engine
            .db()
            .directory()
            .get_driver(driver_id)
            .await
            .unwrap()
            .unwrap()
            .total_earnings()
    }

    #[tokio::test]
    async fn test_quote_for_two_and_a_half_km() {
        let (engine, c) = engine_at(noon()).await;
        assert_eq!(engine.quote_fare(&c.route_id).await.unwrap(), FARE);
        assert!(matches!(
            engine.quote_fare("no-route").await.unwrap_err(),
            DbError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_book_start_complete_scenario() {
        let (engine, c) = engine_at(noon()).await;

        let receipt = booked(
            engine
                .book_ride(&c.rider_id, &c.driver_id, &c.route_id, &PaymentRequest::Cash)
                .await
                .unwrap(),
        );
        assert_eq!(receipt.fare, FARE);
        assert!(receipt.is_paid());

        let ride = engine.db().rides().get_by_id(&receipt.ride_id).await.unwrap().unwrap();
        assert_eq!(ride.status(), RideStatus::Pending);

        assert!(engine.start_ride(&receipt.ride_id, &c.driver_id).await.unwrap().is_applied());
        assert!(engine
            .complete_ride(&receipt.ride_id, &c.driver_id)
            .await
            .unwrap()
            .is_applied());
        assert_eq!(earnings(&engine, &c.driver_id).await, FARE);

        let again = engine.complete_ride(&receipt.ride_id, &c.driver_id).await.unwrap();
        assert_eq!(
            again,
            TransitionOutcome::AlreadyHandled {
                status: RideStatus::Completed
            }
        );
        assert_eq!(earnings(&engine, &c.driver_id).await, FARE);
    }

    #[tokio::test]
    async fn test_wallet_short_of_fare_then_cash_retry() {
        let (engine, c) = engine_at(noon()).await;
        engine.top_up(&c.rider_id, Money::from_cents(10_000)).await.unwrap();

        let receipt = booked(
            engine
                .book_ride(&c.rider_id, &c.driver_id, &c.route_id, &PaymentRequest::Wallet)
                .await
                .unwrap(),
        );
        assert_eq!(receipt.payment_status, PaymentStatus::Failed);
        assert_eq!(receipt.remaining_balance, Some(Money::from_cents(10_000)));
        assert_eq!(
            engine.db().wallets().balance(&c.rider_id).await.unwrap(),
            Some(Money::from_cents(10_000))
        );

        let retry = engine
            .pay_for_ride(&receipt.ride_id, &PaymentRequest::Cash)
            .await
            .unwrap();
        assert!(retry.is_settled());
        let payment = retry.payment().unwrap();
        assert_eq!(payment.payment_id, receipt.payment_id);
        assert_eq!(payment.method, PaymentMethod::Cash);
    }

    #[tokio::test]
    async fn test_paying_a_paid_ride_charges_nothing() {
        let (engine, c) = engine_at(noon()).await;
        engine.top_up(&c.rider_id, Money::from_cents(50_000)).await.unwrap();

        let receipt = booked(
            engine
                .book_ride(&c.rider_id, &c.driver_id, &c.route_id, &PaymentRequest::Wallet)
                .await
                .unwrap(),
        );
        assert!(receipt.is_paid());

        for request in [PaymentRequest::Wallet, PaymentRequest::Cash] {
            let again = engine.pay_for_ride(&receipt.ride_id, &request).await.unwrap();
            assert!(matches!(again, SettlementOutcome::AlreadySettled { .. }));
        }
        assert_eq!(
            engine.db().wallets().balance(&c.rider_id).await.unwrap(),
            Some(Money::from_cents(27_500))
        );
    }

    #[tokio::test]
    async fn test_cancelled_ride_cannot_be_paid() {
        let (engine, c) = engine_at(noon()).await;
        engine.top_up(&c.rider_id, Money::from_cents(10_000)).await.unwrap();

        let receipt = booked(
            engine
                .book_ride(&c.rider_id, &c.driver_id, &c.route_id, &PaymentRequest::Wallet)
                .await
                .unwrap(),
        );
        assert!(!receipt.is_paid());
        assert!(engine.cancel_ride(&receipt.ride_id).await.unwrap().is_applied());

        let outcome = engine
            .pay_for_ride(&receipt.ride_id, &PaymentRequest::Cash)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SettlementOutcome::RideNotPayable {
                status: RideStatus::Cancelled
            }
        );
        let stored = engine.db().payments().get_by_ride(&receipt.ride_id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_wallet_payment_uses_the_booking_riders_wallet() {
        let (engine, c) = engine_at(noon()).await;
        let other = engine
            .db()
            .directory()
            .register_rider("Ali", "ali@example.com")
            .await
            .unwrap();
        engine.top_up(&other.rider_id, Money::from_cents(50_000)).await.unwrap();

        let receipt = booked(
            engine
                .book_ride(&c.rider_id, &c.driver_id, &c.route_id, &PaymentRequest::Wallet)
                .await
                .unwrap(),
        );
        assert_eq!(receipt.payment_status, PaymentStatus::Failed);

        let retry = engine
            .pay_for_ride(&receipt.ride_id, &PaymentRequest::Wallet)
            .await
            .unwrap();
        assert!(!retry.is_settled());
        assert_eq!(
            engine.db().wallets().balance(&other.rider_id).await.unwrap(),
            Some(Money::from_cents(50_000))
        );
    }

    #[tokio::test]
    async fn test_wallet_booking_debits_fare() {
        let (engine, c) = engine_at(noon()).await;
        engine.top_up(&c.rider_id, Money::from_cents(50_000)).await.unwrap();

        let receipt = booked(
            engine
                .book_ride(&c.rider_id, &c.driver_id, &c.route_id, &PaymentRequest::Wallet)
                .await
                .unwrap(),
        );
        assert!(receipt.is_paid());
        assert_eq!(receipt.remaining_balance, Some(Money::from_cents(27_500)));
    }

    #[tokio::test]
    async fn test_off_shift_driver_cannot_be_booked() {
        let (engine, c) = engine_at(noon() + Duration::hours(4)).await;

        let outcome = engine
            .book_ride(&c.rider_id, &c.driver_id, &c.route_id, &PaymentRequest::Cash)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            BookingOutcome::DriverUnavailable {
                reason: Unavailability::OffShift
            }
        );
        assert!(engine.db().rides().rides_for_rider(&c.rider_id).await.unwrap().is_empty());
        assert!(engine.bookable_drivers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_busy_driver_is_not_offered() {
        let (engine, c) = engine_at(noon()).await;
        assert_eq!(engine.bookable_drivers().await.unwrap().len(), 2);

        let receipt = booked(
            engine
                .book_ride(&c.rider_id, &c.driver_id, &c.route_id, &PaymentRequest::Cash)
                .await
                .unwrap(),
        );
        let _ = engine.start_ride(&receipt.ride_id, &c.driver_id).await.unwrap();

        let bookable = engine.bookable_drivers().await.unwrap();
        assert_eq!(bookable.len(), 1);
        assert_eq!(bookable[0].driver_id, c.other_driver_id);

        let outcome = engine
            .book_ride(&c.rider_id, &c.driver_id, &c.route_id, &PaymentRequest::Cash)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            BookingOutcome::DriverUnavailable {
                reason: Unavailability::DriverBusy { .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_invalid_card_rejected_before_booking() {
        let (engine, c) = engine_at(noon()).await;
        let card = PaymentRequest::Card {
            card_number: "12ab".to_string(),
        };

        let err = engine
            .book_ride(&c.rider_id, &c.driver_id, &c.route_id, &card)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
        assert!(engine.db().rides().rides_for_rider(&c.rider_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_requires_vehicle_and_shift() {
        let (engine, c) = engine_at(noon()).await;
        let newcomer = engine
            .db()
            .directory()
            .register_driver("Zain", "zain@example.com", "LHR-777")
            .await
            .unwrap();
        let ride = engine
            .db()
            .rides()
            .create(&c.rider_id, &newcomer.driver_id, &c.route_id, FARE)
            .await
            .unwrap();

        let outcome = engine.start_ride(ride.ride_id(), &newcomer.driver_id).await.unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::DriverUnavailable {
                reason: Unavailability::NoVehicle
            }
        );

        let late = engine.clone().with_clock(Arc::new(FixedClock(noon() + Duration::hours(2))));
        let booked_ride = engine
            .db()
            .rides()
            .create(&c.rider_id, &c.driver_id, &c.route_id, FARE)
            .await
            .unwrap();
        assert_eq!(
            late.start_ride(booked_ride.ride_id(), &c.driver_id).await.unwrap(),
            TransitionOutcome::DriverUnavailable {
                reason: Unavailability::OffShift
            }
        );
    }

    #[tokio::test]
    async fn test_outcomes_serialize_with_tag() {
        let (engine, c) = engine_at(noon()).await;
        let outcome = engine
            .book_ride(&c.rider_id, &c.driver_id, &c.route_id, &PaymentRequest::Cash)
            .await
            .unwrap();

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "booked");
        assert_eq!(json["fare"], 22_500);
        assert_eq!(json["payment_status"], "completed");

        let refused = BookingOutcome::DriverUnavailable {
            reason: Unavailability::OffShift,
        };
        let json = serde_json::to_value(&refused).unwrap();
        assert_eq!(json["outcome"], "driver_unavailable");
        assert_eq!(json["reason"]["reason"], "off_shift");
    }

    #[tokio::test]
    async fn test_cancel_and_missing_rides() {
        let (engine, c) = engine_at(noon()).await;
        let receipt = booked(
            engine
                .book_ride(&c.rider_id, &c.driver_id, &c.route_id, &PaymentRequest::Cash)
                .await
                .unwrap(),
        );

        assert!(engine.cancel_ride(&receipt.ride_id).await.unwrap().is_applied());
        assert_eq!(
            engine.complete_ride("missing", &c.driver_id).await.unwrap(),
            TransitionOutcome::NotFound
        );
        assert!(matches!(
            engine.pay_for_ride("missing", &PaymentRequest::Cash).await.unwrap_err(),
            DbError::NotFound { .. }
        ));
    }
}

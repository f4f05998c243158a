//! # Ride Repository
//!
//! The ride transaction store: durable rides with concurrency-safe,
//! all-or-nothing status transitions.
//!
//! ## Locked Transition
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  start / complete / cancel                                              │
//! │                                                                         │
//! │  BEGIN                                                                 │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  UPDATE rides SET status = status WHERE ride_id = ?   ◄── takes the    │
//! │    │  0 rows → ROLLBACK, NotFound                         write lock;  │
//! │    ▼                                                      concurrent   │
//! │  SELECT driver_id, status, fare_cents                     writers wait │
//! │    │                                                      (busy_timeout)│
//! │    ▼                                                                    │
//! │  authorize_transition(status, driver, requester, action)               │
//! │    │  rejected → ROLLBACK, DriverMismatch | AlreadyHandled | Invalid   │
//! │    ▼                                                                    │
//! │  UPDATE rides SET status = next                                        │
//! │  UPDATE drivers SET total_earnings_cents += fare   (complete only)     │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  COMMIT ──► Applied { from, to }                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! SQLite has no `SELECT ... FOR UPDATE`. Making the first statement of the
//! transaction a write on the ride row gives the same guarantee: the lock is
//! held before the status is read, so two concurrent starts (or completes)
//! serialize and the second one sees the first one's committed status.
//!
//! Any error between BEGIN and COMMIT drops the transaction, which rolls it
//! back. A ride's status and its driver's earnings therefore always agree.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::deadline::Deadline;
use crate::error::{DbError, DbResult};
use rydex_core::ride::authorize_transition;
use rydex_core::validation::{validate_amount_cents, validate_entity_id};
use rydex_core::{Money, Ride, RideAction, RideStatus, TransitionOutcome};

const RIDE_COLUMNS: &str = "ride_id, rider_id, driver_id, route_id, fare_cents, status, created_at";

/// Repository for ride database operations.
#[derive(Debug, Clone)]
pub struct RideRepository {
    pool: SqlitePool,
    deadline: Deadline,
}

impl RideRepository {
    /// Creates a new RideRepository.
    pub fn new(pool: SqlitePool, deadline: Deadline) -> Self {
        RideRepository { pool, deadline }
    }

    /// Overrides the deadline for operations on this handle.
    pub fn with_deadline(mut self, limit: Duration) -> Self {
        self.deadline = Deadline::new(limit);
        self
    }

    // =========================================================================
    // Creation and Lookup
    // =========================================================================

    /// Books a new ride in status Pending.
    ///
    /// The fare is frozen here and never recomputed.
    ///
    /// ## Errors
    /// - `DbError::Validation` for malformed ids or a non-positive fare
    /// - `DbError::NotFound` if the rider, driver or route does not exist
    pub async fn create(
        &self,
        rider_id: &str,
        driver_id: &str,
        route_id: &str,
        fare: Money,
    ) -> DbResult<Ride> {
        validate_entity_id("rider_id", rider_id)?;
        validate_entity_id("driver_id", driver_id)?;
        validate_entity_id("route_id", route_id)?;
        validate_amount_cents("fare", fare.cents())?;

        let ride = Ride::new(
            Uuid::new_v4().to_string(),
            rider_id,
            driver_id,
            route_id,
            fare,
            Utc::now(),
        );

        self.deadline.run("create_ride", self.insert(&ride)).await?;

        info!(
            ride_id = %ride.ride_id(),
            rider_id = %rider_id,
            driver_id = %driver_id,
            fare = %fare,
            "Ride created"
        );
        Ok(ride)
    }

    async fn insert(&self, ride: &Ride) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO rides (
                ride_id, rider_id, driver_id, route_id,
                fare_cents, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            "#,
        )
        .bind(ride.ride_id())
        .bind(ride.rider_id())
        .bind(ride.driver_id())
        .bind(ride.route_id())
        .bind(ride.fare().cents())
        .bind(ride.status())
        .bind(ride.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::ForeignKeyViolation { .. } => DbError::not_found(
                "Rider, driver or route",
                format!("{} / {} / {}", ride.rider_id(), ride.driver_id(), ride.route_id()),
            ),
            other => other,
        })?;

        Ok(())
    }

    /// Gets a ride by ID.
    pub async fn get_by_id(&self, ride_id: &str) -> DbResult<Option<Ride>> {
        self.deadline
            .run("get_ride", async {
                let ride = sqlx::query_as::<_, Ride>(&format!(
                    "SELECT {RIDE_COLUMNS} FROM rides WHERE ride_id = ?1"
                ))
                .bind(ride_id)
                .fetch_optional(&self.pool)
                .await?;
                Ok::<_, DbError>(ride)
            })
            .await
    }

    /// Returns the booked fare of a ride. Read-only, takes no lock.
    pub async fn get_fare(&self, ride_id: &str) -> DbResult<Option<Money>> {
        self.deadline
            .run("get_fare", async {
                let fare: Option<i64> =
                    sqlx::query_scalar("SELECT fare_cents FROM rides WHERE ride_id = ?1")
                        .bind(ride_id)
                        .fetch_optional(&self.pool)
                        .await?;
                Ok::<_, DbError>(fare.map(Money::from_cents))
            })
            .await
    }

    /// All rides booked by a rider, newest first.
    pub async fn rides_for_rider(&self, rider_id: &str) -> DbResult<Vec<Ride>> {
        self.list(
            "rides_for_rider",
            "WHERE rider_id = ?1 ORDER BY created_at DESC",
            rider_id,
        )
        .await
    }

    /// All rides assigned to a driver, newest first.
    pub async fn rides_for_driver(&self, driver_id: &str) -> DbResult<Vec<Ride>> {
        self.list(
            "rides_for_driver",
            "WHERE driver_id = ?1 ORDER BY created_at DESC",
            driver_id,
        )
        .await
    }

    /// Rides the driver could start now (Pending or Confirmed), oldest first.
    pub async fn startable_rides_for_driver(&self, driver_id: &str) -> DbResult<Vec<Ride>> {
        self.list(
            "startable_rides_for_driver",
            "WHERE driver_id = ?1 AND status IN ('pending', 'confirmed') ORDER BY created_at",
            driver_id,
        )
        .await
    }

    /// Rides the driver could complete now. At most one by construction.
    pub async fn in_progress_rides_for_driver(&self, driver_id: &str) -> DbResult<Vec<Ride>> {
        self.list(
            "in_progress_rides_for_driver",
            "WHERE driver_id = ?1 AND status = 'in_progress'",
            driver_id,
        )
        .await
    }

    async fn list(&self, operation: &'static str, filter: &str, key: &str) -> DbResult<Vec<Ride>> {
        self.deadline
            .run(operation, async {
                let rides = sqlx::query_as::<_, Ride>(&format!(
                    "SELECT {RIDE_COLUMNS} FROM rides {filter}"
                ))
                .bind(key)
                .fetch_all(&self.pool)
                .await?;
                Ok::<_, DbError>(rides)
            })
            .await
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Moves a Pending or Confirmed ride to InProgress.
    ///
    /// Only the assigned driver may start a ride, and only while that driver
    /// has no other ride in progress.
    pub async fn start(&self, ride_id: &str, driver_id: &str) -> DbResult<TransitionOutcome> {
        validate_entity_id("ride_id", ride_id)?;
        validate_entity_id("driver_id", driver_id)?;

        let outcome = self
            .deadline
            .run("start_ride", self.start_locked(ride_id, driver_id))
            .await?;
        log_outcome(ride_id, RideAction::Start, &outcome);
        Ok(outcome)
    }

    async fn start_locked(&self, ride_id: &str, driver_id: &str) -> DbResult<TransitionOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some(ride) = lock_ride(&mut *tx, ride_id).await? else {
            tx.rollback().await?;
            return Ok(TransitionOutcome::NotFound);
        };

        let next = match authorize_transition(
            ride.status,
            &ride.driver_id,
            Some(driver_id),
            RideAction::Start,
        ) {
            Ok(next) => next,
            Err(rejection) => {
                tx.rollback().await?;
                return Ok(TransitionOutcome::from_rejection(rejection)?);
            }
        };

        let active: Option<String> = sqlx::query_scalar(
            r#"
            SELECT ride_id FROM rides
            WHERE driver_id = ?1 AND status = 'in_progress' AND ride_id <> ?2
            LIMIT 1
            "#,
        )
        .bind(&ride.driver_id)
        .bind(ride_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(active_ride_id) = active {
            tx.rollback().await?;
            return Ok(TransitionOutcome::DriverBusy { active_ride_id });
        }

        write_status(&mut *tx, ride_id, next).await?;
        tx.commit().await?;

        Ok(TransitionOutcome::Applied {
            from: ride.status,
            to: next,
        })
    }

    /// Moves an InProgress ride to Completed and credits the driver.
    ///
    /// ## Idempotence
    /// A ride is credited at most once. A repeated call finds the ride
    /// Completed under the lock and returns `AlreadyHandled` without touching
    /// earnings.
    ///
    /// `fare` must equal the fare booked on the ride; otherwise nothing
    /// changes and `FareMismatch` reports the booked fare.
    pub async fn complete(
        &self,
        ride_id: &str,
        driver_id: &str,
        fare: Money,
    ) -> DbResult<TransitionOutcome> {
        validate_entity_id("ride_id", ride_id)?;
        validate_entity_id("driver_id", driver_id)?;
        validate_amount_cents("fare", fare.cents())?;

        let outcome = self
            .deadline
            .run("complete_ride", self.complete_locked(ride_id, driver_id, fare))
            .await?;
        log_outcome(ride_id, RideAction::Complete, &outcome);
        Ok(outcome)
    }

    async fn complete_locked(
        &self,
        ride_id: &str,
        driver_id: &str,
        fare: Money,
    ) -> DbResult<TransitionOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some(ride) = lock_ride(&mut *tx, ride_id).await? else {
            tx.rollback().await?;
            return Ok(TransitionOutcome::NotFound);
        };

        let next = match authorize_transition(
            ride.status,
            &ride.driver_id,
            Some(driver_id),
            RideAction::Complete,
        ) {
            Ok(next) => next,
            Err(rejection) => {
                tx.rollback().await?;
                return Ok(TransitionOutcome::from_rejection(rejection)?);
            }
        };

        if fare.cents() != ride.fare_cents {
            tx.rollback().await?;
            return Ok(TransitionOutcome::FareMismatch {
                recorded: Money::from_cents(ride.fare_cents),
            });
        }

        write_status(&mut *tx, ride_id, next).await?;

        let credited = sqlx::query(
            "UPDATE drivers SET total_earnings_cents = total_earnings_cents + ?1 WHERE driver_id = ?2",
        )
        .bind(ride.fare_cents)
        .bind(&ride.driver_id)
        .execute(&mut *tx)
        .await?;

        if credited.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(DbError::not_found("Driver", ride.driver_id));
        }

        tx.commit().await?;

        debug!(
            ride_id = %ride_id,
            driver_id = %ride.driver_id,
            credited_cents = ride.fare_cents,
            "Driver earnings credited"
        );

        Ok(TransitionOutcome::Applied {
            from: ride.status,
            to: next,
        })
    }

    /// Cancels a ride unless it is Completed. No earnings side effect.
    pub async fn cancel(&self, ride_id: &str) -> DbResult<TransitionOutcome> {
        validate_entity_id("ride_id", ride_id)?;

        let outcome = self
            .deadline
            .run("cancel_ride", self.cancel_locked(ride_id))
            .await?;
        log_outcome(ride_id, RideAction::Cancel, &outcome);
        Ok(outcome)
    }

    async fn cancel_locked(&self, ride_id: &str) -> DbResult<TransitionOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some(ride) = lock_ride(&mut *tx, ride_id).await? else {
            tx.rollback().await?;
            return Ok(TransitionOutcome::NotFound);
        };

        let next = match authorize_transition(ride.status, &ride.driver_id, None, RideAction::Cancel)
        {
            Ok(next) => next,
            Err(rejection) => {
                tx.rollback().await?;
                return Ok(TransitionOutcome::from_rejection(rejection)?);
            }
        };

        write_status(&mut *tx, ride_id, next).await?;
        tx.commit().await?;

        Ok(TransitionOutcome::Applied {
            from: ride.status,
            to: next,
        })
    }
}

// =============================================================================
// Lock Helpers (shared with the payment ledger)
// =============================================================================

/// A ride row read while holding the write lock.
#[derive(Debug)]
pub(crate) struct LockedRide {
    pub rider_id: String,
    pub driver_id: String,
    pub status: RideStatus,
    pub fare_cents: i64,
}

/// Takes the write lock on a ride row, then reads it.
///
/// Must be the first statement of the transaction.
pub(crate) async fn lock_ride(
    conn: &mut SqliteConnection,
    ride_id: &str,
) -> DbResult<Option<LockedRide>> {
    let touched = sqlx::query("UPDATE rides SET status = status WHERE ride_id = ?1")
        .bind(ride_id)
        .execute(&mut *conn)
        .await?;

    if touched.rows_affected() == 0 {
        return Ok(None);
    }

    let (rider_id, driver_id, status, fare_cents): (String, String, RideStatus, i64) =
        sqlx::query_as(
            "SELECT rider_id, driver_id, status, fare_cents FROM rides WHERE ride_id = ?1",
        )
        .bind(ride_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(Some(LockedRide {
        rider_id,
        driver_id,
        status,
        fare_cents,
    }))
}

/// Writes a new status onto a ride locked by [`lock_ride`].
pub(crate) async fn write_status(
    conn: &mut SqliteConnection,
    ride_id: &str,
    status: RideStatus,
) -> DbResult<()> {
    sqlx::query("UPDATE rides SET status = ?2, updated_at = ?3 WHERE ride_id = ?1")
        .bind(ride_id)
        .bind(status)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn log_outcome(ride_id: &str, action: RideAction, outcome: &TransitionOutcome) {
    if outcome.is_applied() {
        info!(ride_id = %ride_id, %action, %outcome, "Ride transition applied");
    } else {
        warn!(ride_id = %ride_id, %action, %outcome, "Ride transition rejected");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig, TempDatabase};
    use crate::repository::test_support::{cast, noon, Cast, FARE};

    async fn setup() -> (Database, Cast) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cast = cast(&db, noon()).await;
        (db, cast)
    }

    async fn earnings(db: &Database, driver_id: &str) -> Money {
        db.directory()
            .get_driver(driver_id)
            .await
            .unwrap()
            .unwrap()
            .total_earnings()
    }

    async fn status(db: &Database, ride_id: &str) -> RideStatus {
        db.rides().get_by_id(ride_id).await.unwrap().unwrap().status()
    }

    #[tokio::test]
    async fn test_create_ride_is_pending_with_frozen_fare() {
        let (db, c) = setup().await;
        let ride = db
            .rides()
            .create(&c.rider_id, &c.driver_id, &c.route_id, FARE)
            .await
            .unwrap();

        let stored = db.rides().get_by_id(ride.ride_id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), RideStatus::Pending);
        assert_eq!(stored.fare(), FARE);
        assert_eq!(db.rides().get_fare(ride.ride_id()).await.unwrap(), Some(FARE));
    }

    #[tokio::test]
    async fn test_create_with_unknown_rider_is_not_found() {
        let (db, c) = setup().await;
        let err = db
            .rides()
            .create("no-such-rider", &c.driver_id, &c.route_id, FARE)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input_before_store() {
        let (db, c) = setup().await;
        let err = db
            .rides()
            .create(&c.rider_id, &c.driver_id, &c.route_id, Money::zero())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));

        let err = db.rides().start("", &c.driver_id).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn test_full_lifecycle_credits_once() {
        let (db, c) = setup().await;
        let rides = db.rides();
        let ride = rides.create(&c.rider_id, &c.driver_id, &c.route_id, FARE).await.unwrap();

        let started = rides.start(ride.ride_id(), &c.driver_id).await.unwrap();
        assert_eq!(
            started,
            TransitionOutcome::Applied {
                from: RideStatus::Pending,
                to: RideStatus::InProgress
            }
        );

        let completed = rides.complete(ride.ride_id(), &c.driver_id, FARE).await.unwrap();
        assert!(completed.is_applied());
        assert_eq!(status(&db, ride.ride_id()).await, RideStatus::Completed);
        assert_eq!(earnings(&db, &c.driver_id).await, FARE);

        let again = rides.complete(ride.ride_id(), &c.driver_id, FARE).await.unwrap();
        assert_eq!(
            again,
            TransitionOutcome::AlreadyHandled {
                status: RideStatus::Completed
            }
        );
        assert_eq!(earnings(&db, &c.driver_id).await, FARE);
    }

    #[tokio::test]
    async fn test_wrong_driver_cannot_start() {
        let (db, c) = setup().await;
        let ride = db
            .rides()
            .create(&c.rider_id, &c.driver_id, &c.route_id, FARE)
            .await
            .unwrap();

        let outcome = db.rides().start(ride.ride_id(), &c.other_driver_id).await.unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::DriverMismatch {
                assigned_driver_id: c.driver_id.clone()
            }
        );
        assert_eq!(status(&db, ride.ride_id()).await, RideStatus::Pending);
    }

    #[tokio::test]
    async fn test_wrong_driver_cannot_complete() {
        let (db, c) = setup().await;
        let rides = db.rides();
        let ride = rides.create(&c.rider_id, &c.driver_id, &c.route_id, FARE).await.unwrap();
        let _ = rides.start(ride.ride_id(), &c.driver_id).await.unwrap();

        let outcome = rides
            .complete(ride.ride_id(), &c.other_driver_id, FARE)
            .await
            .unwrap();
        assert!(matches!(outcome, TransitionOutcome::DriverMismatch { .. }));
        assert_eq!(status(&db, ride.ride_id()).await, RideStatus::InProgress);
        assert_eq!(earnings(&db, &c.other_driver_id).await, Money::zero());
    }

    #[tokio::test]
    async fn test_second_start_is_already_handled() {
        let (db, c) = setup().await;
        let rides = db.rides();
        let ride = rides.create(&c.rider_id, &c.driver_id, &c.route_id, FARE).await.unwrap();

        assert!(rides.start(ride.ride_id(), &c.driver_id).await.unwrap().is_applied());
        assert_eq!(
            rides.start(ride.ride_id(), &c.driver_id).await.unwrap(),
            TransitionOutcome::AlreadyHandled {
                status: RideStatus::InProgress
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_ride_is_not_found() {
        let (db, c) = setup().await;
        let rides = db.rides();
        assert_eq!(
            rides.start("missing", &c.driver_id).await.unwrap(),
            TransitionOutcome::NotFound
        );
        assert_eq!(
            rides.complete("missing", &c.driver_id, FARE).await.unwrap(),
            TransitionOutcome::NotFound
        );
        assert_eq!(rides.cancel("missing").await.unwrap(), TransitionOutcome::NotFound);
        assert_eq!(rides.get_fare("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_complete_requires_in_progress() {
        let (db, c) = setup().await;
        let rides = db.rides();
        let ride = rides.create(&c.rider_id, &c.driver_id, &c.route_id, FARE).await.unwrap();

        let outcome = rides.complete(ride.ride_id(), &c.driver_id, FARE).await.unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::InvalidTransition {
                from: RideStatus::Pending
            }
        );
        assert_eq!(earnings(&db, &c.driver_id).await, Money::zero());
    }

    #[tokio::test]
    async fn test_fare_mismatch_changes_nothing() {
        let (db, c) = setup().await;
        let rides = db.rides();
        let ride = rides.create(&c.rider_id, &c.driver_id, &c.route_id, FARE).await.unwrap();
        let _ = rides.start(ride.ride_id(), &c.driver_id).await.unwrap();

        let outcome = rides
            .complete(ride.ride_id(), &c.driver_id, Money::from_cents(99_900))
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::FareMismatch { recorded: FARE });
        assert_eq!(status(&db, ride.ride_id()).await, RideStatus::InProgress);
        assert_eq!(earnings(&db, &c.driver_id).await, Money::zero());
    }

    #[tokio::test]
    async fn test_completed_ride_cannot_be_cancelled() {
        let (db, c) = setup().await;
        let rides = db.rides();
        let ride = rides.create(&c.rider_id, &c.driver_id, &c.route_id, FARE).await.unwrap();
        let _ = rides.start(ride.ride_id(), &c.driver_id).await.unwrap();
        let _ = rides.complete(ride.ride_id(), &c.driver_id, FARE).await.unwrap();

        let outcome = rides.cancel(ride.ride_id()).await.unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::InvalidTransition {
                from: RideStatus::Completed
            }
        );
        assert_eq!(status(&db, ride.ride_id()).await, RideStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_then_nothing_moves() {
        let (db, c) = setup().await;
        let rides = db.rides();
        let ride = rides.create(&c.rider_id, &c.driver_id, &c.route_id, FARE).await.unwrap();

        assert!(rides.cancel(ride.ride_id()).await.unwrap().is_applied());
        assert_eq!(
            rides.cancel(ride.ride_id()).await.unwrap(),
            TransitionOutcome::AlreadyHandled {
                status: RideStatus::Cancelled
            }
        );
        assert!(matches!(
            rides.start(ride.ride_id(), &c.driver_id).await.unwrap(),
            TransitionOutcome::InvalidTransition { .. }
        ));
    }

    #[tokio::test]
    async fn test_cancel_in_progress_pays_nothing() {
        let (db, c) = setup().await;
        let rides = db.rides();
        let ride = rides.create(&c.rider_id, &c.driver_id, &c.route_id, FARE).await.unwrap();
        let _ = rides.start(ride.ride_id(), &c.driver_id).await.unwrap();

        assert!(rides.cancel(ride.ride_id()).await.unwrap().is_applied());
        assert_eq!(earnings(&db, &c.driver_id).await, Money::zero());
    }

    #[tokio::test]
    async fn test_one_ride_in_progress_per_driver() {
        let (db, c) = setup().await;
        let rides = db.rides();
        let first = rides.create(&c.rider_id, &c.driver_id, &c.route_id, FARE).await.unwrap();
        let second = rides.create(&c.rider_id, &c.driver_id, &c.route_id, FARE).await.unwrap();

        let _ = rides.start(first.ride_id(), &c.driver_id).await.unwrap();
        let outcome = rides.start(second.ride_id(), &c.driver_id).await.unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::DriverBusy {
                active_ride_id: first.ride_id().to_string()
            }
        );
        assert_eq!(status(&db, second.ride_id()).await, RideStatus::Pending);
    }

    #[tokio::test]
    async fn test_partial_index_backs_the_busy_check() {
        let (db, c) = setup().await;
        let rides = db.rides();
        let first = rides.create(&c.rider_id, &c.driver_id, &c.route_id, FARE).await.unwrap();
        let second = rides.create(&c.rider_id, &c.driver_id, &c.route_id, FARE).await.unwrap();
        let _ = rides.start(first.ride_id(), &c.driver_id).await.unwrap();

        let err = sqlx::query("UPDATE rides SET status = 'in_progress' WHERE ride_id = ?1")
            .bind(second.ride_id())
            .execute(db.pool())
            .await
            .map_err(DbError::from)
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_fare_is_immutable_in_storage() {
        let (db, c) = setup().await;
        let ride = db
            .rides()
            .create(&c.rider_id, &c.driver_id, &c.route_id, FARE)
            .await
            .unwrap();

        let result = sqlx::query("UPDATE rides SET fare_cents = 1 WHERE ride_id = ?1")
            .bind(ride.ride_id())
            .execute(db.pool())
            .await;
        assert!(result.is_err());
        assert_eq!(db.rides().get_fare(ride.ride_id()).await.unwrap(), Some(FARE));
    }

    #[tokio::test]
    async fn test_listings() {
        let (db, c) = setup().await;
        let rides = db.rides();
        let a = rides.create(&c.rider_id, &c.driver_id, &c.route_id, FARE).await.unwrap();
        let b = rides.create(&c.rider_id, &c.driver_id, &c.route_id, FARE).await.unwrap();
        let _ = rides.create(&c.rider_id, &c.other_driver_id, &c.route_id, FARE).await.unwrap();
        let _ = rides.start(a.ride_id(), &c.driver_id).await.unwrap();

        assert_eq!(rides.rides_for_rider(&c.rider_id).await.unwrap().len(), 3);
        assert_eq!(rides.rides_for_driver(&c.driver_id).await.unwrap().len(), 2);

        let startable = rides.startable_rides_for_driver(&c.driver_id).await.unwrap();
        assert_eq!(startable.len(), 1);
        assert_eq!(startable[0].ride_id(), b.ride_id());

        let in_progress = rides.in_progress_rides_for_driver(&c.driver_id).await.unwrap();
        assert_eq!(in_progress.len(), 1);
        assert_eq!(in_progress[0].ride_id(), a.ride_id());
    }

    // =========================================================================
    // Concurrency (file-backed database, several connections)
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_exactly_one_wins() {
        let temp = TempDatabase::new(4).await;
        let c = cast(&temp.db, noon()).await;
        let ride = temp
            .db
            .rides()
            .create(&c.rider_id, &c.driver_id, &c.route_id, FARE)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let rides = temp.db.rides();
            let ride_id = ride.ride_id().to_string();
            let driver_id = c.driver_id.clone();
            handles.push(tokio::spawn(async move { rides.start(&ride_id, &driver_id).await }));
        }

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap().unwrap());
        }

        let applied = outcomes.iter().filter(|o| o.is_applied()).count();
        assert_eq!(applied, 1, "outcomes: {outcomes:?}");
        assert!(outcomes.contains(&TransitionOutcome::AlreadyHandled {
            status: RideStatus::InProgress
        }));
        assert_eq!(status(&temp.db, ride.ride_id()).await, RideStatus::InProgress);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_completes_credit_once() {
        let temp = TempDatabase::new(4).await;
        let c = cast(&temp.db, noon()).await;
        let rides = temp.db.rides();
        let ride = rides.create(&c.rider_id, &c.driver_id, &c.route_id, FARE).await.unwrap();
        let _ = rides.start(ride.ride_id(), &c.driver_id).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let rides = temp.db.rides();
            let ride_id = ride.ride_id().to_string();
            let driver_id = c.driver_id.clone();
            handles.push(tokio::spawn(async move {
                rides.complete(&ride_id, &driver_id, FARE).await
            }));
        }

        let mut applied = 0;
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            if outcome.is_applied() {
                applied += 1;
            } else {
                assert_eq!(
                    outcome,
                    TransitionOutcome::AlreadyHandled {
                        status: RideStatus::Completed
                    }
                );
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(earnings(&temp.db, &c.driver_id).await, FARE);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deadline_elapses_while_lock_is_held() {
        let temp = TempDatabase::new(4).await;
        let c = cast(&temp.db, noon()).await;
        let ride = temp
            .db
            .rides()
            .create(&c.rider_id, &c.driver_id, &c.route_id, FARE)
            .await
            .unwrap();

        // Another session holds the write lock.
        let mut blocker = temp.db.pool().begin().await.unwrap();
        sqlx::query("UPDATE rides SET status = status WHERE ride_id = ?1")
            .bind(ride.ride_id())
            .execute(&mut *blocker)
            .await
            .unwrap();

        let err = temp
            .db
            .rides()
            .with_deadline(Duration::from_millis(200))
            .start(ride.ride_id(), &c.driver_id)
            .await
            .unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");

        blocker.rollback().await.unwrap();

        // Nothing from the timed-out attempt survived; a retry succeeds.
        let retry = temp.db.rides().start(ride.ride_id(), &c.driver_id).await.unwrap();
        assert!(retry.is_applied());
    }
}

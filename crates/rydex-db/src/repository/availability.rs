//! # Availability Repository
//!
//! The driver availability gate. Read-only: it gathers the three signals
//! from storage and lets [`AvailabilitySignals::verdict`] decide.
//!
//! ```text
//!  vehicles ───────── has_vehicle ─────────┐
//!  driver_shifts ──── has_active_shift ────┼──► AvailabilitySignals ──► verdict()
//!  rides ──────────── in_progress_ride ────┘
//! ```
//!
//! The answer is advisory. Two bookings can both pass the gate for the same
//! driver; what actually prevents double work is the exclusive start in the
//! ride store.

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::SqlitePool;
use tracing::debug;

use crate::deadline::Deadline;
use crate::error::{DbError, DbResult};
use rydex_core::availability::has_active_shift;
use rydex_core::{AvailabilitySignals, DriverShift, Unavailability};

/// Repository for driver availability checks.
#[derive(Debug, Clone)]
pub struct AvailabilityRepository {
    pool: SqlitePool,
    deadline: Deadline,
}

impl AvailabilityRepository {
    /// Creates a new AvailabilityRepository.
    pub fn new(pool: SqlitePool, deadline: Deadline) -> Self {
        AvailabilityRepository { pool, deadline }
    }

    /// True when the driver has a vehicle assigned.
    pub async fn has_vehicle(&self, driver_id: &str) -> DbResult<bool> {
        self.deadline
            .run("has_vehicle", async {
                let found: Option<i64> =
                    sqlx::query_scalar("SELECT 1 FROM vehicles WHERE driver_id = ?1 LIMIT 1")
                        .bind(driver_id)
                        .fetch_optional(&self.pool)
                        .await?;
                Ok::<_, DbError>(found.is_some())
            })
            .await
    }

    /// The driver's shifts on one date, earliest first.
    pub async fn shifts_on(&self, driver_id: &str, date: NaiveDate) -> DbResult<Vec<DriverShift>> {
        self.deadline
            .run("shifts_on", async {
                let shifts = sqlx::query_as::<_, DriverShift>(
                    r#"
                    SELECT shift_id, driver_id, shift_date, start_time, end_time
                    FROM driver_shifts
                    WHERE driver_id = ?1 AND shift_date = ?2
                    ORDER BY start_time
                    "#,
                )
                .bind(driver_id)
                .bind(date)
                .fetch_all(&self.pool)
                .await?;
                Ok::<_, DbError>(shifts)
            })
            .await
    }

    /// True when a shift covers `now`, both ends inclusive.
    pub async fn has_active_shift(&self, driver_id: &str, now: NaiveDateTime) -> DbResult<bool> {
        let shifts = self.shifts_on(driver_id, now.date()).await?;
        Ok(has_active_shift(&shifts, now))
    }

    /// The driver's ride currently in progress, if any.
    pub async fn in_progress_ride(&self, driver_id: &str) -> DbResult<Option<String>> {
        self.deadline
            .run("in_progress_ride", async {
                let ride_id: Option<String> = sqlx::query_scalar(
                    "SELECT ride_id FROM rides WHERE driver_id = ?1 AND status = 'in_progress' LIMIT 1",
                )
                .bind(driver_id)
                .fetch_optional(&self.pool)
                .await?;
                Ok::<_, DbError>(ride_id)
            })
            .await
    }

    pub async fn has_in_progress_ride(&self, driver_id: &str) -> DbResult<bool> {
        Ok(self.in_progress_ride(driver_id).await?.is_some())
    }

    /// Gathers all three signals for a driver at `now`.
    pub async fn signals(&self, driver_id: &str, now: NaiveDateTime) -> DbResult<AvailabilitySignals> {
        let signals = AvailabilitySignals {
            has_vehicle: self.has_vehicle(driver_id).await?,
            on_shift: self.has_active_shift(driver_id, now).await?,
            in_progress_ride: self.in_progress_ride(driver_id).await?,
        };
        debug!(driver_id = %driver_id, ?signals, "Availability signals gathered");
        Ok(signals)
    }

    /// The gate's verdict: `Ok(())`, or the first reason the driver is out.
    pub async fn check(
        &self,
        driver_id: &str,
        now: NaiveDateTime,
    ) -> DbResult<Result<(), Unavailability>> {
        Ok(self.signals(driver_id, now).await?.verdict())
    }

    /// vehicle ∧ on shift ∧ no ride in progress.
    pub async fn is_available_now(&self, driver_id: &str, now: NaiveDateTime) -> DbResult<bool> {
        Ok(self.check(driver_id, now).await?.is_ok())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

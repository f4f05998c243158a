//! # Payment Repository
//!
//! The payment ledger: the current payment state of each ride.
//!
//! ## One Row Per Ride
//! ```text
//! create_or_update(ride, amount, method, status)
//!      │
//!      ▼
//! INSERT INTO payments ...
//!      │
//!      ├── ok ──────────────────────────────► new payment_id
//!      │
//!      └── UNIQUE(ride_id) conflict
//!             │
//!             ▼
//!          UPDATE payments SET amount, method, status WHERE ride_id = ?
//!             │
//!             └────────────────────────────► existing payment_id
//! ```
//!
//! A failed wallet attempt followed by a cash retry therefore leaves exactly
//! one row, carrying the retry's method and status.
//!
//! ## Settlement
//! ```text
//! settle(ride, request)
//!      │
//!      ▼
//! request.validate()  ── card number invalid ──► Err(Validation)
//!      │
//!      ▼
//! BEGIN
//!   lock_ride(ride)              ── missing ──────► Err(NotFound)
//!      │                         ── cancelled ────► RideNotPayable
//!      ▼
//!   payment of ride Completed?   ── yes ──────────► AlreadySettled
//!      │
//!      ▼
//!   request.plan(ride fare)
//!      ├── Collected (cash, card) ──► upsert Completed
//!      └── DebitWallet ──► debit_in(ride's rider, fare)
//!                            ├── Debited ───────────► upsert Completed
//!                            └── InsufficientFunds ─► upsert Failed
//! COMMIT
//! ```
//!
//! The amount and the wallet charged are read from the locked ride row, never
//! from the caller. The wallet debit and the payment row commit together or
//! not at all, and a settled payment is never charged again.

use chrono::Utc;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ride::{lock_ride, write_status};
use super::wallet::{debit_in, DebitOutcome};
use crate::deadline::Deadline;
use crate::error::{DbError, DbResult};
use rydex_core::ride::authorize_transition;
use rydex_core::validation::{validate_amount_cents, validate_entity_id, validate_uuid};
use rydex_core::{
    CoreError, Money, Payment, PaymentMethod, PaymentRequest, PaymentStatus, RideAction, RideStatus,
    SettlementPlan, TransitionOutcome,
};

const PAYMENT_COLUMNS: &str =
    "payment_id, ride_id, amount_cents, method, status, created_at, updated_at";

// =============================================================================
// Outcomes
// =============================================================================

/// Result of a combined payment + ride status update.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentUpdateOutcome {
    /// Both rows written. `ride` holds the ride's (from, to) when it moved.
    Updated {
        payment: Payment,
        ride: Option<(RideStatus, RideStatus)>,
    },
    PaymentNotFound,
    /// The ride refused the requested status; the payment was not changed
    /// either.
    RideRefused { refusal: TransitionOutcome },
}

/// Result of settling a ride's fare.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// Payment recorded as Completed. `remaining_balance` is set for wallet
    /// payments.
    Settled {
        payment: Payment,
        remaining_balance: Option<Money>,
    },
    /// Wallet could not cover the fare. Payment recorded as Failed, no debit.
    InsufficientFunds {
        payment: Payment,
        balance: Money,
        required: Money,
    },
    /// The ride's payment had already settled. Nothing was charged.
    AlreadySettled { payment: Payment },
    /// The ride was cancelled. Nothing was recorded or charged.
    RideNotPayable { status: RideStatus },
}

impl SettlementOutcome {
    /// The ride's payment row, absent only for a ride that cannot be paid.
    pub fn payment(&self) -> Option<&Payment> {
        match self {
            SettlementOutcome::Settled { payment, .. }
            | SettlementOutcome::InsufficientFunds { payment, .. }
            | SettlementOutcome::AlreadySettled { payment } => Some(payment),
            SettlementOutcome::RideNotPayable { .. } => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, SettlementOutcome::Settled { .. })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the payment ledger.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
    deadline: Deadline,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool, deadline: Deadline) -> Self {
        PaymentRepository { pool, deadline }
    }

    /// Gets a payment by ID.
    pub async fn get_by_id(&self, payment_id: &str) -> DbResult<Option<Payment>> {
        self.deadline
            .run("get_payment", async {
                let payment = sqlx::query_as::<_, Payment>(&format!(
                    "SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_id = ?1"
                ))
                .bind(payment_id)
                .fetch_optional(&self.pool)
                .await?;
                Ok::<_, DbError>(payment)
            })
            .await
    }

    /// Gets the payment of a ride, if one was recorded.
    pub async fn get_by_ride(&self, ride_id: &str) -> DbResult<Option<Payment>> {
        self.deadline
            .run("get_payment_by_ride", async {
                let payment = sqlx::query_as::<_, Payment>(&format!(
                    "SELECT {PAYMENT_COLUMNS} FROM payments WHERE ride_id = ?1"
                ))
                .bind(ride_id)
                .fetch_optional(&self.pool)
                .await?;
                Ok::<_, DbError>(payment)
            })
            .await
    }

    /// Records the payment of a ride, or overwrites the one already there.
    ///
    /// ## Returns
    /// The stored payment. Its `payment_id` is stable across retries.
    ///
    /// ## Errors
    /// - `DbError::Validation` for a malformed ride id or non-positive amount
    /// - `DbError::NotFound` if the ride does not exist
    pub async fn create_or_update(
        &self,
        ride_id: &str,
        amount: Money,
        method: PaymentMethod,
        status: PaymentStatus,
    ) -> DbResult<Payment> {
        validate_entity_id("ride_id", ride_id)?;
        validate_amount_cents("amount", amount.cents())?;

        self.deadline
            .run("create_or_update_payment", async {
                let mut tx = self.pool.begin().await?;
                let payment = upsert_in(&mut *tx, ride_id, amount, method, status).await?;
                tx.commit().await?;
                Ok::<_, DbError>(payment)
            })
            .await
    }

    /// Updates the status of a payment alone.
    ///
    /// Returns `None` for an unknown payment.
    pub async fn update_status(
        &self,
        payment_id: &str,
        status: PaymentStatus,
    ) -> DbResult<Option<Payment>> {
        validate_uuid("payment_id", payment_id)?;

        let payment = self
            .deadline
            .run("update_payment_status", async {
                let payment = sqlx::query_as::<_, Payment>(&format!(
                    "UPDATE payments SET status = ?2, updated_at = ?3 WHERE payment_id = ?1 RETURNING {PAYMENT_COLUMNS}"
                ))
                .bind(payment_id)
                .bind(status)
                .bind(Utc::now())
                .fetch_optional(&self.pool)
                .await?;
                Ok::<_, DbError>(payment)
            })
            .await?;

        if payment.is_some() {
            info!(payment_id = %payment_id, %status, "Payment status updated");
        }
        Ok(payment)
    }

    /// Updates a payment's status and, optionally, its ride's status in one
    /// transaction.
    ///
    /// Only Confirmed and Cancelled are accepted as ride targets. A payment
    /// never moves a ride to InProgress or Completed; those belong to the
    /// driver. If the ride refuses, neither row changes.
    pub async fn update_status_and_ride(
        &self,
        payment_id: &str,
        payment_status: PaymentStatus,
        ride_status: Option<RideStatus>,
    ) -> DbResult<PaymentUpdateOutcome> {
        validate_uuid("payment_id", payment_id)?;

        self.deadline
            .run(
                "update_payment_and_ride",
                self.update_locked("payment_id", payment_id, payment_status, ride_status),
            )
            .await
    }

    /// [`update_status_and_ride`](Self::update_status_and_ride) keyed by ride.
    pub async fn update_status_by_ride(
        &self,
        ride_id: &str,
        payment_status: PaymentStatus,
        ride_status: Option<RideStatus>,
    ) -> DbResult<PaymentUpdateOutcome> {
        validate_entity_id("ride_id", ride_id)?;

        self.deadline
            .run(
                "update_payment_and_ride_by_ride",
                self.update_locked("ride_id", ride_id, payment_status, ride_status),
            )
            .await
    }

    async fn update_locked(
        &self,
        key_column: &'static str,
        key: &str,
        payment_status: PaymentStatus,
        ride_status: Option<RideStatus>,
    ) -> DbResult<PaymentUpdateOutcome> {
        let mut tx = self.pool.begin().await?;

        // First statement is a write: the transaction holds the lock from here.
        let Some(payment) = sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments SET status = ?2, updated_at = ?3 WHERE {key_column} = ?1 RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(key)
        .bind(payment_status)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?
        else {
            tx.rollback().await?;
            return Ok(PaymentUpdateOutcome::PaymentNotFound);
        };

        let Some(target) = ride_status else {
            tx.commit().await?;
            info!(payment_id = %payment.payment_id, status = %payment_status, "Payment status updated");
            return Ok(PaymentUpdateOutcome::Updated {
                payment,
                ride: None,
            });
        };

        let Some(ride) = lock_ride(&mut *tx, &payment.ride_id).await? else {
            tx.rollback().await?;
            return Ok(PaymentUpdateOutcome::RideRefused {
                refusal: TransitionOutcome::NotFound,
            });
        };

        let authorized = match RideAction::from_payment_target(target) {
            Some(action) => authorize_transition(ride.status, &ride.driver_id, None, action),
            None => Err(CoreError::InvalidTransition {
                from: ride.status,
                action: RideAction::Confirm,
            }),
        };

        let next = match authorized {
            Ok(next) => next,
            Err(rejection) => {
                tx.rollback().await?;
                let refusal = TransitionOutcome::from_rejection(rejection)?;
                warn!(
                    payment_id = %payment.payment_id,
                    ride_id = %payment.ride_id,
                    target = %target,
                    %refusal,
                    "Ride refused payment-driven status change"
                );
                return Ok(PaymentUpdateOutcome::RideRefused { refusal });
            }
        };

        write_status(&mut *tx, &payment.ride_id, next).await?;
        tx.commit().await?;

        info!(
            payment_id = %payment.payment_id,
            ride_id = %payment.ride_id,
            status = %payment_status,
            from = %ride.status,
            to = %next,
            "Payment and ride status updated"
        );

        Ok(PaymentUpdateOutcome::Updated {
            payment,
            ride: Some((ride.status, next)),
        })
    }

    /// Settles a ride's fare with the rider's chosen method.
    ///
    /// The fare and the rider are taken from the ride itself. A ride whose
    /// payment already settled is not charged again, and a cancelled ride is
    /// not charged at all. Otherwise the payment row is written: Completed on
    /// success, Failed when the wallet cannot cover the fare.
    ///
    /// ## Errors
    /// - `DbError::Validation` for a malformed ride id or invalid card number
    /// - `DbError::NotFound` for an unknown ride
    pub async fn settle(
        &self,
        ride_id: &str,
        request: &PaymentRequest,
    ) -> DbResult<SettlementOutcome> {
        validate_entity_id("ride_id", ride_id)?;
        request.validate()?;

        debug!(ride_id = %ride_id, ?request, "Settling ride payment");

        let outcome = self
            .deadline
            .run("settle_payment", self.settle_locked(ride_id, request))
            .await?;

        match &outcome {
            SettlementOutcome::Settled { payment, .. } => info!(
                ride_id = %ride_id,
                payment_id = %payment.payment_id,
                method = %payment.method,
                amount = %payment.amount(),
                "Payment settled"
            ),
            SettlementOutcome::InsufficientFunds {
                payment,
                balance,
                required,
            } => warn!(
                ride_id = %ride_id,
                payment_id = %payment.payment_id,
                balance = %balance,
                required = %required,
                "Wallet payment failed"
            ),
            SettlementOutcome::AlreadySettled { payment } => warn!(
                ride_id = %ride_id,
                payment_id = %payment.payment_id,
                method = %payment.method,
                "Payment already settled, nothing charged"
            ),
            SettlementOutcome::RideNotPayable { status } => warn!(
                ride_id = %ride_id,
                %status,
                "Ride cannot be paid for"
            ),
        }
        Ok(outcome)
    }

    async fn settle_locked(
        &self,
        ride_id: &str,
        request: &PaymentRequest,
    ) -> DbResult<SettlementOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some(ride) = lock_ride(&mut *tx, ride_id).await? else {
            tx.rollback().await?;
            return Err(DbError::not_found("Ride", ride_id));
        };

        if ride.status == RideStatus::Cancelled {
            tx.rollback().await?;
            return Ok(SettlementOutcome::RideNotPayable {
                status: ride.status,
            });
        }

        let existing = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE ride_id = ?1"
        ))
        .bind(ride_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(payment) = existing.filter(Payment::is_settled) {
            tx.rollback().await?;
            return Ok(SettlementOutcome::AlreadySettled { payment });
        }

        let amount = Money::from_cents(ride.fare_cents);
        let method = request.method();

        let outcome = match request.plan(amount)? {
            SettlementPlan::Collected => {
                let payment =
                    upsert_in(&mut *tx, ride_id, amount, method, PaymentStatus::Completed).await?;
                SettlementOutcome::Settled {
                    payment,
                    remaining_balance: None,
                }
            }
            SettlementPlan::DebitWallet(debit) => {
                let debited = debit_in(&mut *tx, &ride.rider_id, debit).await?;
                let status = PaymentStatus::from_settled(debited.is_debited());
                let payment = upsert_in(&mut *tx, ride_id, amount, method, status).await?;

                match debited {
                    DebitOutcome::Debited { remaining } => SettlementOutcome::Settled {
                        payment,
                        remaining_balance: Some(remaining),
                    },
                    DebitOutcome::InsufficientFunds { balance, required } => {
                        SettlementOutcome::InsufficientFunds {
                            payment,
                            balance,
                            required,
                        }
                    }
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

// =============================================================================
// Upsert
// =============================================================================

/// Insert-or-overwrite of a ride's payment on an open transaction.
///
/// A constraint failure aborts only the failing statement, so the fallback
/// UPDATE runs in the same transaction.
pub(crate) async fn upsert_in(
    conn: &mut SqliteConnection,
    ride_id: &str,
    amount: Money,
    method: PaymentMethod,
    status: PaymentStatus,
) -> DbResult<Payment> {
    let now = Utc::now();

    let inserted = sqlx::query_as::<_, Payment>(&format!(
        r#"
        INSERT INTO payments (payment_id, ride_id, amount_cents, method, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
        RETURNING {PAYMENT_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4().to_string())
    .bind(ride_id)
    .bind(amount.cents())
    .bind(method)
    .bind(status)
    .bind(now)
    .fetch_one(&mut *conn)
    .await;

    match inserted.map_err(DbError::from) {
        Ok(payment) => {
            debug!(payment_id = %payment.payment_id, ride_id = %ride_id, %method, %status, "Payment recorded");
            Ok(payment)
        }
        Err(DbError::UniqueViolation { .. }) => {
            let payment = sqlx::query_as::<_, Payment>(&format!(
                r#"
                UPDATE payments
                SET amount_cents = ?2, method = ?3, status = ?4, updated_at = ?5
                WHERE ride_id = ?1
                RETURNING {PAYMENT_COLUMNS}
                "#
            ))
            .bind(ride_id)
            .bind(amount.cents())
            .bind(method)
            .bind(status)
            .bind(now)
            .fetch_one(&mut *conn)
            .await?;

            debug!(payment_id = %payment.payment_id, ride_id = %ride_id, %method, %status, "Payment overwritten");
            Ok(payment)
        }
        Err(DbError::ForeignKeyViolation { .. }) => Err(DbError::not_found("Ride", ride_id)),
        Err(other) => Err(other),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

//! # Wallet Repository
//!
//! Rider wallet balances. The balance can never go below zero.
//!
//! ## Conditional Debit
//! ```text
//! UPDATE riders
//!    SET balance_cents = balance_cents - :amount
//!  WHERE rider_id = :rider AND balance_cents >= :amount
//! RETURNING balance_cents
//!
//!   row returned ──► Debited { remaining }
//!   no row ──┬── rider exists  ──► InsufficientFunds { balance, required }
//!            └── rider missing ──► Err(NotFound)
//! ```
//!
//! The check and the subtraction are one statement, so two concurrent debits
//! can never both pass against the same balance. The `CHECK (balance_cents
//! >= 0)` constraint on the table backs this up.

use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use crate::deadline::Deadline;
use crate::error::{DbError, DbResult};
use rydex_core::validation::{validate_amount_cents, validate_entity_id};
use rydex_core::Money;

/// Result of a wallet debit.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DebitOutcome {
    Debited { remaining: Money },
    InsufficientFunds { balance: Money, required: Money },
}

impl DebitOutcome {
    pub fn is_debited(&self) -> bool {
        matches!(self, DebitOutcome::Debited { .. })
    }
}

/// Repository for rider wallets.
#[derive(Debug, Clone)]
pub struct WalletRepository {
    pool: SqlitePool,
    deadline: Deadline,
}

impl WalletRepository {
    /// Creates a new WalletRepository.
    pub fn new(pool: SqlitePool, deadline: Deadline) -> Self {
        WalletRepository { pool, deadline }
    }

    /// Current balance, or `None` for an unknown rider.
    pub async fn balance(&self, rider_id: &str) -> DbResult<Option<Money>> {
        self.deadline
            .run("wallet_balance", async {
                let mut conn = self.pool.acquire().await?;
                let balance = read_balance(&mut *conn, rider_id).await?;
                Ok::<_, DbError>(balance)
            })
            .await
    }

    /// Adds funds to a rider's wallet and returns the new balance.
    ///
    /// ## Errors
    /// - `DbError::Validation` if `amount` is not positive
    /// - `DbError::NotFound` for an unknown rider
    pub async fn credit(&self, rider_id: &str, amount: Money) -> DbResult<Money> {
        validate_entity_id("rider_id", rider_id)?;
        validate_amount_cents("amount", amount.cents())?;

        let balance = self
            .deadline
            .run("wallet_credit", async {
                let balance: Option<i64> = sqlx::query_scalar(
                    r#"
                    UPDATE riders SET balance_cents = balance_cents + ?1
                    WHERE rider_id = ?2
                    RETURNING balance_cents
                    "#,
                )
                .bind(amount.cents())
                .bind(rider_id)
                .fetch_optional(&self.pool)
                .await?;

                balance
                    .map(Money::from_cents)
                    .ok_or_else(|| DbError::not_found("Rider", rider_id))
            })
            .await?;

        info!(rider_id = %rider_id, amount = %amount, balance = %balance, "Wallet credited");
        Ok(balance)
    }

    /// Takes `amount` from a rider's wallet if the balance covers it.
    ///
    /// Insufficient funds is an outcome, not an error; the balance is left
    /// untouched.
    pub async fn debit(&self, rider_id: &str, amount: Money) -> DbResult<DebitOutcome> {
        validate_entity_id("rider_id", rider_id)?;
        validate_amount_cents("amount", amount.cents())?;

        self.deadline
            .run("wallet_debit", async {
                let mut conn = self.pool.acquire().await?;
                debit_in(&mut *conn, rider_id, amount).await
            })
            .await
    }
}

/// Conditional debit on an existing connection or transaction.
pub(crate) async fn debit_in(
    conn: &mut SqliteConnection,
    rider_id: &str,
    amount: Money,
) -> DbResult<DebitOutcome> {
    let remaining: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE riders SET balance_cents = balance_cents - ?1
        WHERE rider_id = ?2 AND balance_cents >= ?1
        RETURNING balance_cents
        "#,
    )
    .bind(amount.cents())
    .bind(rider_id)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(remaining) = remaining {
        let remaining = Money::from_cents(remaining);
        info!(rider_id = %rider_id, amount = %amount, remaining = %remaining, "Wallet debited");
        return Ok(DebitOutcome::Debited { remaining });
    }

    match read_balance(conn, rider_id).await? {
        Some(balance) => {
            warn!(
                rider_id = %rider_id,
                balance = %balance,
                required = %amount,
                "Insufficient wallet balance"
            );
            Ok(DebitOutcome::InsufficientFunds {
                balance,
                required: amount,
            })
        }
        None => Err(DbError::not_found("Rider", rider_id)),
    }
}

async fn read_balance(conn: &mut SqliteConnection, rider_id: &str) -> DbResult<Option<Money>> {
    let balance: Option<i64> =
        sqlx::query_scalar("SELECT balance_cents FROM riders WHERE rider_id = ?1")
            .bind(rider_id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(balance.map(Money::from_cents))
}

// =============================================================================
// Unit Tests
// =============================================================================

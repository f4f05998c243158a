//! # Payments
//!
//! Payment methods, payment status, and the pure half of settlement: deciding
//! what has to happen for a fare to count as paid.
//!
//! ## Settlement by Method
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  PaymentRequest          plan()                    recorded status   │
//! │  ──────────────          ──────                    ───────────────   │
//! │  Cash                ──► Collected                 Completed         │
//! │  Card { number }     ──► Collected (validated)     Completed         │
//! │  Wallet              ──► DebitWallet(fare) ──┬──►  Completed         │
//! │                                              └──►  Failed            │
//! │                                   (balance < fare, nothing debited)  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cash is collected at pickup and card has no external gateway, so both
//! settle synchronously. Only the wallet needs the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreResult;
use crate::money::Money;
use crate::validation::{mask_card_number, validate_card_number};

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Collected by the driver at pickup.
    Cash,
    /// Card charged at booking.
    Card,
    /// Debited from the rider's wallet balance.
    Wallet,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Wallet => "wallet",
        };
        f.write_str(label)
    }
}

// =============================================================================
// Payment Status
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    /// Status recorded for a settlement attempt.
    pub const fn from_settled(settled: bool) -> Self {
        if settled {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Failed
        }
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

// =============================================================================
// Payment Request
// =============================================================================

/// How the rider chose to pay, with the data that method needs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentRequest {
    Cash,
    Card { card_number: String },
    Wallet,
}

impl PaymentRequest {
    pub const fn method(&self) -> PaymentMethod {
        match self {
            PaymentRequest::Cash => PaymentMethod::Cash,
            PaymentRequest::Card { .. } => PaymentMethod::Card,
            PaymentRequest::Wallet => PaymentMethod::Wallet,
        }
    }

    /// Checks the data the method carries. Only card numbers can be wrong.
    pub fn validate(&self) -> CoreResult<()> {
        if let PaymentRequest::Card { card_number } = self {
            validate_card_number(card_number)?;
        }
        Ok(())
    }

    /// Decides what settling `amount` with this method requires.
    pub fn plan(&self, amount: Money) -> CoreResult<SettlementPlan> {
        self.validate()?;
        match self {
            PaymentRequest::Cash | PaymentRequest::Card { .. } => Ok(SettlementPlan::Collected),
            PaymentRequest::Wallet => Ok(SettlementPlan::DebitWallet(amount)),
        }
    }
}

/// Never prints a full card number.
impl fmt::Debug for PaymentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentRequest::Cash => f.write_str("Cash"),
            PaymentRequest::Card { card_number } => f
                .debug_struct("Card")
                .field("card_number", &mask_card_number(card_number))
                .finish(),
            PaymentRequest::Wallet => f.write_str("Wallet"),
        }
    }
}

/// What the ledger must do to settle a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementPlan {
    /// Settled out of band; record as Completed.
    Collected,
    /// Debit this amount from the rider wallet; Completed iff the debit succeeds.
    DebitWallet(Money),
}

// =============================================================================
// Payment
// =============================================================================

/// The current payment state of one ride.
///
/// There is at most one payment per ride: a retry (say a failed wallet
/// attempt followed by cash) overwrites amount, method and status in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Payment {
    pub payment_id: String,
    pub ride_id: String,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    pub fn is_settled(&self) -> bool {
        self.status == PaymentStatus::Completed
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

//! # rydex-db: Persistence and Ride Engine for Rydex
//!
//! This crate owns everything that touches storage: the SQLite pool, the
//! embedded schema, the transactional ride store, the payment ledger, rider
//! wallets and the driver availability gate. [`RideEngine`] composes them
//! into the booking flow.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Rydex Data Flow                                  │
//! │                                                                         │
//! │  Presentation (CLI, desktop, service)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     rydex-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  RideEngine   │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │  (engine.rs)  │───►│               │    │  (embedded)  │  │   │
//! │  │   │               │    │ RideRepo      │    │              │  │   │
//! │  │   │ book / start  │    │ PaymentRepo   │    │ 001_initial_ │  │   │
//! │  │   │ complete      │    │ WalletRepo    │    │ schema.sql   │  │   │
//! │  │   │ cancel        │    │ Availability  │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │          │                    │                                 │   │
//! │  │          ▼                    ▼                                 │   │
//! │  │   ┌───────────────────────────────────┐                        │   │
//! │  │   │  Database (pool.rs) + Deadline    │                        │   │
//! │  │   └───────────────────────────────────┘                        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`deadline`] - Per-operation deadlines
//! - [`config`] - Engine configuration (file + environment)
//! - [`repository`] - Ride store, payment ledger, wallets, availability
//! - [`engine`] - Booking flow and driver actions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rydex_db::{EngineConfig, RideEngine};
//! use rydex_core::PaymentRequest;
//!
//! let engine = RideEngine::from_config(&EngineConfig::load(None)?).await?;
//!
//! let outcome = engine
//!     .book_ride(&rider_id, &driver_id, &route_id, &PaymentRequest::Wallet)
//!     .await?;
//!
//! let started = engine.start_ride(&ride_id, &driver_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, EngineConfig};
pub use deadline::Deadline;
pub use engine::{BookingOutcome, BookingReceipt, Clock, FixedClock, RideEngine, SystemClock};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::availability::AvailabilityRepository;
pub use repository::directory::DirectoryRepository;
pub use repository::payment::{PaymentRepository, PaymentUpdateOutcome, SettlementOutcome};
pub use repository::ride::RideRepository;
pub use repository::wallet::{DebitOutcome, WalletRepository};

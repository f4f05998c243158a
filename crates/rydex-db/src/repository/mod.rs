//! # Repository Module
//!
//! Database repository implementations for Rydex.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories and What They Own                       │
//! │                                                                         │
//! │  RideEngine                                                            │
//! │       │                                                                 │
//! │       │  db.rides().start(&ride_id, &driver_id)                        │
//! │       ▼                                                                 │
//! │  RideRepository ───────── rides.status, drivers.total_earnings_cents   │
//! │  PaymentRepository ────── payments (one row per ride)                  │
//! │  WalletRepository ─────── riders.balance_cents                         │
//! │  AvailabilityRepository ─ read-only: vehicles, driver_shifts, rides    │
//! │  DirectoryRepository ──── users, drivers, riders, vehicles, routes     │
//! │       │                                                                 │
//! │       │  SQL                                                           │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every repository holds a pool handle and a [`Deadline`](crate::deadline::Deadline).
//! Operations that must be atomic open exactly one transaction and never
//! acquire a second connection while it is open.
//!
//! ## Available Repositories
//!
//! - [`RideRepository`](ride::RideRepository) - Ride creation and locked transitions
//! - [`PaymentRepository`](payment::PaymentRepository) - Payment ledger and settlement
//! - [`WalletRepository`](wallet::WalletRepository) - Rider wallet credit/debit
//! - [`AvailabilityRepository`](availability::AvailabilityRepository) - Driver availability gate
//! - [`DirectoryRepository`](directory::DirectoryRepository) - Users, vehicles, shifts, routes

pub mod availability;
pub mod directory;
pub mod payment;
pub mod ride;
pub mod wallet;

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, Local, NaiveDateTime};
    use rydex_core::Money;

    use crate::pool::Database;

    /// Ids of a small, fully available cast.
    pub struct Cast {
        pub rider_id: String,
        pub driver_id: String,
        pub other_driver_id: String,
        /// 2.5 km, fare PKR 225.00 under the default policy.
        pub route_id: String,
    }

    pub const FARE: Money = Money::from_cents(22_500);

    /// A rider, two drivers with vehicles and a shift around `now`, one route.
    ///
    /// `now` must not be within 30 minutes of midnight.
    pub async fn cast(db: &Database, now: NaiveDateTime) -> Cast {
        let dir = db.directory();

        let rider = dir.register_rider("Sana", "sana@example.com").await.unwrap();
        let driver = dir
            .register_driver("Bilal", "bilal@example.com", "LHR-001")
            .await
            .unwrap();
        let other = dir
            .register_driver("Usman", "usman@example.com", "LHR-002")
            .await
            .unwrap();

        for (driver_id, plate) in [(&driver.driver_id, "LEA-1001"), (&other.driver_id, "LEA-1002")] {
            dir.assign_vehicle(driver_id, "Suzuki Alto", plate, 4, None)
                .await
                .unwrap();
            dir.add_shift(
                driver_id,
                now.date(),
                (now - Duration::minutes(30)).time(),
                (now + Duration::minutes(30)).time(),
            )
            .await
            .unwrap();
        }

        let route = dir.add_route("FAST Campus", "Gulberg", 2.5).await.unwrap();

        Cast {
            rider_id: rider.rider_id,
            driver_id: driver.driver_id,
            other_driver_id: other.driver_id,
            route_id: route.route_id,
        }
    }

    /// A fixed mid-day instant so shifts never straddle midnight.
    pub fn noon() -> NaiveDateTime {
        Local::now()
            .date_naive()
            .and_hms_opt(12, 0, 0)
            .unwrap_or_else(|| Local::now().naive_local())
    }
}

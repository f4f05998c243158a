//! # Directory Repository
//!
//! Registration and lookup for the data the engine consumes read-only:
//! users with their driver/rider profiles, vehicles, shifts and routes.
//!
//! Earnings and wallet balances are created at zero here and are never
//! written again by this repository. Only the ride store (earnings) and the
//! wallet (balance) mutate them.

use chrono::{NaiveDate, NaiveTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::deadline::Deadline;
use crate::error::{DbError, DbResult};
use rydex_core::validation::{validate_distance_km, validate_shift_window, validate_text};
use rydex_core::{Account, DriverProfile, DriverShift, RiderProfile, Route, User, Vehicle};

/// Repository for directory data.
#[derive(Debug, Clone)]
pub struct DirectoryRepository {
    pool: SqlitePool,
    deadline: Deadline,
}

impl DirectoryRepository {
    /// Creates a new DirectoryRepository.
    pub fn new(pool: SqlitePool, deadline: Deadline) -> Self {
        DirectoryRepository { pool, deadline }
    }

    // =========================================================================
    // Users and Profiles
    // =========================================================================

    /// Registers a user with a driver profile.
    pub async fn register_driver(
        &self,
        name: &str,
        email: &str,
        license_number: &str,
    ) -> DbResult<DriverProfile> {
        validate_text("license_number", license_number, 32)?;
        let user = new_user(name, email)?;

        self.deadline
            .run("register_driver", async {
                let mut tx = self.pool.begin().await?;
                insert_user(&mut *tx, &user).await?;

                sqlx::query(
                    "INSERT INTO drivers (driver_id, license_number, total_earnings_cents) VALUES (?1, ?2, 0)",
                )
                .bind(&user.user_id)
                .bind(license_number.trim())
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;

                info!(driver_id = %user.user_id, "Driver registered");
                Ok::<_, DbError>(DriverProfile {
                    driver_id: user.user_id.clone(),
                    license_number: license_number.trim().to_string(),
                    total_earnings_cents: 0,
                })
            })
            .await
    }

    /// Registers a user with a rider profile and an empty wallet.
    pub async fn register_rider(&self, name: &str, email: &str) -> DbResult<RiderProfile> {
        let user = new_user(name, email)?;

        self.deadline
            .run("register_rider", async {
                let mut tx = self.pool.begin().await?;
                insert_user(&mut *tx, &user).await?;

                sqlx::query("INSERT INTO riders (rider_id, balance_cents) VALUES (?1, 0)")
                    .bind(&user.user_id)
                    .execute(&mut *tx)
                    .await?;

                tx.commit().await?;

                info!(rider_id = %user.user_id, "Rider registered");
                Ok::<_, DbError>(RiderProfile {
                    rider_id: user.user_id.clone(),
                    balance_cents: 0,
                })
            })
            .await
    }

    /// Gets a driver profile.
    pub async fn get_driver(&self, driver_id: &str) -> DbResult<Option<DriverProfile>> {
        self.deadline
            .run("get_driver", async {
                let driver = sqlx::query_as::<_, DriverProfile>(
                    "SELECT driver_id, license_number, total_earnings_cents FROM drivers WHERE driver_id = ?1",
                )
                .bind(driver_id)
                .fetch_optional(&self.pool)
                .await?;
                Ok::<_, DbError>(driver)
            })
            .await
    }

    /// Gets a rider profile.
    pub async fn get_rider(&self, rider_id: &str) -> DbResult<Option<RiderProfile>> {
        self.deadline
            .run("get_rider", async {
                let rider = sqlx::query_as::<_, RiderProfile>(
                    "SELECT rider_id, balance_cents FROM riders WHERE rider_id = ?1",
                )
                .bind(rider_id)
                .fetch_optional(&self.pool)
                .await?;
                Ok::<_, DbError>(rider)
            })
            .await
    }

    /// Gets a user with whichever role profiles they hold.
    pub async fn get_account(&self, user_id: &str) -> DbResult<Option<Account>> {
        let user = self
            .deadline
            .run("get_user", async {
                let user = sqlx::query_as::<_, User>(
                    "SELECT user_id, name, email, created_at FROM users WHERE user_id = ?1",
                )
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
                Ok::<_, DbError>(user)
            })
            .await?;

        let Some(user) = user else {
            return Ok(None);
        };

        Ok(Some(Account {
            driver: self.get_driver(user_id).await?,
            rider: self.get_rider(user_id).await?,
            user,
        }))
    }

    /// Lists every driver, oldest registration first.
    pub async fn list_drivers(&self) -> DbResult<Vec<DriverProfile>> {
        self.deadline
            .run("list_drivers", async {
                let drivers = sqlx::query_as::<_, DriverProfile>(
                    r#"
                    SELECT d.driver_id, d.license_number, d.total_earnings_cents
                    FROM drivers d
                    JOIN users u ON u.user_id = d.driver_id
                    ORDER BY u.created_at, d.driver_id
                    "#,
                )
                .fetch_all(&self.pool)
                .await?;
                Ok::<_, DbError>(drivers)
            })
            .await
    }

    // =========================================================================
    // Vehicles and Shifts
    // =========================================================================

    /// Assigns a vehicle to a driver. A driver has at most one vehicle.
    pub async fn assign_vehicle(
        &self,
        driver_id: &str,
        model: &str,
        plate_number: &str,
        capacity: i64,
        color: Option<&str>,
    ) -> DbResult<Vehicle> {
        validate_text("model", model, 100)?;
        validate_text("plate_number", plate_number, 20)?;
        if capacity <= 0 {
            return Err(rydex_core::ValidationError::MustBePositive {
                field: "capacity".to_string(),
            }
            .into());
        }

        let vehicle = Vehicle {
            vehicle_id: Uuid::new_v4().to_string(),
            driver_id: driver_id.to_string(),
            model: model.trim().to_string(),
            plate_number: plate_number.trim().to_string(),
            capacity,
            color: color.map(str::to_string),
        };

        self.deadline
            .run("assign_vehicle", async {
                debug!(driver_id = %driver_id, plate = %vehicle.plate_number, "Assigning vehicle");

                sqlx::query(
                    r#"
                    INSERT INTO vehicles (vehicle_id, driver_id, model, plate_number, capacity, color)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(&vehicle.vehicle_id)
                .bind(&vehicle.driver_id)
                .bind(&vehicle.model)
                .bind(&vehicle.plate_number)
                .bind(vehicle.capacity)
                .bind(&vehicle.color)
                .execute(&self.pool)
                .await
                .map_err(|e| match DbError::from(e) {
                    DbError::ForeignKeyViolation { .. } => DbError::not_found("Driver", driver_id),
                    other => other,
                })?;

                Ok::<_, DbError>(vehicle.clone())
            })
            .await
    }

    /// Gets the vehicle assigned to a driver.
    pub async fn vehicle_for_driver(&self, driver_id: &str) -> DbResult<Option<Vehicle>> {
        self.deadline
            .run("vehicle_for_driver", async {
                let vehicle = sqlx::query_as::<_, Vehicle>(
                    r#"
                    SELECT vehicle_id, driver_id, model, plate_number, capacity, color
                    FROM vehicles
                    WHERE driver_id = ?1
                    "#,
                )
                .bind(driver_id)
                .fetch_optional(&self.pool)
                .await?;
                Ok::<_, DbError>(vehicle)
            })
            .await
    }

    /// Records a working window for a driver.
    pub async fn add_shift(
        &self,
        driver_id: &str,
        shift_date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> DbResult<DriverShift> {
        validate_shift_window(start_time, end_time)?;

        let shift = DriverShift {
            shift_id: Uuid::new_v4().to_string(),
            driver_id: driver_id.to_string(),
            shift_date,
            start_time,
            end_time,
        };

        self.deadline
            .run("add_shift", async {
                sqlx::query(
                    r#"
                    INSERT INTO driver_shifts (shift_id, driver_id, shift_date, start_time, end_time)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                )
                .bind(&shift.shift_id)
                .bind(&shift.driver_id)
                .bind(shift.shift_date)
                .bind(shift.start_time)
                .bind(shift.end_time)
                .execute(&self.pool)
                .await
                .map_err(|e| match DbError::from(e) {
                    DbError::ForeignKeyViolation { .. } => DbError::not_found("Driver", driver_id),
                    other => other,
                })?;

                debug!(driver_id = %driver_id, date = %shift_date, "Shift added");
                Ok::<_, DbError>(shift.clone())
            })
            .await
    }

    // =========================================================================
    // Routes
    // =========================================================================

    /// Adds a route to the catalog.
    pub async fn add_route(&self, origin: &str, destination: &str, distance_km: f64) -> DbResult<Route> {
        validate_text("origin", origin, 100)?;
        validate_text("destination", destination, 100)?;
        validate_distance_km(distance_km)?;

        let route = Route {
            route_id: Uuid::new_v4().to_string(),
            origin: origin.trim().to_string(),
            destination: destination.trim().to_string(),
            distance_km,
        };

        self.deadline
            .run("add_route", async {
                sqlx::query(
                    "INSERT INTO routes (route_id, origin, destination, distance_km) VALUES (?1, ?2, ?3, ?4)",
                )
                .bind(&route.route_id)
                .bind(&route.origin)
                .bind(&route.destination)
                .bind(route.distance_km)
                .execute(&self.pool)
                .await?;

                Ok::<_, DbError>(route.clone())
            })
            .await
    }

    /// Gets a route by ID.
    pub async fn get_route(&self, route_id: &str) -> DbResult<Option<Route>> {
        self.deadline
            .run("get_route", async {
                let route = sqlx::query_as::<_, Route>(
                    "SELECT route_id, origin, destination, distance_km FROM routes WHERE route_id = ?1",
                )
                .bind(route_id)
                .fetch_optional(&self.pool)
                .await?;
                Ok::<_, DbError>(route)
            })
            .await
    }
}

fn new_user(name: &str, email: &str) -> DbResult<User> {
    validate_text("name", name, 100)?;
    validate_text("email", email, 254)?;

    Ok(User {
        user_id: Uuid::new_v4().to_string(),
        name: name.trim().to_string(),
        email: email.trim().to_lowercase(),
        created_at: Utc::now(),
    })
}

async fn insert_user(conn: &mut sqlx::SqliteConnection, user: &User) -> DbResult<()> {
    sqlx::query("INSERT INTO users (user_id, name, email, created_at) VALUES (?1, ?2, ?3, ?4)")
        .bind(&user.user_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.created_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("email", &user.email),
            other => other,
        })?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

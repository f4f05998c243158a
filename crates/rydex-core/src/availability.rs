//! # Driver Availability
//!
//! Pure predicates behind the availability gate. The store supplies the three
//! signals; this module decides.
//!
//! ```text
//! is_available(driver, now) = has_vehicle
//!                           ∧ on_shift(now)
//!                           ∧ ¬has_in_progress_ride
//! ```
//!
//! A shift covers an instant when its date is the instant's date and the time
//! of day lies in `[start_time, end_time]`, both ends inclusive. Shifts do
//! not cross midnight; an overnight shift is stored as two rows.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Driver Shift
// =============================================================================

/// One working window of a driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DriverShift {
    pub shift_id: String,
    pub driver_id: String,
    pub shift_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl DriverShift {
    /// True when `at` falls on this shift's date within its window.
    pub fn covers(&self, at: NaiveDateTime) -> bool {
        let time = at.time();
        at.date() == self.shift_date && self.start_time <= time && time <= self.end_time
    }
}

/// True when any shift covers `at`.
pub fn has_active_shift<'a, I>(shifts: I, at: NaiveDateTime) -> bool
where
    I: IntoIterator<Item = &'a DriverShift>,
{
    shifts.into_iter().any(|shift| shift.covers(at))
}

// =============================================================================
// Availability Signals
// =============================================================================

/// Why a driver cannot be booked or cannot start a ride.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Unavailability {
    NoVehicle,
    OffShift,
    DriverBusy { ride_id: String },
}

impl fmt::Display for Unavailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unavailability::NoVehicle => f.write_str("no vehicle assigned"),
            Unavailability::OffShift => f.write_str("not on an active shift"),
            Unavailability::DriverBusy { ride_id } => {
                write!(f, "ride {ride_id} is already in progress")
            }
        }
    }
}

/// The three independently queried inputs to the gate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilitySignals {
    pub has_vehicle: bool,
    pub on_shift: bool,
    /// A ride of this driver currently InProgress, if any.
    pub in_progress_ride: Option<String>,
}

impl AvailabilitySignals {
    /// Checks the signals in a fixed order and reports the first failure.
    pub fn verdict(&self) -> Result<(), Unavailability> {
        if !self.has_vehicle {
            return Err(Unavailability::NoVehicle);
        }
        if !self.on_shift {
            return Err(Unavailability::OffShift);
        }
        if let Some(ride_id) = &self.in_progress_ride {
            return Err(Unavailability::DriverBusy {
                ride_id: ride_id.clone(),
            });
        }
        Ok(())
    }

    pub fn is_available(&self) -> bool {
        self.verdict().is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

//! Status and seat rules of a carpooling, independent of storage.
//!
//! ```text
//! OPEN --(last seat booked)--> FULL --(seat released)--> OPEN
//! OPEN | FULL --(driver cancels)--> CANCELLED
//! OPEN | FULL --(complete)--> COMPLETED
//! ```

use chrono::NaiveDateTime;
use sea_orm::ActiveEnum;

use crate::entities::carpooling::CarpoolingStatus;
use crate::error::{AppError, AppResult};

/// Seats of a car taken by the driver. A car's `seats` counts the driver, so
/// at most `seats - DRIVER_OCCUPIED_SEATS` can be booked by passengers.
pub const DRIVER_OCCUPIED_SEATS: i32 = 1;

pub fn bookable_seats(car_seats: i32) -> i32 {
    (car_seats - DRIVER_OCCUPIED_SEATS).max(0)
}

/// Seat count a new carpooling starts with: what the driver offers, or every
/// bookable seat of the car when nothing is requested.
pub fn initial_seat_count(car_seats: i32, requested: Option<i32>) -> AppResult<i32> {
    let max = bookable_seats(car_seats);
    if max < 1 {
        return Err(AppError::BadRequest(
            "This car has no seat left for passengers".to_string(),
        ));
    }

    match requested {
        None => Ok(max),
        Some(n) if (1..=max).contains(&n) => Ok(n),
        Some(n) => Err(AppError::BadRequest(format!(
            "Seat count must be between 1 and {} for this car, got {}",
            max, n
        ))),
    }
}

pub fn is_terminal(status: CarpoolingStatus) -> bool {
    matches!(status, CarpoolingStatus::Cancelled | CarpoolingStatus::Completed)
}

/// Passengers can only join an OPEN carpooling.
pub fn ensure_joinable(status: CarpoolingStatus) -> AppResult<()> {
    match status {
        CarpoolingStatus::Open => Ok(()),
        other => Err(AppError::Conflict(format!(
            "Carpooling is not joinable (status {})",
            other.to_value()
        ))),
    }
}

/// Leaving, cancelling and completing are only possible before a terminal state.
pub fn ensure_modifiable(status: CarpoolingStatus) -> AppResult<()> {
    match status {
        CarpoolingStatus::Open | CarpoolingStatus::Full => Ok(()),
        CarpoolingStatus::Cancelled => Err(AppError::Conflict(
            "Carpooling is already cancelled".to_string(),
        )),
        CarpoolingStatus::Completed => Err(AppError::Conflict(
            "Carpooling is completed and not modifiable".to_string(),
        )),
    }
}

pub fn has_started(departure: NaiveDateTime, now: NaiveDateTime) -> bool {
    now >= departure
}

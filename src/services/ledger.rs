//! Carpooling ledger: trip creation and the seat/credit movements of joining,
//! leaving, cancelling and completing.
//!
//! Every operation runs inside one database transaction. Seat counts, credit
//! balances and participation flags are moved with conditional `UPDATE`s whose
//! affected row count decides whether the step succeeded, so two concurrent
//! requests can never both take the last seat or both refund the same booking.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::entities::carpooling::{self, CarpoolingStatus};
use crate::entities::{car, participation, user};
use crate::error::{AppError, AppResult};
use crate::services::{lifecycle, search};

const ACTIVE_STATUSES: [CarpoolingStatus; 2] = [CarpoolingStatus::Open, CarpoolingStatus::Full];

#[derive(Debug, Clone)]
pub struct NewCarpooling {
    pub car_id: Uuid,
    pub departure_place: String,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub arrival_place: String,
    pub arrival_date: NaiveDate,
    pub arrival_time: NaiveTime,
    pub price_per_person: i32,
    /// Defaults to every bookable seat of the car.
    pub seat_count: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct Booking {
    pub carpooling: carpooling::Model,
    pub participation: participation::Model,
}

/// Commits on success, rolls back on failure. Nothing is ever half-applied.
pub(crate) async fn finish<T>(txn: DatabaseTransaction, op: &str, result: AppResult<T>) -> AppResult<T> {
    match result {
        Ok(value) => {
            txn.commit().await.map_err(|e| {
                AppError::Consistency(format!("Could not commit {}: {}", op, e))
            })?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                return Err(AppError::Consistency(format!(
                    "Could not roll back {}: {}",
                    op, rollback_err
                )));
            }
            Err(err)
        }
    }
}

fn now_tz() -> sea_orm::prelude::DateTimeWithTimeZone {
    Utc::now().into()
}

async fn find_carpooling(txn: &DatabaseTransaction, id: Uuid) -> AppResult<carpooling::Model> {
    carpooling::Entity::find_by_id(id)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Carpooling not found".to_string()))
}

async fn find_driver(
    txn: &DatabaseTransaction,
    carpooling_id: Uuid,
) -> AppResult<participation::Model> {
    participation::Entity::find()
        .filter(participation::Column::CarpoolingId.eq(carpooling_id))
        .filter(participation::Column::IsDriver.eq(true))
        .one(txn)
        .await?
        .ok_or_else(|| AppError::Internal(format!("Carpooling {} has no driver", carpooling_id)))
}

async fn add_credits(txn: &DatabaseTransaction, user_id: Uuid, amount: i32) -> AppResult<()> {
    if amount == 0 {
        return Ok(());
    }

    let res = user::Entity::update_many()
        .col_expr(user::Column::Credits, Expr::col(user::Column::Credits).add(amount))
        .col_expr(user::Column::UpdatedAt, Expr::value(now_tz()))
        .filter(user::Column::Id.eq(user_id))
        .exec(txn)
        .await?;

    if res.rows_affected != 1 {
        return Err(AppError::Consistency(format!(
            "Could not credit user {}",
            user_id
        )));
    }
    Ok(())
}

/// Takes one seat of an OPEN carpooling and marks it FULL when that was the
/// last one. Both outcomes are decided by the statements themselves, never by
/// a row read earlier in the transaction: losers of a race see zero rows.
pub async fn reserve_seat(txn: &DatabaseTransaction, carpooling_id: Uuid) -> AppResult<()> {
    let stamp = now_tz();

    let reserved = carpooling::Entity::update_many()
        .col_expr(
            carpooling::Column::SeatCount,
            Expr::col(carpooling::Column::SeatCount).sub(1),
        )
        .col_expr(carpooling::Column::UpdatedAt, Expr::value(stamp))
        .filter(carpooling::Column::Id.eq(carpooling_id))
        .filter(carpooling::Column::Status.eq(CarpoolingStatus::Open))
        .filter(carpooling::Column::SeatCount.gt(0))
        .exec(txn)
        .await?;

    if reserved.rows_affected == 0 {
        return Err(AppError::Conflict(
            "Carpooling is not joinable: no seat left".to_string(),
        ));
    }

    // The row is locked by the decrement above, so this sees our own write
    carpooling::Entity::update_many()
        .col_expr(carpooling::Column::Status, Expr::value(CarpoolingStatus::Full))
        .filter(carpooling::Column::Id.eq(carpooling_id))
        .filter(carpooling::Column::Status.eq(CarpoolingStatus::Open))
        .filter(carpooling::Column::SeatCount.eq(0))
        .exec(txn)
        .await?;

    Ok(())
}

/// Gives one seat back to a running carpooling. A trip with a free seat is
/// never full, so the status goes back to OPEN in the same statement whatever
/// an earlier read said.
pub async fn release_seat(txn: &DatabaseTransaction, carpooling_id: Uuid) -> AppResult<()> {
    let released = carpooling::Entity::update_many()
        .col_expr(
            carpooling::Column::SeatCount,
            Expr::col(carpooling::Column::SeatCount).add(1),
        )
        .col_expr(carpooling::Column::Status, Expr::value(CarpoolingStatus::Open))
        .col_expr(carpooling::Column::UpdatedAt, Expr::value(now_tz()))
        .filter(carpooling::Column::Id.eq(carpooling_id))
        .filter(carpooling::Column::Status.is_in(ACTIVE_STATUSES))
        .filter(
            Expr::col(carpooling::Column::SeatCount)
                .lt(Expr::col(carpooling::Column::OfferedSeats)),
        )
        .exec(txn)
        .await?;

    if released.rows_affected == 0 {
        return Err(AppError::Conflict(
            "Carpooling is not modifiable".to_string(),
        ));
    }
    Ok(())
}

/// Un-books every active passenger of a carpooling and refunds them.
/// Returns the number of refunded passengers.
pub(crate) async fn refund_passengers(
    txn: &DatabaseTransaction,
    carpooling_id: Uuid,
) -> AppResult<usize> {
    let passengers = participation::Entity::find()
        .filter(participation::Column::CarpoolingId.eq(carpooling_id))
        .filter(participation::Column::IsDriver.eq(false))
        .filter(participation::Column::IsCancelled.eq(false))
        .all(txn)
        .await?;

    let mut refunded = 0;
    for p in passengers {
        let flipped = participation::Entity::update_many()
            .col_expr(participation::Column::IsCancelled, Expr::value(true))
            .col_expr(participation::Column::UpdatedAt, Expr::value(now_tz()))
            .filter(participation::Column::Id.eq(p.id))
            .filter(participation::Column::IsCancelled.eq(false))
            .exec(txn)
            .await?;

        // Already un-booked by someone else: no second refund
        if flipped.rows_affected == 1 {
            add_credits(txn, p.user_id, p.credits_paid).await?;
            refunded += 1;
        }
    }

    Ok(refunded)
}

/// Publishes a carpooling. The driver's participation is written in the same
/// transaction as the trip itself.
pub async fn create_carpooling(
    db: &DatabaseConnection,
    driver_id: Uuid,
    new: NewCarpooling,
    now: NaiveDateTime,
) -> AppResult<carpooling::Model> {
    let departure_at = new.departure_date.and_time(new.departure_time);
    let arrival_at = new.arrival_date.and_time(new.arrival_time);

    if new.departure_place.trim().is_empty() || new.arrival_place.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Departure and arrival places are required".to_string(),
        ));
    }
    if lifecycle::has_started(departure_at, now) {
        return Err(AppError::BadRequest(
            "Departure must be in the future".to_string(),
        ));
    }
    if arrival_at <= departure_at {
        return Err(AppError::BadRequest(
            "Arrival must be after departure".to_string(),
        ));
    }
    if new.price_per_person < 0 {
        return Err(AppError::BadRequest(
            "Price per person cannot be negative".to_string(),
        ));
    }

    let txn = db.begin().await?;
    let result = create_in(&txn, driver_id, new).await;
    let trip = finish(txn, "carpooling creation", result).await?;

    tracing::info!(
        carpooling_id = %trip.id,
        driver_id = %driver_id,
        seat_count = trip.seat_count,
        price = trip.price_per_person,
        "Carpooling created"
    );
    Ok(trip)
}

async fn create_in(
    txn: &DatabaseTransaction,
    driver_id: Uuid,
    new: NewCarpooling,
) -> AppResult<carpooling::Model> {
    let driver = user::Entity::find_by_id(driver_id)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if !driver.is_driver {
        return Err(AppError::Forbidden(
            "Only drivers can publish carpoolings".to_string(),
        ));
    }

    let car = car::Entity::find_by_id(new.car_id)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Car not found".to_string()))?;

    if car.user_id != driver_id {
        return Err(AppError::Forbidden(
            "You can only publish carpoolings with your own cars".to_string(),
        ));
    }

    let seat_count = lifecycle::initial_seat_count(car.seats, new.seat_count)?;
    let now = now_tz();

    let trip = carpooling::ActiveModel {
        id: Set(Uuid::new_v4()),
        car_id: Set(car.id),
        departure_place: Set(new.departure_place.trim().to_string()),
        departure_place_key: Set(search::place_key(&new.departure_place)),
        departure_date: Set(new.departure_date),
        departure_time: Set(new.departure_time),
        arrival_place: Set(new.arrival_place.trim().to_string()),
        arrival_place_key: Set(search::place_key(&new.arrival_place)),
        arrival_date: Set(new.arrival_date),
        arrival_time: Set(new.arrival_time),
        seat_count: Set(seat_count),
        offered_seats: Set(seat_count),
        price_per_person: Set(new.price_per_person),
        is_eco: Set(car.energy.is_eco()),
        status: Set(CarpoolingStatus::Open),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(txn)
    .await?;

    participation::ActiveModel {
        id: Set(Uuid::new_v4()),
        carpooling_id: Set(trip.id),
        user_id: Set(driver_id),
        is_driver: Set(true),
        is_cancelled: Set(false),
        credits_paid: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(txn)
    .await?;

    Ok(trip)
}

/// Books one seat for a passenger and debits the trip price from their credits.
pub async fn join(
    db: &DatabaseConnection,
    carpooling_id: Uuid,
    user_id: Uuid,
    now: NaiveDateTime,
) -> AppResult<Booking> {
    let txn = db.begin().await?;
    let result = join_in(&txn, carpooling_id, user_id, now).await;
    let booking = finish(txn, "join", result).await?;

    tracing::info!(
        carpooling_id = %carpooling_id,
        user_id = %user_id,
        seats_left = booking.carpooling.seat_count,
        status = ?booking.carpooling.status,
        "Passenger joined carpooling"
    );
    Ok(booking)
}

async fn join_in(
    txn: &DatabaseTransaction,
    carpooling_id: Uuid,
    user_id: Uuid,
    now: NaiveDateTime,
) -> AppResult<Booking> {
    let trip = find_carpooling(txn, carpooling_id).await?;

    let existing = participation::Entity::find()
        .filter(participation::Column::CarpoolingId.eq(carpooling_id))
        .filter(participation::Column::UserId.eq(user_id))
        .one(txn)
        .await?;

    if let Some(p) = &existing {
        if p.is_driver {
            return Err(AppError::Conflict(
                "The driver cannot join their own carpooling".to_string(),
            ));
        }
        if !p.is_cancelled {
            return Err(AppError::Conflict(
                "You already joined this carpooling".to_string(),
            ));
        }
    }

    lifecycle::ensure_joinable(trip.status)?;
    if lifecycle::has_started(trip.departure_at(), now) {
        return Err(AppError::Conflict(
            "Carpooling has already departed".to_string(),
        ));
    }

    let price = trip.price_per_person;
    let stamp = now_tz();

    reserve_seat(txn, carpooling_id).await?;

    let debited = user::Entity::update_many()
        .col_expr(user::Column::Credits, Expr::col(user::Column::Credits).sub(price))
        .col_expr(user::Column::UpdatedAt, Expr::value(stamp))
        .filter(user::Column::Id.eq(user_id))
        .filter(user::Column::Credits.gte(price))
        .exec(txn)
        .await?;

    if debited.rows_affected == 0 {
        return Err(AppError::Conflict("Insufficient credits".to_string()));
    }

    let participation = match existing {
        // Rejoining after leaving reuses the cancelled row
        Some(p) => {
            let revived = participation::Entity::update_many()
                .col_expr(participation::Column::IsCancelled, Expr::value(false))
                .col_expr(participation::Column::CreditsPaid, Expr::value(price))
                .col_expr(participation::Column::UpdatedAt, Expr::value(stamp))
                .filter(participation::Column::Id.eq(p.id))
                .filter(participation::Column::IsCancelled.eq(true))
                .exec(txn)
                .await?;

            if revived.rows_affected == 0 {
                return Err(AppError::Conflict(
                    "You already joined this carpooling".to_string(),
                ));
            }

            participation::Entity::find_by_id(p.id)
                .one(txn)
                .await?
                .ok_or_else(|| AppError::Consistency("Participation vanished".to_string()))?
        }
        None => {
            participation::ActiveModel {
                id: Set(Uuid::new_v4()),
                carpooling_id: Set(carpooling_id),
                user_id: Set(user_id),
                is_driver: Set(false),
                is_cancelled: Set(false),
                credits_paid: Set(price),
                created_at: Set(stamp),
                updated_at: Set(stamp),
            }
            .insert(txn)
            .await?
        }
    };

    let carpooling = find_carpooling(txn, carpooling_id).await?;
    Ok(Booking {
        carpooling,
        participation,
    })
}

/// Cancels the caller's own booking and refunds what they paid.
pub async fn leave(
    db: &DatabaseConnection,
    carpooling_id: Uuid,
    user_id: Uuid,
    now: NaiveDateTime,
) -> AppResult<carpooling::Model> {
    let txn = db.begin().await?;
    let result = leave_in(&txn, carpooling_id, user_id, now).await;
    let trip = finish(txn, "leave", result).await?;

    tracing::info!(
        carpooling_id = %carpooling_id,
        user_id = %user_id,
        seats_left = trip.seat_count,
        "Passenger left carpooling"
    );
    Ok(trip)
}

async fn leave_in(
    txn: &DatabaseTransaction,
    carpooling_id: Uuid,
    user_id: Uuid,
    now: NaiveDateTime,
) -> AppResult<carpooling::Model> {
    let trip = find_carpooling(txn, carpooling_id).await?;

    let own = participation::Entity::find()
        .filter(participation::Column::CarpoolingId.eq(carpooling_id))
        .filter(participation::Column::UserId.eq(user_id))
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("You are not part of this carpooling".to_string()))?;

    if own.is_driver {
        return Err(AppError::Conflict(
            "The driver cancels the carpooling instead of leaving it".to_string(),
        ));
    }

    lifecycle::ensure_modifiable(trip.status)?;

    if own.is_cancelled {
        return Err(AppError::Conflict(
            "You already left this carpooling".to_string(),
        ));
    }
    if lifecycle::has_started(trip.departure_at(), now) {
        return Err(AppError::Conflict(
            "Carpooling has already departed".to_string(),
        ));
    }

    let stamp = now_tz();

    // Flip first: a duplicate leave racing this one finds nothing to flip
    let flipped = participation::Entity::update_many()
        .col_expr(participation::Column::IsCancelled, Expr::value(true))
        .col_expr(participation::Column::UpdatedAt, Expr::value(stamp))
        .filter(participation::Column::Id.eq(own.id))
        .filter(participation::Column::IsCancelled.eq(false))
        .exec(txn)
        .await?;

    if flipped.rows_affected == 0 {
        return Err(AppError::Conflict(
            "You already left this carpooling".to_string(),
        ));
    }

    add_credits(txn, user_id, own.credits_paid).await?;

    release_seat(txn, carpooling_id).await?;

    find_carpooling(txn, carpooling_id).await
}

/// Cancels the whole carpooling. Only its driver may do this; every active
/// passenger is un-booked and refunded.
pub async fn cancel(
    db: &DatabaseConnection,
    carpooling_id: Uuid,
    user_id: Uuid,
) -> AppResult<carpooling::Model> {
    let txn = db.begin().await?;
    let result = cancel_in(&txn, carpooling_id, user_id).await;
    let (trip, refunded) = finish(txn, "cancellation", result).await?;

    tracing::info!(
        carpooling_id = %carpooling_id,
        driver_id = %user_id,
        refunded,
        "Carpooling cancelled"
    );
    Ok(trip)
}

async fn cancel_in(
    txn: &DatabaseTransaction,
    carpooling_id: Uuid,
    user_id: Uuid,
) -> AppResult<(carpooling::Model, usize)> {
    let trip = find_carpooling(txn, carpooling_id).await?;
    let driver = find_driver(txn, carpooling_id).await?;

    if driver.user_id != user_id {
        return Err(AppError::Forbidden(
            "Only the driver can cancel this carpooling".to_string(),
        ));
    }

    lifecycle::ensure_modifiable(trip.status)?;

    // Every seat comes back since every passenger is un-booked below
    let cancelled = carpooling::Entity::update_many()
        .col_expr(
            carpooling::Column::Status,
            Expr::value(CarpoolingStatus::Cancelled),
        )
        .col_expr(
            carpooling::Column::SeatCount,
            Expr::col(carpooling::Column::OfferedSeats).into(),
        )
        .col_expr(carpooling::Column::UpdatedAt, Expr::value(now_tz()))
        .filter(carpooling::Column::Id.eq(carpooling_id))
        .filter(carpooling::Column::Status.is_in(ACTIVE_STATUSES))
        .exec(txn)
        .await?;

    if cancelled.rows_affected == 0 {
        return Err(AppError::Conflict(
            "Carpooling is already cancelled or completed".to_string(),
        ));
    }

    let refunded = refund_passengers(txn, carpooling_id).await?;
    let trip = find_carpooling(txn, carpooling_id).await?;
    Ok((trip, refunded))
}

/// Marks a carpooling COMPLETED and pays its driver what the active
/// passengers paid. `actor` is the requesting driver, or `None` when a
/// trusted caller (scheduler, administrator) completes the trip.
pub async fn complete(
    db: &DatabaseConnection,
    carpooling_id: Uuid,
    actor: Option<Uuid>,
) -> AppResult<carpooling::Model> {
    let txn = db.begin().await?;
    let result = complete_in(&txn, carpooling_id, actor).await;
    let (trip, earned) = finish(txn, "completion", result).await?;

    tracing::info!(carpooling_id = %carpooling_id, earned, "Carpooling completed");
    Ok(trip)
}

async fn complete_in(
    txn: &DatabaseTransaction,
    carpooling_id: Uuid,
    actor: Option<Uuid>,
) -> AppResult<(carpooling::Model, i32)> {
    let trip = find_carpooling(txn, carpooling_id).await?;
    let driver = find_driver(txn, carpooling_id).await?;

    if let Some(actor) = actor {
        if driver.user_id != actor {
            return Err(AppError::Forbidden(
                "Only the driver can complete this carpooling".to_string(),
            ));
        }
    }

    lifecycle::ensure_modifiable(trip.status)?;

    let completed = carpooling::Entity::update_many()
        .col_expr(
            carpooling::Column::Status,
            Expr::value(CarpoolingStatus::Completed),
        )
        .col_expr(carpooling::Column::UpdatedAt, Expr::value(now_tz()))
        .filter(carpooling::Column::Id.eq(carpooling_id))
        .filter(carpooling::Column::Status.is_in(ACTIVE_STATUSES))
        .exec(txn)
        .await?;

    if completed.rows_affected == 0 {
        return Err(AppError::Conflict(
            "Carpooling is already cancelled or completed".to_string(),
        ));
    }

    let earned: i32 = participation::Entity::find()
        .filter(participation::Column::CarpoolingId.eq(carpooling_id))
        .filter(participation::Column::IsDriver.eq(false))
        .filter(participation::Column::IsCancelled.eq(false))
        .all(txn)
        .await?
        .iter()
        .map(|p| p.credits_paid)
        .sum();

    add_credits(txn, driver.user_id, earned).await?;

    let trip = find_carpooling(txn, carpooling_id).await?;
    Ok((trip, earned))
}

//! Delete paths. Ownership cascades are spelled out here instead of being
//! left to `ON DELETE` clauses in the schema.

use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, DatabaseTransaction, EntityTrait, PaginatorTrait,
    QueryFilter, TransactionTrait,
};
use uuid::Uuid;

use crate::entities::{car, carpooling, participation, review, user};
use crate::error::{AppError, AppResult};
use crate::services::ledger::{finish, refund_passengers};
use crate::services::lifecycle;

/// Removes a carpooling together with the participations it owns. Passengers
/// of a trip that is still running are refunded first.
pub async fn delete_carpooling(db: &DatabaseConnection, carpooling_id: Uuid) -> AppResult<()> {
    let txn = db.begin().await?;
    let result = delete_carpooling_in(&txn, carpooling_id).await;
    let refunded = finish(txn, "carpooling deletion", result).await?;

    tracing::info!(carpooling_id = %carpooling_id, refunded, "Carpooling deleted");
    Ok(())
}

async fn delete_carpooling_in(txn: &DatabaseTransaction, carpooling_id: Uuid) -> AppResult<usize> {
    let trip = carpooling::Entity::find_by_id(carpooling_id)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Carpooling not found".to_string()))?;

    let refunded = if lifecycle::is_terminal(trip.status) {
        0
    } else {
        refund_passengers(txn, carpooling_id).await?
    };

    participation::Entity::delete_many()
        .filter(participation::Column::CarpoolingId.eq(carpooling_id))
        .exec(txn)
        .await?;

    carpooling::Entity::delete_by_id(carpooling_id)
        .exec(txn)
        .await?;

    Ok(refunded)
}

/// Deletes a user account.
///
/// Users who took part in any carpooling, or whose cars carried one, are kept
/// for the trip history and the deletion is refused. Otherwise the reviews
/// they wrote or received and their cars go with them.
pub async fn delete_user(db: &DatabaseConnection, user_id: Uuid) -> AppResult<()> {
    let txn = db.begin().await?;
    let result = delete_user_in(&txn, user_id).await;
    finish(txn, "user deletion", result).await?;

    tracing::info!(user_id = %user_id, "User deleted");
    Ok(())
}

async fn delete_user_in(txn: &DatabaseTransaction, user_id: Uuid) -> AppResult<()> {
    user::Entity::find_by_id(user_id)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let participations = participation::Entity::find()
        .filter(participation::Column::UserId.eq(user_id))
        .count(txn)
        .await?;

    if participations > 0 {
        return Err(AppError::Conflict(
            "User has carpooling history and cannot be deleted".to_string(),
        ));
    }

    let car_ids: Vec<Uuid> = car::Entity::find()
        .filter(car::Column::UserId.eq(user_id))
        .all(txn)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect();

    if !car_ids.is_empty() {
        let used = carpooling::Entity::find()
            .filter(carpooling::Column::CarId.is_in(car_ids.clone()))
            .count(txn)
            .await?;

        if used > 0 {
            return Err(AppError::Conflict(
                "User's cars are referenced by carpoolings".to_string(),
            ));
        }
    }

    review::Entity::delete_many()
        .filter(
            Condition::any()
                .add(review::Column::AuthorId.eq(user_id))
                .add(review::Column::ReviewedUserId.eq(user_id)),
        )
        .exec(txn)
        .await?;

    car::Entity::delete_many()
        .filter(car::Column::UserId.eq(user_id))
        .exec(txn)
        .await?;

    user::Entity::delete_by_id(user_id).exec(txn).await?;

    Ok(())
}

/// Deletes one of the owner's cars, unless a carpooling references it.
pub async fn delete_car(db: &DatabaseConnection, owner_id: Uuid, car_id: Uuid) -> AppResult<()> {
    let txn = db.begin().await?;
    let result = delete_car_in(&txn, owner_id, car_id).await;
    finish(txn, "car deletion", result).await?;

    tracing::info!(car_id = %car_id, owner_id = %owner_id, "Car deleted");
    Ok(())
}

async fn delete_car_in(txn: &DatabaseTransaction, owner_id: Uuid, car_id: Uuid) -> AppResult<()> {
    let car = car::Entity::find_by_id(car_id)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Car not found".to_string()))?;

    if car.user_id != owner_id {
        return Err(AppError::Forbidden(
            "You can only delete your own cars".to_string(),
        ));
    }

    let used = carpooling::Entity::find()
        .filter(carpooling::Column::CarId.eq(car_id))
        .count(txn)
        .await?;

    if used > 0 {
        return Err(AppError::Conflict(
            "Car is referenced by carpoolings".to_string(),
        ));
    }

    // Drop the "currently used car" pointer before the row goes away
    user::Entity::update_many()
        .col_expr(
            user::Column::CurrentCarId,
            sea_orm::sea_query::Expr::value(Option::<Uuid>::None),
        )
        .filter(user::Column::CurrentCarId.eq(car_id))
        .exec(txn)
        .await?;

    car::Entity::delete_by_id(car_id).exec(txn).await?;

    Ok(())
}

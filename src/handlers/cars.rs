use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::entities::car::{self, Energy};
use crate::entities::brand;
use crate::error::{AppError, AppResult};
use crate::extract::{ValidJson, ValidPath};
use crate::services::{cascade, lifecycle};
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateCarRequest {
    pub brand_id: i32,
    #[validate(length(min = 1, max = 50))]
    pub model: String,
    #[validate(length(min = 1, max = 30))]
    pub color: String,
    #[validate(length(min = 4, max = 20))]
    pub plate: String,
    pub energy: Energy,
    /// Total seats, driver included
    #[validate(range(min = 2, max = 9))]
    pub seats: i32,
    #[serde(default)]
    pub pet_friendly: bool,
}

#[derive(Debug, Serialize)]
pub struct CarResponse {
    pub id: Uuid,
    pub brand: String,
    pub model: String,
    pub color: String,
    pub plate: String,
    pub energy: Energy,
    pub seats: i32,
    pub bookable_seats: i32,
    pub pet_friendly: bool,
}

fn car_response(c: car::Model, brand: String) -> CarResponse {
    CarResponse {
        id: c.id,
        brand,
        model: c.model,
        color: c.color,
        plate: c.plate,
        energy: c.energy,
        seats: c.seats,
        bookable_seats: lifecycle::bookable_seats(c.seats),
        pet_friendly: c.pet_friendly,
    }
}

/// List all brands
pub async fn list_brands(State(state): State<AppState>) -> AppResult<Json<Vec<brand::Model>>> {
    let brands = brand::Entity::find()
        .order_by_asc(brand::Column::Name)
        .all(&state.db)
        .await?;

    Ok(Json(brands))
}

/// List the current user's cars
pub async fn my_cars(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<CarResponse>>> {
    let cars = car::Entity::find()
        .filter(car::Column::UserId.eq(claims.sub))
        .order_by_asc(car::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let brands: HashMap<i32, String> = brand::Entity::find()
        .all(&state.db)
        .await?
        .into_iter()
        .map(|b| (b.id, b.name))
        .collect();

    let responses = cars
        .into_iter()
        .map(|c| {
            let brand = brands.get(&c.brand_id).cloned().unwrap_or_default();
            car_response(c, brand)
        })
        .collect();

    Ok(Json(responses))
}

/// Register a car owned by the current user
pub async fn create_car(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidJson(payload): ValidJson<CreateCarRequest>,
) -> AppResult<(StatusCode, Json<CarResponse>)> {
    payload.validate()?;

    let brand = brand::Entity::find_by_id(payload.brand_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid brand".to_string()))?;

    let plate = payload.plate.trim().to_uppercase();
    let existing = car::Entity::find()
        .filter(car::Column::Plate.eq(&plate))
        .one(&state.db)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict("Plate already registered".to_string()));
    }

    let car = car::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(claims.sub),
        brand_id: Set(brand.id),
        model: Set(payload.model.trim().to_string()),
        color: Set(payload.color.trim().to_string()),
        plate: Set(plate),
        energy: Set(payload.energy),
        seats: Set(payload.seats),
        pet_friendly: Set(payload.pet_friendly),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.db)
    .await?;

    tracing::info!(car_id = %car.id, owner_id = %claims.sub, "Car registered");
    Ok((StatusCode::CREATED, Json(car_response(car, brand.name))))
}

/// Delete one of the current user's cars
pub async fn delete_car(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidPath(car_id): ValidPath<Uuid>,
) -> AppResult<StatusCode> {
    cascade::delete_car(&state.db, claims.sub, car_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

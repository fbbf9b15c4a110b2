use axum::{body::Bytes, extract::State, http::StatusCode, Extension, Json};
use chrono::{NaiveDate, NaiveTime};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::entities::{participation, user};
use crate::error::{AppError, AppResult};
use crate::extract::{ValidJson, ValidPath, ValidQuery};
use crate::services::ledger::{self, NewCarpooling};
use crate::services::search::{self, CarpoolingSummary, SearchFilter, SearchQuery};
use crate::services::views::{self, MyCarpoolings};
use crate::utils::jwt::Claims;
use crate::AppState;

// ============ Search ============

/// Search carpoolings by departure place, arrival place and day
pub async fn list_carpoolings(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<SearchQuery>,
) -> AppResult<Json<Vec<CarpoolingSummary>>> {
    let filter = SearchFilter::try_from(query)?;
    Ok(Json(search::search(&state.db, &filter).await?))
}

/// Get carpooling details
pub async fn get_carpooling(
    State(state): State<AppState>,
    ValidPath(carpooling_id): ValidPath<Uuid>,
) -> AppResult<Json<CarpoolingSummary>> {
    Ok(Json(search::find_summary(&state.db, carpooling_id).await?))
}

// ============ Lifecycle ============

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateCarpoolingRequest {
    pub car_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub departure_place: String,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    #[validate(length(min = 1, max = 255))]
    pub arrival_place: String,
    pub arrival_date: NaiveDate,
    pub arrival_time: NaiveTime,
    #[validate(range(min = 0))]
    pub price_per_person: i32,
    /// Seats offered to passengers; every bookable seat of the car when absent
    #[validate(range(min = 1))]
    pub seat_count: Option<i32>,
}

impl From<CreateCarpoolingRequest> for NewCarpooling {
    fn from(req: CreateCarpoolingRequest) -> Self {
        Self {
            car_id: req.car_id,
            departure_place: req.departure_place,
            departure_date: req.departure_date,
            departure_time: req.departure_time,
            arrival_place: req.arrival_place,
            arrival_date: req.arrival_date,
            arrival_time: req.arrival_time,
            price_per_person: req.price_per_person,
            seat_count: req.seat_count,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinRequest {
    #[serde(default)]
    pub as_driver: bool,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub participation_id: Uuid,
    pub credits_paid: i32,
    pub credits_left: i32,
    pub carpooling: CarpoolingSummary,
}

/// Publish a carpooling; the caller becomes its driver
pub async fn create_carpooling(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidJson(payload): ValidJson<CreateCarpoolingRequest>,
) -> AppResult<(StatusCode, Json<CarpoolingSummary>)> {
    payload.validate()?;

    let trip = ledger::create_carpooling(
        &state.db,
        claims.sub,
        payload.into(),
        state.config.local_now(),
    )
    .await?;

    let summary = search::find_summary(&state.db, trip.id).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Book a seat as passenger. The body is optional.
pub async fn join_carpooling(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidPath(carpooling_id): ValidPath<Uuid>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<JoinResponse>)> {
    let intent: JoinRequest = if body.iter().all(u8::is_ascii_whitespace) {
        JoinRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid join request: {}", e)))?
    };

    if intent.as_driver {
        return Err(AppError::Conflict(
            "Carpooling already has a driver".to_string(),
        ));
    }

    let booking = ledger::join(
        &state.db,
        carpooling_id,
        claims.sub,
        state.config.local_now(),
    )
    .await?;

    let passenger = user::Entity::find_by_id(claims.sub)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(JoinResponse {
            participation_id: booking.participation.id,
            credits_paid: booking.participation.credits_paid,
            credits_left: passenger.credits,
            carpooling: search::find_summary(&state.db, carpooling_id).await?,
        }),
    ))
}

/// Cancel the caller's own booking
pub async fn leave_carpooling(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidPath(carpooling_id): ValidPath<Uuid>,
) -> AppResult<Json<CarpoolingSummary>> {
    ledger::leave(
        &state.db,
        carpooling_id,
        claims.sub,
        state.config.local_now(),
    )
    .await?;

    Ok(Json(search::find_summary(&state.db, carpooling_id).await?))
}

/// Cancel the whole carpooling (driver only)
pub async fn cancel_carpooling(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidPath(carpooling_id): ValidPath<Uuid>,
) -> AppResult<Json<CarpoolingSummary>> {
    ledger::cancel(&state.db, carpooling_id, claims.sub).await?;
    Ok(Json(search::find_summary(&state.db, carpooling_id).await?))
}

/// Mark the carpooling as completed (driver only)
pub async fn complete_carpooling(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidPath(carpooling_id): ValidPath<Uuid>,
) -> AppResult<Json<CarpoolingSummary>> {
    ledger::complete(&state.db, carpooling_id, Some(claims.sub)).await?;
    Ok(Json(search::find_summary(&state.db, carpooling_id).await?))
}

// ============ Participation views ============

#[derive(Debug, Serialize)]
pub struct PassengerInfo {
    pub participation_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub photo: Option<String>,
    pub credits_paid: i32,
}

/// Active passengers of a carpooling (driver only)
pub async fn carpooling_passengers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidPath(carpooling_id): ValidPath<Uuid>,
) -> AppResult<Json<Vec<PassengerInfo>>> {
    let participations = participation::Entity::find()
        .filter(participation::Column::CarpoolingId.eq(carpooling_id))
        .order_by_asc(participation::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let driver = participations
        .iter()
        .find(|p| p.is_driver)
        .ok_or_else(|| AppError::NotFound("Carpooling not found".to_string()))?;

    if driver.user_id != claims.sub {
        return Err(AppError::Forbidden(
            "Only the driver can list passengers".to_string(),
        ));
    }

    let passengers: Vec<participation::Model> = participations
        .into_iter()
        .filter(|p| !p.is_driver && !p.is_cancelled)
        .collect();

    let users = user::Entity::find()
        .filter(user::Column::Id.is_in(passengers.iter().map(|p| p.user_id).collect::<Vec<_>>()))
        .all(&state.db)
        .await?;

    let responses = passengers
        .into_iter()
        .filter_map(|p| {
            let u = users.iter().find(|u| u.id == p.user_id)?;
            Some(PassengerInfo {
                participation_id: p.id,
                user_id: u.id,
                username: u.username.clone(),
                photo: u.photo.clone(),
                credits_paid: p.credits_paid,
            })
        })
        .collect();

    Ok(Json(responses))
}

/// The caller's carpoolings split into active ones and history
pub async fn my_carpoolings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<MyCarpoolings>> {
    Ok(Json(views::my_carpoolings(&state.db, claims.sub).await?))
}

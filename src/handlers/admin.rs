use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::entities::review::{self, ReviewStatus};
use crate::entities::user::{self, UserRole};
use crate::entities::brand;
use crate::error::{AppError, AppResult};
use crate::extract::{ValidJson, ValidPath, ValidQuery};
use crate::services::search::{self, CarpoolingSummary};
use crate::services::{cascade, ledger};
use crate::utils::jwt::Claims;
use crate::AppState;

// ============ User Management ============

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: UserRole,
    pub credits: i32,
    pub is_driver: bool,
    pub created_at: DateTime<Utc>,
}

/// List all users (admin)
pub async fn list_all_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserResponse>>> {
    let users = user::Entity::find()
        .order_by_asc(user::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let responses: Vec<UserResponse> = users
        .into_iter()
        .map(|u| UserResponse {
            id: u.id,
            email: u.email,
            username: u.username,
            role: u.role,
            credits: u.credits,
            is_driver: u.is_driver,
            created_at: u.created_at.with_timezone(&Utc),
        })
        .collect();

    Ok(Json(responses))
}

/// Delete a user (admin)
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidPath(user_id): ValidPath<Uuid>,
) -> AppResult<StatusCode> {
    if user_id == claims.sub {
        return Err(AppError::BadRequest(
            "Administrators cannot delete themselves".to_string(),
        ));
    }

    cascade::delete_user(&state.db, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Catalog ============

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateBrandRequest {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
}

/// Add a car brand (admin)
pub async fn create_brand(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<CreateBrandRequest>,
) -> AppResult<(StatusCode, Json<brand::Model>)> {
    payload.validate()?;

    let name = payload.name.trim().to_string();
    let existing = brand::Entity::find()
        .filter(brand::Column::Name.eq(&name))
        .one(&state.db)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict("Brand already exists".to_string()));
    }

    let brand = brand::ActiveModel {
        name: Set(name),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(brand)))
}

// ============ Review Moderation ============

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewFilter {
    pub status: Option<ReviewStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModerateReviewRequest {
    pub status: ReviewStatus,
}

/// List reviews, optionally by status (admin)
pub async fn list_reviews(
    State(state): State<AppState>,
    ValidQuery(filter): ValidQuery<ReviewFilter>,
) -> AppResult<Json<Vec<review::Model>>> {
    let mut query = review::Entity::find().order_by_asc(review::Column::CreatedAt);
    if let Some(status) = filter.status {
        query = query.filter(review::Column::Status.eq(status));
    }

    Ok(Json(query.all(&state.db).await?))
}

/// Approve or reject a review (admin)
pub async fn moderate_review(
    State(state): State<AppState>,
    ValidPath(review_id): ValidPath<Uuid>,
    ValidJson(payload): ValidJson<ModerateReviewRequest>,
) -> AppResult<Json<review::Model>> {
    let review = review::Entity::find_by_id(review_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Review not found".to_string()))?;

    let mut active: review::ActiveModel = review.into();
    active.status = Set(payload.status);

    let result = active.update(&state.db).await?;
    tracing::info!(review_id = %review_id, status = ?result.status, "Review moderated");
    Ok(Json(result))
}

// ============ Carpooling Management ============

/// Complete a carpooling on behalf of its driver (admin, scheduler)
pub async fn complete_carpooling(
    State(state): State<AppState>,
    ValidPath(carpooling_id): ValidPath<Uuid>,
) -> AppResult<Json<CarpoolingSummary>> {
    ledger::complete(&state.db, carpooling_id, None).await?;
    Ok(Json(search::find_summary(&state.db, carpooling_id).await?))
}

/// Delete a carpooling and its participations (admin)
pub async fn delete_carpooling(
    State(state): State<AppState>,
    ValidPath(carpooling_id): ValidPath<Uuid>,
) -> AppResult<StatusCode> {
    cascade::delete_carpooling(&state.db, carpooling_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

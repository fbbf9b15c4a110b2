use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::entities::carpooling::{self, CarpoolingStatus};
use crate::entities::review::{self, ReviewStatus};
use crate::entities::{participation, user};
use crate::error::{AppError, AppResult};
use crate::extract::{ValidJson, ValidPath};
use crate::services::search::ratings;
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateReviewRequest {
    pub reviewed_user_id: Uuid,
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    #[validate(length(min = 1, max = 2000))]
    pub comment: String,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub author: String,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UserReviewsResponse {
    pub user_id: Uuid,
    pub rating: Option<f64>,
    pub reviews: Vec<ReviewResponse>,
}

/// Whether both users rode, uncancelled, in the same completed carpooling
async fn travelled_together(state: &AppState, a: Uuid, b: Uuid) -> AppResult<bool> {
    let trips_of = |user_id: Uuid| {
        participation::Entity::find()
            .filter(participation::Column::UserId.eq(user_id))
            .filter(participation::Column::IsCancelled.eq(false))
    };

    let a_trips: Vec<Uuid> = trips_of(a)
        .all(&state.db)
        .await?
        .into_iter()
        .map(|p| p.carpooling_id)
        .collect();

    let shared: Vec<Uuid> = trips_of(b)
        .filter(participation::Column::CarpoolingId.is_in(a_trips))
        .all(&state.db)
        .await?
        .into_iter()
        .map(|p| p.carpooling_id)
        .collect();

    let completed = carpooling::Entity::find()
        .filter(carpooling::Column::Id.is_in(shared))
        .filter(carpooling::Column::Status.eq(CarpoolingStatus::Completed))
        .count(&state.db)
        .await?;

    Ok(completed > 0)
}

/// Review another user after a shared trip; the review awaits moderation
pub async fn create_review(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidJson(payload): ValidJson<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<review::Model>)> {
    payload.validate()?;

    if payload.reviewed_user_id == claims.sub {
        return Err(AppError::BadRequest("You cannot review yourself".to_string()));
    }

    user::Entity::find_by_id(payload.reviewed_user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if !travelled_together(&state, claims.sub, payload.reviewed_user_id).await? {
        return Err(AppError::Forbidden(
            "You can only review users you completed a carpooling with".to_string(),
        ));
    }

    let already = review::Entity::find()
        .filter(review::Column::AuthorId.eq(claims.sub))
        .filter(review::Column::ReviewedUserId.eq(payload.reviewed_user_id))
        .filter(review::Column::Status.ne(ReviewStatus::Rejected))
        .count(&state.db)
        .await?;

    if already > 0 {
        return Err(AppError::Conflict(
            "You already reviewed this user".to_string(),
        ));
    }

    let review = review::ActiveModel {
        id: Set(Uuid::new_v4()),
        author_id: Set(claims.sub),
        reviewed_user_id: Set(payload.reviewed_user_id),
        comment: Set(payload.comment.trim().to_string()),
        rating: Set(payload.rating),
        status: Set(ReviewStatus::Pending),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(review)))
}

/// Approved reviews about a user, newest first
pub async fn user_reviews(
    State(state): State<AppState>,
    ValidPath(user_id): ValidPath<Uuid>,
) -> AppResult<Json<UserReviewsResponse>> {
    user::Entity::find_by_id(user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let reviews = review::Entity::find()
        .filter(review::Column::ReviewedUserId.eq(user_id))
        .filter(review::Column::Status.eq(ReviewStatus::Approved))
        .order_by_desc(review::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let authors: HashMap<Uuid, String> = user::Entity::find()
        .filter(user::Column::Id.is_in(reviews.iter().map(|r| r.author_id).collect::<Vec<_>>()))
        .all(&state.db)
        .await?
        .into_iter()
        .map(|u| (u.id, u.username))
        .collect();

    let rating = ratings(&state.db, vec![user_id]).await?.get(&user_id).copied();

    let reviews = reviews
        .into_iter()
        .map(|r| ReviewResponse {
            id: r.id,
            author: authors.get(&r.author_id).cloned().unwrap_or_default(),
            rating: r.rating,
            comment: r.comment,
            created_at: r.created_at.with_timezone(&Utc),
        })
        .collect();

    Ok(Json(UserReviewsResponse {
        user_id,
        rating,
        reviews,
    }))
}

use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::entities::car;
use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::extract::ValidJson;
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub photo: Option<String>,
    pub credits: i32,
    pub is_driver: bool,
    pub current_car_id: Option<Uuid>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for ProfileResponse {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            email: u.email,
            username: u.username,
            first_name: u.first_name,
            last_name: u.last_name,
            phone: u.phone,
            photo: u.photo,
            credits: u.credits,
            is_driver: u.is_driver,
            current_car_id: u.current_car_id,
            role: u.role,
            created_at: u.created_at.with_timezone(&Utc),
        }
    }
}

/// Absent fields are left untouched.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 100))]
    pub first_name: Option<String>,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(url, length(max = 255))]
    pub photo: Option<String>,
    pub is_driver: Option<bool>,
    pub current_car_id: Option<Uuid>,
}

async fn load_user(state: &AppState, id: Uuid) -> AppResult<user::Model> {
    user::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// Current user's profile and credit balance
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<ProfileResponse>> {
    Ok(Json(load_user(&state, claims.sub).await?.into()))
}

/// Update the current user's profile
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidJson(payload): ValidJson<UpdateProfileRequest>,
) -> AppResult<Json<ProfileResponse>> {
    payload.validate()?;

    let user = load_user(&state, claims.sub).await?;

    if let Some(car_id) = payload.current_car_id {
        let car = car::Entity::find_by_id(car_id)
            .one(&state.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Car not found".to_string()))?;

        if car.user_id != user.id {
            return Err(AppError::Forbidden(
                "You can only select one of your own cars".to_string(),
            ));
        }
    }

    let mut active: user::ActiveModel = user.into();

    if let Some(first_name) = payload.first_name {
        active.first_name = Set(Some(first_name));
    }
    if let Some(last_name) = payload.last_name {
        active.last_name = Set(Some(last_name));
    }
    if let Some(phone) = payload.phone {
        active.phone = Set(Some(phone));
    }
    if let Some(photo) = payload.photo {
        active.photo = Set(Some(photo));
    }
    if let Some(is_driver) = payload.is_driver {
        active.is_driver = Set(is_driver);
    }
    if let Some(car_id) = payload.current_car_id {
        active.current_car_id = Set(Some(car_id));
    }
    active.updated_at = Set(Utc::now().into());

    let updated = active.update(&state.db).await?;
    Ok(Json(updated.into()))
}

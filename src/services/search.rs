//! Carpooling search and the denormalized summaries shown on trip cards.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use sea_orm::{
    sea_query::{Expr, LikeExpr},
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::car::Energy;
use crate::entities::carpooling::{self, CarpoolingStatus};
use crate::entities::review::{self, ReviewStatus};
use crate::entities::{brand, car, participation, user};
use crate::error::{AppError, AppResult};

pub const DEFAULT_PER_PAGE: u64 = 20;
pub const MAX_PER_PAGE: u64 = 100;

/// Raw query string of `GET /carpoolings`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchQuery {
    #[serde(default, alias = "departurePlace")]
    pub departure_place: Option<String>,
    #[serde(default, alias = "arrivalPlace")]
    pub arrival_place: Option<String>,
    #[serde(default, alias = "departureDate")]
    pub departure_date: Option<String>,
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default, alias = "perPage")]
    pub per_page: Option<u64>,
}

/// Normalized filters. Empty strings from the query become `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchFilter {
    pub departure_place: Option<String>,
    pub arrival_place: Option<String>,
    pub departure_date: Option<NaiveDate>,
    pub page: u64,
    pub per_page: u64,
}

/// Search form of a place name. Stored next to the place and applied to the
/// search term, so case folding never depends on the database collation.
pub fn place_key(place: &str) -> String {
    place.trim().to_lowercase()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| place_key(&v)).filter(|v| !v.is_empty())
}

impl TryFrom<SearchQuery> for SearchFilter {
    type Error = AppError;

    fn try_from(query: SearchQuery) -> AppResult<Self> {
        let departure_date = match non_empty(query.departure_date) {
            None => None,
            Some(raw) => Some(NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
                AppError::BadRequest(format!(
                    "departure_date must be formatted as YYYY-MM-DD, got '{}'",
                    raw
                ))
            })?),
        };

        let page = query.page.unwrap_or(1);
        if page == 0 {
            return Err(AppError::BadRequest("page starts at 1".to_string()));
        }

        let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE);
        if !(1..=MAX_PER_PAGE).contains(&per_page) {
            return Err(AppError::BadRequest(format!(
                "per_page must be between 1 and {}",
                MAX_PER_PAGE
            )));
        }

        Ok(Self {
            departure_place: non_empty(query.departure_place),
            arrival_place: non_empty(query.arrival_place),
            departure_date,
            page,
            per_page,
        })
    }
}

/// `%term%` with LIKE wildcards in the term escaped.
pub fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn place_contains(column: carpooling::Column, term: &str) -> sea_orm::sea_query::SimpleExpr {
    Expr::col(column).like(LikeExpr::new(contains_pattern(term)).escape('\\'))
}

impl SearchFilter {
    /// Conjunction of whichever filters are present.
    pub fn condition(&self) -> Condition {
        Condition::all()
            .add_option(
                self.departure_place
                    .as_deref()
                    .map(|term| place_contains(carpooling::Column::DeparturePlaceKey, term)),
            )
            .add_option(
                self.arrival_place
                    .as_deref()
                    .map(|term| place_contains(carpooling::Column::ArrivalPlaceKey, term)),
            )
            .add_option(
                self.departure_date
                    .map(|day| carpooling::Column::DepartureDate.eq(day)),
            )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverInfo {
    pub id: Uuid,
    pub username: String,
    pub photo: Option<String>,
    /// Mean of approved reviews, `None` until the first one.
    pub rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CarInfo {
    pub id: Uuid,
    pub brand: String,
    pub model: String,
    pub color: String,
    pub energy: Energy,
    pub pet_friendly: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CarpoolingSummary {
    pub id: Uuid,
    pub departure_place: String,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub arrival_place: String,
    pub arrival_date: NaiveDate,
    pub arrival_time: NaiveTime,
    pub seat_count: i32,
    pub offered_seats: i32,
    pub price_per_person: i32,
    pub is_eco: bool,
    pub status: CarpoolingStatus,
    pub driver: DriverInfo,
    pub car: CarInfo,
}

pub async fn search<C: ConnectionTrait>(
    db: &C,
    filter: &SearchFilter,
) -> AppResult<Vec<CarpoolingSummary>> {
    let trips = carpooling::Entity::find()
        .filter(filter.condition())
        .order_by_asc(carpooling::Column::DepartureDate)
        .order_by_asc(carpooling::Column::DepartureTime)
        .order_by_asc(carpooling::Column::CreatedAt)
        .offset((filter.page - 1) * filter.per_page)
        .limit(filter.per_page)
        .all(db)
        .await?;

    tracing::debug!(
        departure_place = ?filter.departure_place,
        arrival_place = ?filter.arrival_place,
        departure_date = ?filter.departure_date,
        results = trips.len(),
        "Carpooling search"
    );

    summarize(db, trips).await
}

pub async fn find_summary<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<CarpoolingSummary> {
    let trip = carpooling::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Carpooling not found".to_string()))?;

    summarize(db, vec![trip])
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal(format!("Carpooling {} is missing its driver or car", id)))
}

/// Mean of approved ratings per reviewed user, rounded to one decimal.
pub async fn ratings<C: ConnectionTrait>(
    db: &C,
    user_ids: Vec<Uuid>,
) -> AppResult<HashMap<Uuid, f64>> {
    let reviews = review::Entity::find()
        .filter(review::Column::ReviewedUserId.is_in(user_ids))
        .filter(review::Column::Status.eq(ReviewStatus::Approved))
        .all(db)
        .await?;

    let mut totals: HashMap<Uuid, (i64, i64)> = HashMap::new();
    for r in reviews {
        let entry = totals.entry(r.reviewed_user_id).or_insert((0, 0));
        entry.0 += i64::from(r.rating);
        entry.1 += 1;
    }

    Ok(totals
        .into_iter()
        .map(|(id, (sum, count))| {
            let mean = sum as f64 / count as f64;
            (id, (mean * 10.0).round() / 10.0)
        })
        .collect())
}

/// Attaches driver and car details to each trip, keeping the input order.
/// A trip without its driver or car is an internal error, not a gap in the page.
pub async fn summarize<C: ConnectionTrait>(
    db: &C,
    trips: Vec<carpooling::Model>,
) -> AppResult<Vec<CarpoolingSummary>> {
    if trips.is_empty() {
        return Ok(Vec::new());
    }

    let trip_ids: Vec<Uuid> = trips.iter().map(|t| t.id).collect();
    let car_ids: Vec<Uuid> = trips.iter().map(|t| t.car_id).collect();

    let cars: HashMap<Uuid, car::Model> = car::Entity::find()
        .filter(car::Column::Id.is_in(car_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    let brand_ids: Vec<i32> = cars.values().map(|c| c.brand_id).collect();
    let brands: HashMap<i32, String> = brand::Entity::find()
        .filter(brand::Column::Id.is_in(brand_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|b| (b.id, b.name))
        .collect();

    let drivers: HashMap<Uuid, Uuid> = participation::Entity::find()
        .filter(participation::Column::CarpoolingId.is_in(trip_ids))
        .filter(participation::Column::IsDriver.eq(true))
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.carpooling_id, p.user_id))
        .collect();

    let driver_ids: Vec<Uuid> = drivers.values().copied().collect();
    let users: HashMap<Uuid, user::Model> = user::Entity::find()
        .filter(user::Column::Id.is_in(driver_ids.clone()))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let ratings = ratings(db, driver_ids).await?;

    let mut summaries = Vec::with_capacity(trips.len());
    for t in trips {
        let car = cars.get(&t.car_id);
        let driver = drivers.get(&t.id).and_then(|id| users.get(id));

        let (Some(car), Some(driver)) = (car, driver) else {
            return Err(AppError::Internal(format!(
                "Carpooling {} is missing its driver or car",
                t.id
            )));
        };

        summaries.push(CarpoolingSummary {
            id: t.id,
            departure_place: t.departure_place,
            departure_date: t.departure_date,
            departure_time: t.departure_time,
            arrival_place: t.arrival_place,
            arrival_date: t.arrival_date,
            arrival_time: t.arrival_time,
            seat_count: t.seat_count,
            offered_seats: t.offered_seats,
            price_per_person: t.price_per_person,
            is_eco: t.is_eco,
            status: t.status,
            driver: DriverInfo {
                id: driver.id,
                username: driver.username.clone(),
                photo: driver.photo.clone(),
                rating: ratings.get(&driver.id).copied(),
            },
            car: CarInfo {
                id: car.id,
                brand: brands.get(&car.brand_id).cloned().unwrap_or_default(),
                model: car.model.clone(),
                color: car.color.clone(),
                energy: car.energy,
                pet_friendly: car.pet_friendly,
            },
        });
    }

    Ok(summaries)
}

//! "My journeys" views: a caller's trips split into active ones and history.
//! Nothing is stored; the split is derived from the trip status and the
//! caller's own participation on every request.

use std::collections::HashMap;

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::carpooling::{self, CarpoolingStatus};
use crate::entities::participation;
use crate::error::AppResult;
use crate::services::search::{summarize, CarpoolingSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripView {
    Active,
    History,
}

/// A trip the caller still takes part in is active while it runs; anything
/// finished, cancelled, or left by the caller is history.
pub fn classify(status: CarpoolingStatus, own: &participation::Model) -> TripView {
    if own.is_cancelled {
        return TripView::History;
    }

    match status {
        CarpoolingStatus::Open | CarpoolingStatus::Full => TripView::Active,
        CarpoolingStatus::Cancelled | CarpoolingStatus::Completed => TripView::History,
    }
}

#[derive(Debug, Serialize)]
pub struct MyCarpooling {
    #[serde(flatten)]
    pub carpooling: CarpoolingSummary,
    pub is_driver: bool,
    pub is_cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct MyCarpoolings {
    /// Soonest departure first.
    pub active: Vec<MyCarpooling>,
    /// Latest departure first.
    pub history: Vec<MyCarpooling>,
}

pub async fn my_carpoolings<C: ConnectionTrait>(db: &C, user_id: Uuid) -> AppResult<MyCarpoolings> {
    let own: HashMap<Uuid, participation::Model> = participation::Entity::find()
        .filter(participation::Column::UserId.eq(user_id))
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.carpooling_id, p))
        .collect();

    let trips = carpooling::Entity::find()
        .filter(carpooling::Column::Id.is_in(own.keys().copied().collect::<Vec<_>>()))
        .order_by_asc(carpooling::Column::DepartureDate)
        .order_by_asc(carpooling::Column::DepartureTime)
        .all(db)
        .await?;

    let mut active = Vec::new();
    let mut history = Vec::new();
    for summary in summarize(db, trips).await? {
        let Some(p) = own.get(&summary.id) else {
            continue;
        };

        let entry = MyCarpooling {
            is_driver: p.is_driver,
            is_cancelled: p.is_cancelled,
            carpooling: summary,
        };
        match classify(entry.carpooling.status, p) {
            TripView::Active => active.push(entry),
            TripView::History => history.push(entry),
        }
    }
    history.reverse();

    Ok(MyCarpoolings { active, history })
}

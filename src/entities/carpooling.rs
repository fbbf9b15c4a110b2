use sea_orm::entity::prelude::*;
use sea_orm::sea_query::StringLen;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CarpoolingStatus {
    #[sea_orm(string_value = "OPEN")]
    Open,
    #[sea_orm(string_value = "FULL")]
    Full,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "carpooling")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub car_id: Uuid,
    pub departure_place: String,
    /// `departure_place` case-folded for search.
    #[serde(skip_serializing)]
    pub departure_place_key: String,
    pub departure_date: Date,
    pub departure_time: Time,
    pub arrival_place: String,
    #[serde(skip_serializing)]
    pub arrival_place_key: String,
    pub arrival_date: Date,
    pub arrival_time: Time,
    /// Remaining bookable seats, never negative.
    pub seat_count: i32,
    /// Bookable seats at creation time.
    pub offered_seats: i32,
    pub price_per_person: i32,
    pub is_eco: bool,
    pub status: CarpoolingStatus,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn departure_at(&self) -> DateTime {
        self.departure_date.and_time(self.departure_time)
    }

    pub fn arrival_at(&self) -> DateTime {
        self.arrival_date.and_time(self.arrival_time)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::car::Entity",
        from = "Column::CarId",
        to = "super::car::Column::Id"
    )]
    Car,
    #[sea_orm(has_many = "super::participation::Entity")]
    Participations,
}

impl Related<super::car::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Car.def()
    }
}

impl Related<super::participation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

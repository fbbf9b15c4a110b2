//! Join record between a user and a carpooling ("carpooling_user").

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "carpooling_user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub carpooling_id: Uuid,
    pub user_id: Uuid,
    pub is_driver: bool,
    pub is_cancelled: bool,
    /// Credits debited on join, refunded verbatim on leave or cancel.
    pub credits_paid: i32,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::carpooling::Entity",
        from = "Column::CarpoolingId",
        to = "super::carpooling::Column::Id"
    )]
    Carpooling,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::carpooling::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Carpooling.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

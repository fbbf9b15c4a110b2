use sea_orm_migration::{prelude::*, schema::*};

use super::m20250301_000001_create_users::User;
use super::m20250301_000002_create_brands::Brand;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Car::Table)
                    .if_not_exists()
                    .col(uuid(Car::Id).primary_key())
                    .col(uuid(Car::UserId).not_null())
                    .col(integer(Car::BrandId).not_null())
                    .col(string_len(Car::Model, 50).not_null())
                    .col(string_len(Car::Color, 30).not_null())
                    .col(string_len(Car::Plate, 20).not_null().unique_key())
                    .col(string_len(Car::Energy, 16).not_null())
                    .col(integer(Car::Seats).not_null())
                    .col(boolean(Car::PetFriendly).not_null().default(false))
                    .col(
                        timestamp_with_time_zone(Car::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_car_user")
                            .from(Car::Table, Car::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_car_brand")
                            .from(Car::Table, Car::BrandId)
                            .to(Brand::Table, Brand::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Car::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Car {
    Table,
    Id,
    UserId,
    BrandId,
    Model,
    Color,
    Plate,
    Energy,
    Seats,
    PetFriendly,
    CreatedAt,
}

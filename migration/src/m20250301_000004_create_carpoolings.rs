use sea_orm_migration::{prelude::*, schema::*};

use super::m20250301_000003_create_cars::Car;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Carpooling::Table)
                    .if_not_exists()
                    .col(uuid(Carpooling::Id).primary_key())
                    .col(uuid(Carpooling::CarId).not_null())
                    .col(string_len(Carpooling::DeparturePlace, 255).not_null())
                    .col(string_len(Carpooling::DeparturePlaceKey, 255).not_null())
                    .col(date(Carpooling::DepartureDate).not_null())
                    .col(time(Carpooling::DepartureTime).not_null())
                    .col(string_len(Carpooling::ArrivalPlace, 255).not_null())
                    .col(string_len(Carpooling::ArrivalPlaceKey, 255).not_null())
                    .col(date(Carpooling::ArrivalDate).not_null())
                    .col(time(Carpooling::ArrivalTime).not_null())
                    .col(integer(Carpooling::SeatCount).not_null())
                    .col(integer(Carpooling::OfferedSeats).not_null())
                    .col(integer(Carpooling::PricePerPerson).not_null())
                    .col(boolean(Carpooling::IsEco).not_null().default(false))
                    .col(string_len(Carpooling::Status, 16).not_null())
                    .col(
                        timestamp_with_time_zone(Carpooling::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Carpooling::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .check(Expr::col(Carpooling::SeatCount).gte(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_carpooling_car")
                            .from(Carpooling::Table, Carpooling::CarId)
                            .to(Car::Table, Car::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_carpooling_departure")
                    .table(Carpooling::Table)
                    .col(Carpooling::DepartureDate)
                    .col(Carpooling::DepartureTime)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Carpooling::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Carpooling {
    Table,
    Id,
    CarId,
    DeparturePlace,
    DeparturePlaceKey,
    DepartureDate,
    DepartureTime,
    ArrivalPlace,
    ArrivalPlaceKey,
    ArrivalDate,
    ArrivalTime,
    SeatCount,
    OfferedSeats,
    PricePerPerson,
    IsEco,
    Status,
    CreatedAt,
    UpdatedAt,
}

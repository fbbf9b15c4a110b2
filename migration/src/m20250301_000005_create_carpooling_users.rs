use sea_orm_migration::{prelude::*, schema::*};

use super::m20250301_000001_create_users::User;
use super::m20250301_000004_create_carpoolings::Carpooling;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Cascades are still performed by the application delete paths
        manager
            .create_table(
                Table::create()
                    .table(CarpoolingUser::Table)
                    .if_not_exists()
                    .col(uuid(CarpoolingUser::Id).primary_key())
                    .col(uuid(CarpoolingUser::CarpoolingId).not_null())
                    .col(uuid(CarpoolingUser::UserId).not_null())
                    .col(boolean(CarpoolingUser::IsDriver).not_null().default(false))
                    .col(boolean(CarpoolingUser::IsCancelled).not_null().default(false))
                    .col(integer(CarpoolingUser::CreditsPaid).not_null().default(0))
                    .col(
                        timestamp_with_time_zone(CarpoolingUser::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(CarpoolingUser::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_carpooling_user_carpooling")
                            .from(CarpoolingUser::Table, CarpoolingUser::CarpoolingId)
                            .to(Carpooling::Table, Carpooling::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_carpooling_user_user")
                            .from(CarpoolingUser::Table, CarpoolingUser::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // One participation row per (trip, user); leaving flips is_cancelled
        manager
            .create_index(
                Index::create()
                    .name("idx_carpooling_user_unique")
                    .table(CarpoolingUser::Table)
                    .col(CarpoolingUser::CarpoolingId)
                    .col(CarpoolingUser::UserId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CarpoolingUser::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum CarpoolingUser {
    Table,
    Id,
    CarpoolingId,
    UserId,
    IsDriver,
    IsCancelled,
    CreditsPaid,
    CreatedAt,
    UpdatedAt,
}

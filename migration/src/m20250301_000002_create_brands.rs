use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Brand::Table)
                    .if_not_exists()
                    .col(pk_auto(Brand::Id))
                    .col(string_len(Brand::Name, 50).not_null().unique_key())
                    .to_owned(),
            )
            .await?;

        // Seed brands
        let insert = Query::insert()
            .into_table(Brand::Table)
            .columns([Brand::Name])
            .values_panic(["Renault".into()])
            .values_panic(["Peugeot".into()])
            .values_panic(["Citroën".into()])
            .values_panic(["Tesla".into()])
            .values_panic(["Toyota".into()])
            .values_panic(["Volkswagen".into()])
            .to_owned();

        manager.exec_stmt(insert).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Brand::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Brand {
    Table,
    Id,
    Name,
}

pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_users;
mod m20250301_000002_create_brands;
mod m20250301_000003_create_cars;
mod m20250301_000004_create_carpoolings;
mod m20250301_000005_create_carpooling_users;
mod m20250301_000006_create_reviews;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_users::Migration),
            Box::new(m20250301_000002_create_brands::Migration),
            Box::new(m20250301_000003_create_cars::Migration),
            Box::new(m20250301_000004_create_carpoolings::Migration),
            Box::new(m20250301_000005_create_carpooling_users::Migration),
            Box::new(m20250301_000006_create_reviews::Migration),
        ]
    }
}

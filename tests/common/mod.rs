#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, Set};
use sea_orm_migration::MigratorTrait;
use uuid::Uuid;

use ecoride_backend::entities::car::{self, Energy};
use ecoride_backend::entities::carpooling;
use ecoride_backend::entities::user::{self, UserRole};
use ecoride_backend::services::ledger::{self, NewCarpooling};
use ecoride_backend::utils::jwt::create_token;
use ecoride_backend::{AppState, Config};

pub const JWT_SECRET: &str = "test-secret";

/// Fresh in-memory database with every migration applied. A single
/// connection keeps the in-memory database alive and shared.
pub async fn setup_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .expect("in-memory sqlite");
    migration::Migrator::up(&db, None)
        .await
        .expect("migrations apply");
    db
}

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        jwt_expiration_hours: 1,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        tz_offset_minutes: 0,
        signup_credits: 20,
        request_timeout_secs: 5,
        admin_email: "admin@ecoride.test".to_string(),
        admin_password: "admin-password".to_string(),
    }
}

pub async fn test_state() -> AppState {
    AppState {
        db: setup_db().await,
        config: test_config(),
    }
}

/// Reference clock for ledger calls, well before every fixture trip.
pub fn now() -> NaiveDateTime {
    date(2025, 1, 1).and_time(time(8, 0))
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
}

pub async fn create_user(
    db: &DatabaseConnection,
    username: &str,
    credits: i32,
    is_driver: bool,
) -> user::Model {
    create_user_with_role(db, username, credits, is_driver, UserRole::User).await
}

pub async fn create_user_with_role(
    db: &DatabaseConnection,
    username: &str,
    credits: i32,
    is_driver: bool,
    role: UserRole,
) -> user::Model {
    let now = Utc::now();
    user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(format!("{}@ecoride.test", username)),
        username: Set(username.to_string()),
        password_hash: Set("not-a-real-hash".to_string()),
        first_name: Set(None),
        last_name: Set(None),
        phone: Set(None),
        photo: Set(None),
        credits: Set(credits),
        is_driver: Set(is_driver),
        current_car_id: Set(None),
        role: Set(role),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(db)
    .await
    .expect("insert user")
}

pub async fn create_car(
    db: &DatabaseConnection,
    owner: &user::Model,
    seats: i32,
    energy: Energy,
) -> car::Model {
    let id = Uuid::new_v4();
    car::ActiveModel {
        id: Set(id),
        user_id: Set(owner.id),
        brand_id: Set(1),
        model: Set("Zoe".to_string()),
        color: Set("Blue".to_string()),
        plate: Set(format!("AB-{}", &id.simple().to_string()[..8])),
        energy: Set(energy),
        seats: Set(seats),
        pet_friendly: Set(false),
        created_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await
    .expect("insert car")
}

pub fn trip(car: &car::Model, from: &str, to: &str, day: NaiveDate, price: i32) -> NewCarpooling {
    NewCarpooling {
        car_id: car.id,
        departure_place: from.to_string(),
        departure_date: day,
        departure_time: time(9, 0),
        arrival_place: to.to_string(),
        arrival_date: day,
        arrival_time: time(13, 0),
        price_per_person: price,
        seat_count: None,
    }
}

/// A driver with a car of `seats` seats and one published trip.
pub async fn publish(
    db: &DatabaseConnection,
    driver: &user::Model,
    seats: i32,
    price: i32,
) -> carpooling::Model {
    let car = create_car(db, driver, seats, Energy::Electric).await;
    ledger::create_carpooling(
        db,
        driver.id,
        trip(&car, "Paris", "Lyon", date(2025, 6, 1), price),
        now(),
    )
    .await
    .expect("publish carpooling")
}

pub async fn credits(db: &DatabaseConnection, user_id: Uuid) -> i32 {
    user::Entity::find_by_id(user_id)
        .one(db)
        .await
        .expect("query user")
        .expect("user exists")
        .credits
}

pub async fn reload(db: &DatabaseConnection, id: Uuid) -> carpooling::Model {
    carpooling::Entity::find_by_id(id)
        .one(db)
        .await
        .expect("query carpooling")
        .expect("carpooling exists")
}

pub fn token_for(user: &user::Model) -> String {
    create_token(user.id, &user.email, user.role, JWT_SECRET, 1).expect("token")
}

mod common;

use std::collections::HashSet;

use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, TransactionTrait};

use ecoride_backend::entities::car::Energy;
use ecoride_backend::entities::carpooling::{self, CarpoolingStatus};
use ecoride_backend::entities::{car, participation, review, user};
use ecoride_backend::services::ledger::{self, NewCarpooling};
use ecoride_backend::services::{cascade, views};
use ecoride_backend::AppError;

use common::*;

#[tokio::test]
async fn create_offers_every_seat_but_the_drivers() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;

    let trip = publish(&db, &driver, 4, 10).await;

    assert_eq!(trip.seat_count, 3);
    assert_eq!(trip.offered_seats, 3);
    assert_eq!(trip.status, CarpoolingStatus::Open);
    assert!(trip.is_eco);

    let rows = participation::Entity::find()
        .filter(participation::Column::CarpoolingId.eq(trip.id))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_driver);
    assert_eq!(rows[0].user_id, driver.id);
}

#[tokio::test]
async fn create_rejects_bad_input() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let passenger = create_user(&db, "walker", 0, false).await;
    let other = create_user(&db, "other", 0, true).await;
    let car = create_car(&db, &driver, 4, Energy::Diesel).await;
    let day = date(2025, 6, 1);

    let too_many = NewCarpooling {
        seat_count: Some(4),
        ..trip(&car, "Paris", "Lyon", day, 10)
    };
    let err = ledger::create_carpooling(&db, driver.id, too_many, now()).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let past = trip(&car, "Paris", "Lyon", date(2024, 6, 1), 10);
    let err = ledger::create_carpooling(&db, driver.id, past, now()).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let blank = trip(&car, "   ", "Lyon", day, 10);
    let err = ledger::create_carpooling(&db, driver.id, blank, now()).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let not_a_driver = trip(&car, "Paris", "Lyon", day, 10);
    let err = ledger::create_carpooling(&db, passenger.id, not_a_driver, now()).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let borrowed = trip(&car, "Paris", "Lyon", day, 10);
    let err = ledger::create_carpooling(&db, other.id, borrowed, now()).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    assert_eq!(carpooling::Entity::find().count(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn diesel_trips_are_not_eco() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let car = create_car(&db, &driver, 5, Energy::Diesel).await;

    let trip = ledger::create_carpooling(
        &db,
        driver.id,
        NewCarpooling {
            seat_count: Some(2),
            ..trip(&car, "Paris", "Lyon", date(2025, 6, 1), 10)
        },
        now(),
    )
    .await
    .unwrap();

    assert!(!trip.is_eco);
    assert_eq!(trip.seat_count, 2);
}

#[tokio::test]
async fn join_and_leave_move_seats_and_credits() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let passenger = create_user(&db, "passenger", 50, false).await;
    let trip = publish(&db, &driver, 4, 10).await;

    let booking = ledger::join(&db, trip.id, passenger.id, now()).await.unwrap();
    assert_eq!(booking.carpooling.seat_count, 2);
    assert_eq!(booking.participation.credits_paid, 10);
    assert_eq!(credits(&db, passenger.id).await, 40);

    let after = ledger::leave(&db, trip.id, passenger.id, now()).await.unwrap();
    assert_eq!(after.seat_count, 3);
    assert_eq!(after.status, CarpoolingStatus::Open);
    assert_eq!(credits(&db, passenger.id).await, 50);
}

#[tokio::test]
async fn second_leave_refunds_nothing() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let passenger = create_user(&db, "passenger", 50, false).await;
    let trip = publish(&db, &driver, 4, 10).await;

    ledger::join(&db, trip.id, passenger.id, now()).await.unwrap();
    ledger::leave(&db, trip.id, passenger.id, now()).await.unwrap();

    let err = ledger::leave(&db, trip.id, passenger.id, now()).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(credits(&db, passenger.id).await, 50);
    assert_eq!(reload(&db, trip.id).await.seat_count, 3);
}

#[tokio::test]
async fn last_seat_fills_the_trip_and_leaving_reopens_it() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let first = create_user(&db, "first", 20, false).await;
    let second = create_user(&db, "second", 20, false).await;
    let late = create_user(&db, "late", 20, false).await;
    let trip = publish(&db, &driver, 3, 5).await;

    ledger::join(&db, trip.id, first.id, now()).await.unwrap();
    let booking = ledger::join(&db, trip.id, second.id, now()).await.unwrap();
    assert_eq!(booking.carpooling.seat_count, 0);
    assert_eq!(booking.carpooling.status, CarpoolingStatus::Full);

    let err = ledger::join(&db, trip.id, late.id, now()).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(credits(&db, late.id).await, 20);

    let reopened = ledger::leave(&db, trip.id, first.id, now()).await.unwrap();
    assert_eq!(reopened.status, CarpoolingStatus::Open);
    assert_eq!(reopened.seat_count, 1);

    ledger::join(&db, trip.id, late.id, now()).await.unwrap();
    assert_eq!(reload(&db, trip.id).await.status, CarpoolingStatus::Full);
}

#[tokio::test]
async fn join_refusals_leave_no_trace() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let broke = create_user(&db, "broke", 5, false).await;
    let trip = publish(&db, &driver, 4, 10).await;

    let err = ledger::join(&db, trip.id, driver.id, now()).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = ledger::join(&db, trip.id, broke.id, now()).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(credits(&db, broke.id).await, 5);
    assert_eq!(reload(&db, trip.id).await.seat_count, 3);

    let departed = date(2025, 6, 1).and_time(time(9, 0));
    let rich = create_user(&db, "rich", 100, false).await;
    let err = ledger::join(&db, trip.id, rich.id, departed).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = ledger::join(&db, uuid::Uuid::new_v4(), rich.id, now()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn joining_twice_is_a_conflict_but_rejoining_after_leaving_works() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let passenger = create_user(&db, "passenger", 30, false).await;
    let trip = publish(&db, &driver, 4, 10).await;

    let first = ledger::join(&db, trip.id, passenger.id, now()).await.unwrap();
    let err = ledger::join(&db, trip.id, passenger.id, now()).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    ledger::leave(&db, trip.id, passenger.id, now()).await.unwrap();
    let again = ledger::join(&db, trip.id, passenger.id, now()).await.unwrap();

    assert_eq!(again.participation.id, first.participation.id);
    assert!(!again.participation.is_cancelled);
    assert_eq!(credits(&db, passenger.id).await, 20);
}

// A single pooled connection runs these transactions one at a time. The
// statement-level interleavings are covered by the stale-read tests below.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_never_oversell_the_last_seat() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let car = create_car(&db, &driver, 4, Energy::Hybrid).await;
    let trip = ledger::create_carpooling(
        &db,
        driver.id,
        NewCarpooling {
            seat_count: Some(1),
            ..trip(&car, "Paris", "Lyon", date(2025, 6, 1), 10)
        },
        now(),
    )
    .await
    .unwrap();

    let mut passengers = Vec::new();
    for i in 0..8 {
        passengers.push(create_user(&db, &format!("rider{}", i), 10, false).await);
    }

    let handles: Vec<_> = passengers
        .iter()
        .map(|p| {
            let db = db.clone();
            let (trip_id, user_id) = (trip.id, p.id);
            tokio::spawn(async move { ledger::join(&db, trip_id, user_id, now()).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(err) => assert!(matches!(err, AppError::Conflict(_)), "unexpected {:?}", err),
        }
    }
    assert_eq!(winners, 1);

    let trip = reload(&db, trip.id).await;
    assert_eq!(trip.seat_count, 0);
    assert_eq!(trip.status, CarpoolingStatus::Full);

    let mut total = 0;
    for p in &passengers {
        total += credits(&db, p.id).await;
    }
    assert_eq!(total, 8 * 10 - 10);
}

#[tokio::test]
async fn only_the_driver_cancels_and_every_passenger_is_refunded() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let a = create_user(&db, "alice", 50, false).await;
    let b = create_user(&db, "bob", 50, false).await;
    let trip = publish(&db, &driver, 4, 15).await;

    ledger::join(&db, trip.id, a.id, now()).await.unwrap();
    ledger::join(&db, trip.id, b.id, now()).await.unwrap();

    let err = ledger::cancel(&db, trip.id, a.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let cancelled = ledger::cancel(&db, trip.id, driver.id).await.unwrap();
    assert_eq!(cancelled.status, CarpoolingStatus::Cancelled);
    assert_eq!(cancelled.seat_count, cancelled.offered_seats);
    assert_eq!(credits(&db, a.id).await, 50);
    assert_eq!(credits(&db, b.id).await, 50);

    let rows = participation::Entity::find()
        .filter(participation::Column::CarpoolingId.eq(trip.id))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    for row in &rows {
        if row.user_id == driver.id {
            assert!(row.is_driver);
            assert!(!row.is_cancelled);
        } else {
            assert!(row.is_cancelled, "passenger {} still booked", row.user_id);
        }
    }

    let err = ledger::cancel(&db, trip.id, driver.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Already refunded by the cancellation
    let err = ledger::leave(&db, trip.id, a.id, now()).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(credits(&db, a.id).await, 50);

    let c = create_user(&db, "carol", 50, false).await;
    let err = ledger::join(&db, trip.id, c.id, now()).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn completion_pays_the_driver_and_freezes_the_trip() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let a = create_user(&db, "alice", 50, false).await;
    let b = create_user(&db, "bob", 50, false).await;
    let trip = publish(&db, &driver, 4, 15).await;

    ledger::join(&db, trip.id, a.id, now()).await.unwrap();
    ledger::join(&db, trip.id, b.id, now()).await.unwrap();
    ledger::leave(&db, trip.id, b.id, now()).await.unwrap();

    let err = ledger::complete(&db, trip.id, Some(a.id)).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let done = ledger::complete(&db, trip.id, Some(driver.id)).await.unwrap();
    assert_eq!(done.status, CarpoolingStatus::Completed);
    assert_eq!(credits(&db, driver.id).await, 15);

    let err = ledger::leave(&db, trip.id, a.id, now()).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    let err = ledger::cancel(&db, trip.id, driver.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    let err = ledger::complete(&db, trip.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(credits(&db, driver.id).await, 15);
}

#[tokio::test]
async fn seat_and_credit_totals_stay_consistent() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let trip = publish(&db, &driver, 5, 7).await;

    let mut riders = Vec::new();
    for i in 0..4 {
        riders.push(create_user(&db, &format!("rider{}", i), 30, false).await);
    }
    for r in &riders {
        ledger::join(&db, trip.id, r.id, now()).await.unwrap();
    }
    ledger::leave(&db, trip.id, riders[1].id, now()).await.unwrap();
    ledger::leave(&db, trip.id, riders[3].id, now()).await.unwrap();

    let trip = reload(&db, trip.id).await;
    let active = participation::Entity::find()
        .filter(participation::Column::CarpoolingId.eq(trip.id))
        .filter(participation::Column::IsDriver.eq(false))
        .filter(participation::Column::IsCancelled.eq(false))
        .all(&db)
        .await
        .unwrap();

    assert!(trip.seat_count >= 0);
    assert_eq!(trip.seat_count + active.len() as i32, trip.offered_seats);

    let paid: i32 = active.iter().map(|p| p.credits_paid).sum();
    let mut balance = 0;
    for r in &riders {
        balance += credits(&db, r.id).await;
    }
    assert_eq!(balance + paid, 4 * 30);
}

#[tokio::test]
async fn my_carpoolings_splits_active_from_history() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let passenger = create_user(&db, "passenger", 100, false).await;
    let running = publish(&db, &driver, 4, 10).await;
    let left = publish(&db, &driver, 4, 10).await;
    let cancelled = publish(&db, &driver, 4, 10).await;

    for trip in [&running, &left, &cancelled] {
        ledger::join(&db, trip.id, passenger.id, now()).await.unwrap();
    }
    ledger::leave(&db, left.id, passenger.id, now()).await.unwrap();
    ledger::cancel(&db, cancelled.id, driver.id).await.unwrap();

    let mine = views::my_carpoolings(&db, passenger.id).await.unwrap();
    let active: Vec<_> = mine.active.iter().map(|m| m.carpooling.id).collect();
    let history: HashSet<_> = mine.history.iter().map(|m| m.carpooling.id).collect();

    assert_eq!(active, vec![running.id]);
    assert_eq!(history, HashSet::from([left.id, cancelled.id]));

    let drivers_view = views::my_carpoolings(&db, driver.id).await.unwrap();
    assert_eq!(drivers_view.active.len(), 2);
    assert!(drivers_view.active.iter().all(|m| m.is_driver));
    assert_eq!(drivers_view.history.len(), 1);
}

#[tokio::test]
async fn deleting_a_carpooling_refunds_and_removes_participations() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let passenger = create_user(&db, "passenger", 50, false).await;
    let trip = publish(&db, &driver, 4, 10).await;

    ledger::join(&db, trip.id, passenger.id, now()).await.unwrap();
    cascade::delete_carpooling(&db, trip.id).await.unwrap();

    assert_eq!(credits(&db, passenger.id).await, 50);
    assert!(carpooling::Entity::find_by_id(trip.id).one(&db).await.unwrap().is_none());
    let left = participation::Entity::find()
        .filter(participation::Column::CarpoolingId.eq(trip.id))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(left, 0);

    let err = cascade::delete_carpooling(&db, trip.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn users_with_trip_history_cannot_be_deleted() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let passenger = create_user(&db, "passenger", 50, false).await;
    let idle = create_user(&db, "idle", 0, true).await;
    let idle_car = create_car(&db, &idle, 4, Energy::Petrol).await;
    publish(&db, &driver, 4, 10).await;

    let err = cascade::delete_user(&db, driver.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    cascade::delete_user(&db, idle.id).await.unwrap();
    assert!(user::Entity::find_by_id(idle.id).one(&db).await.unwrap().is_none());
    assert!(car::Entity::find_by_id(idle_car.id).one(&db).await.unwrap().is_none());

    cascade::delete_user(&db, passenger.id).await.unwrap();
    assert_eq!(review::Entity::find().count(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn cars_in_use_cannot_be_deleted() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let stranger = create_user(&db, "stranger", 0, true).await;
    let trip = publish(&db, &driver, 4, 10).await;
    let spare = create_car(&db, &driver, 2, Energy::Lpg).await;

    let err = cascade::delete_car(&db, driver.id, trip.car_id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = cascade::delete_car(&db, stranger.id, spare.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    cascade::delete_car(&db, driver.id, spare.id).await.unwrap();
    assert!(car::Entity::find_by_id(spare.id).one(&db).await.unwrap().is_none());
}

#[tokio::test]
async fn seat_released_after_a_stale_read_reopens_a_trip_filled_meanwhile() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let leaver = create_user(&db, "leaver", 20, false).await;
    let filler = create_user(&db, "filler", 20, false).await;
    let waiting = create_user(&db, "waiting", 20, false).await;
    let trip = publish(&db, &driver, 3, 5).await;

    ledger::join(&db, trip.id, leaver.id, now()).await.unwrap();

    // What a leave reads before another join takes the last seat
    let seen = reload(&db, trip.id).await;
    assert_eq!(seen.status, CarpoolingStatus::Open);
    assert_eq!(seen.seat_count, 1);

    let filled = ledger::join(&db, trip.id, filler.id, now()).await.unwrap();
    assert_eq!(filled.carpooling.status, CarpoolingStatus::Full);

    let txn = db.begin().await.unwrap();
    ledger::release_seat(&txn, trip.id).await.unwrap();
    txn.commit().await.unwrap();

    let reopened = reload(&db, trip.id).await;
    assert_eq!(reopened.status, CarpoolingStatus::Open);
    assert_eq!(reopened.seat_count, 1);

    // The released seat is bookable again
    ledger::join(&db, trip.id, waiting.id, now()).await.unwrap();
    assert_eq!(reload(&db, trip.id).await.status, CarpoolingStatus::Full);
}

#[tokio::test]
async fn leave_racing_the_last_seat_join_keeps_the_trip_open() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let first = create_user(&db, "first", 20, false).await;
    let second = create_user(&db, "second", 20, false).await;
    let trip = publish(&db, &driver, 3, 5).await;

    ledger::join(&db, trip.id, first.id, now()).await.unwrap();
    ledger::join(&db, trip.id, second.id, now()).await.unwrap();
    assert_eq!(reload(&db, trip.id).await.status, CarpoolingStatus::Full);

    let after = ledger::leave(&db, trip.id, first.id, now()).await.unwrap();
    assert_eq!(after.status, CarpoolingStatus::Open);
    assert!(after.seat_count > 0);
}

#[tokio::test]
async fn reserving_on_a_stale_read_cannot_take_a_taken_seat() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let car = create_car(&db, &driver, 4, Energy::Electric).await;
    let trip = ledger::create_carpooling(
        &db,
        driver.id,
        NewCarpooling {
            seat_count: Some(1),
            ..trip(&car, "Paris", "Lyon", date(2025, 6, 1), 10)
        },
        now(),
    )
    .await
    .unwrap();

    // Both contenders saw one free seat
    let seen = reload(&db, trip.id).await;
    assert_eq!(seen.seat_count, 1);

    let winner = db.begin().await.unwrap();
    ledger::reserve_seat(&winner, trip.id).await.unwrap();
    winner.commit().await.unwrap();

    let loser = db.begin().await.unwrap();
    let err = ledger::reserve_seat(&loser, trip.id).await.unwrap_err();
    loser.rollback().await.unwrap();
    assert!(matches!(err, AppError::Conflict(_)));

    let trip = reload(&db, trip.id).await;
    assert_eq!(trip.seat_count, 0);
    assert_eq!(trip.status, CarpoolingStatus::Full);
}

#[tokio::test]
async fn releasing_never_exceeds_the_offered_seats() {
    let db = setup_db().await;
    let driver = create_user(&db, "driver", 0, true).await;
    let trip = publish(&db, &driver, 3, 5).await;

    let txn = db.begin().await.unwrap();
    let err = ledger::release_seat(&txn, trip.id).await.unwrap_err();
    txn.rollback().await.unwrap();

    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(reload(&db, trip.id).await.seat_count, trip.offered_seats);
}

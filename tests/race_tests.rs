//! Competing bookings of one car. Both callers pass the availability check
//! before either writes; exactly one booking may survive.

mod common;

use std::sync::Arc;

use carrental::{
    ActingContext, CarStatus, DomainError, DuckdbRentalStore, InMemoryRentalStore, NewRental,
    Rental, RentalStatus, RentalStore,
};
use common::{date, fixture, Fixture, GatedStore};

fn booking(car_id: i64) -> NewRental {
    NewRental {
        car_id,
        rental_date: date(2024, 1, 10),
        return_date: date(2024, 1, 13),
        notes: None,
    }
}

async fn race_for_one_car(fx: &Fixture) -> Vec<Result<Rental, DomainError>> {
    let gated: Arc<dyn RentalStore> = Arc::new(GatedStore::new(fx.store.clone(), 2));
    let lifecycle = Arc::new(fx.lifecycle_over(gated));

    let mut handles = Vec::new();
    for user in [&fx.customer, &fx.other_customer] {
        let lifecycle = lifecycle.clone();
        let actor = ActingContext::of(user);
        let request = booking(fx.car.id());
        handles.push(tokio::spawn(async move {
            lifecycle.create_rental(&actor, request).await
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.expect("booking task panicked"));
    }
    outcomes
}

async fn assert_single_winner(fx: &Fixture, outcomes: Vec<Result<Rental, DomainError>>) {
    let winners: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
    let losers: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().err()).collect();
    assert_eq!(winners.len(), 1, "outcomes: {:?}", outcomes);
    assert_eq!(losers.len(), 1, "outcomes: {:?}", outcomes);
    assert!(losers[0].is_concurrency(), "loser saw {}", losers[0]);

    let rentals = fx.rentals().await;
    assert_eq!(rentals.len(), 1);
    assert_eq!(rentals[0].id(), winners[0].id());
    assert_eq!(rentals[0].status(), RentalStatus::Active);
    assert_eq!(fx.history(winners[0].id()).await.len(), 1);

    let car = fx.car(fx.car.id()).await;
    assert_eq!(car.status(), CarStatus::Rented);
    assert_eq!(car.version(), fx.car.version() + 1);
    fx.assert_availability_consistent().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_bookings_in_memory_admit_one() {
    let fx = fixture(Arc::new(InMemoryRentalStore::new())).await;
    let outcomes = race_for_one_car(&fx).await;
    assert_single_winner(&fx, outcomes).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_bookings_on_duckdb_admit_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = DuckdbRentalStore::new(&dir.path().join("race.duckdb")).expect("open duckdb");
    let fx = fixture(Arc::new(store)).await;
    let outcomes = race_for_one_car(&fx).await;
    assert_single_winner(&fx, outcomes).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn loser_retry_sees_the_car_taken() {
    let fx = fixture(Arc::new(InMemoryRentalStore::new())).await;
    let outcomes = race_for_one_car(&fx).await;
    let loser = if outcomes[0].is_err() {
        &fx.customer
    } else {
        &fx.other_customer
    };

    let err = fx
        .lifecycle()
        .create_rental(&ActingContext::of(loser), booking(fx.car.id()))
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(err.field(), Some("car_id"));
    fx.assert_availability_consistent().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_bookings_across_cars_keep_availability_consistent() {
    let fx = fixture(Arc::new(InMemoryRentalStore::new())).await;
    let mut cars = vec![fx.car.clone()];
    for plate in ["D 1 AA", "D 2 BB", "D 3 CC"] {
        cars.push(fx.add_car(plate, rust_decimal::Decimal::from(200_000)).await);
    }

    let lifecycle = Arc::new(fx.lifecycle());
    let mut handles = Vec::new();
    for round in 0..3 {
        for (i, car) in cars.iter().enumerate() {
            let user = if (i + round) % 2 == 0 {
                &fx.customer
            } else {
                &fx.other_customer
            };
            let lifecycle = lifecycle.clone();
            let actor = ActingContext::of(user);
            let request = booking(car.id());
            handles.push(tokio::spawn(async move {
                lifecycle.create_rental(&actor, request).await
            }));
        }
    }

    let mut booked = 0;
    for handle in handles {
        match handle.await.expect("booking task panicked") {
            Ok(_) => booked += 1,
            Err(e) => assert!(
                e.is_concurrency() || e.field() == Some("car_id"),
                "unexpected failure: {}",
                e
            ),
        }
    }

    assert_eq!(booked, cars.len());
    fx.assert_availability_consistent().await;
}

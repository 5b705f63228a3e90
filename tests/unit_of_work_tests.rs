//! Unit of work state machine and repository staging against both stores.

mod common;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use carrental::application::UnitOfWorkState;
use carrental::{
    ActingContext, Car, CarDetails, CarStatus, DuckdbRentalStore, InMemoryRentalStore, NewRental,
    RentalStore, TransactionOptions, UnitOfWork,
};
use common::{date, fixture};

fn car(plate: &str) -> Car {
    Car::register(
        plate,
        CarDetails::new("Suzuki", "Ertiga", 2020, Decimal::from(275_000)),
        chrono::Utc::now(),
    )
}

fn stores() -> Vec<(&'static str, Arc<dyn RentalStore>, Option<tempfile::TempDir>)> {
    let dir = tempfile::tempdir().expect("tempdir");
    let memory: Arc<dyn RentalStore> = Arc::new(InMemoryRentalStore::new());
    let duck: Arc<dyn RentalStore> =
        Arc::new(DuckdbRentalStore::new(&dir.path().join("uow.duckdb")).expect("open duckdb"));
    vec![("memory", memory, None), ("duckdb", duck, Some(dir))]
}

#[tokio::test]
async fn staged_changes_are_written_only_by_persist() {
    for (name, store, _dir) in stores() {
        let mut uow = UnitOfWork::open(store.as_ref()).await.expect("open");
        let added = uow.cars().add(car("F 1 AB")).await.expect("add");
        assert!(added.id() > 0, "{name}: id reserved at add");
        assert_eq!(uow.staged_len(), 1);

        let mut reader = UnitOfWork::open_read_only(store.as_ref()).await.expect("open reader");
        assert_eq!(reader.cars().count_all().await.expect("count"), 0, "{name}");

        assert_eq!(uow.persist().await.expect("persist"), 1, "{name}");
        assert_eq!(uow.staged_len(), 0);
        assert_eq!(uow.persist().await.expect("nothing staged"), 0);

        let loaded = reader.cars().get_by_id(added.id()).await.expect("load");
        assert_eq!(loaded.as_ref().map(Car::license_plate), Some("F 1 AB"), "{name}");

        reader.dispose().await.expect("dispose reader");
        uow.dispose().await.expect("dispose");
    }
}

#[tokio::test]
async fn rollback_discards_the_transaction() {
    for (name, store, _dir) in stores() {
        let mut uow = UnitOfWork::open(store.as_ref()).await.expect("open");
        uow.begin_transaction().await.expect("begin");
        assert_eq!(uow.state(), UnitOfWorkState::InTransaction);

        uow.cars().add(car("F 2 AB")).await.expect("add");
        uow.persist().await.expect("persist inside transaction");
        assert_eq!(uow.cars().count_all().await.expect("own write visible"), 1, "{name}");

        uow.cars().add(car("F 3 AB")).await.expect("add staged");
        uow.rollback().await.expect("rollback");
        assert_eq!(uow.state(), UnitOfWorkState::Idle);
        assert_eq!(uow.staged_len(), 0);
        assert_eq!(uow.cars().count_all().await.expect("count"), 0, "{name}");

        // No transaction open: rollback is a no-op.
        uow.rollback().await.expect("idle rollback");
        uow.dispose().await.expect("dispose");
    }
}

#[tokio::test]
async fn commit_makes_writes_visible_to_other_sessions() {
    for (name, store, _dir) in stores() {
        let mut uow = UnitOfWork::open(store.as_ref()).await.expect("open");
        uow.begin_transaction().await.expect("begin");
        uow.cars().add(car("F 4 AB")).await.expect("add");
        uow.persist().await.expect("persist");

        let mut other = UnitOfWork::open_read_only(store.as_ref()).await.expect("open other");
        assert_eq!(other.cars().count_all().await.expect("count"), 0, "{name}: uncommitted hidden");

        uow.commit().await.expect("commit");
        assert_eq!(uow.state(), UnitOfWorkState::Idle);
        assert_eq!(other.cars().count_all().await.expect("count"), 1, "{name}: committed visible");

        other.dispose().await.expect("dispose other");
        uow.dispose().await.expect("dispose");
    }
}

#[tokio::test]
async fn begin_while_open_discards_the_previous_scope() {
    let store: Arc<dyn RentalStore> = Arc::new(InMemoryRentalStore::new());
    let mut uow = UnitOfWork::open(store.as_ref()).await.expect("open");
    uow.begin_transaction().await.expect("begin");
    uow.cars().add(car("F 5 AB")).await.expect("add");
    uow.persist().await.expect("persist");

    uow.begin_transaction().await.expect("second begin");
    assert_eq!(uow.state(), UnitOfWorkState::InTransaction);
    uow.commit().await.expect("commit");

    assert_eq!(uow.cars().count_all().await.expect("count"), 0);
    uow.dispose().await.expect("dispose");
}

#[tokio::test]
async fn dispose_is_idempotent_and_final() {
    let store: Arc<dyn RentalStore> = Arc::new(InMemoryRentalStore::new());
    let mut uow = UnitOfWork::open(store.as_ref()).await.expect("open");
    uow.begin_transaction().await.expect("begin");
    uow.cars().add(car("F 6 AB")).await.expect("add");
    uow.persist().await.expect("persist");

    uow.dispose().await.expect("dispose");
    uow.dispose().await.expect("dispose again");
    assert_eq!(uow.state(), UnitOfWorkState::Disposed);

    let err = uow.cars().add(car("F 7 AB")).await.unwrap_err();
    assert!(matches!(err, carrental::DomainError::Internal(_)));

    let mut reader = UnitOfWork::open_read_only(store.as_ref()).await.expect("open reader");
    assert_eq!(reader.cars().count_all().await.expect("count"), 0);
    reader.dispose().await.expect("dispose reader");
}

#[tokio::test]
async fn read_only_unit_refuses_mutations() {
    let fx = fixture(Arc::new(InMemoryRentalStore::new())).await;
    let mut uow = UnitOfWork::open_read_only(fx.store.as_ref()).await.expect("open");
    assert!(uow.is_read_only());

    let err = uow.cars().add(car("F 8 AB")).await.unwrap_err();
    assert!(matches!(err, carrental::DomainError::Internal(_)));
    let err = uow.cars().update(fx.car.clone()).unwrap_err();
    assert!(matches!(err, carrental::DomainError::Internal(_)));
    let err = uow.users().remove(fx.customer.clone()).unwrap_err();
    assert!(matches!(err, carrental::DomainError::Internal(_)));
    assert_eq!(uow.staged_len(), 0);
    uow.dispose().await.expect("dispose");
}

#[tokio::test]
async fn update_attaches_entities_loaded_elsewhere() {
    let fx = fixture(Arc::new(InMemoryRentalStore::new())).await;
    let mut detached = fx.car.clone();
    let mut details = detached.details().clone();
    details.color = Some("Silver".to_string());
    detached.revise(details, fx.clock.0);

    let mut uow = UnitOfWork::open(fx.store.as_ref()).await.expect("open");
    uow.cars().update(detached).expect("stage update");
    uow.persist().await.expect("persist");
    uow.dispose().await.expect("dispose");

    let stored = fx.car(fx.car.id()).await;
    assert_eq!(stored.details().color.as_deref(), Some("Silver"));
    assert_eq!(stored.version(), fx.car.version() + 1);
}

#[tokio::test]
async fn constraint_failures_carry_their_root_cause() {
    for (name, store, _dir) in stores() {
        let mut uow = UnitOfWork::open(store.as_ref()).await.expect("open");
        uow.cars().add(car("F 9 AB")).await.expect("add");
        uow.persist().await.expect("persist");

        uow.begin_transaction().await.expect("begin");
        uow.cars().add(car("F 9 AB")).await.expect("stage duplicate");
        let err = uow.commit().await.unwrap_err();

        assert!(err.is_persistence(), "{name}: {err}");
        let cause = err.root_cause().expect("root cause").to_lowercase();
        assert!(
            cause.contains("license_plate") || cause.contains("unique") || cause.contains("duplicate"),
            "{name}: {cause}"
        );
        assert_eq!(uow.state(), UnitOfWorkState::Idle, "{name}: rolled back");
        assert_eq!(uow.cars().count_all().await.expect("count"), 1, "{name}");
        uow.dispose().await.expect("dispose");
    }
}

#[tokio::test]
async fn remove_deletes_unreferenced_rows_only() {
    let fx = fixture(Arc::new(InMemoryRentalStore::new())).await;
    let spare = fx.add_car("F 10 AB", Decimal::from(100_000)).await;

    let mut uow = UnitOfWork::open(fx.store.as_ref()).await.expect("open");
    uow.cars().remove(spare.clone()).expect("stage remove");
    uow.persist().await.expect("persist");
    assert!(uow.cars().get_by_id(spare.id()).await.expect("load").is_none());
    uow.dispose().await.expect("dispose");
}

#[tokio::test]
async fn expired_transactions_fail_at_commit() {
    let store: Arc<dyn RentalStore> = Arc::new(InMemoryRentalStore::new());
    let options = TransactionOptions {
        timeout: Duration::from_millis(10),
    };
    let mut uow = UnitOfWork::open_with_options(store.as_ref(), options)
        .await
        .expect("open");
    uow.begin_transaction().await.expect("begin");
    uow.cars().add(car("F 11 AB")).await.expect("add");
    tokio::time::sleep(Duration::from_millis(30)).await;

    let err = uow.commit().await.unwrap_err();
    assert!(err.is_persistence());
    assert_eq!(uow.cars().count_all().await.expect("count"), 0);
    uow.dispose().await.expect("dispose");
}

#[tokio::test]
async fn history_and_rentals_cannot_be_rewritten_or_deleted() {
    for (name, store, _dir) in stores() {
        let fx = fixture(store).await;
        let rental = fx
            .lifecycle()
            .create_rental(
                &ActingContext::of(&fx.customer),
                NewRental {
                    car_id: fx.car.id(),
                    rental_date: date(2024, 1, 10),
                    return_date: date(2024, 1, 13),
                    notes: None,
                },
            )
            .await
            .expect("create");
        let entry = fx.history(rental.id()).await.remove(0);

        let mut uow = UnitOfWork::open(fx.store.as_ref()).await.expect("open");
        uow.rental_histories().update(entry.clone()).expect("stage history update");
        let err = uow.persist().await.unwrap_err();
        assert!(err.is_persistence(), "{name}: {err}");
        uow.dispose().await.expect("dispose");

        let mut uow = UnitOfWork::open(fx.store.as_ref()).await.expect("open");
        uow.rental_histories().remove(entry.clone()).expect("stage history delete");
        let err = uow.persist().await.unwrap_err();
        assert!(err.is_persistence(), "{name}: {err}");
        assert!(err.root_cause().expect("cause").contains("append-only"), "{name}");
        uow.dispose().await.expect("dispose");

        let mut uow = UnitOfWork::open(fx.store.as_ref()).await.expect("open");
        uow.rentals().remove(rental.clone()).expect("stage rental delete");
        let err = uow.persist().await.unwrap_err();
        assert!(err.is_persistence(), "{name}: {err}");
        uow.dispose().await.expect("dispose");

        assert_eq!(fx.rentals().await.len(), 1, "{name}");
        assert_eq!(fx.history(rental.id()).await, vec![entry], "{name}");
        assert_eq!(fx.car(fx.car.id()).await.status(), CarStatus::Rented, "{name}");
        fx.assert_availability_consistent().await;
    }
}

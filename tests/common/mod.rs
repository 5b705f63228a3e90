//! Shared fixtures and store decorators for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::sync::Barrier;

use carrental::application::{RentalLifecycleUseCase, RentalQueriesUseCase};
use carrental::domain::{Change, EntityKind, Record};
use carrental::{
    Car, CarDetails, CarStatus, DomainError, FixedClock, Rental, RentalHistory, RentalStatus,
    RentalStore, Role, StoreSession, TransactionOptions, UnitOfWork, User,
};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// "Today" for every fixture-driven test.
pub fn today() -> NaiveDate {
    date(2024, 1, 1)
}

pub struct Fixture {
    pub store: Arc<dyn RentalStore>,
    pub clock: Arc<FixedClock>,
    pub customer: User,
    pub other_customer: User,
    pub admin: User,
    pub car: Car,
}

/// Two customers, one administrator and one available car at 300000.00 a day.
pub async fn fixture(store: Arc<dyn RentalStore>) -> Fixture {
    let clock = Arc::new(FixedClock::on(today()));
    let now = clock.0;

    let mut uow = UnitOfWork::open(store.as_ref()).await.expect("open");
    uow.begin_transaction().await.expect("begin");
    let customer = uow
        .users()
        .add(User::new("budi", "budi@example.com", "hash", "Budi Santoso", Role::User, now))
        .await
        .expect("add customer");
    let other_customer = uow
        .users()
        .add(User::new("sari", "sari@example.com", "hash", "Sari Dewi", Role::User, now))
        .await
        .expect("add other customer");
    let admin = uow
        .users()
        .add(User::new("admin", "admin@example.com", "hash", "Administrator", Role::Admin, now))
        .await
        .expect("add admin");
    let car = uow
        .cars()
        .add(Car::register(
            "B 1234 ABC",
            CarDetails::new("Toyota", "Avanza", 2022, Decimal::new(30000000, 2)),
            now,
        ))
        .await
        .expect("add car");
    uow.commit().await.expect("commit fixture");
    uow.dispose().await.expect("dispose");

    Fixture {
        store,
        clock,
        customer,
        other_customer,
        admin,
        car,
    }
}

impl Fixture {
    pub fn lifecycle(&self) -> RentalLifecycleUseCase {
        RentalLifecycleUseCase::new(self.store.clone(), self.clock.clone())
    }

    pub fn lifecycle_over(&self, store: Arc<dyn RentalStore>) -> RentalLifecycleUseCase {
        RentalLifecycleUseCase::new(store, self.clock.clone())
    }

    pub fn queries(&self) -> RentalQueriesUseCase {
        RentalQueriesUseCase::new(self.store.clone())
    }

    pub async fn add_car(&self, plate: &str, rate: Decimal) -> Car {
        let mut uow = UnitOfWork::open(self.store.as_ref()).await.expect("open");
        let car = uow
            .cars()
            .add(Car::register(
                plate,
                CarDetails::new("Honda", "Jazz", 2021, rate),
                self.clock.0,
            ))
            .await
            .expect("add car");
        uow.persist().await.expect("persist");
        uow.dispose().await.expect("dispose");
        car
    }

    pub async fn car(&self, id: i64) -> Car {
        let mut uow = UnitOfWork::open_read_only(self.store.as_ref()).await.expect("open");
        let car = uow.cars().get_by_id(id).await.expect("load car").expect("car exists");
        uow.dispose().await.expect("dispose");
        car
    }

    pub async fn rentals(&self) -> Vec<Rental> {
        let mut uow = UnitOfWork::open_read_only(self.store.as_ref()).await.expect("open");
        let rentals = uow.rentals().all().await.expect("load rentals");
        uow.dispose().await.expect("dispose");
        rentals
    }

    pub async fn history(&self, rental_id: i64) -> Vec<RentalHistory> {
        let mut uow = UnitOfWork::open_read_only(self.store.as_ref()).await.expect("open");
        let history = uow
            .rental_histories()
            .find(|h| h.rental_id() == rental_id)
            .await
            .expect("load history");
        uow.dispose().await.expect("dispose");
        history
    }

    /// A car is Rented exactly when it has one active rental; never more than one.
    pub async fn assert_availability_consistent(&self) {
        let mut uow = UnitOfWork::open_read_only(self.store.as_ref()).await.expect("open");
        let cars = uow.cars().all().await.expect("load cars");
        let rentals = uow.rentals().all().await.expect("load rentals");
        uow.dispose().await.expect("dispose");

        for car in cars {
            let active = rentals
                .iter()
                .filter(|r| r.car_id() == car.id() && r.status() == RentalStatus::Active)
                .count();
            assert!(active <= 1, "car {} has {} active rentals", car.id(), active);
            assert_eq!(
                car.status() == CarStatus::Rented,
                active == 1,
                "car {} is {:?} with {} active rentals",
                car.id(),
                car.status(),
                active
            );
        }
    }
}

/// Holds every session at its first write until `parties` sessions have arrived.
pub struct GatedStore {
    inner: Arc<dyn RentalStore>,
    gate: Arc<Barrier>,
}

impl GatedStore {
    pub fn new(inner: Arc<dyn RentalStore>, parties: usize) -> Self {
        Self {
            inner,
            gate: Arc::new(Barrier::new(parties)),
        }
    }
}

#[async_trait]
impl RentalStore for GatedStore {
    async fn open_session(&self) -> Result<Box<dyn StoreSession>, DomainError> {
        let inner = self.inner.open_session().await?;
        Ok(Box::new(GatedSession {
            inner,
            gate: Some(self.gate.clone()),
        }))
    }
}

struct GatedSession {
    inner: Box<dyn StoreSession>,
    gate: Option<Arc<Barrier>>,
}

/// Commits `changes` from a separate session just before session number `at` opens.
pub struct InterleavingStore {
    inner: Arc<dyn RentalStore>,
    at: usize,
    opened: AtomicUsize,
    changes: Vec<Change>,
}

impl InterleavingStore {
    pub fn new(inner: Arc<dyn RentalStore>, at: usize, changes: Vec<Change>) -> Self {
        Self {
            inner,
            at,
            opened: AtomicUsize::new(0),
            changes,
        }
    }
}

#[async_trait]
impl RentalStore for InterleavingStore {
    async fn open_session(&self) -> Result<Box<dyn StoreSession>, DomainError> {
        if self.opened.fetch_add(1, Ordering::SeqCst) + 1 == self.at {
            let mut writer = self.inner.open_session().await?;
            writer.write(&self.changes).await?;
            writer.close().await?;
        }
        self.inner.open_session().await
    }
}

/// Fails any write batch that inserts a history entry.
pub struct HistoryFailingStore {
    inner: Arc<dyn RentalStore>,
    armed: Arc<AtomicBool>,
}

impl HistoryFailingStore {
    pub fn new(inner: Arc<dyn RentalStore>) -> Self {
        Self {
            inner,
            armed: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl RentalStore for HistoryFailingStore {
    async fn open_session(&self) -> Result<Box<dyn StoreSession>, DomainError> {
        let inner = self.inner.open_session().await?;
        Ok(Box::new(HistoryFailingSession {
            inner,
            armed: self.armed.clone(),
        }))
    }
}

struct HistoryFailingSession {
    inner: Box<dyn StoreSession>,
    armed: Arc<AtomicBool>,
}

#[async_trait]
impl StoreSession for GatedSession {
    async fn write(&mut self, changes: &[Change]) -> Result<usize, DomainError> {
        if let Some(gate) = self.gate.take() {
            gate.wait().await;
        }
        self.inner.write(changes).await
    }

    async fn begin(&mut self, options: TransactionOptions) -> Result<(), DomainError> {
        self.inner.begin(options).await
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        self.inner.rollback().await
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    async fn next_id(&mut self, kind: EntityKind) -> Result<i64, DomainError> {
        self.inner.next_id(kind).await
    }

    async fn load(&mut self, kind: EntityKind, id: i64) -> Result<Option<Record>, DomainError> {
        self.inner.load(kind, id).await
    }

    async fn load_all(&mut self, kind: EntityKind) -> Result<Vec<Record>, DomainError> {
        self.inner.load_all(kind).await
    }

    async fn close(&mut self) -> Result<(), DomainError> {
        self.inner.close().await
    }
}

#[async_trait]
impl StoreSession for HistoryFailingSession {
    async fn write(&mut self, changes: &[Change]) -> Result<usize, DomainError> {
        let inserts_history = changes
            .iter()
            .any(|c| matches!(c, Change::Insert(Record::RentalHistory(_))));
        if inserts_history && self.armed.load(Ordering::SeqCst) {
            return Err(DomainError::constraint("history table unavailable"));
        }
        self.inner.write(changes).await
    }

    async fn begin(&mut self, options: TransactionOptions) -> Result<(), DomainError> {
        self.inner.begin(options).await
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        self.inner.rollback().await
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    async fn next_id(&mut self, kind: EntityKind) -> Result<i64, DomainError> {
        self.inner.next_id(kind).await
    }

    async fn load(&mut self, kind: EntityKind, id: i64) -> Result<Option<Record>, DomainError> {
        self.inner.load(kind, id).await
    }

    async fn load_all(&mut self, kind: EntityKind) -> Result<Vec<Record>, DomainError> {
        self.inner.load_all(kind).await
    }

    async fn close(&mut self) -> Result<(), DomainError> {
        self.inner.close().await
    }
}

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::application::{RentalStore, StoreSession, TransactionOptions};
use crate::domain::{Change, DomainError, EntityKind, Record};

/// Process-local store with the same constraint and isolation behaviour as the
/// DuckDB store. Used by tests and `--memory-storage`.
pub struct InMemoryRentalStore {
    shared: Arc<Mutex<Shared>>,
}

impl InMemoryRentalStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }
}

impl Default for InMemoryRentalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RentalStore for InMemoryRentalStore {
    async fn open_session(&self) -> Result<Box<dyn StoreSession>, DomainError> {
        Ok(Box::new(InMemorySession {
            shared: Arc::clone(&self.shared),
            tx: None,
            closed: false,
        }))
    }
}

#[derive(Default)]
struct Shared {
    tables: Tables,
    sequences: HashMap<EntityKind, i64>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<i64, Record>,
    cars: BTreeMap<i64, Record>,
    rentals: BTreeMap<i64, Record>,
    histories: BTreeMap<i64, Record>,
}

impl Tables {
    fn rows(&self, kind: EntityKind) -> &BTreeMap<i64, Record> {
        match kind {
            EntityKind::User => &self.users,
            EntityKind::Car => &self.cars,
            EntityKind::Rental => &self.rentals,
            EntityKind::RentalHistory => &self.histories,
        }
    }

    fn rows_mut(&mut self, kind: EntityKind) -> &mut BTreeMap<i64, Record> {
        match kind {
            EntityKind::User => &mut self.users,
            EntityKind::Car => &mut self.cars,
            EntityKind::Rental => &mut self.rentals,
            EntityKind::RentalHistory => &mut self.histories,
        }
    }

    fn contains(&self, kind: EntityKind, id: i64) -> bool {
        self.rows(kind).contains_key(&id)
    }

    fn apply(&mut self, change: &Change) -> Result<(), DomainError> {
        change.check_permitted()?;
        match change {
            Change::Insert(record) => {
                record.check_columns()?;
                if self.contains(record.kind(), record.id()) {
                    return Err(DomainError::constraint(format!(
                        "duplicate key {}.id = {}",
                        record.kind().table(),
                        record.id()
                    )));
                }
                self.check_unique(record)?;
                self.check_references(record)?;
                self.rows_mut(record.kind()).insert(record.id(), record.clone());
            }
            Change::Update(record) => {
                record.check_columns()?;
                let stored = self.rows(record.kind()).get(&record.id()).ok_or_else(|| {
                    DomainError::concurrency(format!(
                        "{} {} no longer exists",
                        record.kind().table(),
                        record.id()
                    ))
                })?;
                let mut next = record.clone();
                if let (Record::Car(stored), Record::Car(car)) = (stored, &mut next) {
                    if stored.version != car.version {
                        return Err(DomainError::concurrency(format!(
                            "car {} was modified concurrently (read version {}, stored version {})",
                            car.id, car.version, stored.version
                        )));
                    }
                    car.version += 1;
                }
                self.check_unique(&next)?;
                self.check_references(&next)?;
                self.rows_mut(next.kind()).insert(next.id(), next);
            }
            Change::Delete(kind, id) => {
                if !self.contains(*kind, *id) {
                    return Err(DomainError::concurrency(format!(
                        "{} {} no longer exists",
                        kind.table(),
                        id
                    )));
                }
                self.check_not_referenced(*kind, *id)?;
                self.rows_mut(*kind).remove(id);
            }
        }
        Ok(())
    }

    fn check_unique(&self, record: &Record) -> Result<(), DomainError> {
        let clash = |column: &str| {
            Err(DomainError::constraint(format!(
                "duplicate key violates unique constraint on {}.{}",
                record.kind().table(),
                column
            )))
        };

        match record {
            Record::User(user) => {
                for other in self.users.values() {
                    if let Record::User(other) = other {
                        if other.id == user.id {
                            continue;
                        }
                        if other.username == user.username {
                            return clash("username");
                        }
                        if other.email == user.email {
                            return clash("email");
                        }
                    }
                }
            }
            Record::Car(car) => {
                let taken = self.cars.values().any(|other| {
                    matches!(other, Record::Car(other) if other.id != car.id && other.license_plate == car.license_plate)
                });
                if taken {
                    return clash("license_plate");
                }
            }
            Record::Rental(_) | Record::RentalHistory(_) => {}
        }
        Ok(())
    }

    fn check_references(&self, record: &Record) -> Result<(), DomainError> {
        let missing = |column: &str, target: EntityKind, id: i64| {
            Err(DomainError::constraint(format!(
                "foreign key {}.{} references missing {} {}",
                record.kind().table(),
                column,
                target.table(),
                id
            )))
        };

        match record {
            Record::Rental(rental) => {
                if !self.contains(EntityKind::User, rental.user_id) {
                    return missing("user_id", EntityKind::User, rental.user_id);
                }
                if !self.contains(EntityKind::Car, rental.car_id) {
                    return missing("car_id", EntityKind::Car, rental.car_id);
                }
            }
            Record::RentalHistory(entry) => {
                if !self.contains(EntityKind::Rental, entry.rental_id) {
                    return missing("rental_id", EntityKind::Rental, entry.rental_id);
                }
                if let Some(actor) = entry.action_by {
                    if !self.contains(EntityKind::User, actor) {
                        return missing("action_by", EntityKind::User, actor);
                    }
                }
            }
            Record::User(_) | Record::Car(_) => {}
        }
        Ok(())
    }

    fn check_not_referenced(&self, kind: EntityKind, id: i64) -> Result<(), DomainError> {
        let referenced = match kind {
            EntityKind::User => {
                self.rentals
                    .values()
                    .any(|r| matches!(r, Record::Rental(r) if r.user_id == id))
                    || self
                        .histories
                        .values()
                        .any(|h| matches!(h, Record::RentalHistory(h) if h.action_by == Some(id)))
            }
            EntityKind::Car => self
                .rentals
                .values()
                .any(|r| matches!(r, Record::Rental(r) if r.car_id == id)),
            EntityKind::Rental | EntityKind::RentalHistory => false,
        };

        if referenced {
            return Err(DomainError::constraint(format!(
                "{} {} is still referenced",
                kind.table(),
                id
            )));
        }
        Ok(())
    }
}

struct PendingTransaction {
    started: Instant,
    options: TransactionOptions,
    /// Changes written so far, replayed against committed state at commit.
    changes: Vec<Change>,
    /// This transaction's view of every row it wrote; `None` marks a delete.
    rows: HashMap<(EntityKind, i64), Option<Record>>,
}

struct InMemorySession {
    shared: Arc<Mutex<Shared>>,
    tx: Option<PendingTransaction>,
    closed: bool,
}

impl InMemorySession {
    fn ensure_open(&self) -> Result<(), DomainError> {
        if self.closed {
            return Err(DomainError::internal("session is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreSession for InMemorySession {
    async fn begin(&mut self, options: TransactionOptions) -> Result<(), DomainError> {
        self.ensure_open()?;
        if self.tx.is_some() {
            return Err(DomainError::internal("a transaction is already open on this session"));
        }
        self.tx = Some(PendingTransaction {
            started: Instant::now(),
            options,
            changes: Vec::new(),
            rows: HashMap::new(),
        });
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        self.ensure_open()?;
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DomainError::internal("no transaction is open"))?;

        let elapsed = tx.started.elapsed();
        if elapsed > tx.options.timeout {
            return Err(DomainError::Persistence {
                message: "transaction timed out".to_string(),
                root_cause: format!(
                    "open for {:?}, limit is {:?}",
                    elapsed, tx.options.timeout
                ),
            });
        }

        let mut shared = self.shared.lock().await;
        let mut next = shared.tables.clone();
        for change in &tx.changes {
            next.apply(change)?;
        }
        shared.tables = next;

        debug!("In-memory transaction committed {} changes", tx.changes.len());
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        if let Some(tx) = self.tx.take() {
            debug!("In-memory transaction discarded {} changes", tx.changes.len());
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    async fn next_id(&mut self, kind: EntityKind) -> Result<i64, DomainError> {
        self.ensure_open()?;
        let mut shared = self.shared.lock().await;
        let sequence = shared.sequences.entry(kind).or_insert(0);
        *sequence += 1;
        Ok(*sequence)
    }

    async fn load(&mut self, kind: EntityKind, id: i64) -> Result<Option<Record>, DomainError> {
        self.ensure_open()?;
        if let Some(row) = self.tx.as_ref().and_then(|tx| tx.rows.get(&(kind, id))) {
            return Ok(row.clone());
        }
        let shared = self.shared.lock().await;
        Ok(shared.tables.rows(kind).get(&id).cloned())
    }

    async fn load_all(&mut self, kind: EntityKind) -> Result<Vec<Record>, DomainError> {
        self.ensure_open()?;
        let shared = self.shared.lock().await;
        let mut rows = shared.tables.rows(kind).clone();
        drop(shared);

        if let Some(tx) = self.tx.as_ref() {
            for ((row_kind, id), row) in &tx.rows {
                if *row_kind != kind {
                    continue;
                }
                match row {
                    Some(record) => rows.insert(*id, record.clone()),
                    None => rows.remove(id),
                };
            }
        }
        Ok(rows.into_values().collect())
    }

    async fn write(&mut self, changes: &[Change]) -> Result<usize, DomainError> {
        self.ensure_open()?;
        let mut shared = self.shared.lock().await;

        match self.tx.as_mut() {
            None => {
                let mut next = shared.tables.clone();
                for change in changes {
                    next.apply(change)?;
                }
                shared.tables = next;
            }
            Some(tx) => {
                let mut view = shared.tables.clone();
                for change in tx.changes.iter().chain(changes) {
                    view.apply(change)?;
                }
                for change in changes {
                    let row = view.rows(change.kind()).get(&change.id()).cloned();
                    tx.rows.insert((change.kind(), change.id()), row);
                }
                tx.changes.extend_from_slice(changes);
            }
        }

        debug!("Wrote {} changes to memory", changes.len());
        Ok(changes.len())
    }

    async fn close(&mut self) -> Result<(), DomainError> {
        self.tx = None;
        self.closed = true;
        Ok(())
    }
}

//! Transactional session shared by the repositories of one business operation.

use std::marker::PhantomData;

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::{RentalStore, StoreSession, TransactionOptions};
use crate::domain::{Car, Change, DomainError, Entity, Rental, RentalHistory, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkState {
    Idle,
    InTransaction,
    Disposed,
}

/// Groups repository mutations against one store session.
///
/// Repository `add`/`update`/`remove` only stage changes; [`UnitOfWork::persist`]
/// writes them. Inside a transaction the written changes become durable only on
/// [`UnitOfWork::commit`].
pub struct UnitOfWork {
    id: Uuid,
    session: Option<Box<dyn StoreSession>>,
    staged: Vec<Change>,
    state: UnitOfWorkState,
    options: TransactionOptions,
    read_only: bool,
}

impl UnitOfWork {
    pub async fn open(store: &dyn RentalStore) -> Result<Self, DomainError> {
        Self::open_with_options(store, TransactionOptions::default()).await
    }

    pub async fn open_with_options(
        store: &dyn RentalStore,
        options: TransactionOptions,
    ) -> Result<Self, DomainError> {
        Self::connect(store, options, false).await
    }

    /// A unit of work whose repositories refuse every mutation.
    pub async fn open_read_only(store: &dyn RentalStore) -> Result<Self, DomainError> {
        Self::connect(store, TransactionOptions::default(), true).await
    }

    async fn connect(
        store: &dyn RentalStore,
        options: TransactionOptions,
        read_only: bool,
    ) -> Result<Self, DomainError> {
        let session = store.open_session().await?;
        let id = Uuid::new_v4();
        debug!(session = %id, read_only, "unit of work opened");

        Ok(Self {
            id,
            session: Some(session),
            staged: Vec::new(),
            state: UnitOfWorkState::Idle,
            options,
            read_only,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> UnitOfWorkState {
        self.state
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Number of changes staged but not yet persisted.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    pub fn users(&mut self) -> Repository<'_, User> {
        Repository::new(self)
    }

    pub fn cars(&mut self) -> Repository<'_, Car> {
        Repository::new(self)
    }

    pub fn rentals(&mut self) -> Repository<'_, Rental> {
        Repository::new(self)
    }

    pub fn rental_histories(&mut self) -> Repository<'_, RentalHistory> {
        Repository::new(self)
    }

    /// Writes every staged change. Returns how many rows were written.
    pub async fn persist(&mut self) -> Result<usize, DomainError> {
        if self.staged.is_empty() {
            return Ok(0);
        }

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| DomainError::internal("unit of work is disposed"))?;

        match session.write(&self.staged).await {
            Ok(written) => {
                self.staged.clear();
                debug!(session = %self.id, written, "staged changes persisted");
                Ok(written)
            }
            Err(e) => {
                error!(
                    session = %self.id,
                    root_cause = e.root_cause().unwrap_or("n/a"),
                    "persist failed: {}",
                    e
                );
                Err(e)
            }
        }
    }

    /// Opens a fresh transaction scope. An already open scope is rolled back first.
    pub async fn begin_transaction(&mut self) -> Result<(), DomainError> {
        if self.state == UnitOfWorkState::InTransaction {
            warn!(session = %self.id, "begin_transaction while a transaction is open; discarding it");
            self.rollback().await?;
        }

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| DomainError::internal("unit of work is disposed"))?;
        session.begin(self.options).await?;
        self.state = UnitOfWorkState::InTransaction;
        debug!(session = %self.id, "transaction started (read committed)");
        Ok(())
    }

    /// Persists, then finalizes the transaction. Any failure rolls back and is returned.
    pub async fn commit(&mut self) -> Result<(), DomainError> {
        if let Err(e) = self.persist().await {
            self.rollback_quietly().await;
            return Err(e);
        }

        if self.state != UnitOfWorkState::InTransaction {
            return Ok(());
        }

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| DomainError::internal("unit of work is disposed"))?;

        match session.commit().await {
            Ok(()) => {
                self.state = UnitOfWorkState::Idle;
                debug!(session = %self.id, "transaction committed");
                Ok(())
            }
            Err(e) => {
                error!(
                    session = %self.id,
                    root_cause = e.root_cause().unwrap_or("n/a"),
                    "commit failed: {}",
                    e
                );
                self.rollback_quietly().await;
                Err(e)
            }
        }
    }

    /// Abandons staged changes and the open transaction, if any.
    pub async fn rollback(&mut self) -> Result<(), DomainError> {
        self.staged.clear();
        if self.state != UnitOfWorkState::InTransaction {
            return Ok(());
        }

        self.state = UnitOfWorkState::Idle;
        if let Some(session) = self.session.as_mut() {
            session.rollback().await?;
        }
        debug!(session = %self.id, "transaction rolled back");
        Ok(())
    }

    async fn rollback_quietly(&mut self) {
        if let Err(e) = self.rollback().await {
            warn!(session = %self.id, "rollback failed: {}", e);
        }
    }

    /// Releases the transaction scope and the session. Safe to call repeatedly.
    pub async fn dispose(&mut self) -> Result<(), DomainError> {
        if self.state == UnitOfWorkState::Disposed {
            return Ok(());
        }

        if self.state == UnitOfWorkState::InTransaction {
            self.rollback_quietly().await;
        }
        self.staged.clear();
        self.state = UnitOfWorkState::Disposed;

        if let Some(mut session) = self.session.take() {
            session.close().await?;
        }
        debug!(session = %self.id, "unit of work disposed");
        Ok(())
    }

    fn session_mut(&mut self) -> Result<&mut Box<dyn StoreSession>, DomainError> {
        self.session
            .as_mut()
            .ok_or_else(|| DomainError::internal("unit of work is disposed"))
    }

    fn ensure_writable(&self) -> Result<(), DomainError> {
        if self.read_only {
            return Err(DomainError::internal("unit of work is read-only"));
        }
        if self.state == UnitOfWorkState::Disposed {
            return Err(DomainError::internal("unit of work is disposed"));
        }
        Ok(())
    }

    fn stage(&mut self, change: Change) -> Result<(), DomainError> {
        self.ensure_writable()?;
        self.staged.push(change);
        Ok(())
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        // The session's own drop discards the open transaction.
        if self.state == UnitOfWorkState::InTransaction {
            warn!(session = %self.id, "unit of work dropped inside a transaction");
        }
    }
}

/// Per-entity data access bound to one unit of work.
pub struct Repository<'u, T: Entity> {
    uow: &'u mut UnitOfWork,
    _entity: PhantomData<T>,
}

impl<'u, T: Entity> Repository<'u, T> {
    fn new(uow: &'u mut UnitOfWork) -> Self {
        Self {
            uow,
            _entity: PhantomData,
        }
    }

    pub async fn get_by_id(&mut self, id: i64) -> Result<Option<T>, DomainError> {
        let record = self.uow.session_mut()?.load(T::KIND, id).await?;
        Ok(record.and_then(T::from_record))
    }

    pub async fn all(&mut self) -> Result<Vec<T>, DomainError> {
        let records = self.uow.session_mut()?.load_all(T::KIND).await?;
        Ok(records.into_iter().filter_map(T::from_record).collect())
    }

    pub async fn find<P>(&mut self, predicate: P) -> Result<Vec<T>, DomainError>
    where
        P: Fn(&T) -> bool + Send,
    {
        let all = self.all().await?;
        Ok(all.into_iter().filter(|e| predicate(e)).collect())
    }

    pub async fn first_matching<P>(&mut self, predicate: P) -> Result<Option<T>, DomainError>
    where
        P: Fn(&T) -> bool + Send,
    {
        let all = self.all().await?;
        Ok(all.into_iter().find(|e| predicate(e)))
    }

    /// Stages an insert and returns the entity with its reserved id.
    pub async fn add(&mut self, mut entity: T) -> Result<T, DomainError> {
        self.uow.ensure_writable()?;
        let id = self.uow.session_mut()?.next_id(T::KIND).await?;
        entity.assign_id(id);
        self.uow.stage(Change::Insert(entity.clone().into_record()))?;
        Ok(entity)
    }

    /// Stages a full-row update. The entity need not have been loaded through this unit of work.
    pub fn update(&mut self, entity: T) -> Result<(), DomainError> {
        self.uow.stage(Change::Update(entity.into_record()))
    }

    pub fn remove(&mut self, entity: T) -> Result<(), DomainError> {
        self.uow.stage(Change::Delete(T::KIND, entity.id()))
    }

    pub async fn query(&mut self) -> Result<Query<T>, DomainError> {
        Ok(Query::new(self.all().await?))
    }

    pub async fn count_all(&mut self) -> Result<usize, DomainError> {
        Ok(self.all().await?.len())
    }

    pub async fn count<P>(&mut self, predicate: P) -> Result<usize, DomainError>
    where
        P: Fn(&T) -> bool + Send,
    {
        Ok(self.find(predicate).await?.len())
    }

    pub async fn any<P>(&mut self, predicate: P) -> Result<bool, DomainError>
    where
        P: Fn(&T) -> bool + Send,
    {
        Ok(self.first_matching(predicate).await?.is_some())
    }
}

/// An in-memory result set with chained filtering and ordering.
#[derive(Debug, Clone)]
pub struct Query<T> {
    items: Vec<T>,
}

impl<T> Query<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn filter(mut self, predicate: impl Fn(&T) -> bool) -> Self {
        self.items.retain(|e| predicate(e));
        self
    }

    pub fn order_by<K: Ord>(mut self, key: impl Fn(&T) -> K) -> Self {
        self.items.sort_by_key(|e| key(e));
        self
    }

    pub fn order_by_desc<K: Ord>(mut self, key: impl Fn(&T) -> K) -> Self {
        self.items.sort_by(|a, b| key(b).cmp(&key(a)));
        self
    }

    pub fn take(mut self, n: usize) -> Self {
        self.items.truncate(n);
        self
    }

    pub fn first(self) -> Option<T> {
        self.items.into_iter().next()
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn to_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T> IntoIterator for Query<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Change, DomainError, EntityKind, Record};

/// Options for an explicit transaction scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    /// A transaction older than this fails at commit instead of holding locks indefinitely.
    pub timeout: Duration,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// Durable storage for users, cars, rentals and rental history.
#[async_trait]
pub trait RentalStore: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn StoreSession>, DomainError>;
}

/// One storage connection.
///
/// Reads observe committed data plus this session's own uncommitted writes
/// (read committed or stronger). Outside a transaction every `write` is atomic
/// and committed immediately. Dropping a session with an open transaction
/// discards that transaction.
#[async_trait]
pub trait StoreSession: Send {
    async fn begin(&mut self, options: TransactionOptions) -> Result<(), DomainError>;

    async fn commit(&mut self) -> Result<(), DomainError>;

    /// Discards the open transaction. No-op when none is open.
    async fn rollback(&mut self) -> Result<(), DomainError>;

    fn in_transaction(&self) -> bool;

    /// Reserves a fresh identifier. Reserved ids are not returned on rollback.
    async fn next_id(&mut self, kind: EntityKind) -> Result<i64, DomainError>;

    async fn load(&mut self, kind: EntityKind, id: i64) -> Result<Option<Record>, DomainError>;

    async fn load_all(&mut self, kind: EntityKind) -> Result<Vec<Record>, DomainError>;

    /// Applies a batch in order, enforcing uniqueness, foreign keys, column rules
    /// and car versions. Returns the number of rows written.
    async fn write(&mut self, changes: &[Change]) -> Result<usize, DomainError>;

    /// Releases the connection, discarding any open transaction. Idempotent.
    async fn close(&mut self) -> Result<(), DomainError>;
}

use tracing::{debug, warn};

use crate::application::{RentalStore, TransactionOptions, UnitOfWork};
use crate::domain::DomainError;

/// Opens a unit of work with an explicit transaction already begun.
pub(crate) async fn begin(
    store: &dyn RentalStore,
    options: TransactionOptions,
) -> Result<UnitOfWork, DomainError> {
    let mut uow = UnitOfWork::open_with_options(store, options).await?;
    if let Err(e) = uow.begin_transaction().await {
        release(&mut uow).await;
        return Err(e);
    }
    Ok(uow)
}

/// Commits on success and rolls back on failure. The unit of work is disposed
/// on every path.
pub(crate) async fn finish<T>(
    mut uow: UnitOfWork,
    result: Result<T, DomainError>,
    operation: &str,
) -> Result<T, DomainError> {
    let outcome = match result {
        Ok(value) => uow.commit().await.map(|_| value),
        Err(e) => {
            warn!(session = %uow.id(), "{} rejected: {}", operation, e);
            if let Err(rollback_err) = uow.rollback().await {
                warn!(session = %uow.id(), "rollback after failed {} also failed: {}", operation, rollback_err);
            }
            Err(e)
        }
    };

    release(&mut uow).await;
    outcome
}

/// Read-only work never commits; it only needs the session released.
pub(crate) async fn read<T>(mut uow: UnitOfWork, result: Result<T, DomainError>) -> Result<T, DomainError> {
    release(&mut uow).await;
    result
}

async fn release(uow: &mut UnitOfWork) {
    if let Err(e) = uow.dispose().await {
        warn!(session = %uow.id(), "failed to release unit of work: {}", e);
    } else {
        debug!(session = %uow.id(), "unit of work released");
    }
}

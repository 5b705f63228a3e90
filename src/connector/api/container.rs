use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use crate::application::{
    CarInventoryUseCase, Clock, RentalLifecycleUseCase, RentalQueriesUseCase, RentalStore,
    ReportsUseCase, SystemClock, TransactionOptions, UserAccountsUseCase,
};
use crate::connector::{DuckdbRentalStore, InMemoryRentalStore};

pub struct ContainerConfig {
    pub data_dir: String,
    pub memory_storage: bool,
    /// Transactions open longer than this fail at commit.
    pub tx_timeout_secs: u64,
    pub bcrypt_cost: u32,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            data_dir: ".".to_string(),
            memory_storage: true,
            tx_timeout_secs: 30,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

pub struct Container {
    store: Arc<dyn RentalStore>,
    clock: Arc<dyn Clock>,
    config: ContainerConfig,
}

impl Container {
    pub async fn new(config: ContainerConfig) -> Result<Self> {
        let store: Arc<dyn RentalStore> = if config.memory_storage {
            debug!("Using in-memory rental storage");
            Arc::new(InMemoryRentalStore::new())
        } else {
            let db_path = PathBuf::from(&config.data_dir).join("carrental.duckdb");
            debug!("Using DuckDB rental storage at {:?}", db_path);
            Arc::new(DuckdbRentalStore::new(&db_path)?)
        };

        Ok(Self::with_parts(config, store, Arc::new(SystemClock)))
    }

    /// Wires the use cases over an existing store and clock.
    pub fn with_parts(config: ContainerConfig, store: Arc<dyn RentalStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    fn transaction_options(&self) -> TransactionOptions {
        TransactionOptions {
            timeout: Duration::from_secs(self.config.tx_timeout_secs),
        }
    }

    pub fn lifecycle_use_case(&self) -> RentalLifecycleUseCase {
        RentalLifecycleUseCase::new(self.store.clone(), self.clock.clone())
            .with_transaction_options(self.transaction_options())
    }

    pub fn queries_use_case(&self) -> RentalQueriesUseCase {
        RentalQueriesUseCase::new(self.store.clone())
    }

    pub fn inventory_use_case(&self) -> CarInventoryUseCase {
        CarInventoryUseCase::new(self.store.clone(), self.clock.clone())
            .with_transaction_options(self.transaction_options())
    }

    pub fn accounts_use_case(&self) -> UserAccountsUseCase {
        UserAccountsUseCase::new(self.store.clone(), self.clock.clone(), self.config.bcrypt_cost)
            .with_transaction_options(self.transaction_options())
    }

    pub fn reports_use_case(&self) -> ReportsUseCase {
        ReportsUseCase::new(self.store.clone())
    }

    pub fn data_dir(&self) -> &str {
        &self.config.data_dir
    }

    pub fn memory_storage(&self) -> bool {
        self.config.memory_storage
    }
}

//! Store selection from `LedgerConfig`: Postgres when a database URL is set, in-memory
//! otherwise.

use tracing::info;

use resinstock_core::{InventoryCountId, LocationCode, ProductionOrderId, TransferId};
use resinstock_inventory::{
    BalanceKey, InventoryCount, LoggedMovement, ProductionOrder, StockAdjustment, StockBalance,
    Transfer, TransferStatus,
};

use super::in_memory::InMemoryLedgerStore;
use super::postgres::PostgresLedgerStore;
use super::query::MovementQuery;
use super::r#trait::{ChangeSet, Committed, LedgerStore, StoreError};
use crate::config::LedgerConfig;

#[derive(Debug)]
pub enum ConfiguredStore {
    InMemory(InMemoryLedgerStore),
    Postgres(PostgresLedgerStore),
}

impl ConfiguredStore {
    /// Open the store `config` selects. Postgres connections are established and the
    /// schema created before returning.
    pub async fn open(config: &LedgerConfig) -> Result<Self, StoreError> {
        match config.database_url.as_deref() {
            Some(url) => {
                let store = PostgresLedgerStore::connect(url, config.db_max_connections).await?;
                info!(max_connections = config.db_max_connections, "using postgres ledger store");
                Ok(Self::Postgres(store))
            }
            None => {
                info!("no database configured, using in-memory ledger store");
                Ok(Self::InMemory(InMemoryLedgerStore::new()))
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::InMemory(_) => "in-memory",
            Self::Postgres(_) => "postgres",
        }
    }

    fn inner(&self) -> &dyn LedgerStore {
        match self {
            Self::InMemory(store) => store,
            Self::Postgres(store) => store,
        }
    }
}

impl LedgerStore for ConfiguredStore {
    fn read_balance(&self, key: &BalanceKey) -> Result<Option<StockBalance>, StoreError> {
        self.inner().read_balance(key)
    }

    fn balances_at(&self, location: &LocationCode) -> Result<Vec<StockBalance>, StoreError> {
        self.inner().balances_at(location)
    }

    fn snapshot(&self) -> Result<Vec<StockBalance>, StoreError> {
        self.inner().snapshot()
    }

    fn commit(&self, changes: ChangeSet) -> Result<Committed, StoreError> {
        self.inner().commit(changes)
    }

    fn load_transfer(&self, id: &TransferId) -> Result<Option<Transfer>, StoreError> {
        self.inner().load_transfer(id)
    }

    fn list_transfers(&self, status: Option<TransferStatus>) -> Result<Vec<Transfer>, StoreError> {
        self.inner().list_transfers(status)
    }

    fn load_production_order(
        &self,
        id: &ProductionOrderId,
    ) -> Result<Option<ProductionOrder>, StoreError> {
        self.inner().load_production_order(id)
    }

    fn load_count(&self, id: &InventoryCountId) -> Result<Option<InventoryCount>, StoreError> {
        self.inner().load_count(id)
    }

    fn movements(&self, query: &MovementQuery) -> Result<Vec<LoggedMovement>, StoreError> {
        self.inner().movements(query)
    }

    fn adjustments(&self, key: Option<&BalanceKey>) -> Result<Vec<StockAdjustment>, StoreError> {
        self.inner().adjustments(key)
    }
}

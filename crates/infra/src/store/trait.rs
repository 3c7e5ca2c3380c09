use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use resinstock_core::{
    Actor, ExpectedVersion, InventoryCountId, LocationCode, ProductionOrderId, TransferId,
};
use resinstock_inventory::{
    BalanceKey, InventoryCount, LoggedMovement, Movement, ProductionOrder, StockAdjustment,
    StockBalance, StockLevel, Transfer, TransferStatus,
};

use super::query::MovementQuery;

/// Persistence-layer failure.
///
/// These are **infrastructure errors** as opposed to domain errors (validation,
/// insufficient stock). `Concurrency` is the only one a caller should retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("storage backend failure: {0}")]
    Backend(String),

    #[error("serialization failure: {0}")]
    Serialization(String),
}

/// A new balance level for one key, guarded by the version observed at read time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceWrite {
    pub key: BalanceKey,
    pub level: StockLevel,
    pub expected_version: ExpectedVersion,
    pub updated_by: Actor,
    pub updated_at: DateTime<Utc>,
}

/// An aggregate document to upsert, guarded by its expected stored version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateWrite<T> {
    pub aggregate: T,
    pub expected_version: ExpectedVersion,
}

impl<T: resinstock_core::AggregateRoot> AggregateWrite<T> {
    /// Guard on the version the aggregate carried when it was loaded.
    pub fn loaded(aggregate: T) -> Self {
        let expected_version = aggregate.expected_version();
        Self {
            aggregate,
            expected_version,
        }
    }
}

/// Everything one workflow invocation writes.
///
/// A store applies a change set entirely or not at all: every version guard is
/// checked before anything is written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub balances: Vec<BalanceWrite>,
    pub movements: Vec<Movement>,
    pub adjustments: Vec<StockAdjustment>,
    pub transfers: Vec<AggregateWrite<Transfer>>,
    pub counts: Vec<AggregateWrite<InventoryCount>>,
    /// Production orders are insert-only.
    pub production_orders: Vec<ProductionOrder>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
            && self.movements.is_empty()
            && self.adjustments.is_empty()
            && self.transfers.is_empty()
            && self.counts.is_empty()
            && self.production_orders.is_empty()
    }
}

/// What a successful commit persisted, with store-assigned versions and sequence numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Committed {
    pub balances: Vec<StockBalance>,
    pub movements: Vec<LoggedMovement>,
    pub transfers: Vec<Transfer>,
    pub counts: Vec<InventoryCount>,
}

/// Persistence boundary of the stock ledger.
///
/// ## Commit semantics
///
/// `commit()`:
/// - checks every balance and aggregate version guard first
/// - fails with `StoreError::Concurrency` (and writes nothing) on any mismatch
/// - bumps each written row's version by one
/// - assigns movements consecutive global sequence numbers in change-set order
///
/// Reads never block writers for longer than one commit.
pub trait LedgerStore: Send + Sync {
    /// Current balance row, `None` when the key has never moved.
    fn read_balance(&self, key: &BalanceKey) -> Result<Option<StockBalance>, StoreError>;

    /// Every balance row at one location, ordered by product.
    fn balances_at(&self, location: &LocationCode) -> Result<Vec<StockBalance>, StoreError>;

    /// Every balance row.
    fn snapshot(&self) -> Result<Vec<StockBalance>, StoreError>;

    fn commit(&self, changes: ChangeSet) -> Result<Committed, StoreError>;

    fn load_transfer(&self, id: &TransferId) -> Result<Option<Transfer>, StoreError>;

    fn list_transfers(&self, status: Option<TransferStatus>)
    -> Result<Vec<Transfer>, StoreError>;

    fn load_production_order(
        &self,
        id: &ProductionOrderId,
    ) -> Result<Option<ProductionOrder>, StoreError>;

    fn load_count(&self, id: &InventoryCountId) -> Result<Option<InventoryCount>, StoreError>;

    /// Logged movements matching `query`, in sequence order.
    fn movements(&self, query: &MovementQuery) -> Result<Vec<LoggedMovement>, StoreError>;

    /// Adjustments, optionally restricted to one key, oldest first.
    fn adjustments(&self, key: Option<&BalanceKey>) -> Result<Vec<StockAdjustment>, StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn read_balance(&self, key: &BalanceKey) -> Result<Option<StockBalance>, StoreError> {
        (**self).read_balance(key)
    }

    fn balances_at(&self, location: &LocationCode) -> Result<Vec<StockBalance>, StoreError> {
        (**self).balances_at(location)
    }

    fn snapshot(&self) -> Result<Vec<StockBalance>, StoreError> {
        (**self).snapshot()
    }

    fn commit(&self, changes: ChangeSet) -> Result<Committed, StoreError> {
        (**self).commit(changes)
    }

    fn load_transfer(&self, id: &TransferId) -> Result<Option<Transfer>, StoreError> {
        (**self).load_transfer(id)
    }

    fn list_transfers(
        &self,
        status: Option<TransferStatus>,
    ) -> Result<Vec<Transfer>, StoreError> {
        (**self).list_transfers(status)
    }

    fn load_production_order(
        &self,
        id: &ProductionOrderId,
    ) -> Result<Option<ProductionOrder>, StoreError> {
        (**self).load_production_order(id)
    }

    fn load_count(&self, id: &InventoryCountId) -> Result<Option<InventoryCount>, StoreError> {
        (**self).load_count(id)
    }

    fn movements(&self, query: &MovementQuery) -> Result<Vec<LoggedMovement>, StoreError> {
        (**self).movements(query)
    }

    fn adjustments(&self, key: Option<&BalanceKey>) -> Result<Vec<StockAdjustment>, StoreError> {
        (**self).adjustments(key)
    }
}

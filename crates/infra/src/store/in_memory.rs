use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard};

use resinstock_core::{InventoryCountId, LocationCode, ProductionOrderId, TransferId};
use resinstock_inventory::{
    BalanceKey, InventoryCount, LoggedMovement, ProductionOrder, StockAdjustment, StockBalance,
    Transfer, TransferStatus,
};

use super::query::MovementQuery;
use super::r#trait::{ChangeSet, Committed, LedgerStore, StoreError};

#[derive(Debug, Default)]
struct LedgerState {
    balances: BTreeMap<BalanceKey, StockBalance>,
    movements: Vec<LoggedMovement>,
    adjustments: Vec<StockAdjustment>,
    transfers: HashMap<TransferId, Transfer>,
    production_orders: HashMap<ProductionOrderId, ProductionOrder>,
    counts: HashMap<InventoryCountId, InventoryCount>,
}

/// In-memory ledger store.
///
/// One write lock covers version checks and application, so a commit is atomic with
/// respect to every other commit and read. Intended for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    /// Number of movements ever appended.
    pub fn movement_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.movements.len())
    }
}

fn check_changes(state: &LedgerState, changes: &ChangeSet) -> Result<(), StoreError> {
    let mut seen = BTreeSet::new();
    for write in &changes.balances {
        if !seen.insert(&write.key) {
            return Err(StoreError::Backend(format!(
                "change set writes balance {} twice",
                write.key
            )));
        }
        let current = state.balances.get(&write.key).map_or(0, |b| b.version);
        if !write.expected_version.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "balance {}: expected {:?}, found {current}",
                write.key, write.expected_version
            )));
        }
    }

    for write in &changes.transfers {
        let id = write.aggregate.id;
        let current = state.transfers.get(&id).map_or(0, |t| t.version);
        if !write.expected_version.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "transfer {id}: expected {:?}, found {current}",
                write.expected_version
            )));
        }
    }

    for write in &changes.counts {
        let id = write.aggregate.id;
        let current = state.counts.get(&id).map_or(0, |c| c.version);
        if !write.expected_version.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "inventory count {id}: expected {:?}, found {current}",
                write.expected_version
            )));
        }
    }

    for order in &changes.production_orders {
        if state.production_orders.contains_key(&order.id) {
            return Err(StoreError::Concurrency(format!(
                "production order {} already exists",
                order.id
            )));
        }
    }

    Ok(())
}

impl LedgerStore for InMemoryLedgerStore {
    fn read_balance(&self, key: &BalanceKey) -> Result<Option<StockBalance>, StoreError> {
        Ok(self.read()?.balances.get(key).cloned())
    }

    fn balances_at(&self, location: &LocationCode) -> Result<Vec<StockBalance>, StoreError> {
        Ok(self
            .read()?
            .balances
            .values()
            .filter(|b| b.key.location == *location)
            .cloned()
            .collect())
    }

    fn snapshot(&self) -> Result<Vec<StockBalance>, StoreError> {
        Ok(self.read()?.balances.values().cloned().collect())
    }

    fn commit(&self, changes: ChangeSet) -> Result<Committed, StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        // All guards first; nothing below may fail.
        check_changes(&state, &changes)?;

        let mut committed = Committed::default();

        for write in changes.balances {
            let version = state.balances.get(&write.key).map_or(0, |b| b.version) + 1;
            let balance = StockBalance {
                key: write.key.clone(),
                level: write.level,
                version,
                updated_by: Some(write.updated_by),
                updated_at: Some(write.updated_at),
            };
            state.balances.insert(write.key, balance.clone());
            committed.balances.push(balance);
        }

        for movement in changes.movements {
            let logged = LoggedMovement {
                sequence_number: state.movements.len() as u64 + 1,
                movement,
            };
            state.movements.push(logged.clone());
            committed.movements.push(logged);
        }

        state.adjustments.extend(changes.adjustments);

        for write in changes.transfers {
            let mut transfer = write.aggregate;
            transfer.version = state.transfers.get(&transfer.id).map_or(0, |t| t.version) + 1;
            state.transfers.insert(transfer.id, transfer.clone());
            committed.transfers.push(transfer);
        }

        for write in changes.counts {
            let mut count = write.aggregate;
            count.version = state.counts.get(&count.id).map_or(0, |c| c.version) + 1;
            state.counts.insert(count.id, count.clone());
            committed.counts.push(count);
        }

        for order in changes.production_orders {
            state.production_orders.insert(order.id, order);
        }

        Ok(committed)
    }

    fn load_transfer(&self, id: &TransferId) -> Result<Option<Transfer>, StoreError> {
        Ok(self.read()?.transfers.get(id).cloned())
    }

    fn list_transfers(
        &self,
        status: Option<TransferStatus>,
    ) -> Result<Vec<Transfer>, StoreError> {
        let mut transfers: Vec<Transfer> = self
            .read()?
            .transfers
            .values()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        transfers.sort_by(|a, b| a.requested_at.cmp(&b.requested_at).then(a.id.cmp(&b.id)));
        Ok(transfers)
    }

    fn load_production_order(
        &self,
        id: &ProductionOrderId,
    ) -> Result<Option<ProductionOrder>, StoreError> {
        Ok(self.read()?.production_orders.get(id).cloned())
    }

    fn load_count(&self, id: &InventoryCountId) -> Result<Option<InventoryCount>, StoreError> {
        Ok(self.read()?.counts.get(id).cloned())
    }

    fn movements(&self, query: &MovementQuery) -> Result<Vec<LoggedMovement>, StoreError> {
        let state = self.read()?;
        let matching = state.movements.iter().filter(|m| query.matches(m)).cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    fn adjustments(&self, key: Option<&BalanceKey>) -> Result<Vec<StockAdjustment>, StoreError> {
        Ok(self
            .read()?
            .adjustments
            .iter()
            .filter(|a| key.is_none_or(|k| a.product_id == k.product_id && a.location == k.location))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use resinstock_core::{Actor, ExpectedVersion, ProductId, UserId};
    use resinstock_inventory::{
        Movement, MovementReference, MovementType, Product, StockLevel, StockUnit,
    };
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;
    use crate::store::BalanceWrite;

    fn actor() -> Actor {
        Actor::new(UserId::new(), "Tester")
    }

    fn entry(product: &Product, location: &str, kg: rust_decimal::Decimal, expected: u64) -> ChangeSet {
        let key = BalanceKey::new(product.id, location);
        let level = StockLevel::from_kg(kg, StockUnit::Kg, product);
        ChangeSet {
            balances: vec![BalanceWrite {
                key: key.clone(),
                level: level.clone(),
                expected_version: ExpectedVersion::Exact(expected),
                updated_by: actor(),
                updated_at: Utc::now(),
            }],
            movements: vec![Movement::inbound(
                MovementType::Entry,
                &key,
                &level,
                MovementReference::receipt(Uuid::now_v7()),
                &actor(),
                Utc::now(),
            )],
            ..ChangeSet::default()
        }
    }

    #[test]
    fn commit_bumps_versions_and_sequences() {
        let store = InMemoryLedgerStore::new();
        let p = Product::bulk(ProductId::new(), "CaCO3");

        let first = store.commit(entry(&p, "CD", dec!(10), 0)).unwrap();
        assert_eq!(first.balances[0].version, 1);
        assert_eq!(first.movements[0].sequence_number, 1);

        let second = store.commit(entry(&p, "CD", dec!(20), 1)).unwrap();
        assert_eq!(second.balances[0].version, 2);
        assert_eq!(second.movements[0].sequence_number, 2);

        let key = BalanceKey::new(p.id, "CD");
        assert_eq!(store.read_balance(&key).unwrap().unwrap().level.total_kg, dec!(20));
    }

    #[test]
    fn stale_version_applies_nothing() {
        let store = InMemoryLedgerStore::new();
        let p = Product::bulk(ProductId::new(), "CaCO3");
        store.commit(entry(&p, "CD", dec!(10), 0)).unwrap();

        let mut stale = entry(&p, "CD", dec!(99), 0);
        stale.balances.extend(entry(&p, "PCP", dec!(5), 0).balances);
        let err = store.commit(stale).unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));

        assert_eq!(store.movement_count().unwrap(), 1);
        assert!(store.read_balance(&BalanceKey::new(p.id, "PCP")).unwrap().is_none());
    }

    #[test]
    fn duplicate_keys_in_one_change_set_are_rejected() {
        let store = InMemoryLedgerStore::new();
        let p = Product::bulk(ProductId::new(), "CaCO3");
        let mut changes = entry(&p, "CD", dec!(10), 0);
        changes.balances.push(changes.balances[0].clone());
        assert!(matches!(store.commit(changes), Err(StoreError::Backend(_))));
    }
}

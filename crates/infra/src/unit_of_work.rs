//! Unit of work: stage reads and writes of one workflow invocation, commit them at once.
//!
//! Every balance read through the unit records the version it observed; the commit
//! sends those versions as compare-and-swap guards. Nothing reaches the store before
//! `commit()`, so returning an error from a workflow body discards all staged work.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use resinstock_core::{Actor, ExpectedVersion};
use resinstock_inventory::{
    BalanceKey, InventoryCount, Movement, Product, ProductionOrder, StockAdjustment, StockBalance,
    StockLevel, Transfer,
};

use crate::error::{LedgerError, LedgerResult};
use crate::store::{AggregateWrite, BalanceWrite, ChangeSet, Committed, LedgerStore};

#[derive(Debug, Clone)]
struct StagedBalance {
    observed_version: u64,
    current: StockBalance,
    dirty: bool,
}

/// Result of debiting one balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Debit {
    pub before: StockLevel,
    pub after: StockLevel,
    /// True when the debit exceeded the balance and was clamped at zero.
    pub clamped: bool,
}

pub struct UnitOfWork<'s, S: ?Sized> {
    store: &'s S,
    actor: Actor,
    at: DateTime<Utc>,
    balances: BTreeMap<BalanceKey, StagedBalance>,
    changes: ChangeSet,
}

impl<'s, S> UnitOfWork<'s, S>
where
    S: LedgerStore + ?Sized,
{
    pub fn begin(store: &'s S, actor: Actor, at: DateTime<Utc>) -> Self {
        Self {
            store,
            actor,
            at,
            balances: BTreeMap::new(),
            changes: ChangeSet::default(),
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Timestamp shared by every record of this unit.
    pub fn now(&self) -> DateTime<Utc> {
        self.at
    }

    pub fn store(&self) -> &'s S {
        self.store
    }

    fn stage(&mut self, key: &BalanceKey, product: &Product) -> LedgerResult<&mut StagedBalance> {
        if !self.balances.contains_key(key) {
            let current = self
                .store
                .read_balance(key)?
                .unwrap_or_else(|| StockBalance::empty(key.clone(), product));
            self.balances.insert(
                key.clone(),
                StagedBalance {
                    observed_version: current.version,
                    current,
                    dirty: false,
                },
            );
        }
        self.balances
            .get_mut(key)
            .ok_or_else(|| LedgerError::InvariantViolation(format!("balance {key} not staged")))
    }

    /// Balance as this unit sees it: staged writes included, implicit zero when absent.
    pub fn read(&mut self, key: &BalanceKey, product: &Product) -> LedgerResult<StockBalance> {
        Ok(self.stage(key, product)?.current.clone())
    }

    /// Overwrite a balance. The ledger itself does not clamp.
    pub fn write(&mut self, key: &BalanceKey, level: StockLevel, product: &Product) -> LedgerResult<()> {
        if level.total_kg.is_sign_negative() && !level.total_kg.is_zero() {
            return Err(LedgerError::InvariantViolation(format!(
                "balance {key} would become negative ({} kg)",
                level.total_kg
            )));
        }
        let staged = self.stage(key, product)?;
        staged.current.level = level;
        staged.dirty = true;
        Ok(())
    }

    /// Remove `kg` from a balance, clamping at zero.
    pub fn debit(&mut self, key: &BalanceKey, kg: Decimal, product: &Product) -> LedgerResult<Debit> {
        let before = self.read(key, product)?.level;
        let clamped = before.would_clamp(kg);
        if clamped {
            warn!(
                balance = %key,
                requested_kg = %kg,
                available_kg = %before.total_kg,
                "debit exceeds balance, clamping at zero"
            );
        }
        let after = before.debit(kg, product);
        self.write(key, after.clone(), product)?;
        Ok(Debit {
            before,
            after,
            clamped,
        })
    }

    /// Add `kg` to a balance.
    pub fn credit(&mut self, key: &BalanceKey, kg: Decimal, product: &Product) -> LedgerResult<StockLevel> {
        let after = self.read(key, product)?.level.credit(kg, product);
        self.write(key, after.clone(), product)?;
        Ok(after)
    }

    pub fn append_movement(&mut self, movement: Movement) {
        self.changes.movements.push(movement);
    }

    pub fn record_adjustment(&mut self, adjustment: StockAdjustment) {
        self.changes.adjustments.push(adjustment);
    }

    /// Save a transfer, guarded by the version it was loaded at.
    pub fn save_transfer(&mut self, transfer: Transfer) {
        self.changes.transfers.push(AggregateWrite::loaded(transfer));
    }

    pub fn save_count(&mut self, count: InventoryCount) {
        self.changes.counts.push(AggregateWrite::loaded(count));
    }

    pub fn save_production_order(&mut self, order: ProductionOrder) {
        self.changes.production_orders.push(order);
    }

    /// Commit every staged change atomically.
    ///
    /// Fails with `InvariantViolation` (before touching the store) when a written
    /// balance has no movement on the same key.
    pub fn commit(self) -> LedgerResult<Committed> {
        let Self {
            store,
            actor,
            at,
            balances,
            mut changes,
        } = self;

        for (key, staged) in balances.iter().filter(|(_, s)| s.dirty) {
            let has_movement = changes
                .movements
                .iter()
                .any(|m| m.product_id == key.product_id && m.location == key.location);
            if !has_movement {
                return Err(LedgerError::InvariantViolation(format!(
                    "balance {key} written without a movement"
                )));
            }
            changes.balances.push(BalanceWrite {
                key: key.clone(),
                level: staged.current.level.clone(),
                expected_version: ExpectedVersion::Exact(staged.observed_version),
                updated_by: actor.clone(),
                updated_at: at,
            });
        }

        if changes.is_empty() {
            return Ok(Committed::default());
        }

        let committed = store.commit(changes)?;
        debug!(
            balances = committed.balances.len(),
            movements = committed.movements.len(),
            "unit of work committed"
        );
        Ok(committed)
    }
}

/// Run `body` in a fresh unit of work and commit it, retrying the whole body on
/// concurrency conflicts up to `max_retries` times.
pub fn run_atomic<S, T, F>(
    store: &S,
    max_retries: u32,
    actor: &Actor,
    operation: &'static str,
    mut body: F,
) -> LedgerResult<(T, Committed)>
where
    S: LedgerStore + ?Sized,
    F: FnMut(&mut UnitOfWork<'_, S>) -> LedgerResult<T>,
{
    let mut attempt = 0u32;
    loop {
        let mut uow = UnitOfWork::begin(store, actor.clone(), Utc::now());
        let value = body(&mut uow)?;
        match uow.commit() {
            Ok(committed) => return Ok((value, committed)),
            Err(err) if err.is_conflict() && attempt < max_retries => {
                attempt += 1;
                warn!(operation, attempt, max_retries, error = %err, "conflict, retrying unit of work");
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use resinstock_core::{ProductId, UserId};
    use resinstock_inventory::{MovementReference, MovementType, StockUnit};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;
    use crate::store::InMemoryLedgerStore;

    fn actor() -> Actor {
        Actor::new(UserId::new(), "Tester")
    }

    #[test]
    fn staged_reads_see_staged_writes() {
        let store = InMemoryLedgerStore::new();
        let p = Product::bulk(ProductId::new(), "CaCO3");
        let key = BalanceKey::new(p.id, "CD");
        let mut uow = UnitOfWork::begin(&store, actor(), Utc::now());

        uow.credit(&key, dec!(40), &p).unwrap();
        let debit = uow.debit(&key, dec!(15), &p).unwrap();
        assert_eq!(debit.before.total_kg, dec!(40));
        assert_eq!(debit.after.total_kg, dec!(25));
        assert!(!debit.clamped);

        // Nothing reaches the store before commit.
        assert!(store.read_balance(&key).unwrap().is_none());
    }

    #[test]
    fn write_without_movement_is_refused() {
        let store = InMemoryLedgerStore::new();
        let p = Product::bulk(ProductId::new(), "CaCO3");
        let key = BalanceKey::new(p.id, "CD");
        let mut uow = UnitOfWork::begin(&store, actor(), Utc::now());
        uow.credit(&key, dec!(1), &p).unwrap();

        assert!(matches!(uow.commit(), Err(LedgerError::InvariantViolation(_))));
        assert!(store.read_balance(&key).unwrap().is_none());
    }

    #[test]
    fn debit_past_zero_clamps() {
        let store = InMemoryLedgerStore::new();
        let p = Product::bulk(ProductId::new(), "CaCO3");
        let key = BalanceKey::new(p.id, "CD");
        let mut uow = UnitOfWork::begin(&store, actor(), Utc::now());
        uow.credit(&key, dec!(10), &p).unwrap();
        let debit = uow.debit(&key, dec!(25), &p).unwrap();
        assert!(debit.clamped);
        assert_eq!(debit.after, StockLevel::zero(StockUnit::Kg));
    }

    #[test]
    fn run_atomic_retries_after_a_conflict() {
        let store = InMemoryLedgerStore::new();
        let p = Product::bulk(ProductId::new(), "CaCO3");
        let key = BalanceKey::new(p.id, "CD");
        let mut attempts = 0;

        let (_, committed) = run_atomic(&store, 3, &actor(), "test", |uow| {
            attempts += 1;
            let level = uow.credit(&key, dec!(5), &p)?;
            uow.append_movement(Movement::inbound(
                MovementType::Entry,
                &key,
                &StockLevel::from_kg(dec!(5), StockUnit::Kg, &p),
                MovementReference::receipt(Uuid::now_v7()),
                uow.actor(),
                uow.now(),
            ));
            if attempts == 1 {
                // A competing writer commits between our read and our commit.
                let mut rival = UnitOfWork::begin(uow.store(), actor(), Utc::now());
                rival.credit(&key, dec!(100), &p)?;
                rival.append_movement(Movement::inbound(
                    MovementType::Entry,
                    &key,
                    &StockLevel::from_kg(dec!(100), StockUnit::Kg, &p),
                    MovementReference::receipt(Uuid::now_v7()),
                    &actor(),
                    Utc::now(),
                ));
                rival.commit()?;
            }
            Ok(level)
        })
        .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(committed.balances[0].level.total_kg, dec!(105));
        assert_eq!(committed.balances[0].version, 2);
    }

    #[test]
    fn run_atomic_gives_up_after_max_retries() {
        let store = InMemoryLedgerStore::new();
        let p = Product::bulk(ProductId::new(), "CaCO3");
        let key = BalanceKey::new(p.id, "CD");

        let result = run_atomic(&store, 1, &actor(), "test", |uow| {
            uow.credit(&key, dec!(5), &p)?;
            uow.append_movement(Movement::inbound(
                MovementType::Entry,
                &key,
                &StockLevel::from_kg(dec!(5), StockUnit::Kg, &p),
                MovementReference::receipt(Uuid::now_v7()),
                uow.actor(),
                uow.now(),
            ));
            let mut rival = UnitOfWork::begin(uow.store(), actor(), Utc::now());
            rival.credit(&key, dec!(1), &p)?;
            rival.append_movement(Movement::inbound(
                MovementType::Entry,
                &key,
                &StockLevel::from_kg(dec!(1), StockUnit::Kg, &p),
                MovementReference::receipt(Uuid::now_v7()),
                &actor(),
                Utc::now(),
            ));
            rival.commit()?;
            Ok(())
        });

        assert!(matches!(result, Err(LedgerError::Concurrency(_))));
    }
}

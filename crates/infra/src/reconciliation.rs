//! Reconciliation workflow: physical counts with mandatory justification.

use rust_decimal::Decimal;
use tracing::{debug, info, instrument};

use resinstock_core::{Actor, InventoryCountId, LocationCode, ProductId};
use resinstock_events::EventBus;
use resinstock_inventory::{
    AdjustmentReference, InventoryCount, Movement, StockAdjustment, StockLevel,
};

use crate::catalog::{Catalog, require_active_location, require_product};
use crate::context::{LedgerContext, MovementEnvelope};
use crate::error::{LedgerError, LedgerResult};
use crate::store::{Committed, LedgerStore};
use crate::unit_of_work::UnitOfWork;

pub struct ReconciliationWorkflow<S, C, B> {
    ctx: LedgerContext<S, C, B>,
}

fn load_count<S: LedgerStore + ?Sized>(
    uow: &UnitOfWork<'_, S>,
    count_id: &InventoryCountId,
) -> LedgerResult<InventoryCount> {
    uow.store()
        .load_count(count_id)?
        .ok_or_else(|| LedgerError::not_found(format!("inventory count {count_id}")))
}

fn saved_count(committed: Committed) -> LedgerResult<InventoryCount> {
    committed
        .counts
        .into_iter()
        .next()
        .ok_or_else(|| LedgerError::InvariantViolation("inventory count was not saved".into()))
}

impl<S, C, B> ReconciliationWorkflow<S, C, B>
where
    S: LedgerStore,
    C: Catalog,
    B: EventBus<MovementEnvelope>,
{
    pub fn new(ctx: LedgerContext<S, C, B>) -> Self {
        Self { ctx }
    }

    /// Open a draft count holding every balance currently recorded at `location`.
    #[instrument(skip(self, actor), fields(actor = %actor), err)]
    pub fn start(&self, location: &LocationCode, actor: &Actor) -> LedgerResult<InventoryCount> {
        require_active_location(&self.ctx.catalog, location)?;
        let count_id = InventoryCountId::new();

        let (_, committed) = self.ctx.atomically(actor, "count.start", |uow| {
            let balances = uow.store().balances_at(location)?;
            let count =
                InventoryCount::start(count_id, location.clone(), &balances, uow.actor(), uow.now())?;
            uow.save_count(count);
            Ok(())
        })?;

        let count = saved_count(committed)?;
        info!(count_id = %count.id, items = count.items.len(), "inventory count started");
        Ok(count)
    }

    /// Record the physically counted kilograms of one product.
    #[instrument(skip(self, actor), fields(actor = %actor), err)]
    pub fn record_count(
        &self,
        count_id: &InventoryCountId,
        product_id: &ProductId,
        counted_kg: Decimal,
        actor: &Actor,
    ) -> LedgerResult<InventoryCount> {
        let product = require_product(&self.ctx.catalog, product_id)?;
        let (_, committed) = self.ctx.atomically(actor, "count.record", |uow| {
            let mut count = load_count(uow, count_id)?;
            count.record_count(&product, counted_kg)?;
            uow.save_count(count);
            Ok(())
        })?;
        saved_count(committed)
    }

    #[instrument(skip(self, text, actor), fields(actor = %actor), err)]
    pub fn justify(
        &self,
        count_id: &InventoryCountId,
        product_id: &ProductId,
        text: &str,
        actor: &Actor,
    ) -> LedgerResult<InventoryCount> {
        let (_, committed) = self.ctx.atomically(actor, "count.justify", |uow| {
            let mut count = load_count(uow, count_id)?;
            count.justify(product_id, text)?;
            uow.save_count(count);
            Ok(())
        })?;
        saved_count(committed)
    }

    /// Confirm a count and correct the ledger to the counted values.
    ///
    /// Every material difference must be justified first; otherwise nothing is written.
    /// Each corrected balance gets a `StockAdjustment` and an `adjustment` movement whose
    /// old value is the balance at confirmation time.
    #[instrument(skip(self, actor), fields(actor = %actor), err)]
    pub fn confirm(&self, count_id: &InventoryCountId, actor: &Actor) -> LedgerResult<InventoryCount> {
        let (adjusted, committed) = self.ctx.atomically(actor, "count.confirm", |uow| {
            let mut count = load_count(uow, count_id)?;
            count.validate_for_confirm()?;

            let (actor, at) = (uow.actor().clone(), uow.now());
            let mut adjusted = 0usize;
            for item in count.discrepancies() {
                let product = require_product(&self.ctx.catalog, &item.product_id)?;
                let key = count.key_for(item);
                let current = uow.read(&key, &product)?;
                let counted = StockLevel::from_kg(item.counted_total_kg, current.level.unit, &product);
                if current.level.total_kg == counted.total_kg {
                    debug!(balance = %key, "balance already matches count");
                    continue;
                }

                let reason = item.justification.clone().unwrap_or_default();
                uow.write(&key, counted.clone(), &product)?;
                let adjustment = StockAdjustment::record(
                    &key,
                    &current.level,
                    &counted,
                    reason.clone(),
                    AdjustmentReference::InventoryCount(count.id),
                    &actor,
                    at,
                );
                uow.append_movement(
                    Movement::adjustment(
                        &key,
                        &adjustment.difference(),
                        adjustment.movement_reference(),
                        &actor,
                        at,
                    )
                    .with_notes(reason),
                );
                uow.record_adjustment(adjustment);
                adjusted += 1;
            }

            count.confirm(&actor, at)?;
            uow.save_count(count);
            Ok(adjusted)
        })?;

        let count = saved_count(committed)?;
        info!(count_id = %count.id, adjusted, "inventory count confirmed");
        Ok(count)
    }

    pub fn get(&self, count_id: &InventoryCountId) -> LedgerResult<InventoryCount> {
        self.ctx
            .store
            .load_count(count_id)?
            .ok_or_else(|| LedgerError::not_found(format!("inventory count {count_id}")))
    }
}

//! Admin direct adjustment: last-resort balance correction with an audit pair.

use rust_decimal::Decimal;
use tracing::{info, instrument};

use resinstock_core::{Actor, LocationCode, ProductId};
use resinstock_events::EventBus;
use resinstock_inventory::{
    AdjustmentReference, BalanceKey, Movement, StockAdjustment, StockLevel,
    require_justification,
};

use crate::catalog::{Catalog, require_active_location, require_product};
use crate::context::{LedgerContext, MovementEnvelope};
use crate::error::{LedgerError, LedgerResult};
use crate::store::LedgerStore;

pub struct AdminAdjustmentWorkflow<S, C, B> {
    ctx: LedgerContext<S, C, B>,
}

impl<S, C, B> AdminAdjustmentWorkflow<S, C, B>
where
    S: LedgerStore,
    C: Catalog,
    B: EventBus<MovementEnvelope>,
{
    pub fn new(ctx: LedgerContext<S, C, B>) -> Self {
        Self { ctx }
    }

    /// Overwrite a balance to `new_total_kg`.
    ///
    /// The justification is checked before anything is read. The adjustment record and
    /// its `adjustment` movement are always written, even when nothing changes.
    #[instrument(skip(self, justification, actor), fields(actor = %actor), err)]
    pub fn adjust(
        &self,
        product_id: &ProductId,
        location: &LocationCode,
        new_total_kg: Decimal,
        justification: &str,
        actor: &Actor,
    ) -> LedgerResult<StockAdjustment> {
        let reason = require_justification(justification)?;
        if new_total_kg.is_sign_negative() && !new_total_kg.is_zero() {
            return Err(LedgerError::validation(format!(
                "new balance must not be negative, got {new_total_kg} kg"
            )));
        }
        let product = require_product(&self.ctx.catalog, product_id)?;
        require_active_location(&self.ctx.catalog, location)?;
        let key = BalanceKey::new(*product_id, location.clone());

        let (adjustment, _) = self.ctx.atomically(actor, "admin.adjust", |uow| {
            let old = uow.read(&key, &product)?.level;
            let new = StockLevel::from_kg(new_total_kg, old.unit, &product);
            uow.write(&key, new.clone(), &product)?;

            let adjustment = StockAdjustment::record(
                &key,
                &old,
                &new,
                reason.clone(),
                AdjustmentReference::AdminAdjustment,
                uow.actor(),
                uow.now(),
            );
            uow.append_movement(
                Movement::adjustment(
                    &key,
                    &adjustment.difference(),
                    adjustment.movement_reference(),
                    uow.actor(),
                    uow.now(),
                )
                .with_notes(reason.clone()),
            );
            uow.record_adjustment(adjustment.clone());
            Ok(adjustment)
        })?;

        info!(
            balance = %key,
            old_kg = %adjustment.old_total_kg,
            new_kg = %adjustment.new_total_kg,
            "balance adjusted by admin"
        );
        Ok(adjustment)
    }

    /// Every adjustment ever recorded for one balance, oldest first.
    pub fn history(&self, product_id: &ProductId, location: &LocationCode) -> LedgerResult<Vec<StockAdjustment>> {
        let key = BalanceKey::new(*product_id, location.clone());
        Ok(self.ctx.store.adjustments(Some(&key))?)
    }
}

//! Transfer workflow: request stock between locations, then confirm what was sent.

use tracing::{info, instrument};

use resinstock_core::{Actor, LocationCode, TransferId};
use resinstock_events::EventBus;
use resinstock_inventory::{
    BalanceKey, Delivery, Movement, MovementReference, MovementType, Transfer, TransferLine,
    TransferStatus,
};

use crate::catalog::{Catalog, require_active_location, require_products};
use crate::context::{LedgerContext, MovementEnvelope};
use crate::error::{LedgerError, LedgerResult};
use crate::store::LedgerStore;

pub struct TransferWorkflow<S, C, B> {
    ctx: LedgerContext<S, C, B>,
}

impl<S, C, B> TransferWorkflow<S, C, B>
where
    S: LedgerStore,
    C: Catalog,
    B: EventBus<MovementEnvelope>,
{
    pub fn new(ctx: LedgerContext<S, C, B>) -> Self {
        Self { ctx }
    }

    /// Create a pending transfer. Balances are checked but not touched.
    ///
    /// Lines of the same product are summed before comparing with the source balance.
    #[instrument(skip(self, lines, actor), fields(lines = lines.len(), actor = %actor), err)]
    pub fn create(
        &self,
        from: &LocationCode,
        to: &LocationCode,
        lines: &[TransferLine],
        actor: &Actor,
    ) -> LedgerResult<Transfer> {
        require_active_location(&self.ctx.catalog, from)?;
        require_active_location(&self.ctx.catalog, to)?;
        let products = require_products(&self.ctx.catalog, lines.iter().map(|l| &l.product_id))?;

        let transfer = Transfer::request(
            TransferId::new(),
            from.clone(),
            to.clone(),
            lines,
            &products,
            actor,
            chrono::Utc::now(),
        )?;

        let (_, committed) = self.ctx.atomically(actor, "transfer.create", |uow| {
            for (product_id, requested_kg) in transfer.sent_kg_by_product() {
                let product = products
                    .get(&product_id)
                    .ok_or_else(|| LedgerError::not_found(format!("product {product_id}")))?;
                let available = uow
                    .read(&BalanceKey::new(product_id, from.clone()), product)?
                    .available_kg();
                if requested_kg > available {
                    return Err(LedgerError::InsufficientStock {
                        product: product.name.clone(),
                        location: from.to_string(),
                        requested_kg,
                        available_kg: available,
                    });
                }
            }
            uow.save_transfer(transfer.clone());
            Ok(())
        })?;

        let saved = committed
            .transfers
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::InvariantViolation("transfer was not saved".into()))?;
        info!(transfer_id = %saved.id, from = %from, to = %to, "transfer requested");
        Ok(saved)
    }

    /// Confirm a pending transfer with the quantities actually sent.
    ///
    /// Each line debits the source (clamped at zero) with `transfer_out` and credits
    /// the destination with `transfer_in`; all lines commit together or not at all.
    #[instrument(skip(self, deliveries, actor), fields(actor = %actor), err)]
    pub fn confirm(
        &self,
        transfer_id: &TransferId,
        deliveries: &[Delivery],
        actor: &Actor,
    ) -> LedgerResult<Transfer> {
        let (_, committed) = self.ctx.atomically(actor, "transfer.confirm", |uow| {
            let mut transfer = uow
                .store()
                .load_transfer(transfer_id)?
                .ok_or_else(|| LedgerError::not_found(format!("transfer {transfer_id}")))?;
            let products =
                require_products(&self.ctx.catalog, transfer.items.iter().map(|i| &i.product_id))?;

            let (actor, at) = (uow.actor().clone(), uow.now());
            transfer.confirm(deliveries, &products, &actor, at)?;

            let reference = MovementReference::transfer(transfer.id);
            for item in &transfer.items {
                let product = products
                    .get(&item.product_id)
                    .ok_or_else(|| LedgerError::not_found(format!("product {}", item.product_id)))?;
                let from_key = BalanceKey::new(item.product_id, transfer.from.clone());
                let to_key = BalanceKey::new(item.product_id, transfer.to.clone());
                let sent = item.sent();

                uow.debit(&from_key, sent.total_kg, product)?;
                uow.credit(&to_key, sent.total_kg, product)?;
                uow.append_movement(Movement::outbound(
                    MovementType::TransferOut,
                    &from_key,
                    &sent,
                    reference,
                    &actor,
                    at,
                ));
                uow.append_movement(Movement::inbound(
                    MovementType::TransferIn,
                    &to_key,
                    &sent,
                    reference,
                    &actor,
                    at,
                ));
            }

            uow.save_transfer(transfer);
            Ok(())
        })?;

        let confirmed = committed
            .transfers
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::InvariantViolation("transfer was not saved".into()))?;
        info!(
            transfer_id = %confirmed.id,
            lines = confirmed.items.len(),
            "transfer confirmed"
        );
        Ok(confirmed)
    }

    pub fn get(&self, transfer_id: &TransferId) -> LedgerResult<Transfer> {
        self.ctx
            .store
            .load_transfer(transfer_id)?
            .ok_or_else(|| LedgerError::not_found(format!("transfer {transfer_id}")))
    }

    pub fn list(&self, status: Option<TransferStatus>) -> LedgerResult<Vec<Transfer>> {
        Ok(self.ctx.store.list_transfers(status)?)
    }
}

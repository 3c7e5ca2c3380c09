//! Stock ledger service: balance reads, goods receipts and factory issues.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use resinstock_core::{Actor, LocationCode, ProductId};
use resinstock_events::EventBus;
use resinstock_inventory::{
    BalanceKey, LoggedMovement, Movement, MovementReference, MovementType, StockBalance,
    StockLevel, StockUnit,
};

use crate::catalog::{Catalog, require_active_location, require_product};
use crate::context::{LedgerContext, MovementEnvelope};
use crate::error::{LedgerError, LedgerResult};
use crate::projections::location_summary::{LocationStockSummary, summarize};
use crate::store::{LedgerStore, MovementQuery};

/// Outcome of moving compound to the factory floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryIssue {
    pub id: Uuid,
    pub source: StockBalance,
    pub destination: StockBalance,
}

fn ensure_positive(quantity: Decimal) -> LedgerResult<()> {
    if quantity <= Decimal::ZERO {
        return Err(LedgerError::validation(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}

fn committed_balance(
    committed: &crate::store::Committed,
    key: &BalanceKey,
) -> LedgerResult<StockBalance> {
    committed
        .balances
        .iter()
        .find(|b| b.key == *key)
        .cloned()
        .ok_or_else(|| LedgerError::InvariantViolation(format!("balance {key} was not committed")))
}

pub struct StockLedger<S, C, B> {
    ctx: LedgerContext<S, C, B>,
}

impl<S, C, B> StockLedger<S, C, B>
where
    S: LedgerStore,
    C: Catalog,
    B: EventBus<MovementEnvelope>,
{
    pub fn new(ctx: LedgerContext<S, C, B>) -> Self {
        Self { ctx }
    }

    /// Current balance, or the implicit zero balance (version 0) if the key never moved.
    pub fn read(&self, product_id: &ProductId, location: &LocationCode) -> LedgerResult<StockBalance> {
        let product = require_product(&self.ctx.catalog, product_id)?;
        let key = BalanceKey::new(*product_id, location.clone());
        Ok(self
            .ctx
            .store
            .read_balance(&key)?
            .unwrap_or_else(|| StockBalance::empty(key, &product)))
    }

    pub fn balances_at(&self, location: &LocationCode) -> LedgerResult<Vec<StockBalance>> {
        Ok(self.ctx.store.balances_at(location)?)
    }

    pub fn snapshot(&self) -> LedgerResult<Vec<StockBalance>> {
        Ok(self.ctx.store.snapshot()?)
    }

    /// Per-location totals from a snapshot read. Advisory; may be stale by the time it returns.
    pub fn location_summaries(&self) -> LedgerResult<Vec<LocationStockSummary>> {
        Ok(summarize(&self.ctx.store.snapshot()?))
    }

    pub fn movements(&self, query: &MovementQuery) -> LedgerResult<Vec<LoggedMovement>> {
        Ok(self.ctx.store.movements(query)?)
    }

    /// Book incoming goods at a location as an `entry` movement.
    #[instrument(skip(self, actor, notes), fields(actor = %actor), err)]
    pub fn receive(
        &self,
        product_id: &ProductId,
        location: &LocationCode,
        quantity: Decimal,
        unit: StockUnit,
        notes: Option<String>,
        actor: &Actor,
    ) -> LedgerResult<StockBalance> {
        ensure_positive(quantity)?;
        let product = require_product(&self.ctx.catalog, product_id)?;
        require_active_location(&self.ctx.catalog, location)?;

        let key = BalanceKey::new(*product_id, location.clone());
        let amount = StockLevel::from_quantity(quantity, unit, &product);
        let receipt_id = Uuid::now_v7();

        let (_, committed) = self.ctx.atomically(actor, "receive", |uow| {
            uow.credit(&key, amount.total_kg, &product)?;
            let mut movement = Movement::inbound(
                MovementType::Entry,
                &key,
                &amount,
                MovementReference::receipt(receipt_id),
                uow.actor(),
                uow.now(),
            );
            if let Some(notes) = &notes {
                movement = movement.with_notes(notes.clone());
            }
            uow.append_movement(movement);
            Ok(())
        })?;

        let balance = committed_balance(&committed, &key)?;
        info!(balance = %key, total_kg = %balance.level.total_kg, "goods received");
        Ok(balance)
    }

    /// Move stock from a staging location to the factory floor (`factory_out` + `factory_in`).
    ///
    /// Unlike transfer confirmation this never clamps: a short source is rejected.
    #[instrument(skip(self, actor), fields(actor = %actor), err)]
    pub fn issue_to_factory(
        &self,
        product_id: &ProductId,
        from: &LocationCode,
        to: &LocationCode,
        quantity: Decimal,
        unit: StockUnit,
        actor: &Actor,
    ) -> LedgerResult<FactoryIssue> {
        ensure_positive(quantity)?;
        if from == to {
            return Err(LedgerError::validation(format!(
                "source and destination must differ (both {from})"
            )));
        }
        let product = require_product(&self.ctx.catalog, product_id)?;
        require_active_location(&self.ctx.catalog, from)?;
        require_active_location(&self.ctx.catalog, to)?;

        let from_key = BalanceKey::new(*product_id, from.clone());
        let to_key = BalanceKey::new(*product_id, to.clone());
        let amount = StockLevel::from_quantity(quantity, unit, &product);
        let issue_id = Uuid::now_v7();

        let (_, committed) = self.ctx.atomically(actor, "issue_to_factory", |uow| {
            let available = uow.read(&from_key, &product)?.available_kg();
            if amount.total_kg > available {
                return Err(LedgerError::InsufficientStock {
                    product: product_id.to_string(),
                    location: from.to_string(),
                    requested_kg: amount.total_kg,
                    available_kg: available,
                });
            }
            uow.debit(&from_key, amount.total_kg, &product)?;
            uow.credit(&to_key, amount.total_kg, &product)?;

            let reference = MovementReference::factory_issue(issue_id);
            let (actor, at) = (uow.actor().clone(), uow.now());
            uow.append_movement(Movement::outbound(
                MovementType::FactoryOut,
                &from_key,
                &amount,
                reference,
                &actor,
                at,
            ));
            uow.append_movement(Movement::inbound(
                MovementType::FactoryIn,
                &to_key,
                &amount,
                reference,
                &actor,
                at,
            ));
            Ok(())
        })?;

        info!(product = %product_id, from = %from, to = %to, kg = %amount.total_kg, "issued to factory");
        Ok(FactoryIssue {
            id: issue_id,
            source: committed_balance(&committed, &from_key)?,
            destination: committed_balance(&committed, &to_key)?,
        })
    }
}

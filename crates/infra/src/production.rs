//! Production workflow: plan a formulation run and confirm it against the ledger.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use resinstock_core::{Actor, FormulationId, LocationCode, ProductId, ProductionOrderId};
use resinstock_events::EventBus;
use resinstock_inventory::{
    BalanceKey, IngredientOverride, Movement, MovementReference, MovementType, ProductionOrder,
    ProductionPlan, ProductionUsage, StockLevel, Transfer, plan_production,
};

use crate::catalog::{Catalog, require_active_location, require_formulation, require_products};
use crate::context::{LedgerContext, MovementEnvelope};
use crate::error::{LedgerError, LedgerResult};
use crate::store::LedgerStore;

/// Everything needed to confirm one production run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRequest {
    pub formulation_id: FormulationId,
    pub batches: u32,
    pub source: LocationCode,
    pub destination: LocationCode,
    #[serde(default)]
    pub overrides: Vec<IngredientOverride>,
}

pub struct ProductionWorkflow<S, C, B> {
    ctx: LedgerContext<S, C, B>,
}

impl<S, C, B> ProductionWorkflow<S, C, B>
where
    S: LedgerStore,
    C: Catalog,
    B: EventBus<MovementEnvelope>,
{
    pub fn new(ctx: LedgerContext<S, C, B>) -> Self {
        Self { ctx }
    }

    /// Ingredient requirements for `batches` runs, checked against stock at `source`.
    #[instrument(skip(self), err)]
    pub fn plan(
        &self,
        formulation_id: &FormulationId,
        batches: u32,
        source: &LocationCode,
    ) -> LedgerResult<ProductionPlan> {
        require_active_location(&self.ctx.catalog, source)?;
        let formulation = require_formulation(&self.ctx.catalog, formulation_id)?;
        let products =
            require_products(&self.ctx.catalog, formulation.items.iter().map(|i| &i.product_id))?;

        let mut available: HashMap<ProductId, Decimal> = HashMap::new();
        for product_id in products.keys() {
            let key = BalanceKey::new(*product_id, source.clone());
            let kg = self
                .ctx
                .store
                .read_balance(&key)?
                .map_or(Decimal::ZERO, |b| b.available_kg());
            available.insert(*product_id, kg);
        }

        Ok(plan_production(&formulation, batches, &products, |id| {
            available.get(id).copied().unwrap_or(Decimal::ZERO)
        })?)
    }

    /// Confirm a production run.
    ///
    /// The plan is recomputed from balances read inside the unit of work, so a stale
    /// client plan cannot overdraw stock. Deducts every ingredient (`production_out`),
    /// credits the compound at the destination (`production_in`) and records the order
    /// plus a completed transfer mirroring the issue.
    #[instrument(
        skip(self, request, actor),
        fields(
            formulation_id = %request.formulation_id,
            batches = request.batches,
            actor = %actor
        ),
        err
    )]
    pub fn confirm(
        &self,
        request: &ProductionRequest,
        actor: &Actor,
    ) -> LedgerResult<ProductionOrder> {
        if request.source == request.destination {
            return Err(LedgerError::validation(format!(
                "source and destination must differ (both {})",
                request.source
            )));
        }
        require_active_location(&self.ctx.catalog, &request.source)?;
        require_active_location(&self.ctx.catalog, &request.destination)?;
        let formulation = require_formulation(&self.ctx.catalog, &request.formulation_id)?;
        let products = require_products(
            &self.ctx.catalog,
            formulation
                .items
                .iter()
                .map(|i| &i.product_id)
                .chain(std::iter::once(&formulation.final_product_id)),
        )?;
        let order_id = ProductionOrderId::new();

        let (order, _) = self.ctx.atomically(actor, "production.confirm", |uow| {
            let mut available = HashMap::new();
            for item in &formulation.items {
                let product = products
                    .get(&item.product_id)
                    .ok_or_else(|| LedgerError::not_found(format!("product {}", item.product_id)))?;
                let key = BalanceKey::new(item.product_id, request.source.clone());
                available.insert(item.product_id, uow.read(&key, product)?.available_kg());
            }

            let plan = plan_production(&formulation, request.batches, &products, |id| {
                available.get(id).copied().unwrap_or(Decimal::ZERO)
            })?
            .with_overrides(&request.overrides, &products)?;
            plan.ensure_stock_sufficient(&request.source)?;

            let (actor, at) = (uow.actor().clone(), uow.now());
            let reference = MovementReference::production_order(order_id);

            for ingredient in &plan.ingredients {
                let product = products.get(&ingredient.product_id).ok_or_else(|| {
                    LedgerError::not_found(format!("product {}", ingredient.product_id))
                })?;
                let key = BalanceKey::new(ingredient.product_id, request.source.clone());
                let debit = uow.debit(&key, ingredient.adjusted_kg, product)?;
                let issued = StockLevel::from_kg(ingredient.adjusted_kg, debit.before.unit, product);
                uow.append_movement(
                    Movement::outbound(MovementType::ProductionOut, &key, &issued, reference, &actor, at)
                        .with_production_usage(ProductionUsage {
                            ideal_kg: ingredient.ideal_kg,
                            sent_kg: ingredient.adjusted_kg,
                        }),
                );
            }

            let compound = products.get(&plan.final_product_id).ok_or_else(|| {
                LedgerError::not_found(format!("product {}", plan.final_product_id))
            })?;
            let compound_key = BalanceKey::new(plan.final_product_id, request.destination.clone());
            let compound_unit = uow.read(&compound_key, compound)?.level.unit;
            uow.credit(&compound_key, plan.total_compound_kg, compound)?;
            uow.append_movement(Movement::inbound(
                MovementType::ProductionIn,
                &compound_key,
                &StockLevel::from_kg(plan.total_compound_kg, compound_unit, compound),
                reference,
                &actor,
                at,
            ));

            let lines: Vec<_> = plan
                .ingredients
                .iter()
                .map(|i| (i.product_id, i.ideal_kg, i.adjusted_kg))
                .collect();
            let mirror = Transfer::mirror_production(
                order_id,
                request.source.clone(),
                request.destination.clone(),
                &lines,
                &actor,
                at,
            )?;
            let order = ProductionOrder::from_plan(
                order_id,
                &plan,
                request.source.clone(),
                request.destination.clone(),
                mirror.id,
                &actor,
                at,
            );
            uow.save_transfer(mirror);
            uow.save_production_order(order.clone());
            Ok(order)
        })?;

        info!(
            order_id = %order.id,
            total_compound_kg = %order.total_compound_kg,
            "production confirmed"
        );
        Ok(order)
    }

    pub fn get(&self, order_id: &ProductionOrderId) -> LedgerResult<ProductionOrder> {
        self.ctx
            .store
            .load_production_order(order_id)?
            .ok_or_else(|| LedgerError::not_found(format!("production order {order_id}")))
    }
}

//! Production loss read model: ideal vs. issued kilograms per ingredient.
//!
//! Built from the structured usage carried by `production_out` movements.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use resinstock_core::ProductId;
use resinstock_events::{EventEnvelope, Projection, ProjectionError, ProjectionRunner};
use resinstock_inventory::{Movement, MovementType};

use crate::context::MovementEnvelope;
use crate::store::{LedgerStore, MovementQuery, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionLoss {
    pub ideal_kg: Decimal,
    pub sent_kg: Decimal,
    pub loss_kg: Decimal,
    pub issues: u64,
}

/// Out-of-order sequence numbers kept above the high-water mark before the oldest gap
/// is given up on.
const REORDER_WINDOW: usize = 1024;

/// Sequence numbers already applied: everything up to `high_water`, plus the few that
/// arrived early.
#[derive(Debug, Default)]
struct AppliedSequences {
    high_water: u64,
    ahead: BTreeSet<u64>,
}

impl AppliedSequences {
    /// Record `seq`; `false` when it was applied before.
    fn insert(&mut self, seq: u64) -> bool {
        if seq <= self.high_water || !self.ahead.insert(seq) {
            return false;
        }
        self.advance();
        if self.ahead.len() > REORDER_WINDOW {
            if let Some(first) = self.ahead.pop_first() {
                warn!(skipped_to = first, from = self.high_water, "sequence gap never filled, moving on");
                self.high_water = first;
                self.advance();
            }
        }
        true
    }

    fn advance(&mut self) {
        while self.ahead.remove(&(self.high_water + 1)) {
            self.high_water += 1;
        }
    }
}

#[derive(Debug, Default)]
pub struct ProductionLossProjection {
    by_product: BTreeMap<ProductId, ProductionLoss>,
    applied: AppliedSequences,
}

impl ProductionLossProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, product_id: &ProductId) -> Option<&ProductionLoss> {
        self.by_product.get(product_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProductId, &ProductionLoss)> {
        self.by_product.iter()
    }

    pub fn total_loss_kg(&self) -> Decimal {
        self.by_product.values().map(|l| l.loss_kg).sum()
    }

    /// Highest sequence number below which every movement has been seen.
    pub fn high_water_mark(&self) -> u64 {
        self.applied.high_water
    }

    /// Replay the whole movement log into a fresh projection.
    ///
    /// Every movement is replayed, not only `production_out`, so the high-water mark
    /// ends at the head of the log.
    pub fn rebuild(store: &impl LedgerStore) -> Result<Self, RebuildError> {
        let logged = store.movements(&MovementQuery::all())?;
        let envelopes: Vec<MovementEnvelope> = logged
            .into_iter()
            .map(|l| EventEnvelope::for_event(*l.movement.id.as_uuid(), l.sequence_number, l.movement))
            .collect();
        let runner = ProjectionRunner::rebuild_from_scratch(Self::new, &envelopes)?;
        Ok(runner.into_projection())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RebuildError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

impl Projection for ProductionLossProjection {
    type Ev = Movement;

    fn apply(&mut self, envelope: &EventEnvelope<Movement>) {
        // Live delivery may reorder commits from different threads; dedupe by position.
        if !self.applied.insert(envelope.sequence_number()) {
            return;
        }
        let movement = envelope.payload();
        if movement.movement_type != MovementType::ProductionOut {
            return;
        }
        let Some(usage) = movement.production else {
            return;
        };

        let entry = self.by_product.entry(movement.product_id).or_default();
        entry.ideal_kg += usage.ideal_kg;
        entry.sent_kg += usage.sent_kg;
        entry.loss_kg += usage.loss_kg();
        entry.issues += 1;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use resinstock_core::{Actor, ProductionOrderId, UserId};
    use resinstock_inventory::{
        BalanceKey, MovementReference, Product, ProductionUsage, StockLevel, StockUnit,
    };
    use rust_decimal_macros::dec;

    use super::*;

    fn production_out(product: &Product, ideal: Decimal, sent: Decimal, seq: u64) -> MovementEnvelope {
        let key = BalanceKey::new(product.id, "PCP");
        let movement = Movement::outbound(
            MovementType::ProductionOut,
            &key,
            &StockLevel::from_kg(sent, StockUnit::Kg, product),
            MovementReference::production_order(ProductionOrderId::new()),
            &Actor::new(UserId::new(), "Mixer"),
            Utc::now(),
        )
        .with_production_usage(ProductionUsage {
            ideal_kg: ideal,
            sent_kg: sent,
        });
        EventEnvelope::for_event(*movement.id.as_uuid(), seq, movement)
    }

    #[test]
    fn accumulates_loss_per_product_and_ignores_duplicates() {
        let resin = Product::sealed_bag(ProductId::new(), "Resin", dec!(25));
        let mut projection = ProductionLossProjection::new();

        let first = production_out(&resin, dec!(237), dec!(250), 1);
        projection.apply(&first);
        projection.apply(&first);
        projection.apply(&production_out(&resin, dec!(100), dec!(100), 2));

        let loss = projection.get(&resin.id).unwrap();
        assert_eq!(loss.ideal_kg, dec!(337));
        assert_eq!(loss.sent_kg, dec!(350));
        assert_eq!(loss.loss_kg, dec!(13));
        assert_eq!(loss.issues, 2);
        assert_eq!(projection.total_loss_kg(), dec!(13));
    }

    #[test]
    fn late_deliveries_are_applied_once() {
        let resin = Product::sealed_bag(ProductId::new(), "Resin", dec!(25));
        let mut projection = ProductionLossProjection::new();

        let third = production_out(&resin, dec!(10), dec!(25), 3);
        let first = production_out(&resin, dec!(10), dec!(25), 1);
        projection.apply(&third);
        projection.apply(&first);
        assert_eq!(projection.high_water_mark(), 1);

        projection.apply(&production_out(&resin, dec!(10), dec!(25), 2));
        projection.apply(&third);
        projection.apply(&first);

        assert_eq!(projection.high_water_mark(), 3);
        assert_eq!(projection.get(&resin.id).unwrap().issues, 3);
        assert_eq!(projection.total_loss_kg(), dec!(45));
    }

    #[test]
    fn dedupe_state_stays_bounded() {
        let resin = Product::sealed_bag(ProductId::new(), "Resin", dec!(25));
        let mut projection = ProductionLossProjection::new();

        for seq in 1..=5_000 {
            projection.apply(&production_out(&resin, dec!(20), dec!(25), seq));
        }
        assert_eq!(projection.high_water_mark(), 5_000);
        assert!(projection.applied.ahead.is_empty());

        // Sequence 5001 never arrives: the window gives up on it instead of growing.
        let window = REORDER_WINDOW as u64;
        for seq in 5_002..=5_002 + window {
            projection.apply(&production_out(&resin, dec!(20), dec!(25), seq));
        }
        assert!(projection.applied.ahead.len() <= REORDER_WINDOW);
        assert_eq!(projection.high_water_mark(), 5_002 + window);
        assert_eq!(projection.get(&resin.id).unwrap().issues, 5_000 + window + 1);
    }
}

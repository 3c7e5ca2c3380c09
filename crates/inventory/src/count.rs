//! Inventory count aggregate: physical count vs. system balance at one location.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use resinstock_core::{
    Actor, AggregateRoot, DomainError, DomainResult, InventoryCountId, LocationCode, ProductId,
};

use crate::balance::{BalanceKey, StockBalance, StockLevel};
use crate::catalog::Product;
use crate::conversion::{self, StockUnit};

/// Differences at or below this many kilograms are rounding noise.
pub const DIFFERENCE_TOLERANCE_KG: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryCountStatus {
    Draft,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryCountItem {
    pub product_id: ProductId,
    pub unit: StockUnit,
    pub system_quantity: Decimal,
    pub system_total_kg: Decimal,
    pub counted_quantity: Decimal,
    pub counted_total_kg: Decimal,
    pub difference_kg: Decimal,
    pub justification: Option<String>,
}

impl InventoryCountItem {
    /// True when the difference is material and must be justified and applied.
    pub fn is_discrepancy(&self) -> bool {
        self.difference_kg.abs() > DIFFERENCE_TOLERANCE_KG
    }

    pub fn counted(&self) -> StockLevel {
        StockLevel {
            quantity: self.counted_quantity,
            unit: self.unit,
            total_kg: self.counted_total_kg,
        }
    }

    fn is_justified(&self) -> bool {
        self.justification
            .as_deref()
            .is_some_and(|j| !j.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryCount {
    pub id: InventoryCountId,
    pub location: LocationCode,
    pub status: InventoryCountStatus,
    pub items: Vec<InventoryCountItem>,
    pub started_by: Actor,
    pub started_at: DateTime<Utc>,
    pub confirmed_by: Option<Actor>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl AggregateRoot for InventoryCount {
    type Id = InventoryCountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl InventoryCount {
    /// Open a draft count from the balances currently recorded at `location`.
    ///
    /// Counted values start at zero, so every non-empty row starts as a discrepancy.
    pub fn start(
        id: InventoryCountId,
        location: LocationCode,
        balances: &[StockBalance],
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let mut items = Vec::with_capacity(balances.len());
        for balance in balances {
            if balance.key.location != location {
                return Err(DomainError::invariant(format!(
                    "balance {} does not belong to location {location}",
                    balance.key
                )));
            }
            items.push(InventoryCountItem {
                product_id: balance.key.product_id,
                unit: balance.level.unit,
                system_quantity: balance.level.quantity,
                system_total_kg: balance.level.total_kg,
                counted_quantity: Decimal::ZERO,
                counted_total_kg: Decimal::ZERO,
                difference_kg: -balance.level.total_kg,
                justification: None,
            });
        }

        Ok(Self {
            id,
            location,
            status: InventoryCountStatus::Draft,
            items,
            started_by: actor.clone(),
            started_at: at,
            confirmed_by: None,
            confirmed_at: None,
            version: 0,
        })
    }

    pub fn is_draft(&self) -> bool {
        self.status == InventoryCountStatus::Draft
    }

    fn ensure_draft(&self) -> DomainResult<()> {
        if !self.is_draft() {
            return Err(DomainError::validation(format!(
                "inventory count {} is already confirmed",
                self.id
            )));
        }
        Ok(())
    }

    fn item_mut(&mut self, product_id: &ProductId) -> DomainResult<&mut InventoryCountItem> {
        let id = self.id;
        self.items
            .iter_mut()
            .find(|i| i.product_id == *product_id)
            .ok_or_else(|| DomainError::not_found(format!("product {product_id} in count {id}")))
    }

    pub fn item(&self, product_id: &ProductId) -> Option<&InventoryCountItem> {
        self.items.iter().find(|i| i.product_id == *product_id)
    }

    /// Set the physically counted kilograms for one product.
    pub fn record_count(&mut self, product: &Product, counted_kg: Decimal) -> DomainResult<()> {
        self.ensure_draft()?;
        if counted_kg.is_sign_negative() && !counted_kg.is_zero() {
            return Err(DomainError::validation(format!(
                "counted weight must not be negative, got {counted_kg}"
            )));
        }

        let item = self.item_mut(&product.id)?;
        item.counted_total_kg = counted_kg;
        item.counted_quantity = conversion::from_kg(counted_kg, item.unit, product);
        item.difference_kg = counted_kg - item.system_total_kg;
        Ok(())
    }

    pub fn justify(&mut self, product_id: &ProductId, text: impl Into<String>) -> DomainResult<()> {
        self.ensure_draft()?;
        let text = text.into();
        let item = self.item_mut(product_id)?;
        item.justification = if text.trim().is_empty() {
            None
        } else {
            Some(text.trim().to_string())
        };
        Ok(())
    }

    /// Items whose difference must be applied to the ledger.
    pub fn discrepancies(&self) -> impl Iterator<Item = &InventoryCountItem> {
        self.items.iter().filter(|i| i.is_discrepancy())
    }

    /// Check every confirmation precondition without changing anything.
    pub fn validate_for_confirm(&self) -> DomainResult<()> {
        self.ensure_draft()?;
        let missing: Vec<String> = self
            .discrepancies()
            .filter(|i| !i.is_justified())
            .map(|i| i.product_id.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DomainError::validation(format!(
                "justification required for products with a difference: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Mark the count confirmed. Terminal.
    pub fn confirm(&mut self, actor: &Actor, at: DateTime<Utc>) -> DomainResult<()> {
        self.validate_for_confirm()?;
        self.status = InventoryCountStatus::Confirmed;
        self.confirmed_by = Some(actor.clone());
        self.confirmed_at = Some(at);
        Ok(())
    }

    pub fn key_for(&self, item: &InventoryCountItem) -> BalanceKey {
        BalanceKey::new(item.product_id, self.location.clone())
    }
}

#[cfg(test)]
mod tests {
    use resinstock_core::UserId;
    use rust_decimal_macros::dec;

    use super::*;

    fn actor() -> Actor {
        Actor::new(UserId::new(), "Counter")
    }

    fn balance(product: &Product, location: &str, kg: Decimal) -> StockBalance {
        StockBalance {
            key: BalanceKey::new(product.id, location),
            level: StockLevel::from_kg(kg, StockUnit::natural_for(product), product),
            version: 1,
            updated_by: None,
            updated_at: None,
        }
    }

    fn draft(product: &Product, system_kg: Decimal) -> InventoryCount {
        InventoryCount::start(
            InventoryCountId::new(),
            "PCP".into(),
            &[balance(product, "PCP", system_kg)],
            &actor(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn start_snapshots_system_values_with_zero_counted() {
        let p = Product::sealed_bag(ProductId::new(), "Resin", dec!(25));
        let count = draft(&p, dec!(250));
        let item = &count.items[0];
        assert_eq!(item.unit, StockUnit::Bag);
        assert_eq!(item.system_quantity, dec!(10));
        assert_eq!(item.counted_total_kg, Decimal::ZERO);
        assert_eq!(item.difference_kg, dec!(-250));
        assert!(count.is_draft());
    }

    #[test]
    fn start_rejects_balances_from_other_locations() {
        let p = Product::bulk(ProductId::new(), "CaCO3");
        let err = InventoryCount::start(
            InventoryCountId::new(),
            "PCP".into(),
            &[balance(&p, "CD", dec!(10))],
            &actor(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn matching_count_needs_no_justification() {
        let p = Product::bulk(ProductId::new(), "CaCO3");
        let mut count = draft(&p, dec!(1000));
        count.record_count(&p, dec!(1000)).unwrap();

        assert_eq!(count.items[0].difference_kg, Decimal::ZERO);
        assert_eq!(count.discrepancies().count(), 0);
        count.confirm(&actor(), Utc::now()).unwrap();
        assert_eq!(count.status, InventoryCountStatus::Confirmed);
    }

    #[test]
    fn discrepancy_requires_justification() {
        let p = Product::bulk(ProductId::new(), "CaCO3");
        let mut count = draft(&p, dec!(1000));
        count.record_count(&p, dec!(950)).unwrap();
        assert_eq!(count.items[0].difference_kg, dec!(-50));

        count.justify(&p.id, "   ").unwrap();
        assert!(matches!(
            count.confirm(&actor(), Utc::now()),
            Err(DomainError::Validation(_))
        ));
        assert!(count.is_draft());

        count.justify(&p.id, "physical count").unwrap();
        count.confirm(&actor(), Utc::now()).unwrap();
        assert_eq!(count.items[0].justification.as_deref(), Some("physical count"));
    }

    #[test]
    fn tolerance_is_exclusive() {
        let p = Product::bulk(ProductId::new(), "CaCO3");
        let mut count = draft(&p, dec!(100));
        count.record_count(&p, dec!(100.001)).unwrap();
        assert!(!count.items[0].is_discrepancy());
        count.record_count(&p, dec!(100.0011)).unwrap();
        assert!(count.items[0].is_discrepancy());
    }

    #[test]
    fn confirmed_counts_are_immutable() {
        let p = Product::bulk(ProductId::new(), "CaCO3");
        let mut count = draft(&p, dec!(10));
        count.record_count(&p, dec!(10)).unwrap();
        count.confirm(&actor(), Utc::now()).unwrap();

        assert!(count.record_count(&p, dec!(5)).is_err());
        assert!(count.justify(&p.id, "late").is_err());
        assert!(count.confirm(&actor(), Utc::now()).is_err());
    }

    #[test]
    fn negative_counts_and_unknown_products_are_rejected() {
        let p = Product::bulk(ProductId::new(), "CaCO3");
        let other = Product::bulk(ProductId::new(), "TiO2");
        let mut count = draft(&p, dec!(10));
        assert!(matches!(
            count.record_count(&p, dec!(-1)),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            count.record_count(&other, dec!(1)),
            Err(DomainError::NotFound(_))
        ));
    }
}

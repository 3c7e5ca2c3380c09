//! Current stock per (product, location).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use resinstock_core::{Actor, AggregateRoot, LocationCode, ProductId, ValueObject};

use crate::catalog::Product;
use crate::conversion::{self, StockUnit};

/// Ledger row key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BalanceKey {
    pub product_id: ProductId,
    pub location: LocationCode,
}

impl BalanceKey {
    pub fn new(product_id: ProductId, location: impl Into<LocationCode>) -> Self {
        Self {
            product_id,
            location: location.into(),
        }
    }
}

impl ValueObject for BalanceKey {}

impl core::fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.product_id, self.location)
    }
}

/// A quantity together with its unit and kilogram equivalent.
///
/// Invariant: `total_kg == to_kg(quantity, unit, product)` for the owning product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub quantity: Decimal,
    pub unit: StockUnit,
    pub total_kg: Decimal,
}

impl ValueObject for StockLevel {}

impl StockLevel {
    pub fn zero(unit: StockUnit) -> Self {
        Self {
            quantity: Decimal::ZERO,
            unit,
            total_kg: Decimal::ZERO,
        }
    }

    pub fn from_quantity(quantity: Decimal, unit: StockUnit, product: &Product) -> Self {
        Self {
            quantity,
            unit,
            total_kg: conversion::to_kg(quantity, unit, product),
        }
    }

    pub fn from_kg(total_kg: Decimal, unit: StockUnit, product: &Product) -> Self {
        Self {
            quantity: conversion::from_kg(total_kg, unit, product),
            unit,
            total_kg,
        }
    }

    /// Level after removing `kg`, clamped at zero.
    pub fn debit(&self, kg: Decimal, product: &Product) -> Self {
        let remaining = (self.total_kg - kg).max(Decimal::ZERO);
        Self::from_kg(remaining, self.unit, product)
    }

    /// Level after adding `kg`.
    pub fn credit(&self, kg: Decimal, product: &Product) -> Self {
        Self::from_kg(self.total_kg + kg, self.unit, product)
    }

    /// True when debiting `kg` would have to clamp at zero.
    pub fn would_clamp(&self, kg: Decimal) -> bool {
        kg > self.total_kg
    }
}

/// Persisted balance row.
///
/// `version == 0` denotes the implicit zero balance of a key that has never moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBalance {
    pub key: BalanceKey,
    pub level: StockLevel,
    pub version: u64,
    pub updated_by: Option<Actor>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StockBalance {
    /// Implicit zero balance for a key without a row, in the product's natural unit.
    pub fn empty(key: BalanceKey, product: &Product) -> Self {
        Self {
            key,
            level: StockLevel::zero(StockUnit::natural_for(product)),
            version: 0,
            updated_by: None,
            updated_at: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.version > 0
    }

    pub fn available_kg(&self) -> Decimal {
        self.level.total_kg
    }
}

impl AggregateRoot for StockBalance {
    type Id = BalanceKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }

    fn version(&self) -> u64 {
        self.version
    }
}

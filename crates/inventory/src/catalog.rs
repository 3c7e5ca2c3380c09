//! Catalog reference data as seen by the ledger.
//!
//! Products, locations and formulations are owned by the external catalog; the
//! ledger only reads them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use resinstock_core::{FormulationId, LocationCode, ProductId};

/// How a product is packaged and therefore fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageType {
    /// Loose material weighed out in kilograms.
    Bulk,
    /// Discrete units with a known unit weight.
    Unit,
    /// Fixed-weight bags that can only be issued whole.
    SealedBag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub package_type: PackageType,
    /// Net kilograms in one sealed bag (only meaningful for `SealedBag`).
    pub package_weight: Decimal,
    /// Kilograms per unit when counted in units.
    pub unit_weight_kg: Decimal,
    pub conversion_factor: Decimal,
}

impl Product {
    /// Bulk product counted in kilograms.
    pub fn bulk(id: ProductId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            package_type: PackageType::Bulk,
            package_weight: Decimal::ZERO,
            unit_weight_kg: Decimal::ONE,
            conversion_factor: Decimal::ONE,
        }
    }

    /// Product sold in sealed bags of `package_weight` kg.
    pub fn sealed_bag(id: ProductId, name: impl Into<String>, package_weight: Decimal) -> Self {
        Self {
            id,
            name: name.into(),
            package_type: PackageType::SealedBag,
            package_weight,
            unit_weight_kg: package_weight,
            conversion_factor: Decimal::ONE,
        }
    }

    /// Product counted in discrete units of `unit_weight_kg` kg.
    pub fn unit(id: ProductId, name: impl Into<String>, unit_weight_kg: Decimal) -> Self {
        Self {
            id,
            name: name.into(),
            package_type: PackageType::Unit,
            package_weight: Decimal::ZERO,
            unit_weight_kg,
            conversion_factor: Decimal::ONE,
        }
    }

    /// True when issues must be rounded up to whole bags.
    pub fn requires_whole_packages(&self) -> bool {
        self.package_type == PackageType::SealedBag && self.package_weight > Decimal::ZERO
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub code: LocationCode,
    pub name: String,
    pub active: bool,
}

impl Location {
    pub fn new(code: impl Into<LocationCode>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            active: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formulation {
    pub id: FormulationId,
    pub name: String,
    /// Compound produced by this formulation.
    pub final_product_id: ProductId,
    pub machine: String,
    pub weight_per_batch: Decimal,
    pub items: Vec<FormulationItem>,
}

/// One ingredient line of a formulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulationItem {
    pub product_id: ProductId,
    pub quantity_per_batch: Decimal,
}

/// Read access to products already fetched for one operation.
pub trait ProductLookup {
    fn product(&self, id: &ProductId) -> Option<&Product>;

    fn require_product(&self, id: &ProductId) -> resinstock_core::DomainResult<&Product> {
        self.product(id)
            .ok_or_else(|| resinstock_core::DomainError::not_found(format!("product {id}")))
    }
}

impl ProductLookup for std::collections::HashMap<ProductId, Product> {
    fn product(&self, id: &ProductId) -> Option<&Product> {
        self.get(id)
    }
}

impl ProductLookup for std::collections::BTreeMap<ProductId, Product> {
    fn product(&self, id: &ProductId) -> Option<&Product> {
        self.get(id)
    }
}

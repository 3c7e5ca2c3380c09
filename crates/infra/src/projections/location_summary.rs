//! Per-location stock totals computed from a balance snapshot.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use resinstock_core::LocationCode;
use resinstock_inventory::StockBalance;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationStockSummary {
    pub location: LocationCode,
    /// Products with a positive balance.
    pub products_in_stock: usize,
    pub total_kg: Decimal,
}

/// Group balances by location, ordered by location code.
pub fn summarize(balances: &[StockBalance]) -> Vec<LocationStockSummary> {
    let mut by_location: BTreeMap<&LocationCode, (usize, Decimal)> = BTreeMap::new();
    for balance in balances {
        let entry = by_location
            .entry(&balance.key.location)
            .or_insert((0, Decimal::ZERO));
        if balance.level.total_kg > Decimal::ZERO {
            entry.0 += 1;
        }
        entry.1 += balance.level.total_kg;
    }

    by_location
        .into_iter()
        .map(|(location, (products_in_stock, total_kg))| LocationStockSummary {
            location: location.clone(),
            products_in_stock,
            total_kg,
        })
        .collect()
}

//! Quantity/unit to kilogram conversion driven by a product's packaging rule.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::{PackageType, Product};

/// Unit a stock quantity is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockUnit {
    Kg,
    Unit,
    Bag,
}

impl StockUnit {
    /// The unit a product is naturally counted in.
    pub fn natural_for(product: &Product) -> Self {
        match product.package_type {
            PackageType::Bulk => StockUnit::Kg,
            PackageType::Unit => StockUnit::Unit,
            PackageType::SealedBag => StockUnit::Bag,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StockUnit::Kg => "kg",
            StockUnit::Unit => "unit",
            StockUnit::Bag => "bag",
        }
    }
}

impl core::fmt::Display for StockUnit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kilograms per one `unit` of `product`.
fn kg_per(unit: StockUnit, product: &Product) -> Decimal {
    match unit {
        StockUnit::Kg => Decimal::ONE,
        _ if product.requires_whole_packages() => product.package_weight,
        _ => product.unit_weight_kg,
    }
}

/// Convert a quantity in `unit` to kilograms.
pub fn to_kg(quantity: Decimal, unit: StockUnit, product: &Product) -> Decimal {
    quantity * kg_per(unit, product)
}

/// Convert kilograms back to a quantity in `unit`; `0` when the product has no weight
/// for that unit.
pub fn from_kg(kg: Decimal, unit: StockUnit, product: &Product) -> Decimal {
    let per = kg_per(unit, product);
    if per.is_zero() {
        return Decimal::ZERO;
    }
    kg / per
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use resinstock_core::ProductId;
    use rust_decimal_macros::dec;

    use super::*;

    fn resin_bag() -> Product {
        Product::sealed_bag(ProductId::new(), "PVC resin", dec!(25))
    }

    #[test]
    fn kilograms_pass_through() {
        assert_eq!(to_kg(dec!(12.5), StockUnit::Kg, &resin_bag()), dec!(12.5));
        assert_eq!(from_kg(dec!(12.5), StockUnit::Kg, &resin_bag()), dec!(12.5));
    }

    #[test]
    fn sealed_bags_use_package_weight() {
        let p = resin_bag();
        assert_eq!(to_kg(dec!(4), StockUnit::Bag, &p), dec!(100));
        assert_eq!(from_kg(dec!(100), StockUnit::Bag, &p), dec!(4));
    }

    #[test]
    fn sealed_bag_without_weight_falls_back_to_unit_weight() {
        let mut p = resin_bag();
        p.package_weight = Decimal::ZERO;
        p.unit_weight_kg = dec!(20);
        assert_eq!(to_kg(dec!(2), StockUnit::Bag, &p), dec!(40));
    }

    #[test]
    fn units_use_unit_weight() {
        let p = Product::unit(ProductId::new(), "Pigment can", dec!(0.5));
        assert_eq!(to_kg(dec!(8), StockUnit::Unit, &p), dec!(4));
        assert_eq!(from_kg(dec!(4), StockUnit::Unit, &p), dec!(8));
    }

    #[test]
    fn zero_divisor_yields_zero() {
        let p = Product::unit(ProductId::new(), "Weightless", Decimal::ZERO);
        assert_eq!(from_kg(dec!(10), StockUnit::Unit, &p), Decimal::ZERO);
    }

    #[test]
    fn natural_units_follow_packaging() {
        assert_eq!(StockUnit::natural_for(&resin_bag()), StockUnit::Bag);
        assert_eq!(
            StockUnit::natural_for(&Product::bulk(ProductId::new(), "CaCO3")),
            StockUnit::Kg
        );
    }

    proptest! {
        #[test]
        fn from_kg_inverts_to_kg(
            qty_milli in 0i64..10_000_000i64,
            weight_milli in 1i64..100_000i64,
            unit_idx in 0usize..3,
        ) {
            let qty = Decimal::new(qty_milli, 3);
            let weight = Decimal::new(weight_milli, 3);
            let unit = [StockUnit::Kg, StockUnit::Unit, StockUnit::Bag][unit_idx];
            let product = Product::sealed_bag(ProductId::new(), "p", weight);

            let back = from_kg(to_kg(qty, unit, &product), unit, &product);
            prop_assert!((back - qty).abs() <= dec!(0.000001));
        }
    }
}

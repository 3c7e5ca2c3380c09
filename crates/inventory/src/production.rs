//! Production engine: ingredient requirements for a formulation run.
//!
//! Planning is a pure calculation. Sealed-bag ingredients are always rounded **up**
//! to whole bags so a run never starts short; the excess is reported as rounding loss.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use resinstock_core::{
    Actor, DomainError, DomainResult, FormulationId, LocationCode, ProductId, ProductionOrderId,
    TransferId,
};

use crate::catalog::{Formulation, PackageType, Product, ProductLookup};

/// Ingredient line of a production plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientRequirement {
    pub product_id: ProductId,
    pub quantity_per_batch: Decimal,
    pub ideal_kg: Decimal,
    pub package_type: PackageType,
    pub package_weight: Decimal,
    /// Whole bags to issue; `None` for products not issued in sealed bags.
    pub required_units: Option<u64>,
    pub adjusted_kg: Decimal,
    pub rounding_loss_kg: Decimal,
    pub available_kg: Decimal,
    pub has_enough_stock: bool,
    /// True when `adjusted_kg` came from an operator override.
    pub overridden: bool,
}

impl IngredientRequirement {
    fn refresh_sufficiency(&mut self) {
        self.rounding_loss_kg = self.adjusted_kg - self.ideal_kg;
        self.has_enough_stock = self.available_kg >= self.adjusted_kg;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionPlan {
    pub formulation_id: FormulationId,
    pub final_product_id: ProductId,
    pub machine: String,
    pub batches: u32,
    pub weight_per_batch: Decimal,
    pub total_compound_kg: Decimal,
    pub ingredients: Vec<IngredientRequirement>,
    pub all_stock_sufficient: bool,
    pub total_rounding_loss_kg: Decimal,
}

/// Operator-chosen issue weight for one ingredient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientOverride {
    pub product_id: ProductId,
    pub adjusted_kg: Decimal,
}

/// Whole packages and issued kilograms needed to cover `ideal_kg` of `product`.
pub fn package_requirement(ideal_kg: Decimal, product: &Product) -> (Option<u64>, Decimal) {
    if !product.requires_whole_packages() {
        return (None, ideal_kg);
    }
    let units = (ideal_kg / product.package_weight).ceil();
    (units.to_u64(), units * product.package_weight)
}

/// A formulation lists each ingredient once, with a positive weight per batch.
fn ensure_well_formed(formulation: &Formulation) -> DomainResult<()> {
    if formulation.weight_per_batch <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "formulation {} must yield a positive weight per batch, got {}",
            formulation.id, formulation.weight_per_batch
        )));
    }
    let mut seen = HashSet::with_capacity(formulation.items.len());
    for item in &formulation.items {
        if item.quantity_per_batch <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "formulation {} needs a positive quantity of {}, got {}",
                formulation.id, item.product_id, item.quantity_per_batch
            )));
        }
        if !seen.insert(item.product_id) {
            return Err(DomainError::validation(format!(
                "formulation {} lists ingredient {} more than once",
                formulation.id, item.product_id
            )));
        }
    }
    Ok(())
}

/// Compute the ingredient requirements of `batches` runs of `formulation`.
///
/// `available_kg` reports the stock of each ingredient at the source location.
pub fn plan_production(
    formulation: &Formulation,
    batches: u32,
    products: &impl ProductLookup,
    available_kg: impl Fn(&ProductId) -> Decimal,
) -> DomainResult<ProductionPlan> {
    if batches == 0 {
        return Err(DomainError::validation("batch count must be at least 1"));
    }
    if formulation.items.is_empty() {
        return Err(DomainError::validation(format!(
            "formulation {} has no ingredients",
            formulation.id
        )));
    }

    ensure_well_formed(formulation)?;

    let n = Decimal::from(batches);
    let mut ingredients = Vec::with_capacity(formulation.items.len());
    for item in &formulation.items {
        let product = products.require_product(&item.product_id)?;
        let ideal_kg = item.quantity_per_batch * n;
        let (required_units, adjusted_kg) = package_requirement(ideal_kg, product);

        let mut requirement = IngredientRequirement {
            product_id: item.product_id,
            quantity_per_batch: item.quantity_per_batch,
            ideal_kg,
            package_type: product.package_type,
            package_weight: product.package_weight,
            required_units,
            adjusted_kg,
            rounding_loss_kg: Decimal::ZERO,
            available_kg: available_kg(&item.product_id),
            has_enough_stock: false,
            overridden: false,
        };
        requirement.refresh_sufficiency();
        ingredients.push(requirement);
    }

    let mut plan = ProductionPlan {
        formulation_id: formulation.id,
        final_product_id: formulation.final_product_id,
        machine: formulation.machine.clone(),
        batches,
        weight_per_batch: formulation.weight_per_batch,
        total_compound_kg: n * formulation.weight_per_batch,
        ingredients,
        all_stock_sufficient: false,
        total_rounding_loss_kg: Decimal::ZERO,
    };
    plan.refresh_totals();
    Ok(plan)
}

impl ProductionPlan {
    fn refresh_totals(&mut self) {
        self.all_stock_sufficient = self.ingredients.iter().all(|i| i.has_enough_stock);
        self.total_rounding_loss_kg = self.ingredients.iter().map(|i| i.rounding_loss_kg).sum();
    }

    /// Replace computed issue weights with operator overrides.
    ///
    /// Sealed-bag overrides must stay whole multiples of the bag weight.
    pub fn with_overrides(
        mut self,
        overrides: &[IngredientOverride],
        products: &impl ProductLookup,
    ) -> DomainResult<Self> {
        for o in overrides {
            let product = products.require_product(&o.product_id)?;
            let ingredient = self
                .ingredients
                .iter_mut()
                .find(|i| i.product_id == o.product_id)
                .ok_or_else(|| {
                    DomainError::validation(format!(
                        "product {} is not an ingredient of formulation {}",
                        o.product_id, self.formulation_id
                    ))
                })?;

            if o.adjusted_kg <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "override for {} must be positive, got {}",
                    product.name, o.adjusted_kg
                )));
            }

            if product.requires_whole_packages() {
                let units = o.adjusted_kg / product.package_weight;
                if !units.fract().is_zero() {
                    return Err(DomainError::validation(format!(
                        "override for {} must be a multiple of {} kg bags, got {} kg",
                        product.name, product.package_weight, o.adjusted_kg
                    )));
                }
                ingredient.required_units = units.to_u64();
            }

            ingredient.adjusted_kg = o.adjusted_kg;
            ingredient.overridden = true;
            ingredient.refresh_sufficiency();
        }

        self.refresh_totals();
        Ok(self)
    }

    /// Fail with `InsufficientStock` for the first ingredient the source cannot cover.
    pub fn ensure_stock_sufficient(&self, source: &LocationCode) -> DomainResult<()> {
        match self.ingredients.iter().find(|i| !i.has_enough_stock) {
            Some(short) => Err(DomainError::insufficient_stock(
                short.product_id,
                source,
                short.adjusted_kg,
                short.available_kg,
            )),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductionOrderStatus {
    /// Orders are only persisted once confirmed and their stock has moved.
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOrderItem {
    pub product_id: ProductId,
    pub ideal_kg: Decimal,
    pub adjusted_kg: Decimal,
    pub difference_kg: Decimal,
    pub package_type: PackageType,
    pub package_weight: Decimal,
    pub required_units: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOrder {
    pub id: ProductionOrderId,
    pub formulation_id: FormulationId,
    pub final_product_id: ProductId,
    pub machine: String,
    pub batches: u32,
    pub weight_per_batch: Decimal,
    pub total_compound_kg: Decimal,
    pub source: LocationCode,
    pub destination: LocationCode,
    pub status: ProductionOrderStatus,
    pub items: Vec<ProductionOrderItem>,
    /// Completed transfer mirroring the ingredient issue.
    pub transfer_id: TransferId,
    pub confirmed_by: Actor,
    pub confirmed_at: DateTime<Utc>,
}

impl ProductionOrder {
    pub fn from_plan(
        id: ProductionOrderId,
        plan: &ProductionPlan,
        source: LocationCode,
        destination: LocationCode,
        transfer_id: TransferId,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> Self {
        let items = plan
            .ingredients
            .iter()
            .map(|i| ProductionOrderItem {
                product_id: i.product_id,
                ideal_kg: i.ideal_kg,
                adjusted_kg: i.adjusted_kg,
                difference_kg: i.adjusted_kg - i.ideal_kg,
                package_type: i.package_type,
                package_weight: i.package_weight,
                required_units: i.required_units,
            })
            .collect();

        Self {
            id,
            formulation_id: plan.formulation_id,
            final_product_id: plan.final_product_id,
            machine: plan.machine.clone(),
            batches: plan.batches,
            weight_per_batch: plan.weight_per_batch,
            total_compound_kg: plan.total_compound_kg,
            source,
            destination,
            status: ProductionOrderStatus::Completed,
            items,
            transfer_id,
            confirmed_by: actor.clone(),
            confirmed_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::catalog::FormulationItem;

    struct Fixture {
        resin: Product,
        chalk: Product,
        compound: Product,
        formulation: Formulation,
        products: HashMap<ProductId, Product>,
    }

    fn fixture(resin_per_batch: Decimal, chalk_per_batch: Decimal) -> Fixture {
        let resin = Product::sealed_bag(ProductId::new(), "PVC resin", dec!(25));
        let chalk = Product::bulk(ProductId::new(), "CaCO3");
        let compound = Product::bulk(ProductId::new(), "Compound 80A");
        let formulation = Formulation {
            id: FormulationId::new(),
            name: "80A".to_string(),
            final_product_id: compound.id,
            machine: "Mixer 1".to_string(),
            weight_per_batch: resin_per_batch + chalk_per_batch,
            items: vec![
                FormulationItem { product_id: resin.id, quantity_per_batch: resin_per_batch },
                FormulationItem { product_id: chalk.id, quantity_per_batch: chalk_per_batch },
            ],
        };
        let products = [resin.clone(), chalk.clone(), compound.clone()]
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        Fixture { resin, chalk, compound, formulation, products }
    }

    #[test]
    fn sealed_bag_rounds_up_to_whole_bags() {
        // 237 kg of resin at 25 kg per bag.
        let f = fixture(dec!(237), dec!(63));
        let plan = plan_production(&f.formulation, 1, &f.products, |_| dec!(1000)).unwrap();

        let resin = &plan.ingredients[0];
        assert_eq!(resin.required_units, Some(10));
        assert_eq!(resin.adjusted_kg, dec!(250));
        assert_eq!(resin.rounding_loss_kg, dec!(13));

        let chalk = &plan.ingredients[1];
        assert_eq!(chalk.required_units, None);
        assert_eq!(chalk.adjusted_kg, dec!(63));
        assert_eq!(chalk.rounding_loss_kg, Decimal::ZERO);

        assert_eq!(plan.total_compound_kg, dec!(300));
        assert_eq!(plan.total_rounding_loss_kg, dec!(13));
        assert_eq!(plan.final_product_id, f.compound.id);
        assert!(plan.all_stock_sufficient);
    }

    #[test]
    fn batches_multiply_ideal_weights() {
        let f = fixture(dec!(50), dec!(10));
        let plan = plan_production(&f.formulation, 3, &f.products, |_| dec!(1000)).unwrap();
        assert_eq!(plan.ingredients[0].ideal_kg, dec!(150));
        assert_eq!(plan.ingredients[0].required_units, Some(6));
        assert_eq!(plan.ingredients[1].ideal_kg, dec!(30));
        assert_eq!(plan.total_compound_kg, dec!(180));
    }

    #[test]
    fn insufficient_stock_is_flagged_per_ingredient() {
        let f = fixture(dec!(237), dec!(63));
        let chalk_id = f.chalk.id;
        let plan = plan_production(&f.formulation, 1, &f.products, |id| {
            if *id == chalk_id { dec!(50) } else { dec!(240) }
        })
        .unwrap();

        // 240 kg of resin does not cover 10 whole bags.
        assert!(!plan.ingredients[0].has_enough_stock);
        assert!(!plan.ingredients[1].has_enough_stock);
        assert!(!plan.all_stock_sufficient);

        let err = plan.ensure_stock_sufficient(&"PCP".into()).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { .. }));
    }

    #[test]
    fn zero_batches_are_rejected() {
        let f = fixture(dec!(1), dec!(1));
        assert!(matches!(
            plan_production(&f.formulation, 0, &f.products, |_| dec!(0)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn overrides_must_respect_bag_multiples() {
        let f = fixture(dec!(237), dec!(63));
        let plan = plan_production(&f.formulation, 1, &f.products, |_| dec!(1000)).unwrap();

        let partial_bag = plan.clone().with_overrides(
            &[IngredientOverride { product_id: f.resin.id, adjusted_kg: dec!(240) }],
            &f.products,
        );
        assert!(matches!(partial_bag, Err(DomainError::Validation(_))));

        let whole = plan
            .with_overrides(
                &[
                    IngredientOverride { product_id: f.resin.id, adjusted_kg: dec!(275) },
                    IngredientOverride { product_id: f.chalk.id, adjusted_kg: dec!(60) },
                ],
                &f.products,
            )
            .unwrap();
        assert_eq!(whole.ingredients[0].required_units, Some(11));
        assert_eq!(whole.ingredients[0].rounding_loss_kg, dec!(38));
        assert_eq!(whole.ingredients[1].rounding_loss_kg, dec!(-3));
        assert!(whole.ingredients.iter().all(|i| i.overridden));
    }

    #[test]
    fn overrides_for_foreign_products_are_rejected() {
        let f = fixture(dec!(10), dec!(10));
        let plan = plan_production(&f.formulation, 1, &f.products, |_| dec!(100)).unwrap();
        let err = plan
            .with_overrides(
                &[IngredientOverride { product_id: f.compound.id, adjusted_kg: dec!(5) }],
                &f.products,
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn order_items_record_difference() {
        let f = fixture(dec!(237), dec!(63));
        let plan = plan_production(&f.formulation, 1, &f.products, |_| dec!(1000)).unwrap();
        let actor = Actor::new(resinstock_core::UserId::new(), "Supervisor");
        let order = ProductionOrder::from_plan(
            ProductionOrderId::new(),
            &plan,
            "PCP".into(),
            "PMP".into(),
            TransferId::new(),
            &actor,
            Utc::now(),
        );
        assert_eq!(order.items[0].difference_kg, dec!(13));
        assert_eq!(order.status, ProductionOrderStatus::Completed);
    }

    #[test]
    fn repeated_ingredients_are_rejected() {
        let mut f = fixture(dec!(100), dec!(100));
        f.formulation.items[0].product_id = f.chalk.id;
        let err = plan_production(&f.formulation, 1, &f.products, |_| dec!(1000)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn non_positive_ingredient_quantities_are_rejected() {
        for qty in [dec!(-100), Decimal::ZERO] {
            let f = fixture(dec!(237), qty);
            let err = plan_production(&f.formulation, 1, &f.products, |_| dec!(1000)).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "quantity {qty}");
        }
    }

    #[test]
    fn non_positive_batch_weight_is_rejected() {
        let mut f = fixture(dec!(237), dec!(63));
        for weight in [dec!(-300), Decimal::ZERO] {
            f.formulation.weight_per_batch = weight;
            let err = plan_production(&f.formulation, 1, &f.products, |_| dec!(1000)).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "weight {weight}");
        }
    }

    proptest! {
        #[test]
        fn sealed_bag_rounding_bounds(ideal_centi in 0i64..10_000_000, weight_centi in 1i64..10_000) {
            let ideal = Decimal::new(ideal_centi, 2);
            let weight = Decimal::new(weight_centi, 2);
            let product = Product::sealed_bag(ProductId::new(), "bag", weight);

            let (units, adjusted) = package_requirement(ideal, &product);
            let units = units.expect("sealed bags always yield a unit count");

            prop_assert_eq!(adjusted, (ideal / weight).ceil() * weight);
            prop_assert_eq!(adjusted, Decimal::from(units) * weight);
            prop_assert!(adjusted >= ideal);
            let loss = adjusted - ideal;
            prop_assert!(loss >= Decimal::ZERO);
            prop_assert!(loss < weight);
        }
    }
}

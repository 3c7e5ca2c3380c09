//! Catalog repository: read access to master data owned outside the ledger.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use resinstock_core::{FormulationId, LocationCode, ProductId};
use resinstock_inventory::{Formulation, Location, Product};

use crate::error::{LedgerError, LedgerResult};
use crate::store::StoreError;

/// Source of products, locations and formulations.
pub trait Catalog: Send + Sync {
    fn product(&self, id: &ProductId) -> Result<Option<Product>, StoreError>;

    fn location(&self, code: &LocationCode) -> Result<Option<Location>, StoreError>;

    fn formulation(&self, id: &FormulationId) -> Result<Option<Formulation>, StoreError>;
}

impl<C> Catalog for Arc<C>
where
    C: Catalog + ?Sized,
{
    fn product(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        (**self).product(id)
    }

    fn location(&self, code: &LocationCode) -> Result<Option<Location>, StoreError> {
        (**self).location(code)
    }

    fn formulation(&self, id: &FormulationId) -> Result<Option<Formulation>, StoreError> {
        (**self).formulation(id)
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("catalog lock poisoned".to_string())
}

/// In-memory catalog, seeded by tests or by a loader at startup.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<ProductId, Product>>,
    locations: RwLock<HashMap<LocationCode, Location>>,
    formulations: RwLock<HashMap<FormulationId, Formulation>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_product(&self, product: Product) -> Result<(), StoreError> {
        self.products
            .write()
            .map_err(|_| poisoned())?
            .insert(product.id, product);
        Ok(())
    }

    pub fn insert_location(&self, location: Location) -> Result<(), StoreError> {
        self.locations
            .write()
            .map_err(|_| poisoned())?
            .insert(location.code.clone(), location);
        Ok(())
    }

    pub fn insert_formulation(&self, formulation: Formulation) -> Result<(), StoreError> {
        self.formulations
            .write()
            .map_err(|_| poisoned())?
            .insert(formulation.id, formulation);
        Ok(())
    }
}

impl Catalog for InMemoryCatalog {
    fn product(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.products.read().map_err(|_| poisoned())?.get(id).cloned())
    }

    fn location(&self, code: &LocationCode) -> Result<Option<Location>, StoreError> {
        Ok(self.locations.read().map_err(|_| poisoned())?.get(code).cloned())
    }

    fn formulation(&self, id: &FormulationId) -> Result<Option<Formulation>, StoreError> {
        Ok(self.formulations.read().map_err(|_| poisoned())?.get(id).cloned())
    }
}

/// Read-through cache in front of a slower catalog.
///
/// Only hits are cached; a missing entry is asked for again next time.
#[derive(Debug)]
pub struct CachedCatalog<C> {
    inner: C,
    products: RwLock<HashMap<ProductId, Product>>,
    locations: RwLock<HashMap<LocationCode, Location>>,
    formulations: RwLock<HashMap<FormulationId, Formulation>>,
}

impl<C> CachedCatalog<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            products: RwLock::new(HashMap::new()),
            locations: RwLock::new(HashMap::new()),
            formulations: RwLock::new(HashMap::new()),
        }
    }

    /// Drop every cached entry.
    pub fn invalidate(&self) {
        if let Ok(mut p) = self.products.write() {
            p.clear();
        }
        if let Ok(mut l) = self.locations.write() {
            l.clear();
        }
        if let Ok(mut f) = self.formulations.write() {
            f.clear();
        }
    }
}

fn read_through<K, V>(
    cache: &RwLock<HashMap<K, V>>,
    key: &K,
    load: impl FnOnce() -> Result<Option<V>, StoreError>,
) -> Result<Option<V>, StoreError>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    if let Some(hit) = cache.read().map_err(|_| poisoned())?.get(key) {
        return Ok(Some(hit.clone()));
    }
    let loaded = load()?;
    if let Some(value) = &loaded {
        cache
            .write()
            .map_err(|_| poisoned())?
            .insert(key.clone(), value.clone());
    }
    Ok(loaded)
}

impl<C: Catalog> Catalog for CachedCatalog<C> {
    fn product(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        read_through(&self.products, id, || self.inner.product(id))
    }

    fn location(&self, code: &LocationCode) -> Result<Option<Location>, StoreError> {
        read_through(&self.locations, code, || self.inner.location(code))
    }

    fn formulation(&self, id: &FormulationId) -> Result<Option<Formulation>, StoreError> {
        read_through(&self.formulations, id, || self.inner.formulation(id))
    }
}

/// Load a product or fail with `NotFound`.
pub fn require_product(catalog: &impl Catalog, id: &ProductId) -> LedgerResult<Product> {
    catalog
        .product(id)?
        .ok_or_else(|| LedgerError::not_found(format!("product {id}")))
}

/// Load every product in `ids` into a lookup map.
pub fn require_products<'a>(
    catalog: &impl Catalog,
    ids: impl IntoIterator<Item = &'a ProductId>,
) -> LedgerResult<HashMap<ProductId, Product>> {
    let mut products = HashMap::new();
    for id in ids {
        if !products.contains_key(id) {
            products.insert(*id, require_product(catalog, id)?);
        }
    }
    Ok(products)
}

/// Load an active location: unknown codes are `NotFound`, inactive ones `Validation`.
pub fn require_active_location(catalog: &impl Catalog, code: &LocationCode) -> LedgerResult<Location> {
    let location = catalog
        .location(code)?
        .ok_or_else(|| LedgerError::not_found(format!("location {code}")))?;
    if !location.active {
        return Err(LedgerError::validation(format!("location {code} is inactive")));
    }
    Ok(location)
}

pub fn require_formulation(catalog: &impl Catalog, id: &FormulationId) -> LedgerResult<Formulation> {
    catalog
        .formulation(id)?
        .ok_or_else(|| LedgerError::not_found(format!("formulation {id}")))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingCatalog {
        inner: InMemoryCatalog,
        product_calls: AtomicUsize,
    }

    impl Catalog for CountingCatalog {
        fn product(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
            self.product_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.product(id)
        }

        fn location(&self, code: &LocationCode) -> Result<Option<Location>, StoreError> {
            self.inner.location(code)
        }

        fn formulation(&self, id: &FormulationId) -> Result<Option<Formulation>, StoreError> {
            self.inner.formulation(id)
        }
    }

    #[test]
    fn cached_catalog_reads_through_once() {
        let inner = InMemoryCatalog::new();
        let p = Product::bulk(ProductId::new(), "CaCO3");
        inner.insert_product(p.clone()).unwrap();
        let counting = CountingCatalog {
            inner,
            product_calls: AtomicUsize::new(0),
        };
        let cached = CachedCatalog::new(counting);

        assert_eq!(cached.product(&p.id).unwrap(), Some(p.clone()));
        assert_eq!(cached.product(&p.id).unwrap(), Some(p.clone()));
        assert_eq!(cached.inner.product_calls.load(Ordering::SeqCst), 1);

        cached.invalidate();
        cached.product(&p.id).unwrap();
        assert_eq!(cached.inner.product_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn inactive_and_unknown_locations_are_rejected() {
        let catalog = InMemoryCatalog::new();
        let mut closed = Location::new("OLD", "Old warehouse");
        closed.active = false;
        catalog.insert_location(closed).unwrap();

        assert!(matches!(
            require_active_location(&catalog, &"old".into()),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            require_active_location(&catalog, &"NOPE".into()),
            Err(LedgerError::NotFound(_))
        ));
    }
}

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::types::{CatalogError, ContentType, Product, ProductId, ProductKind};
use super::Catalog;

fn default_available() -> bool {
    true
}

/// A non-product record known to the host (pages, posts, ...).
#[derive(Debug, Deserialize)]
struct OtherRecord {
    id: ProductId,
    content_type: String,
}

#[derive(Debug, Deserialize)]
struct SnapshotFile {
    #[serde(default = "default_available")]
    available: bool,
    currency: String,
    #[serde(default)]
    products: Vec<Product>,
    #[serde(default)]
    other_records: Vec<OtherRecord>,
}

#[derive(Debug)]
struct SnapshotState {
    available: bool,
    currency: String,
    products: BTreeMap<ProductId, Product>,
    other_records: BTreeMap<ProductId, String>,
}

/// Catalog backed by an in-memory copy of the store's product records.
///
/// Loaded from a JSON snapshot for the CLI; tests mutate it through
/// [`SnapshotCatalog::upsert`] and [`SnapshotCatalog::remove`] while a
/// sync engine holds a shared handle.
#[derive(Debug)]
pub struct SnapshotCatalog {
    state: RwLock<SnapshotState>,
}

impl SnapshotCatalog {
    /// Creates an empty, available catalog using `currency` for prices.
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(SnapshotState {
                available: true,
                currency: currency.into(),
                products: BTreeMap::new(),
                other_records: BTreeMap::new(),
            }),
        }
    }

    /// Parses a JSON snapshot document.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: SnapshotFile = serde_json::from_str(json)?;
        let catalog = Self::new(file.currency);
        catalog.set_available(file.available);
        for product in file.products {
            catalog.upsert(product);
        }
        for record in file.other_records {
            catalog.add_other_record(record.id, record.content_type);
        }
        Ok(catalog)
    }

    /// Reads and parses a JSON snapshot from disk.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&content)?;
        tracing::debug!(
            path = %path.display(),
            products = catalog.read().products.len(),
            "Loaded catalog snapshot"
        );
        Ok(catalog)
    }

    fn read(&self) -> RwLockReadGuard<'_, SnapshotState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SnapshotState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or replaces a top-level product record.
    ///
    /// Variations nested under a variable product are re-linked to it if
    /// their `parent_id` disagrees.
    pub fn upsert(&self, mut product: Product) {
        let parent = product.id;
        if let ProductKind::Variable { variations } = &mut product.kind {
            for variation in variations.iter_mut() {
                if variation.parent_id() != Some(parent) {
                    tracing::warn!(
                        variation_id = variation.id,
                        parent_id = parent,
                        "Re-linking variation to its enclosing variable product"
                    );
                    variation.kind = ProductKind::Variation { parent_id: parent };
                }
            }
        }
        self.write().products.insert(product.id, product);
    }

    /// Removes a top-level product record (and its variations).
    pub fn remove(&self, id: ProductId) -> Option<Product> {
        self.write().products.remove(&id)
    }

    /// Registers a record that exists in the host but is not a product.
    pub fn add_other_record(&self, id: ProductId, content_type: impl Into<String>) {
        self.write().other_records.insert(id, content_type.into());
    }

    /// Simulates the e-commerce subsystem being switched off.
    pub fn set_available(&self, available: bool) {
        self.write().available = available;
    }
}

impl Catalog for SnapshotCatalog {
    fn is_available(&self) -> bool {
        self.read().available
    }

    fn content_type(&self, id: ProductId) -> Option<ContentType> {
        let state = self.read();
        if state.products.contains_key(&id) {
            return Some(ContentType::Product);
        }
        if state
            .products
            .values()
            .any(|p| p.variations().iter().any(|v| v.id == id))
        {
            return Some(ContentType::ProductVariation);
        }
        state
            .other_records
            .get(&id)
            .map(|name| ContentType::from_name(name))
    }

    fn product(&self, id: ProductId) -> Result<Product, CatalogError> {
        let state = self.read();
        if let Some(product) = state.products.get(&id) {
            return Ok(product.clone());
        }
        state
            .products
            .values()
            .flat_map(|p| p.variations())
            .find(|v| v.id == id)
            .cloned()
            .ok_or(CatalogError::Unresolvable(id))
    }

    fn published_products(&self) -> Vec<Product> {
        self.read()
            .products
            .values()
            .filter(|p| p.is_published())
            .cloned()
            .collect()
    }

    fn currency(&self) -> String {
        self.read().currency.clone()
    }
}

//! Read-only view of the store's product catalog.
//!
//! The sync engine never talks to the host platform directly; it consumes
//! the [`Catalog`] contract. [`SnapshotCatalog`] is the in-process
//! implementation used by the CLI and the test suite.

mod snapshot;
mod types;

use std::sync::Arc;

pub use snapshot::SnapshotCatalog;
pub use types::{
    CatalogError, ContentType, Product, ProductAttribute, ProductId, ProductKind, ProductStatus,
};

/// Catalog queries the feed needs from the host platform.
pub trait Catalog {
    /// False when the e-commerce subsystem is not active.
    fn is_available(&self) -> bool;

    /// Content type of any host record, or `None` if the id is unknown.
    fn content_type(&self, id: ProductId) -> Option<ContentType>;

    /// Resolves a product or variation record.
    fn product(&self, id: ProductId) -> Result<Product, CatalogError>;

    /// Every published top-level product.
    fn published_products(&self) -> Vec<Product>;

    /// Store-wide currency code (e.g. `BRL`).
    fn currency(&self) -> String;
}

impl<C: Catalog + ?Sized> Catalog for Arc<C> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn content_type(&self, id: ProductId) -> Option<ContentType> {
        (**self).content_type(id)
    }

    fn product(&self, id: ProductId) -> Result<Product, CatalogError> {
        (**self).product(id)
    }

    fn published_products(&self) -> Vec<Product> {
        (**self).published_products()
    }

    fn currency(&self) -> String {
        (**self).currency()
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by catalog collaborators.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The record id does not resolve to a usable product.
    #[error("Product {0} could not be resolved")]
    Unresolvable(ProductId),

    /// The catalog snapshot is not valid JSON or has the wrong shape.
    #[error("Invalid catalog snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// The catalog snapshot could not be read.
    #[error("Failed to read catalog snapshot: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Record Types
// ============================================================================

/// Catalog identifier shared by products and variations.
pub type ProductId = u64;

/// Content type of a host record, as reported before any product lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentType {
    Product,
    ProductVariation,
    Other(String),
}

impl ContentType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "product" => Self::Product,
            "product_variation" => Self::ProductVariation,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Publication status of a product record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Publish,
    #[default]
    Draft,
    Pending,
    Private,
    Trash,
}

/// Product shape. Field derivation rules in the item mapper dispatch on this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProductKind {
    Simple,
    Variable {
        #[serde(default)]
        variations: Vec<Product>,
    },
    Variation {
        #[serde(default)]
        parent_id: ProductId,
    },
}

/// A taxonomy-backed attribute (e.g. `pa_marca`) with its term names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAttribute {
    pub name: String,
    #[serde(default)]
    pub terms: Vec<String>,
}

fn default_in_stock() -> bool {
    true
}

/// A product record as exposed by the catalog.
///
/// `price` is the price including tax. Variations carry their chosen
/// attribute values in `variation_attributes` (slug → value); simple and
/// variable products carry taxonomy attributes in `attributes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(flatten)]
    pub kind: ProductKind,
    #[serde(default)]
    pub status: ProductStatus,
    #[serde(default)]
    pub title: String,
    /// Display name with variant labels wrapped in `<span>` elements.
    #[serde(default)]
    pub formatted_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub attributes: Vec<ProductAttribute>,
    #[serde(default)]
    pub variation_attributes: BTreeMap<String, String>,
}

impl Product {
    pub fn is_published(&self) -> bool {
        self.status == ProductStatus::Publish
    }

    /// Price including tax.
    ///
    /// A variable product without a price of its own reports the lowest
    /// positive price among its variations.
    pub fn price_including_tax(&self) -> Option<f64> {
        match (&self.kind, self.price) {
            (_, Some(price)) => Some(price),
            (ProductKind::Variable { variations }, None) => variations
                .iter()
                .filter_map(|v| v.price)
                .filter(|p| p.is_finite() && *p > 0.0)
                .min_by(|a, b| a.total_cmp(b)),
            _ => None,
        }
    }

    /// Variations of a variable product; empty for every other shape.
    pub fn variations(&self) -> &[Product] {
        match &self.kind {
            ProductKind::Variable { variations } => variations,
            _ => &[],
        }
    }

    pub fn parent_id(&self) -> Option<ProductId> {
        match self.kind {
            ProductKind::Variation { parent_id } => Some(parent_id),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ProductKind::Simple => "simple",
            ProductKind::Variable { .. } => "variable",
            ProductKind::Variation { .. } => "variation",
        }
    }
}

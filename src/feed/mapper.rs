use crate::catalog::{Product, ProductKind};
use crate::util::{format_price, join_category_list, normalize_variant_title, strip_xml_invalid_chars};

use super::document::{Availability, Item, CONDITION_NEW};

/// True when `price` is a finite number strictly greater than zero.
pub fn has_valid_price(price: Option<f64>) -> bool {
    matches!(price, Some(p) if p.is_finite() && p > 0.0)
}

/// The single gate for feed membership: published with a valid price.
pub fn qualifies(product: &Product) -> bool {
    product.is_published() && has_valid_price(product.price_including_tax())
}

/// Feed ids a product owns: its own id for a simple product, every
/// variation id for a variable product.
pub fn feed_ids(product: &Product) -> Vec<String> {
    match &product.kind {
        ProductKind::Simple => vec![product.id.to_string()],
        ProductKind::Variable { variations } => {
            variations.iter().map(|v| v.id.to_string()).collect()
        }
        ProductKind::Variation { .. } => Vec::new(),
    }
}

fn clean(text: &str) -> String {
    strip_xml_invalid_chars(text).into_owned()
}

/// Maps catalog products to feed items.
///
/// Shared by the full rebuild and the incremental path so both produce
/// identical items for the same catalog state.
#[derive(Debug, Clone)]
pub struct ItemMapper {
    currency: String,
    brand_attribute: String,
}

impl ItemMapper {
    pub fn new(currency: impl Into<String>, brand_attribute: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            brand_attribute: brand_attribute.into(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Items for a changed top-level product, after applying the gate.
    ///
    /// - Simple: one item when the product qualifies.
    /// - Variable: one item per qualifying variation, when the parent
    ///   qualifies.
    /// - Variation: none; variations are only reached through their parent.
    pub fn items_for(&self, product: &Product) -> Vec<Item> {
        if !qualifies(product) {
            return Vec::new();
        }
        match &product.kind {
            ProductKind::Simple => vec![self.map(product, None)],
            ProductKind::Variable { variations } => variations
                .iter()
                .filter(|v| qualifies(v))
                .map(|v| self.map(v, Some(product)))
                .collect(),
            ProductKind::Variation { .. } => Vec::new(),
        }
    }

    /// Maps one product or variation to an item without gating.
    ///
    /// `parent` supplies description and categories for variable and
    /// variation records; without it the record's own values are used.
    pub fn map(&self, product: &Product, parent: Option<&Product>) -> Item {
        let is_simple = matches!(product.kind, ProductKind::Simple);
        let source = if is_simple {
            product
        } else {
            parent.unwrap_or(product)
        };

        let title = if is_simple {
            product.title.clone()
        } else {
            let name = product.formatted_name.as_deref().unwrap_or(&product.title);
            normalize_variant_title(name)
        };

        let availability = if product.in_stock {
            Availability::InStock
        } else {
            Availability::OutOfStock
        };

        Item {
            id: product.id.to_string(),
            title: clean(&title),
            description: clean(&source.description),
            link: clean(&product.permalink),
            product_type: clean(&join_category_list(&source.categories)),
            google_product_category: String::new(),
            image_link: product
                .image_url
                .as_deref()
                .filter(|url| !url.is_empty())
                .map(clean),
            condition: CONDITION_NEW.to_string(),
            availability,
            price: format_price(
                product.price_including_tax().unwrap_or_default(),
                &self.currency,
            ),
            brand: self.brand(product).map(|b| clean(&b)),
            mpn: Some(product.sku.as_str())
                .filter(|sku| !sku.is_empty())
                .map(clean),
        }
    }

    /// Brand values for `product`.
    ///
    /// Variable and variation records first use their variation-level
    /// attribute value; only when that is empty are the taxonomy terms of
    /// the brand attribute collected.
    fn brand(&self, product: &Product) -> Option<String> {
        let mut brands: Vec<&str> = Vec::new();

        if !matches!(product.kind, ProductKind::Simple) {
            brands.extend(
                product
                    .variation_attributes
                    .get(&self.brand_attribute)
                    .map(String::as_str)
                    .filter(|v| !v.is_empty()),
            );
        }

        if brands.is_empty() {
            brands.extend(
                product
                    .attributes
                    .iter()
                    .filter(|attr| attr.name == self.brand_attribute)
                    .flat_map(|attr| attr.terms.iter().map(String::as_str))
                    .filter(|term| !term.is_empty()),
            );
        }

        if brands.is_empty() {
            None
        } else {
            Some(brands.join(", "))
        }
    }
}

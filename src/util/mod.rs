//! Text helpers shared by the item mapper.
//!
//! - **Markup**: tag stripping and variant-title normalization
//! - **Formatting**: price and category breadcrumb rendering
//! - **Sanitizing**: removal of characters XML 1.0 forbids
//!
//! # Examples
//!
//! ```
//! use shopfeed::util::{format_price, normalize_variant_title};
//!
//! assert_eq!(format_price(19.9, "BRL"), "19.90 BRL");
//! assert_eq!(normalize_variant_title("Mug<span>Blue</span>"), "Mug | Blue");
//! ```

mod text;

pub use text::{
    format_price, join_category_list, normalize_variant_title, strip_tags,
    strip_xml_invalid_chars,
};

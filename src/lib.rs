//! Google Shopping XML feed kept in sync with catalog change events.
//!
//! The first relevant save builds the feed from the whole published
//! catalog; every later event replaces only the changed product's items.

pub mod catalog;
pub mod config;
pub mod feed;
pub mod sync;
pub mod util;

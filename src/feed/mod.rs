//! The shopping feed itself: document model, item mapping and persistence.
//!
//! - [`document`] - Feed Document Model (parse / serialize / item edits)
//! - [`mapper`] - product → item field derivation and the membership gate
//! - [`store`] - the single feed file on disk, replaced atomically
//!
//! # Example
//!
//! ```ignore
//! use shopfeed::feed::{FeedStore, ItemMapper};
//!
//! let store = FeedStore::new("uploads/shopping-feeds/g-shopping-feed.xml");
//! let mut document = store.load()?;
//! for item in ItemMapper::new("BRL", "pa_marca").items_for(&product) {
//!     document.append_item(item);
//! }
//! store.save(&document)?;
//! ```

pub mod document;
pub mod mapper;
pub mod store;

pub use document::{
    parse, serialize, Availability, Channel, FeedDocument, ForeignElement, Item, ItemHandle,
    MalformedFeedError, SerializeError, GOOGLE_NAMESPACE,
};
pub use mapper::{feed_ids, has_valid_price, qualifies, ItemMapper};
pub use store::{FeedError, FeedStore, StorageError};

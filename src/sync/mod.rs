//! Catalog event handling.
//!
//! - [`engine`] - decides between full rebuild and incremental update
//! - [`worker`] - serializes events through a single queue consumer

mod engine;
mod worker;

pub use engine::{CatalogEvent, EventKind, IgnoreReason, SyncEngine, SyncError, SyncOutcome};
pub use worker::{SyncHandle, SyncWorker};

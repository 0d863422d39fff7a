use thiserror::Error;

use crate::catalog::{Catalog, CatalogError, ContentType, Product, ProductId, ProductKind};
use crate::config::Config;
use crate::feed::{feed_ids, Channel, FeedDocument, FeedError, FeedStore, ItemMapper, StorageError};

/// Errors that abort handling of a single catalog event.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// The sync worker is no longer accepting events.
    #[error("Sync worker has stopped")]
    WorkerStopped,
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        Self::Feed(FeedError::Storage(err))
    }
}

/// Host trigger that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A record was created or updated.
    Saved,
    /// A record is about to be deleted.
    BeforeDelete,
}

/// A single catalog change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEvent {
    pub kind: EventKind,
    pub id: ProductId,
}

impl CatalogEvent {
    pub fn saved(id: ProductId) -> Self {
        Self {
            kind: EventKind::Saved,
            id,
        }
    }

    pub fn before_delete(id: ProductId) -> Self {
        Self {
            kind: EventKind::BeforeDelete,
            id,
        }
    }
}

/// Why an event left the feed untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    CatalogUnavailable,
    NotAProduct,
    UnresolvableProduct,
    /// A delete arrived before any feed file exists.
    NoFeedToUpdate,
}

/// What handling an event did to the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Ignored(IgnoreReason),
    /// The feed was regenerated from the whole published catalog.
    Rebuilt { items: usize },
    /// The changed product's items were removed and re-added.
    Updated { removed: usize, added: usize },
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ignored(reason) => write!(f, "ignored ({reason:?})"),
            Self::Rebuilt { items } => write!(f, "rebuilt feed with {items} items"),
            Self::Updated { removed, added } => {
                write!(f, "updated feed: {removed} removed, {added} added")
            }
        }
    }
}

/// Applies catalog change events to the feed file.
///
/// With no feed file a save triggers a full rebuild; afterwards every event
/// only touches the changed product. Not safe to call concurrently on the
/// same feed path; route events through [`super::SyncWorker`] for that.
#[derive(Debug)]
pub struct SyncEngine<C> {
    catalog: C,
    store: FeedStore,
    channel: Channel,
    brand_attribute: String,
}

impl<C: Catalog> SyncEngine<C> {
    pub fn new(
        catalog: C,
        store: FeedStore,
        channel: Channel,
        brand_attribute: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            store,
            channel,
            brand_attribute: brand_attribute.into(),
        }
    }

    pub fn from_config(catalog: C, config: &Config) -> Self {
        Self::new(
            catalog,
            FeedStore::new(config.feed_file_path()),
            config.channel(),
            config.brand_attribute.clone(),
        )
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    /// Built per event so a currency change in the store applies immediately.
    fn mapper(&self) -> ItemMapper {
        ItemMapper::new(self.catalog.currency(), self.brand_attribute.as_str())
    }

    pub fn on_saved(&self, id: ProductId) -> Result<SyncOutcome, SyncError> {
        self.handle(CatalogEvent::saved(id))
    }

    pub fn on_before_delete(&self, id: ProductId) -> Result<SyncOutcome, SyncError> {
        self.handle(CatalogEvent::before_delete(id))
    }

    /// Handles one event to completion.
    ///
    /// Irrelevant events (catalog off, non-product record, unknown id) are
    /// reported as [`SyncOutcome::Ignored`]. Storage and parse failures
    /// abort the event and are returned.
    pub fn handle(&self, event: CatalogEvent) -> Result<SyncOutcome, SyncError> {
        let product = match self.resolve(event.id) {
            Ok(product) => product,
            Err(reason) => {
                tracing::debug!(product_id = event.id, ?reason, "Ignoring catalog event");
                return Ok(SyncOutcome::Ignored(reason));
            }
        };

        if !self.store.exists() {
            return match event.kind {
                EventKind::BeforeDelete => {
                    tracing::debug!(product_id = event.id, "No feed yet, nothing to remove");
                    Ok(SyncOutcome::Ignored(IgnoreReason::NoFeedToUpdate))
                }
                EventKind::Saved => self.rebuild(),
            };
        }

        self.apply_delta(&product, event.kind)
    }

    fn resolve(&self, id: ProductId) -> Result<Product, IgnoreReason> {
        if !self.catalog.is_available() {
            return Err(IgnoreReason::CatalogUnavailable);
        }
        match self.catalog.content_type(id) {
            Some(ContentType::Product) => {}
            Some(_) => return Err(IgnoreReason::NotAProduct),
            None => return Err(IgnoreReason::UnresolvableProduct),
        }

        let product = match self.catalog.product(id) {
            Ok(product) => product,
            Err(CatalogError::Unresolvable(_)) => return Err(IgnoreReason::UnresolvableProduct),
            Err(e) => {
                tracing::warn!(product_id = id, error = %e, "Catalog lookup failed");
                return Err(IgnoreReason::UnresolvableProduct);
            }
        };

        if matches!(product.kind, ProductKind::Variation { .. }) {
            return Err(IgnoreReason::NotAProduct);
        }
        Ok(product)
    }

    /// Regenerates the feed from every published product.
    ///
    /// Runs automatically on the first save with no feed file; callable
    /// directly to force a full regeneration.
    pub fn rebuild(&self) -> Result<SyncOutcome, SyncError> {
        let mut document = if self.store.exists() {
            FeedDocument::new(self.channel.clone())
        } else {
            self.store.initialize_empty(self.channel.clone())?
        };

        let mapper = self.mapper();
        for product in self.catalog.published_products() {
            for item in mapper.items_for(&product) {
                document.append_item(item);
            }
        }

        self.store.save(&document)?;
        tracing::info!(
            path = %self.store.path().display(),
            items = document.len(),
            "Rebuilt feed from catalog"
        );
        Ok(SyncOutcome::Rebuilt {
            items: document.len(),
        })
    }

    /// Removes the product's current items, then re-adds them on save.
    fn apply_delta(&self, product: &Product, kind: EventKind) -> Result<SyncOutcome, SyncError> {
        let mut document = self.store.load()?;

        let mut removed = 0;
        for id in feed_ids(product) {
            for handle in document.find_items_by_id(&id) {
                if document.remove_item(handle).is_some() {
                    removed += 1;
                }
            }
        }

        let mut added = 0;
        if kind == EventKind::Saved {
            for item in self.mapper().items_for(product) {
                document.append_item(item);
                added += 1;
            }
        }

        self.store.save(&document)?;
        tracing::info!(
            product_id = product.id,
            kind = product.kind_name(),
            removed,
            added,
            "Updated feed"
        );
        Ok(SyncOutcome::Updated { removed, added })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SnapshotCatalog;
    use std::sync::Arc;

    const CATALOG: &str = r#"{
        "currency": "USD",
        "products": [
            {"id": 1, "type": "simple", "status": "publish", "title": "Mug", "price": 10, "in_stock": true},
            {"id": 2, "type": "simple", "status": "draft", "title": "Draft", "price": 10},
            {"id": 10, "type": "variable", "status": "publish", "title": "Shirt",
             "variations": [
                {"id": 11, "type": "variation", "parent_id": 10, "status": "publish", "price": 20},
                {"id": 12, "type": "variation", "parent_id": 10, "status": "publish", "price": 22}
             ]}
        ],
        "other_records": [{"id": 50, "content_type": "page"}]
    }"#;

    fn test_channel() -> Channel {
        Channel {
            title: "MainProductsList".to_string(),
            link: "https://shop.example.com".to_string(),
            description: "MainProductsList".to_string(),
        }
    }

    fn engine(dir: &tempfile::TempDir) -> SyncEngine<Arc<SnapshotCatalog>> {
        let catalog = Arc::new(SnapshotCatalog::from_json(CATALOG).unwrap());
        SyncEngine::new(
            catalog,
            FeedStore::new(dir.path().join("feeds/feed.xml")),
            test_channel(),
            "pa_marca",
        )
    }

    fn ids(engine: &SyncEngine<Arc<SnapshotCatalog>>) -> Vec<String> {
        engine
            .store()
            .load()
            .unwrap()
            .items()
            .map(|i| i.id.clone())
            .collect()
    }

    #[test]
    fn test_first_save_rebuilds_whole_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);

        let outcome = engine.on_saved(1).unwrap();
        assert_eq!(outcome, SyncOutcome::Rebuilt { items: 3 });
        assert_eq!(ids(&engine), vec!["1", "11", "12"]);
    }

    #[test]
    fn test_delete_without_feed_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);

        let outcome = engine.on_before_delete(1).unwrap();
        assert_eq!(outcome, SyncOutcome::Ignored(IgnoreReason::NoFeedToUpdate));
        assert!(!engine.store().exists());
    }

    #[test]
    fn test_ignored_events() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);

        assert_eq!(
            engine.on_saved(50).unwrap(),
            SyncOutcome::Ignored(IgnoreReason::NotAProduct)
        );
        assert_eq!(
            engine.on_saved(11).unwrap(),
            SyncOutcome::Ignored(IgnoreReason::NotAProduct)
        );
        assert_eq!(
            engine.on_saved(404).unwrap(),
            SyncOutcome::Ignored(IgnoreReason::UnresolvableProduct)
        );
        assert_eq!(
            engine.on_before_delete(404).unwrap(),
            SyncOutcome::Ignored(IgnoreReason::UnresolvableProduct)
        );

        engine.catalog().set_available(false);
        assert_eq!(
            engine.on_saved(1).unwrap(),
            SyncOutcome::Ignored(IgnoreReason::CatalogUnavailable)
        );
        assert!(!engine.store().exists());
    }

    #[test]
    fn test_update_moves_item_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        engine.on_saved(1).unwrap();

        let outcome = engine.on_saved(1).unwrap();
        assert_eq!(outcome, SyncOutcome::Updated { removed: 1, added: 1 });
        assert_eq!(ids(&engine), vec!["11", "12", "1"]);
    }

    #[test]
    fn test_unpublish_removes_item() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        engine.on_saved(1).unwrap();

        let mut mug = engine.catalog().product(1).unwrap();
        mug.status = crate::catalog::ProductStatus::Draft;
        engine.catalog().upsert(mug);

        let outcome = engine.on_saved(1).unwrap();
        assert_eq!(outcome, SyncOutcome::Updated { removed: 1, added: 0 });
        assert_eq!(ids(&engine), vec!["11", "12"]);
    }

    #[test]
    fn test_before_delete_variable_removes_all_variations() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        engine.on_saved(1).unwrap();

        let outcome = engine.on_before_delete(10).unwrap();
        assert_eq!(outcome, SyncOutcome::Updated { removed: 2, added: 0 });
        assert_eq!(ids(&engine), vec!["1"]);
    }

    #[test]
    fn test_publishing_draft_adds_it() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        engine.on_saved(1).unwrap();

        let mut draft = engine.catalog().product(2).unwrap();
        draft.status = crate::catalog::ProductStatus::Publish;
        engine.catalog().upsert(draft);

        let outcome = engine.on_saved(2).unwrap();
        assert_eq!(outcome, SyncOutcome::Updated { removed: 0, added: 1 });
        assert_eq!(ids(&engine), vec!["1", "11", "12", "2"]);
    }

    #[test]
    fn test_malformed_feed_aborts_event() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        std::fs::create_dir_all(dir.path().join("feeds")).unwrap();
        std::fs::write(engine.store().path(), "garbage").unwrap();

        let err = engine.on_saved(1).unwrap_err();
        assert!(matches!(err, SyncError::Feed(FeedError::Malformed { .. })));
        assert_eq!(
            std::fs::read_to_string(engine.store().path()).unwrap(),
            "garbage"
        );
    }

    #[test]
    fn test_forced_rebuild_discards_stale_items() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        engine.on_saved(1).unwrap();
        engine.catalog().remove(10);

        assert_eq!(engine.rebuild().unwrap(), SyncOutcome::Rebuilt { items: 1 });
        assert_eq!(ids(&engine), vec!["1"]);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(
            SyncOutcome::Updated { removed: 1, added: 2 }.to_string(),
            "updated feed: 1 removed, 2 added"
        );
        assert_eq!(
            SyncOutcome::Rebuilt { items: 4 }.to_string(),
            "rebuilt feed with 4 items"
        );
    }
}

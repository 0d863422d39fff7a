//! Integration tests for the feed lifecycle: first build, incremental
//! updates, deletions and the rebuild/incremental equivalence.
//!
//! Each test writes its feed into its own temporary directory.

use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;

use shopfeed::catalog::{
    Catalog, CatalogError, ContentType, Product, ProductId, ProductStatus, SnapshotCatalog,
};
use shopfeed::feed::{self, Availability, Channel, FeedStore, Item};
use shopfeed::sync::{IgnoreReason, SyncEngine, SyncOutcome};

const CATALOG: &str = r#"{
    "currency": "BRL",
    "products": [
        {"id": 1, "type": "simple", "status": "publish", "title": "Caneca",
         "description": "Caneca de cerâmica", "permalink": "https://loja.example.com/caneca",
         "image_url": "https://cdn.example.com/caneca.jpg", "categories": ["Casa", "Cozinha"],
         "price": 10, "sku": "CAN-1",
         "attributes": [{"name": "pa_marca", "terms": ["Tramontina"]}]},
        {"id": 2, "type": "simple", "status": "draft", "title": "Rascunho", "price": 99},
        {"id": 3, "type": "simple", "status": "publish", "title": "Brinde", "price": 0},
        {"id": 4, "type": "simple", "status": "publish", "title": "Esgotado", "price": 7.5,
         "in_stock": false},
        {"id": 10, "type": "variable", "status": "publish", "title": "Camiseta",
         "description": "Camiseta de algodão", "categories": ["Roupas"],
         "attributes": [{"name": "pa_marca", "terms": ["Hering"]}],
         "variations": [
            {"id": 11, "type": "variation", "parent_id": 10, "status": "publish",
             "formatted_name": "Camiseta<span>Azul</span><span>M</span>",
             "permalink": "https://loja.example.com/camiseta?v=11", "price": 49.9,
             "variation_attributes": {"pa_marca": "Malwee"}},
            {"id": 12, "type": "variation", "parent_id": 10, "status": "publish",
             "formatted_name": "Camiseta<span>Azul</span><span>G</span>",
             "permalink": "https://loja.example.com/camiseta?v=12", "price": 52}
         ]}
    ],
    "other_records": [{"id": 100, "content_type": "page"}]
}"#;

fn test_channel() -> Channel {
    Channel {
        title: "MainProductsList".to_string(),
        link: "https://loja.example.com".to_string(),
        description: "MainProductsList".to_string(),
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    catalog: Arc<SnapshotCatalog>,
    engine: SyncEngine<Arc<SnapshotCatalog>>,
}

fn fixture(json: &str) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(SnapshotCatalog::from_json(json).unwrap());
    let engine = SyncEngine::new(
        Arc::clone(&catalog),
        FeedStore::new(dir.path().join("uploads/shopping-feeds/g-shopping-feed.xml")),
        test_channel(),
        "pa_marca",
    );
    Fixture {
        _dir: dir,
        catalog,
        engine,
    }
}

fn items_by_id(engine: &SyncEngine<Arc<SnapshotCatalog>>) -> BTreeMap<String, Item> {
    engine
        .store()
        .load()
        .unwrap()
        .items()
        .map(|item| (item.id.clone(), item.clone()))
        .collect()
}

fn feed_ids(engine: &SyncEngine<Arc<SnapshotCatalog>>) -> Vec<String> {
    engine
        .store()
        .load()
        .unwrap()
        .items()
        .map(|item| item.id.clone())
        .collect()
}

// ============================================================================
// First build
// ============================================================================

#[test]
fn test_first_save_creates_feed_with_single_simple_product() {
    let fx = fixture(
        r#"{"currency": "USD", "products": [
            {"id": 1, "type": "simple", "status": "publish", "title": "A", "price": 10, "in_stock": true},
            {"id": 2, "type": "simple", "status": "draft", "title": "B", "price": 10}
        ]}"#,
    );
    assert!(!fx.engine.store().exists());

    fx.engine.on_saved(1).unwrap();

    assert!(fx.engine.store().exists());
    let items = items_by_id(&fx.engine);
    assert_eq!(items.len(), 1);
    let a = &items["1"];
    assert_eq!(a.availability, Availability::InStock);
    assert_eq!(a.price, "10.00 USD");
    assert!(!items.contains_key("2"));
}

#[test]
fn test_first_save_applies_gate_to_whole_catalog() {
    let fx = fixture(CATALOG);

    let outcome = fx.engine.on_saved(4).unwrap();

    assert_eq!(outcome, SyncOutcome::Rebuilt { items: 4 });
    assert_eq!(feed_ids(&fx.engine), vec!["1", "4", "11", "12"]);
}

#[test]
fn test_item_fields_in_written_feed() {
    let fx = fixture(CATALOG);
    fx.engine.on_saved(1).unwrap();
    let items = items_by_id(&fx.engine);

    let mug = &items["1"];
    assert_eq!(mug.title, "Caneca");
    assert_eq!(mug.description, "Caneca de cerâmica");
    assert_eq!(mug.link, "https://loja.example.com/caneca");
    assert_eq!(mug.product_type, "Casa, Cozinha");
    assert_eq!(mug.image_link.as_deref(), Some("https://cdn.example.com/caneca.jpg"));
    assert_eq!(mug.condition, "New");
    assert_eq!(mug.price, "10.00 BRL");
    assert_eq!(mug.brand.as_deref(), Some("Tramontina"));
    assert_eq!(mug.mpn.as_deref(), Some("CAN-1"));

    assert_eq!(items["4"].availability, Availability::OutOfStock);
    assert_eq!(items["4"].price, "7.50 BRL");

    let blue_m = &items["11"];
    assert_eq!(blue_m.title, "Camiseta | Azul | M");
    assert_eq!(blue_m.description, "Camiseta de algodão");
    assert_eq!(blue_m.product_type, "Roupas");
    assert_eq!(blue_m.brand.as_deref(), Some("Malwee"));
    assert_eq!(blue_m.image_link, None);
    assert_eq!(blue_m.price, "49.90 BRL");

    // No variation-level brand: taxonomy terms on the variation itself (none)
    assert_eq!(items["12"].brand, None);
}

#[test]
fn test_written_feed_is_valid_rss() {
    let fx = fixture(CATALOG);
    fx.engine.on_saved(1).unwrap();

    let bytes = std::fs::read(fx.engine.store().path()).unwrap();
    let parsed = feed_rs::parser::parse(bytes.as_slice()).unwrap();
    assert_eq!(parsed.entries.len(), 4);
    assert_eq!(
        parsed.title.map(|t| t.content).as_deref(),
        Some("MainProductsList")
    );

    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains(r#"xmlns:g="http://base.google.com/ns/1.0""#));
    assert!(text.contains("<g:google_product_category/>"));
}

// ============================================================================
// Incremental updates
// ============================================================================

#[test]
fn test_price_drop_to_zero_removes_item() {
    let fx = fixture(CATALOG);
    fx.engine.on_saved(1).unwrap();

    let mut mug = fx.catalog.product(1).unwrap();
    mug.price = Some(0.0);
    fx.catalog.upsert(mug);

    let outcome = fx.engine.on_saved(1).unwrap();
    assert_eq!(outcome, SyncOutcome::Updated { removed: 1, added: 0 });
    assert!(!items_by_id(&fx.engine).contains_key("1"));
}

#[test]
fn test_price_change_rewrites_item_at_end() {
    let fx = fixture(CATALOG);
    fx.engine.on_saved(1).unwrap();

    let mut mug = fx.catalog.product(1).unwrap();
    mug.price = Some(12.9);
    fx.catalog.upsert(mug);
    fx.engine.on_saved(1).unwrap();

    assert_eq!(feed_ids(&fx.engine), vec!["4", "11", "12", "1"]);
    assert_eq!(items_by_id(&fx.engine)["1"].price, "12.90 BRL");
}

#[test]
fn test_variation_disabled_leaves_feed() {
    let fx = fixture(CATALOG);
    fx.engine.on_saved(1).unwrap();

    let mut shirt = fx.catalog.product(10).unwrap();
    if let shopfeed::catalog::ProductKind::Variable { variations } = &mut shirt.kind {
        variations[1].status = ProductStatus::Private;
    }
    fx.catalog.upsert(shirt);

    let outcome = fx.engine.on_saved(10).unwrap();
    assert_eq!(outcome, SyncOutcome::Updated { removed: 2, added: 1 });
    assert_eq!(feed_ids(&fx.engine), vec!["1", "4", "11"]);
}

#[test]
fn test_saving_non_product_leaves_feed_untouched() {
    let fx = fixture(CATALOG);
    fx.engine.on_saved(1).unwrap();
    let before = std::fs::read(fx.engine.store().path()).unwrap();

    assert_eq!(
        fx.engine.on_saved(100).unwrap(),
        SyncOutcome::Ignored(IgnoreReason::NotAProduct)
    );
    assert_eq!(std::fs::read(fx.engine.store().path()).unwrap(), before);
}

// ============================================================================
// Deletion
// ============================================================================

#[test]
fn test_before_delete_removes_item_without_adding() {
    let fx = fixture(CATALOG);
    fx.engine.on_saved(1).unwrap();
    assert!(items_by_id(&fx.engine).contains_key("1"));

    let outcome = fx.engine.on_before_delete(1).unwrap();

    assert_eq!(outcome, SyncOutcome::Updated { removed: 1, added: 0 });
    assert!(!items_by_id(&fx.engine).contains_key("1"));
    assert_eq!(feed_ids(&fx.engine).len(), 3);
}

#[test]
fn test_before_delete_of_absent_item_is_noop() {
    let fx = fixture(CATALOG);
    fx.engine.on_saved(1).unwrap();
    let before = fx.engine.store().load().unwrap();

    let outcome = fx.engine.on_before_delete(2).unwrap();

    assert_eq!(outcome, SyncOutcome::Updated { removed: 0, added: 0 });
    assert_eq!(fx.engine.store().load().unwrap(), before);
}

// ============================================================================
// Existing feeds written by other tools
// ============================================================================

const HAND_EDITED_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss xmlns:g="http://base.google.com/ns/1.0" version="2.0">
  <channel>
    <title>MainProductsList</title>
    <link>https://loja.example.com</link>
    <description>MainProductsList</description>
    <lastBuildDate>Sat, 17 Oct 2026 10:00:00 GMT</lastBuildDate>
    <item>
      <g:id>900</g:id>
      <title><![CDATA[Pré-venda]]></title>
      <g:availability>preorder</g:availability>
      <g:price>120.00 BRL</g:price>
      <g:gtin>7891234567895</g:gtin>
    </item>
  </channel>
</rss>
"#;

#[test]
fn test_save_into_hand_edited_feed_keeps_foreign_content() {
    let fx = fixture(CATALOG);
    let path = fx.engine.store().path().to_path_buf();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, HAND_EDITED_FEED).unwrap();

    let outcome = fx.engine.on_saved(1).unwrap();
    assert_eq!(outcome, SyncOutcome::Updated { removed: 0, added: 1 });
    assert_eq!(feed_ids(&fx.engine), vec!["900", "1"]);

    let items = items_by_id(&fx.engine);
    assert_eq!(
        items["900"].availability,
        Availability::Other("preorder".to_string())
    );

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("<g:availability>preorder</g:availability>"));
    assert!(written.contains("<g:gtin>7891234567895</g:gtin>"));
    assert!(written.contains("<lastBuildDate>Sat, 17 Oct 2026 10:00:00 GMT</lastBuildDate>"));
}

// ============================================================================
// Rebuild ⇔ incremental equivalence
// ============================================================================

#[test]
fn test_rebuild_matches_incremental_replay() {
    let rebuilt = fixture(CATALOG);
    rebuilt.engine.rebuild().unwrap();

    let incremental = fixture(CATALOG);
    incremental
        .engine
        .store()
        .initialize_empty(test_channel())
        .unwrap();
    for id in [10, 4, 3, 2, 1] {
        incremental.engine.on_saved(id).unwrap();
    }

    assert_eq!(items_by_id(&incremental.engine), items_by_id(&rebuilt.engine));
}

#[test]
fn test_gate_consistency_after_mixed_events() {
    let fx = fixture(CATALOG);
    fx.engine.on_saved(1).unwrap();

    let mut draft = fx.catalog.product(2).unwrap();
    draft.status = ProductStatus::Publish;
    fx.catalog.upsert(draft);
    let mut freebie = fx.catalog.product(3).unwrap();
    freebie.price = Some(3.0);
    fx.catalog.upsert(freebie);
    let mut mug = fx.catalog.product(1).unwrap();
    mug.status = ProductStatus::Trash;
    fx.catalog.upsert(mug);

    for id in [2, 3, 1] {
        fx.engine.on_saved(id).unwrap();
    }

    let expected: Vec<String> = fx
        .catalog
        .published_products()
        .iter()
        .filter(|p| feed::qualifies(p))
        .flat_map(feed::feed_ids)
        .collect();
    let mut actual = feed_ids(&fx.engine);
    actual.sort();
    let mut expected = expected;
    expected.sort();
    assert_eq!(actual, expected);
}

// ============================================================================
// Collaborator failures
// ============================================================================

/// Catalog whose records claim to be products but never resolve.
struct BrokenCatalog;

impl Catalog for BrokenCatalog {
    fn is_available(&self) -> bool {
        true
    }

    fn content_type(&self, _id: ProductId) -> Option<ContentType> {
        Some(ContentType::Product)
    }

    fn product(&self, id: ProductId) -> Result<Product, CatalogError> {
        Err(CatalogError::Unresolvable(id))
    }

    fn published_products(&self) -> Vec<Product> {
        Vec::new()
    }

    fn currency(&self) -> String {
        "BRL".to_string()
    }
}

#[test]
fn test_unresolvable_product_is_silent_noop() {
    let dir = tempfile::tempdir().unwrap();
    let engine = SyncEngine::new(
        BrokenCatalog,
        FeedStore::new(dir.path().join("feed.xml")),
        test_channel(),
        "pa_marca",
    );

    assert_eq!(
        engine.on_saved(7).unwrap(),
        SyncOutcome::Ignored(IgnoreReason::UnresolvableProduct)
    );
    assert!(!engine.store().exists());
}

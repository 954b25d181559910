//! End-to-end tests wiring storage, the catalog, a B+Tree index, and the
//! transaction coordinator together the way `database` will — insert,
//! query through an index, update, delete, and roll back a failed write.

use crate::{self as executor, Aggregation, SortDirection, TransactionCoordinator};
use btree::BTreeIndex;
use buffer::PageCache;
use catalog::{Catalog, IndexDescriptor};
use common::{DbError, ExecutionStats};
use expr::{BinaryOp, Node};
use storage::{CollectionStore, PageAccess, Pager};
use tempfile::tempdir;
use types::{Document, Value};

struct Fixture {
    _dir: tempfile::TempDir,
    cache: PageCache,
    catalog: Catalog,
}

fn fixture() -> Fixture {
    let dir = tempdir().unwrap();
    let pager = Pager::create(&dir.path().join("db"), 4096, 0).unwrap();
    let cache = PageCache::new(pager, 64);
    Fixture { _dir: dir, cache, catalog: Catalog::new() }
}

fn doc(pairs: &[(&str, Value)]) -> Document {
    let mut d = Document::new();
    for (k, v) in pairs {
        d.insert(*k, v.clone());
    }
    d
}

fn eq(field: &str, value: Value) -> Node {
    Node::binary(BinaryOp::Equal, Node::member(field), Node::Constant(value))
}

impl Fixture {
    fn new_collection(&mut self, name: &str) -> &mut catalog::CollectionEntry {
        let mut store = CollectionStore::new(self.cache.page_size());
        let root = store.create_chain(&mut self.cache).unwrap();
        let primary = BTreeIndex::create(&mut self.cache, true).unwrap();
        self.catalog.create_collection(name, root, primary.root_page()).unwrap()
    }

    fn attach_index(&mut self, collection: &str, index_name: &str, unique: bool, fields: &[&str]) {
        let btree = BTreeIndex::create(&mut self.cache, unique).unwrap();
        let descriptor = IndexDescriptor::new(
            index_name,
            unique,
            fields.iter().map(|f| f.to_string()).collect(),
            btree.root_page(),
        );
        self.catalog.collection_mut(collection).unwrap().indexes.push(descriptor);
    }
}

#[test]
fn insert_then_full_scan_round_trips_documents() {
    let mut f = fixture();
    f.new_collection("widgets");

    let mut stats = ExecutionStats::default();
    let mut coordinator = TransactionCoordinator::new(&mut f.cache, None);
    coordinator
        .run(|cache| {
            let collection = f.catalog.collection_mut("widgets").unwrap();
            executor::insert(cache, collection, doc(&[("name", Value::String("bolt".into()))]))?;
            executor::insert(cache, collection, doc(&[("name", Value::String("nut".into()))]))
        })
        .unwrap();

    let collection = f.catalog.collection("widgets").unwrap();
    let results = executor::query(&mut f.cache, collection, None, &mut stats).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(stats.documents_scanned, 2);
}

#[test]
fn query_through_a_secondary_index_only_scans_the_match() {
    let mut f = fixture();
    f.new_collection("widgets");
    f.attach_index("widgets", "by_sku", true, &["sku"]);

    let mut coordinator = TransactionCoordinator::new(&mut f.cache, None);
    coordinator
        .run(|cache| {
            let collection = f.catalog.collection_mut("widgets").unwrap();
            executor::insert(cache, collection, doc(&[("sku", Value::String("A1".into()))]))?;
            executor::insert(cache, collection, doc(&[("sku", Value::String("B2".into()))]))
        })
        .unwrap();

    let collection = f.catalog.collection("widgets").unwrap();
    let mut stats = ExecutionStats::default();
    let predicate = eq("sku", Value::String("B2".into()));
    let results = executor::query(&mut f.cache, collection, Some(&predicate), &mut stats).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].get("sku"), Some(&Value::String("B2".into())));
}

#[test]
fn unique_index_violation_rolls_back_the_document_insert() {
    let mut f = fixture();
    f.new_collection("widgets");
    f.attach_index("widgets", "by_sku", true, &["sku"]);

    let mut coordinator = TransactionCoordinator::new(&mut f.cache, None);
    coordinator
        .run(|cache| {
            let collection = f.catalog.collection_mut("widgets").unwrap();
            executor::insert(cache, collection, doc(&[("sku", Value::String("A1".into()))]))
        })
        .unwrap();

    let result: common::DbResult<_> = coordinator.run(|cache| {
        let collection = f.catalog.collection_mut("widgets").unwrap();
        executor::insert(cache, collection, doc(&[("sku", Value::String("A1".into()))]))
    });
    assert!(result.is_err());

    let collection = f.catalog.collection("widgets").unwrap();
    let mut stats = ExecutionStats::default();
    let all = executor::query(&mut f.cache, collection, None, &mut stats).unwrap();
    assert_eq!(all.len(), 1, "the duplicate insert must not have left an orphaned document behind");
}

#[test]
fn update_moves_the_index_entry_to_the_new_key() {
    let mut f = fixture();
    f.new_collection("widgets");
    f.attach_index("widgets", "by_sku", false, &["sku"]);

    let mut coordinator = TransactionCoordinator::new(&mut f.cache, None);
    let id = coordinator
        .run(|cache| {
            let collection = f.catalog.collection_mut("widgets").unwrap();
            executor::insert(cache, collection, doc(&[("sku", Value::String("A1".into()))]))
        })
        .unwrap();

    coordinator
        .run(|cache| {
            let collection = f.catalog.collection_mut("widgets").unwrap();
            executor::update(cache, collection, id, doc(&[("sku", Value::String("Z9".into()))]))
        })
        .unwrap();

    let collection = f.catalog.collection("widgets").unwrap();
    let mut stats = ExecutionStats::default();
    let old_key = eq("sku", Value::String("A1".into()));
    let new_key = eq("sku", Value::String("Z9".into()));
    assert!(executor::query(&mut f.cache, collection, Some(&old_key), &mut stats).unwrap().is_empty());
    assert_eq!(executor::query(&mut f.cache, collection, Some(&new_key), &mut stats).unwrap().len(), 1);
}

#[test]
fn delete_removes_both_the_document_and_its_index_entry() {
    let mut f = fixture();
    f.new_collection("widgets");
    f.attach_index("widgets", "by_sku", false, &["sku"]);

    let mut coordinator = TransactionCoordinator::new(&mut f.cache, None);
    let id = coordinator
        .run(|cache| {
            let collection = f.catalog.collection_mut("widgets").unwrap();
            executor::insert(cache, collection, doc(&[("sku", Value::String("A1".into()))]))
        })
        .unwrap();

    coordinator
        .run(|cache| {
            let collection = f.catalog.collection_mut("widgets").unwrap();
            executor::delete(cache, collection, id)
        })
        .unwrap();

    let collection = f.catalog.collection("widgets").unwrap();
    let mut stats = ExecutionStats::default();
    let results = executor::query(&mut f.cache, collection, None, &mut stats).unwrap();
    assert!(results.is_empty());
}

#[test]
fn failed_transaction_leaves_storage_untouched() {
    let mut f = fixture();
    f.new_collection("widgets");

    let mut coordinator = TransactionCoordinator::new(&mut f.cache, None);
    let result: common::DbResult<_> = coordinator.run(|cache| {
        let collection = f.catalog.collection_mut("widgets").unwrap();
        executor::insert(cache, collection, doc(&[("name", Value::String("bolt".into()))]))?;
        Err(DbError::BadArgument("simulated mid-transaction failure".into()))
    });
    assert!(result.is_err());

    let collection = f.catalog.collection("widgets").unwrap();
    let mut stats = ExecutionStats::default();
    let results = executor::query(&mut f.cache, collection, None, &mut stats).unwrap();
    assert!(results.is_empty());
}

#[test]
fn primary_key_lookup_resolves_through_the_implicit_id_index() {
    let mut f = fixture();
    f.new_collection("widgets");

    let mut coordinator = TransactionCoordinator::new(&mut f.cache, None);
    coordinator
        .run(|cache| {
            let collection = f.catalog.collection_mut("widgets").unwrap();
            executor::insert(cache, collection, doc(&[("_id", Value::Int64(1)), ("name", Value::String("bolt".into()))]))?;
            executor::insert(cache, collection, doc(&[("_id", Value::Int64(2)), ("name", Value::String("nut".into()))]))?;
            executor::insert(cache, collection, doc(&[("_id", Value::Int64(3)), ("name", Value::String("washer".into()))]))
        })
        .unwrap();

    let collection = f.catalog.collection("widgets").unwrap();
    let mut stats = ExecutionStats::default();
    let predicate = eq("_id", Value::Int64(2));
    let results = executor::query(&mut f.cache, collection, Some(&predicate), &mut stats).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].get("name"), Some(&Value::String("nut".into())));

    let missing = eq("_id", Value::Int64(999));
    let results = executor::query(&mut f.cache, collection, Some(&missing), &mut stats).unwrap();
    assert!(results.is_empty(), "a primary-key miss must not fall back to scanning the rest of the collection");
}

#[test]
fn relocating_update_still_repoints_every_index_entry() {
    let mut f = fixture();
    f.new_collection("widgets");
    f.attach_index("widgets", "by_name", false, &["name"]);

    let mut coordinator = TransactionCoordinator::new(&mut f.cache, None);
    let id = coordinator
        .run(|cache| {
            let collection = f.catalog.collection_mut("widgets").unwrap();
            executor::insert(cache, collection, doc(&[("name", Value::String("bolt".into()))]))
        })
        .unwrap();

    // A much larger document for the same key no longer fits in the
    // original slot, forcing `CollectionStore::update` to relocate it to a
    // brand-new `DocumentId` even though the indexed field didn't change.
    let filler = Value::String("x".repeat(4000));
    let new_id = coordinator
        .run(|cache| {
            let collection = f.catalog.collection_mut("widgets").unwrap();
            executor::update(
                cache,
                collection,
                id,
                doc(&[("name", Value::String("bolt".into())), ("filler", filler.clone())]),
            )
        })
        .unwrap();
    assert_ne!(new_id, id, "the larger document no longer fits in its original slot");

    let collection = f.catalog.collection("widgets").unwrap();
    let mut stats = ExecutionStats::default();
    let predicate = eq("name", Value::String("bolt".into()));
    let results = executor::query(&mut f.cache, collection, Some(&predicate), &mut stats).unwrap();
    assert_eq!(results.len(), 1, "the index entry must follow the document to its relocated id, not a deleted one");
    assert_eq!(results[0].get("filler"), Some(&filler));

    let by_id = eq("_id", results[0].get("_id").unwrap().clone());
    let results = executor::query(&mut f.cache, collection, Some(&by_id), &mut stats).unwrap();
    assert_eq!(results.len(), 1, "the primary index must also follow the relocation");
}

#[test]
fn pipeline_aggregation_over_a_query_result() {
    let mut f = fixture();
    f.new_collection("orders");

    let mut coordinator = TransactionCoordinator::new(&mut f.cache, None);
    coordinator
        .run(|cache| {
            let collection = f.catalog.collection_mut("orders").unwrap();
            executor::insert(cache, collection, doc(&[("total", Value::Int64(10))]))?;
            executor::insert(cache, collection, doc(&[("total", Value::Int64(25))]))
        })
        .unwrap();

    let collection = f.catalog.collection("orders").unwrap();
    let mut stats = ExecutionStats::default();
    let documents = executor::query(&mut f.cache, collection, None, &mut stats).unwrap();
    let pipeline = crate::Pipeline::new(documents);
    let sum = pipeline.aggregate(Aggregation::Sum, Some(&Node::member("total"))).unwrap();
    assert_eq!(sum, Value::Double(35.0));
}

#[test]
fn pipeline_order_by_and_take_compose_after_a_query() {
    let mut f = fixture();
    f.new_collection("orders");

    let mut coordinator = TransactionCoordinator::new(&mut f.cache, None);
    coordinator
        .run(|cache| {
            let collection = f.catalog.collection_mut("orders").unwrap();
            executor::insert(cache, collection, doc(&[("total", Value::Int64(30))]))?;
            executor::insert(cache, collection, doc(&[("total", Value::Int64(10))]))?;
            executor::insert(cache, collection, doc(&[("total", Value::Int64(20))]))
        })
        .unwrap();

    let collection = f.catalog.collection("orders").unwrap();
    let mut stats = ExecutionStats::default();
    let documents = executor::query(&mut f.cache, collection, None, &mut stats).unwrap();
    let ordered = crate::Pipeline::new(documents)
        .order_by(&[(Node::member("total"), SortDirection::Ascending)])
        .unwrap()
        .take(2)
        .into_documents();
    assert_eq!(ordered.len(), 2);
    assert_eq!(ordered[0].get("total"), Some(&Value::Int64(10)));
    assert_eq!(ordered[1].get("total"), Some(&Value::Int64(20)));
}

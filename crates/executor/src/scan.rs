//! Drives a [`planner::ExecutionPlan`] against storage, yielding the
//! documents an access path produces before the pipeline's residual
//! filter (if any) runs over them (spec §4.8/§4.9).

use btree::BTreeIndex;
use catalog::CollectionEntry;
use common::{DbResult, ExecutionStats};
use planner::{Comparison, ExecutionPlan, IndexScanKey, Strategy};
use storage::{CollectionStore, PageAccess};
use types::{Document, Value};

pub fn execute_plan(
    pa: &mut impl PageAccess,
    collection: &CollectionEntry,
    plan: &ExecutionPlan,
    stats: &mut ExecutionStats,
) -> DbResult<Vec<Document>> {
    let store = CollectionStore::new(pa.page_size());
    let documents = match plan.strategy {
        Strategy::FullTableScan => store
            .scan(pa, collection.root_page)?
            .into_iter()
            .map(|(_, doc)| doc)
            .collect(),
        Strategy::PrimaryKeyLookup => {
            let primary = BTreeIndex::open(collection.primary_root, pa.page_size(), true);
            let composite = vec![plan.keys[0].value.clone()];
            let mut docs = Vec::new();
            for id in primary.find_exact(pa, &composite)? {
                docs.push(store.get(pa, id)?);
            }
            docs
        }
        Strategy::IndexScan => {
            let index_name = plan
                .index_ref
                .as_deref()
                .expect("IndexScan plans always carry an index_ref");
            let descriptor = collection.index(index_name)?;
            let index = BTreeIndex::open(descriptor.root_page, pa.page_size(), descriptor.unique);
            let ids = scan_index(pa, &index, &plan.keys)?;
            let mut docs = Vec::with_capacity(ids.len());
            for id in ids {
                docs.push(store.get(pa, id)?);
            }
            // The B+Tree's whole-tuple ordering can only bound a composite
            // range loosely when a prefix of equality keys precedes the
            // range atom (see range_bounds); re-check every key exactly so
            // a loose bound never leaks a false positive into the pipeline.
            docs.retain(|doc| plan.keys.iter().all(|key| key_holds(doc, key)));
            docs
        }
    };

    stats.documents_scanned += documents.len() as u64;
    Ok(documents)
}

fn scan_index(
    pa: &mut impl PageAccess,
    index: &BTreeIndex,
    keys: &[IndexScanKey],
) -> DbResult<Vec<common::DocumentId>> {
    if keys.iter().all(|k| k.comparison == Comparison::Equal) {
        let composite: Vec<Value> = keys.iter().map(|k| k.value.clone()).collect();
        return index.find_exact(pa, &composite);
    }

    let (low, inclusive_low, high, inclusive_high) = range_bounds(keys);
    index.range_scan(pa, low.as_ref(), high.as_ref(), inclusive_low, inclusive_high)
}

/// Build a best-effort `(low, inclusive_low, high, inclusive_high)` bound
/// for a prefix of equality keys optionally closed off by one trailing
/// range atom. A bare prefix (no extra element) always sorts before any
/// key that extends it, since `Vec<Value>`'s lexicographic order treats a
/// strict prefix as less than its extensions — that fact is what lets a
/// partial-prefix scan stay within its own equality group without an
/// explicit upper sentinel.
fn range_bounds(keys: &[IndexScanKey]) -> (Option<Vec<Value>>, bool, Option<Vec<Value>>, bool) {
    let prefix: Vec<Value> = keys
        .iter()
        .take_while(|k| k.comparison == Comparison::Equal)
        .map(|k| k.value.clone())
        .collect();

    let Some(tail) = keys.get(prefix.len()) else {
        return (Some(prefix.clone()), true, None, false);
    };

    let mut with_tail = prefix.clone();
    with_tail.push(tail.value.clone());

    match tail.comparison {
        Comparison::Greater => (Some(with_tail), false, Some(prefix), false),
        Comparison::GreaterEq => (Some(with_tail), true, Some(prefix), false),
        Comparison::Less => (Some(prefix), true, Some(with_tail), false),
        Comparison::LessEq => (Some(prefix), true, Some(with_tail), true),
        Comparison::Equal => unreachable!("equality atoms are consumed into the prefix"),
    }
}

fn key_holds(doc: &Document, key: &IndexScanKey) -> bool {
    let Some((_, actual)) = doc.get_ci(&key.field) else {
        return false;
    };
    match key.comparison {
        Comparison::Equal => actual == &key.value,
        Comparison::Less => actual < &key.value,
        Comparison::LessEq => actual <= &key.value,
        Comparison::Greater => actual > &key.value,
        Comparison::GreaterEq => actual >= &key.value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planner::Comparison as Cmp;

    fn key(field: &str, comparison: Cmp, value: Value) -> IndexScanKey {
        IndexScanKey { field: field.to_string(), comparison, value }
    }

    #[test]
    fn pure_equality_prefix_has_no_upper_bound() {
        let keys = vec![key("status", Cmp::Equal, Value::String("a".into()))];
        let (low, inc_low, high, inc_high) = range_bounds(&keys);
        assert_eq!(low, Some(vec![Value::String("a".into())]));
        assert!(inc_low);
        assert_eq!(high, None);
        assert!(!inc_high);
    }

    #[test]
    fn trailing_greater_eq_closes_off_the_prefix_group() {
        let keys = vec![
            key("status", Cmp::Equal, Value::String("a".into())),
            key("amount", Cmp::GreaterEq, Value::Int64(100)),
        ];
        let (low, inc_low, high, inc_high) = range_bounds(&keys);
        assert_eq!(low, Some(vec![Value::String("a".into()), Value::Int64(100)]));
        assert!(inc_low);
        assert_eq!(high, Some(vec![Value::String("a".into())]));
        assert!(!inc_high);
    }
}

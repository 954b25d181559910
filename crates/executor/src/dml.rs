//! Collection mutation: insert, update, delete, each keeping every
//! attached index in sync with the document store (spec §4.5's closing
//! paragraph — "index maintenance is never optional, it runs inside the
//! same transaction as the write it accompanies").

use btree::{key_for_fields, BTreeIndex};
use catalog::{CollectionEntry, IdKind};
use common::{DbError, DbResult, DocumentId};
use storage::{CollectionStore, PageAccess};
use types::{Document, ObjectId, Value};

/// Assign `_id` if the caller didn't supply one, according to the
/// collection's fixed id kind, then insert the document, its entry in the
/// implicit primary `_id` index, and every secondary index entry it needs.
pub fn insert(pa: &mut impl PageAccess, collection: &mut CollectionEntry, mut doc: Document) -> DbResult<DocumentId> {
    if !doc.contains_key(&collection.id_field_name) {
        let generated = match collection.id_kind {
            IdKind::ObjectId => Value::ObjectId(ObjectId::new()),
            IdKind::Int32 => Value::Int32(collection.next_sequence() as i32),
            IdKind::Int64 => Value::Int64(collection.next_sequence() as i64),
            IdKind::String => {
                return Err(DbError::BadArgument(format!(
                    "collection '{}' requires an explicit string _id",
                    collection.name
                )))
            }
        };
        doc.insert(collection.id_field_name.clone(), generated);
    }

    let mut store = CollectionStore::new(pa.page_size());
    let id = store.insert(pa, collection.root_page, &doc)?;

    let primary_key = key_for_fields(&doc, std::slice::from_ref(&collection.id_field_name));
    let mut primary = BTreeIndex::open(collection.primary_root, pa.page_size(), true);
    match primary.insert(pa, primary_key.clone(), id) {
        Ok(()) => collection.primary_root = primary.root_page(),
        Err(e) => {
            // Roll the document itself back out before surfacing the
            // failure, so a unique-index violation never leaves an
            // orphaned, unindexed document behind.
            store.delete(pa, id)?;
            return Err(e);
        }
    }

    for i in 0..collection.indexes.len() {
        let index = &collection.indexes[i];
        let key = key_for_fields(&doc, &index.fields);
        let mut btree = BTreeIndex::open(index.root_page, pa.page_size(), index.unique);
        match btree.insert(pa, key, id) {
            Ok(()) => collection.indexes[i].root_page = btree.root_page(),
            Err(e) => {
                let mut primary = BTreeIndex::open(collection.primary_root, pa.page_size(), true);
                primary.remove(pa, &primary_key, id)?;
                collection.primary_root = primary.root_page();
                store.delete(pa, id)?;
                return Err(e);
            }
        }
    }

    Ok(id)
}

/// Replace the document at `id` with `new_doc`, then bring every index —
/// the implicit primary `_id` index and every attached secondary index —
/// in line with whatever `store.update` actually did. The document's
/// physical [`DocumentId`] can change even when none of its indexed fields
/// did, whenever the new encoding no longer fits in its old slot; every
/// index entry still pointing at the old id has to move to the new one,
/// not just the ones whose key changed.
pub fn update(
    pa: &mut impl PageAccess,
    collection: &mut CollectionEntry,
    id: DocumentId,
    new_doc: Document,
) -> DbResult<DocumentId> {
    let mut store = CollectionStore::new(pa.page_size());
    let old_doc = store.get(pa, id)?;
    let new_id = store.update(pa, collection.root_page, id, &new_doc)?;

    let old_primary_key = key_for_fields(&old_doc, std::slice::from_ref(&collection.id_field_name));
    let new_primary_key = key_for_fields(&new_doc, std::slice::from_ref(&collection.id_field_name));
    if old_primary_key != new_primary_key || new_id != id {
        let mut primary = BTreeIndex::open(collection.primary_root, pa.page_size(), true);
        primary.remove(pa, &old_primary_key, id)?;
        primary.insert(pa, new_primary_key, new_id)?;
        collection.primary_root = primary.root_page();
    }

    for i in 0..collection.indexes.len() {
        let index = &collection.indexes[i];
        let old_key = key_for_fields(&old_doc, &index.fields);
        let new_key = key_for_fields(&new_doc, &index.fields);
        if old_key == new_key && new_id == id {
            continue;
        }
        let mut btree = BTreeIndex::open(index.root_page, pa.page_size(), index.unique);
        btree.remove(pa, &old_key, id)?;
        btree.insert(pa, new_key, new_id)?;
        collection.indexes[i].root_page = btree.root_page();
    }

    Ok(new_id)
}

/// Remove the document at `id` along with its primary-index entry and
/// every secondary index entry pointing to it.
pub fn delete(pa: &mut impl PageAccess, collection: &mut CollectionEntry, id: DocumentId) -> DbResult<()> {
    let mut store = CollectionStore::new(pa.page_size());
    let doc = store.get(pa, id)?;

    let primary_key = key_for_fields(&doc, std::slice::from_ref(&collection.id_field_name));
    let mut primary = BTreeIndex::open(collection.primary_root, pa.page_size(), true);
    primary.remove(pa, &primary_key, id)?;
    collection.primary_root = primary.root_page();

    for i in 0..collection.indexes.len() {
        let index = &collection.indexes[i];
        let key = key_for_fields(&doc, &index.fields);
        let mut btree = BTreeIndex::open(index.root_page, pa.page_size(), index.unique);
        btree.remove(pa, &key, id)?;
        collection.indexes[i].root_page = btree.root_page();
    }

    store.delete(pa, id)
}

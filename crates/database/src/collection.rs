//! Typed document CRUD and the query entry points (spec §2) for one
//! registered collection.

use crate::{Database, Query};
use common::{DbResult, DocumentId, ExecutionStats};
use expr::Node;
use storage::{CollectionStore, PageAccess};
use types::Document;

/// A handle onto one collection, borrowed from its owning [`Database`].
/// Cheap to clone — it's just a name and a reference back to the database.
#[derive(Clone)]
pub struct Collection<'db> {
    db: &'db Database,
    name: String,
}

impl<'db> Collection<'db> {
    pub(crate) fn new(db: &'db Database, name: String) -> Self {
        Self { db, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert `doc`, assigning `_id` if the caller didn't supply one, and
    /// keeping every attached index in sync in the same transaction.
    pub fn insert(&self, doc: Document) -> DbResult<DocumentId> {
        self.db.transaction(|cache| {
            let mut catalog = self.db.catalog_write();
            let entry = catalog.collection_mut(&self.name)?;
            executor::insert(cache, entry, doc)
        })
    }

    /// Replace the document at `id`, updating every index whose key changed.
    pub fn update(&self, id: DocumentId, doc: Document) -> DbResult<DocumentId> {
        self.db.transaction(|cache| {
            let mut catalog = self.db.catalog_write();
            let entry = catalog.collection_mut(&self.name)?;
            executor::update(cache, entry, id, doc)
        })
    }

    /// Remove the document at `id` along with every index entry pointing
    /// to it.
    pub fn delete(&self, id: DocumentId) -> DbResult<()> {
        self.db.transaction(|cache| {
            let mut catalog = self.db.catalog_write();
            let entry = catalog.collection_mut(&self.name)?;
            executor::delete(cache, entry, id)
        })
    }

    /// Fetch a single document by its physical id directly, bypassing the
    /// planner — the id is already exact.
    pub fn get(&self, id: DocumentId) -> DbResult<Document> {
        let mut cache = self.db.cache_lock();
        let store = CollectionStore::new(cache.page_size());
        store.get(&mut *cache, id)
    }

    /// Build an index over `fields`, backfilling existing documents.
    pub fn ensure_index(&self, index_name: &str, fields: &[&str], unique: bool) -> DbResult<()> {
        self.db.ensure_index(&self.name, index_name, fields, unique)
    }

    /// Run `predicate` (or a full scan if `None`) through the planner and
    /// return every surviving document, discarding execution statistics.
    pub fn find(&self, predicate: Option<&Node>) -> DbResult<Vec<Document>> {
        Ok(self.find_with_stats(predicate)?.0)
    }

    /// As [`find`](Self::find), but also returns the [`ExecutionStats`] the
    /// access path and pipeline recorded.
    pub fn find_with_stats(&self, predicate: Option<&Node>) -> DbResult<(Vec<Document>, ExecutionStats)> {
        let catalog = self.db.catalog_read();
        let entry = catalog.collection(&self.name)?;
        let mut cache = self.db.cache_lock();
        let mut stats = ExecutionStats::default();
        let docs = executor::query(&mut *cache, entry, predicate, &mut stats)?;
        Ok((docs, stats))
    }

    /// Start a composable [`Query`]: filter, order, skip/take, distinct,
    /// group-by, and aggregation chained over this collection's documents.
    pub fn query(&self) -> Query<'db> {
        Query::new(self.clone())
    }
}

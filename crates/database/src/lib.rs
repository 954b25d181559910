//! Top-level control flow (spec §2): [`Database`] opens or creates the
//! paged file, journal, and catalog; [`Collection`] wires the planner and
//! executor into typed document CRUD, index management, and the query
//! entry points built on [`Query`].
//!
//! ```text
//! read:  Query -> Planner -> (IndexScan | PrimaryKeyLookup | FullScan) -> Pipeline -> caller
//! write: Transaction -> Collection Store + Index Manager (cache) -> Journal append -> Commit
//! ```

mod collection;
mod query;


pub use collection::Collection;
pub use query::Query;

use buffer::PageCache;
use catalog::{Catalog, IndexDescriptor};
use common::{Config, DbResult};
use journal::Journal;
use parking_lot::{Mutex, RwLock};
use std::fs;
use storage::{CollectionStore, PageAccess, Pager};
use tracing::info;

/// A single-file embedded document database.
///
/// Concurrency follows spec §5: one coarse-grained writer lock serializes
/// begin-to-commit for every write transaction — an explicit
/// [`Database::transaction`] call, or the implicit single-statement
/// transaction each [`Collection`] write method opens on its own — while
/// reads only take the shorter-lived cache/catalog locks their access path
/// actually touches, so they never queue behind an in-flight write's own
/// query planning.
pub struct Database {
    config: Config,
    write_lock: Mutex<()>,
    cache: Mutex<PageCache>,
    journal: Mutex<Option<Journal>>,
    catalog: RwLock<Catalog>,
}

impl Database {
    /// Open the database file named by `config`, creating it (and its
    /// directory) if it doesn't exist yet. Replays the journal before the
    /// catalog loads, so a crash mid-transaction is invisible by the time
    /// the first collection handle is issued.
    pub fn open(config: Config) -> DbResult<Self> {
        fs::create_dir_all(&config.data_dir)?;
        let path = config.database_path();
        let journal_path = config.journal_path();

        let mut pager = if path.exists() {
            Pager::open(&path)?
        } else {
            Pager::create(&path, config.page_size, now_micros())?
        };

        if config.enable_journaling {
            journal::recover(&journal_path, &mut pager)?;
        }

        let catalog_root = pager.catalog_root()?;
        let catalog = Catalog::load(&mut pager, catalog_root)?;

        let journal = if config.enable_journaling {
            Some(Journal::open(&journal_path)?)
        } else {
            None
        };

        info!(
            path = %path.display(),
            collections = catalog.collections().count(),
            journaling = config.enable_journaling,
            "opened database"
        );

        Ok(Self {
            cache: Mutex::new(PageCache::new(pager, config.cache_size)),
            journal: Mutex::new(journal),
            catalog: RwLock::new(catalog),
            write_lock: Mutex::new(()),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `body` as a single write transaction (spec §4.10): the page
    /// cache (and journal, when enabled) commits on success and every
    /// dirty page rolls back on failure. Every [`Collection`] write method
    /// is one of these with a single statement inside it.
    pub fn transaction<T>(&self, body: impl FnOnce(&mut PageCache) -> DbResult<T>) -> DbResult<T> {
        let _write_guard = self.write_lock.lock();
        let mut cache = self.cache.lock();
        let mut journal = self.journal.lock();
        let mut coordinator = executor::TransactionCoordinator::new(&mut cache, journal.as_mut());
        coordinator.run(body)
    }

    pub(crate) fn catalog_read(&self) -> parking_lot::RwLockReadGuard<'_, Catalog> {
        self.catalog.read()
    }

    pub(crate) fn catalog_write(&self) -> parking_lot::RwLockWriteGuard<'_, Catalog> {
        self.catalog.write()
    }

    pub(crate) fn cache_lock(&self) -> parking_lot::MutexGuard<'_, PageCache> {
        self.cache.lock()
    }

    /// Register a new, empty collection with an auto-generated `ObjectId`
    /// `_id` field (the default `catalog::IdKind`; change it via
    /// [`CollectionEntry`](catalog::CollectionEntry) fields after creation
    /// for an integer or string identity).
    pub fn create_collection(&self, name: &str) -> DbResult<()> {
        self.transaction(|cache| {
            let mut store = CollectionStore::new(cache.page_size());
            let root = store.create_chain(cache)?;
            let primary = btree::BTreeIndex::create(cache, true)?;
            let mut catalog = self.catalog.write();
            catalog.create_collection(name, root, primary.root_page())?;
            self.persist_catalog(cache, &catalog)
        })
    }

    /// Build a secondary index over `fields`, backfilling every document
    /// already in the collection. A no-op if an index by this name already
    /// exists.
    pub fn ensure_index(&self, collection_name: &str, index_name: &str, fields: &[&str], unique: bool) -> DbResult<()> {
        self.transaction(|cache| {
            if self.catalog.read().collection(collection_name)?.has_index(index_name) {
                return Ok(());
            }

            let mut index = btree::BTreeIndex::create(cache, unique)?;
            let field_names: Vec<String> = fields.iter().map(|f| f.to_string()).collect();

            let mut catalog = self.catalog.write();
            let root_page = catalog.collection(collection_name)?.root_page;
            let store = CollectionStore::new(cache.page_size());
            for (id, doc) in store.scan(cache, root_page)? {
                let key = btree::key_for_fields(&doc, &field_names);
                index.insert(cache, key, id)?;
            }

            let descriptor = IndexDescriptor::new(index_name, unique, field_names, index.root_page());
            catalog.collection_mut(collection_name)?.indexes.push(descriptor);
            self.persist_catalog(cache, &catalog)
        })
    }

    /// Borrow a handle for typed CRUD and queries against `name`. Fails if
    /// no such collection has been created.
    pub fn collection(&self, name: &str) -> DbResult<Collection<'_>> {
        self.catalog.read().collection(name)?;
        Ok(Collection::new(self, name.to_string()))
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.catalog.read().collections().map(|c| c.name.clone()).collect()
    }

    fn persist_catalog(&self, cache: &mut PageCache, catalog: &Catalog) -> DbResult<()> {
        let root = cache.catalog_root()?;
        let new_root = catalog.save(cache, root)?;
        if new_root != root {
            cache.set_catalog_root(new_root)?;
        }
        Ok(())
    }
}

fn now_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

//! Page Cache: a bounded LRU buffer pool sitting in front of the pager.
//!
//! Correctness must survive a cold cache (spec §4.2) — this layer exists
//! purely to avoid redundant disk I/O, never to hold state the rest of the
//! system depends on surviving a restart.


use common::{DbError, DbResult, PageId};
use hashbrown::{HashMap, HashSet};
use lru::LruCache;
use std::num::NonZeroUsize;
use storage::{Page, PageAccess, Pager};

/// LRU-bounded cache of pages backed by a [`Pager`]. Implements
/// [`PageAccess`] itself so the Collection Store, catalog, and B+Tree code
/// written against that trait run unmodified whether or not caching sits in
/// front of the pager.
pub struct PageCache {
    pager: Pager,
    capacity: NonZeroUsize,
    cache: LruCache<PageId, Page>,
    dirty: HashSet<PageId>,
    /// Pre-dirty snapshot of each page touched since the last flush, kept
    /// so the journal can frame a before-image the first time a page is
    /// dirtied within a transaction (spec §4.3).
    before_images: HashMap<PageId, Vec<u8>>,
}

impl PageCache {
    pub fn new(pager: Pager, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            pager,
            capacity,
            // Unbounded: `capacity` is a soft target this cache enforces
            // itself by evicting clean pages, not a hard cap the `lru` crate
            // enforces on our behalf — the latter would silently evict
            // whatever's least-recently-used, dirty or not, the moment a
            // `put` pushed us over it.
            cache: LruCache::unbounded(),
            dirty: HashSet::new(),
            before_images: HashMap::new(),
        }
    }

    pub fn into_pager(self) -> Pager {
        self.pager
    }

    /// Drain the before-images recorded since the last flush. The
    /// Transaction Coordinator calls this to build journal frames.
    pub fn take_before_images(&mut self) -> Vec<(PageId, Vec<u8>)> {
        self.before_images.drain().collect()
    }

    /// Discard every dirty page (and its before-image) without writing it
    /// through to the pager. The next `get` re-reads from disk, which is
    /// how `rollback` undoes an in-flight transaction's writes.
    pub fn discard_dirty(&mut self) {
        for id in self.dirty.drain() {
            self.cache.pop(&id);
        }
        self.before_images.clear();
    }

    /// Reclaim one slot by evicting the least-recently-used *clean* page.
    /// A dirty page is never written out here — only `flush_all_dirty`
    /// (driven by the transaction coordinator, spec §4.2/§4.3) is allowed to
    /// persist it, so it always has a journal frame before it reaches disk.
    /// If every resident page is dirty, the cache grows past `capacity`
    /// rather than lose that guarantee; it shrinks back down the next time a
    /// transaction flushes or rolls back.
    fn evict_if_full(&mut self) -> DbResult<()> {
        if self.cache.len() < self.capacity.get() {
            return Ok(());
        }
        let mut held_back = Vec::new();
        while let Some((id, page)) = self.cache.pop_lru() {
            if self.dirty.contains(&id) {
                held_back.push((id, page));
                continue;
            }
            self.before_images.remove(&id);
            break;
        }
        for (id, page) in held_back.into_iter().rev() {
            self.cache.put(id, page);
        }
        Ok(())
    }
}

impl PageAccess for PageCache {
    fn get(&mut self, id: PageId) -> DbResult<Page> {
        if let Some(page) = self.cache.get(&id) {
            return Ok(page.clone());
        }
        let page = self.pager.get(id)?;
        self.evict_if_full()?;
        self.cache.put(id, page.clone());
        Ok(page)
    }

    fn put(&mut self, page: Page) -> DbResult<()> {
        let id = page.id;
        if !self.dirty.contains(&id) {
            let before = self.get(id)?;
            self.before_images.insert(id, before.data);
        }
        self.evict_if_full()?;
        self.cache.put(id, page);
        self.dirty.insert(id);
        Ok(())
    }

    fn allocate_page(&mut self) -> DbResult<PageId> {
        let id = self.pager.allocate_page()?;
        let page = self.pager.get(id)?;
        self.evict_if_full()?;
        self.cache.put(id, page);
        Ok(id)
    }

    fn free_page(&mut self, id: PageId) -> DbResult<()> {
        self.cache.pop(&id);
        self.dirty.remove(&id);
        self.before_images.remove(&id);
        self.pager.free_page(id)
    }

    fn flush_all_dirty(&mut self) -> DbResult<()> {
        let ids: Vec<PageId> = self.dirty.iter().copied().collect();
        for id in ids {
            let page = self
                .cache
                .peek(&id)
                .cloned()
                .ok_or_else(|| DbError::CorruptDatabase(format!("dirty page {} missing from cache", id.0)))?;
            self.pager.put(page)?;
        }
        self.dirty.clear();
        self.before_images.clear();
        Ok(())
    }

    fn page_size(&self) -> u32 {
        self.pager.page_size()
    }

    fn catalog_root(&mut self) -> DbResult<PageId> {
        self.pager.catalog_root()
    }

    fn set_catalog_root(&mut self, id: PageId) -> DbResult<()> {
        self.pager.set_catalog_root(id)
    }

    fn sync(&mut self) -> DbResult<()> {
        self.pager.sync()
    }
}

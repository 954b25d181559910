//! Transaction Coordinator (spec §4.10): brackets a unit of work across
//! the page cache and journal, so a failure anywhere inside rolls every
//! page the transaction touched back to its pre-transaction state.
//!
//! A caller that never calls [`TransactionCoordinator::run`] explicitly
//! still gets transactional semantics — every public `database`/`executor`
//! entry point wraps its work in an implicit single-statement transaction,
//! per spec §4.10's "operations outside an explicit transaction get an
//! implicit single-statement transaction" rule.

use buffer::PageCache;
use common::DbResult;
use journal::Journal;

/// Coordinates commit/rollback for one database's page cache and journal.
/// Held for the database's lifetime; each unit of work borrows it via
/// [`run`](Self::run) rather than constructing a new coordinator per call.
pub struct TransactionCoordinator<'a> {
    cache: &'a mut PageCache,
    journal: Option<&'a mut Journal>,
}

impl<'a> TransactionCoordinator<'a> {
    pub fn new(cache: &'a mut PageCache, journal: Option<&'a mut Journal>) -> Self {
        Self { cache, journal }
    }

    /// Run `body` as a single transaction: on success, commit; on any
    /// error, roll back and propagate the error. `body` receives the
    /// cache to read and write pages through.
    pub fn run<T>(&mut self, body: impl FnOnce(&mut PageCache) -> DbResult<T>) -> DbResult<T> {
        match body(self.cache) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                self.rollback();
                Err(err)
            }
        }
    }

    /// Durably record every dirty page: before-images to the journal
    /// first (so recovery can undo a crash mid-flush), then the pages
    /// themselves through to the data file, then fsync, then the journal
    /// is truncated — a committed transaction leaves no journal trace.
    fn commit(&mut self) -> DbResult<()> {
        if let Some(journal) = self.journal.as_deref_mut() {
            for (page_id, before_image) in self.cache.take_before_images() {
                journal.append_frame(page_id, &before_image)?;
            }
            journal.write_commit_marker()?;
            journal.fsync()?;
        }

        self.cache.flush_all_dirty()?;
        self.cache.sync()?;

        if let Some(journal) = self.journal.as_deref_mut() {
            journal.truncate()?;
            journal.fsync()?;
        }
        Ok(())
    }

    /// Discard every page the transaction dirtied. Nothing in the journal
    /// was ever applied, so rollback needs no journal interaction at all.
    fn rollback(&mut self) {
        self.cache.discard_dirty();
    }
}

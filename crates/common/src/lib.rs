#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::{io, path::PathBuf, time::Duration};
use thiserror::Error;

/// Logical identifier for a fixed-size page in the storage layer.
/// Examples:
/// - `let header = PageId(0);`
/// - `let catalog_root = PageId(1);`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u64);

impl PageId {
    pub const HEADER: PageId = PageId(0);
}

/// A document's slot within its owning page: `(PageId, SlotIndex)`.
/// This is the address used internally by index entries.
/// Examples:
/// - `let id = DocumentId { page_id: PageId(42), slot: 3 };`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId {
    pub page_id: PageId,
    pub slot: u16,
}

impl DocumentId {
    pub fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_id.0, self.slot)
    }
}

/// Canonical error taxonomy shared across every database subsystem (spec §7).
#[derive(Error, Debug)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("corrupt database: {0}")]
    CorruptDatabase(String),
    #[error("corrupt journal: {0}")]
    CorruptJournal(String),
    #[error(transparent)]
    IoFailure(#[from] io::Error),
    #[error("bad argument: {0}")]
    BadArgument(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("sequence has no elements")]
    NoElements,
    #[error("sequence has more than one element")]
    MoreThanOneElement,
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for a single database file (spec §6).
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .page_size(8192)
///     .cache_size(512)
///     .enable_journaling(true)
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory where the single database file and its sibling journal live.
    #[builder(default = PathBuf::from("."))]
    pub data_dir: PathBuf,
    /// Filename stem; the database file is `{database_name}` and the journal
    /// is `{database_name}.journal`. Defaults to the filename of `data_dir`
    /// joined with `tinydb` at open time if left unset.
    pub database_name: Option<String>,
    /// Fixed-size page allocation in bytes. Set at database creation and
    /// immutable thereafter — reopening with a different value is rejected.
    #[builder(default = 4096)]
    pub page_size: u32,
    /// Number of pages the page cache keeps resident.
    #[builder(default = 256)]
    pub cache_size: usize,
    /// Controls whether the write-ahead journal is enabled. Disabling
    /// forfeits crash safety.
    #[builder(default = true)]
    pub enable_journaling: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            database_name: None,
            page_size: 4096,
            cache_size: 256,
            enable_journaling: true,
        }
    }
}

impl Config {
    pub fn resolved_database_name(&self) -> String {
        self.database_name
            .clone()
            .unwrap_or_else(|| "tinydb".to_string())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(self.resolved_database_name())
    }

    pub fn journal_path(&self) -> PathBuf {
        let mut name = self.resolved_database_name();
        name.push_str(".journal");
        self.data_dir.join(name)
    }
}

/// Execution statistics collected per query, surfaced for diagnostics.
#[derive(Clone, Debug, Default)]
pub struct ExecutionStats {
    /// Time spent choosing and preparing an access path.
    pub plan_time: Duration,
    /// Cumulative time spent pulling rows through the pipeline.
    pub pipeline_time: Duration,
    /// Number of documents the access path yielded before residual filtering.
    pub documents_scanned: u64,
    /// Number of documents the residual predicate rejected.
    pub documents_filtered: u64,
    /// Number of pages read through the cache while satisfying this query.
    pub pages_read: u64,
}

impl ExecutionStats {
    pub fn total_time(&self) -> Duration {
        self.plan_time + self.pipeline_time
    }

    pub fn format_duration(d: Duration) -> String {
        let micros = d.as_micros();
        if micros < 1000 {
            format!("{micros}µs")
        } else if micros < 1_000_000 {
            format!("{:.2}ms", micros as f64 / 1000.0)
        } else {
            format!("{:.3}s", micros as f64 / 1_000_000.0)
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{Config, DbError, DbResult, DocumentId, ExecutionStats, PageId};
    pub use types::Value;
}

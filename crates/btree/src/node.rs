//! B+Tree node definitions.

use common::{DocumentId, PageId};
use serde::{Deserialize, Serialize};
use types::Value;

/// A (possibly composite) ordered index key; ordering follows `Value`'s
/// `IndexKey` comparison rule elementwise, then by length on a shared
/// prefix (`Vec<Value>`'s derived `Ord` already does exactly this).
pub type IndexKey = Vec<Value>;

/// A B+Tree node, either internal or leaf. Encoded whole into a single
/// page via bincode, the way the teacher's own B+Tree pages are written.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BTreeNode {
    /// Internal node: `n` keys separate `n + 1` children.
    Internal {
        keys: Vec<IndexKey>,
        children: Vec<PageId>,
    },
    /// Leaf node. Each key maps to an ordered list of document ids — a
    /// single id for a unique index, possibly many for a non-unique one.
    Leaf {
        entries: Vec<(IndexKey, Vec<DocumentId>)>,
        next_leaf: Option<PageId>,
    },
}

impl BTreeNode {
    pub fn new_leaf() -> Self {
        Self::Leaf {
            entries: Vec::new(),
            next_leaf: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf { .. })
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Internal { keys, .. } => keys.len(),
            Self::Leaf { entries, .. } => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

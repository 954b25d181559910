//! Index Manager + B+Tree: ordered, composite-key indexes over collections.
//!
//! Keys are `Vec<Value>` (composite), values are ordered lists of
//! `DocumentId` (one entry for a unique index, possibly many for a
//! non-unique one). Nodes are written whole into a single page via
//! bincode, the way the teacher's pager writes tuples — but routed through
//! `storage::PageAccess` instead of a dedicated per-index file, so the
//! buffer pool and journal can see every index write too.

mod node;

pub use node::{BTreeNode, IndexKey};

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_to_vec};
use common::{DbError, DbResult, DocumentId, PageId};
use storage::{Page, PageAccess};
use types::{Document, Value};

fn bincode_config() -> impl Config {
    config::legacy()
}

/// Rough fanout derived from the configured page size, generalizing the
/// teacher's fixed "~100 entries per node" estimate to whatever page size
/// the database was created with.
fn max_entries(page_size: u32) -> usize {
    ((page_size as usize) / 48).max(4)
}

/// Eager merge-on-underflow threshold: roughly 40% fill.
fn min_entries(page_size: u32) -> usize {
    (max_entries(page_size) * 2 / 5).max(1)
}

/// A single persistent B+Tree index.
#[derive(Debug)]
pub struct BTreeIndex {
    page_size: u32,
    unique: bool,
    root: PageId,
}

impl BTreeIndex {
    /// Allocate a brand-new, empty index (a single empty leaf as root).
    pub fn create(pa: &mut impl PageAccess, unique: bool) -> DbResult<Self> {
        let page_size = pa.page_size();
        let root = pa.allocate_page()?;
        let mut index = Self { page_size, unique, root };
        index.write_node(pa, root, &BTreeNode::new_leaf())?;
        Ok(index)
    }

    /// Attach to an existing index whose root page is already known (read
    /// from the collection's catalog entry).
    pub fn open(root: PageId, page_size: u32, unique: bool) -> Self {
        Self { page_size, unique, root }
    }

    pub fn root_page(&self) -> PageId {
        self.root
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    fn max_leaf(&self) -> usize {
        max_entries(self.page_size)
    }

    fn min_leaf(&self) -> usize {
        min_entries(self.page_size)
    }

    fn max_internal(&self) -> usize {
        max_entries(self.page_size)
    }

    fn min_internal(&self) -> usize {
        min_entries(self.page_size)
    }

    fn read_node(&self, pa: &mut impl PageAccess, id: PageId) -> DbResult<BTreeNode> {
        let page = pa.get(id)?;
        let (node, _): (BTreeNode, usize) = decode_from_slice(&page.data, bincode_config())
            .map_err(|e| DbError::CorruptDatabase(format!("decode btree node: {e}")))?;
        Ok(node)
    }

    fn write_node(&self, pa: &mut impl PageAccess, id: PageId, node: &BTreeNode) -> DbResult<()> {
        let bytes = encode_to_vec(node, bincode_config())
            .map_err(|e| DbError::CorruptDatabase(format!("encode btree node: {e}")))?;
        if bytes.len() > self.page_size as usize {
            return Err(DbError::CorruptDatabase(format!(
                "btree node too large: {} bytes (page size {})",
                bytes.len(),
                self.page_size
            )));
        }
        let mut page = Page::zeroed(id, self.page_size);
        page.data[..bytes.len()].copy_from_slice(&bytes);
        pa.put(page)
    }

    fn find_leaf(&self, pa: &mut impl PageAccess, key: &[Value]) -> DbResult<PageId> {
        let mut current = self.root;
        loop {
            match self.read_node(pa, current)? {
                BTreeNode::Internal { keys, children } => {
                    let idx = keys.partition_point(|k| k.as_slice() <= key);
                    current = children[idx];
                }
                BTreeNode::Leaf { .. } => return Ok(current),
            }
        }
    }

    /// Exact-match lookup; empty if the key is absent.
    pub fn find_exact(&self, pa: &mut impl PageAccess, key: &IndexKey) -> DbResult<Vec<DocumentId>> {
        let leaf_id = self.find_leaf(pa, key)?;
        match self.read_node(pa, leaf_id)? {
            BTreeNode::Leaf { entries, .. } => Ok(entries
                .binary_search_by(|(k, _)| k.cmp(key))
                .ok()
                .map(|pos| entries[pos].1.clone())
                .unwrap_or_default()),
            BTreeNode::Internal { .. } => Err(DbError::CorruptDatabase("find_leaf returned an internal node".into())),
        }
    }

    /// Inclusive/exclusive bounded range scan, `None` bound meaning unbounded.
    pub fn range_scan(
        &self,
        pa: &mut impl PageAccess,
        low: Option<&IndexKey>,
        high: Option<&IndexKey>,
        inclusive_low: bool,
        inclusive_high: bool,
    ) -> DbResult<Vec<DocumentId>> {
        let empty_key: IndexKey = Vec::new();
        let start = low.unwrap_or(&empty_key);
        let mut leaf_id = self.find_leaf(pa, start)?;
        let mut out = Vec::new();

        loop {
            let node = self.read_node(pa, leaf_id)?;
            let (entries, next_leaf) = match node {
                BTreeNode::Leaf { entries, next_leaf } => (entries, next_leaf),
                BTreeNode::Internal { .. } => {
                    return Err(DbError::CorruptDatabase("expected a leaf node in range scan".into()));
                }
            };
            for (key, ids) in &entries {
                if let Some(lo) = low {
                    match key.as_slice().cmp(lo.as_slice()) {
                        std::cmp::Ordering::Less => continue,
                        std::cmp::Ordering::Equal if !inclusive_low => continue,
                        _ => {}
                    }
                }
                if let Some(hi) = high {
                    match key.as_slice().cmp(hi.as_slice()) {
                        std::cmp::Ordering::Greater => return Ok(out),
                        std::cmp::Ordering::Equal if !inclusive_high => return Ok(out),
                        _ => {}
                    }
                }
                out.extend(ids.iter().copied());
            }
            match next_leaf {
                Some(next) => leaf_id = next,
                None => break,
            }
        }
        Ok(out)
    }

    /// Insert `id` under `key`. A unique index rejects a second distinct id
    /// under an existing key with `DuplicateKey`; re-inserting the same id
    /// is idempotent.
    pub fn insert(&mut self, pa: &mut impl PageAccess, key: IndexKey, id: DocumentId) -> DbResult<()> {
        if let Some((split_key, new_child)) = self.insert_recursive(pa, self.root, key, id)? {
            let new_root = pa.allocate_page()?;
            let node = BTreeNode::Internal {
                keys: vec![split_key],
                children: vec![self.root, new_child],
            };
            self.write_node(pa, new_root, &node)?;
            self.root = new_root;
        }
        Ok(())
    }

    fn insert_recursive(
        &mut self,
        pa: &mut impl PageAccess,
        page_id: PageId,
        key: IndexKey,
        id: DocumentId,
    ) -> DbResult<Option<(IndexKey, PageId)>> {
        match self.read_node(pa, page_id)? {
            BTreeNode::Internal { mut keys, mut children } => {
                let idx = keys.partition_point(|k| k.as_slice() <= key.as_slice());
                let child = children[idx];
                let split = self.insert_recursive(pa, child, key, id)?;
                let Some((split_key, new_child)) = split else {
                    return Ok(None);
                };
                keys.insert(idx, split_key);
                children.insert(idx + 1, new_child);

                if keys.len() > self.max_internal() {
                    let mid = keys.len() / 2;
                    let split_key = keys[mid].clone();
                    let right_keys = keys.split_off(mid + 1);
                    keys.truncate(mid);
                    let right_children = children.split_off(mid + 1);
                    self.write_node(pa, page_id, &BTreeNode::Internal { keys, children })?;
                    let right_id = pa.allocate_page()?;
                    self.write_node(
                        pa,
                        right_id,
                        &BTreeNode::Internal {
                            keys: right_keys,
                            children: right_children,
                        },
                    )?;
                    Ok(Some((split_key, right_id)))
                } else {
                    self.write_node(pa, page_id, &BTreeNode::Internal { keys, children })?;
                    Ok(None)
                }
            }
            BTreeNode::Leaf { mut entries, next_leaf } => {
                match entries.binary_search_by(|(k, _)| k.cmp(&key)) {
                    Ok(pos) => {
                        if self.unique {
                            if entries[pos].1.first() == Some(&id) {
                                // Same id re-inserted: idempotent no-op.
                            } else {
                                return Err(DbError::DuplicateKey(format!("{key:?}")));
                            }
                        } else {
                            let ids = &mut entries[pos].1;
                            if let Err(insert_at) = ids.binary_search(&id) {
                                ids.insert(insert_at, id);
                            }
                        }
                    }
                    Err(pos) => entries.insert(pos, (key, vec![id])),
                }

                if entries.len() > self.max_leaf() {
                    let mid = entries.len() / 2;
                    let right_entries = entries.split_off(mid);
                    let split_key = right_entries[0].0.clone();
                    let right_id = pa.allocate_page()?;
                    self.write_node(
                        pa,
                        right_id,
                        &BTreeNode::Leaf {
                            entries: right_entries,
                            next_leaf,
                        },
                    )?;
                    self.write_node(
                        pa,
                        page_id,
                        &BTreeNode::Leaf {
                            entries,
                            next_leaf: Some(right_id),
                        },
                    )?;
                    Ok(Some((split_key, right_id)))
                } else {
                    self.write_node(pa, page_id, &BTreeNode::Leaf { entries, next_leaf })?;
                    Ok(None)
                }
            }
        }
    }

    /// Remove `id` from under `key`. Returns whether anything was removed.
    /// Underflowing leaves/internal nodes are eagerly rebalanced by
    /// borrowing from a sibling, falling back to a merge.
    pub fn remove(&mut self, pa: &mut impl PageAccess, key: &IndexKey, id: DocumentId) -> DbResult<bool> {
        let (removed, _) = self.remove_recursive(pa, self.root, key, id)?;
        if let BTreeNode::Internal { keys, children } = self.read_node(pa, self.root)? {
            if keys.is_empty() && children.len() == 1 {
                let only_child = children[0];
                pa.free_page(self.root)?;
                self.root = only_child;
            }
        }
        Ok(removed)
    }

    /// Returns `(removed, this_node_is_now_underflowing)`.
    fn remove_recursive(
        &mut self,
        pa: &mut impl PageAccess,
        page_id: PageId,
        key: &IndexKey,
        id: DocumentId,
    ) -> DbResult<(bool, bool)> {
        let is_root = page_id == self.root;
        match self.read_node(pa, page_id)? {
            BTreeNode::Leaf { mut entries, next_leaf } => {
                let Ok(pos) = entries.binary_search_by(|(k, _)| k.as_slice().cmp(key.as_slice())) else {
                    return Ok((false, false));
                };
                let ids = &mut entries[pos].1;
                let before = ids.len();
                ids.retain(|existing| existing != &id);
                let removed = ids.len() < before;
                if ids.is_empty() {
                    entries.remove(pos);
                }
                let underflow = !is_root && entries.len() < self.min_leaf();
                self.write_node(pa, page_id, &BTreeNode::Leaf { entries, next_leaf })?;
                Ok((removed, underflow))
            }
            BTreeNode::Internal { mut keys, mut children } => {
                let idx = keys.partition_point(|k| k.as_slice() <= key.as_slice());
                let child = children[idx];
                let (removed, child_underflow) = self.remove_recursive(pa, child, key, id)?;
                if !child_underflow {
                    return Ok((removed, false));
                }

                self.rebalance_child(pa, &mut keys, &mut children, idx)?;
                let underflow = !is_root && keys.len() < self.min_internal();
                self.write_node(pa, page_id, &BTreeNode::Internal { keys, children })?;
                Ok((removed, underflow))
            }
        }
    }

    /// After `children[idx]` underflowed, borrow a key/entry from a
    /// sibling if one can spare it, otherwise merge with a sibling.
    fn rebalance_child(
        &mut self,
        pa: &mut impl PageAccess,
        keys: &mut Vec<IndexKey>,
        children: &mut Vec<PageId>,
        idx: usize,
    ) -> DbResult<()> {
        let child_id = children[idx];
        let child = self.read_node(pa, child_id)?;

        if idx > 0 {
            let left_id = children[idx - 1];
            let left = self.read_node(pa, left_id)?;
            if left.len() > self.min_sibling_len(&left) {
                self.borrow_from_left(pa, keys, children, idx, left, child)?;
                return Ok(());
            }
        }
        if idx + 1 < children.len() {
            let right_id = children[idx + 1];
            let right = self.read_node(pa, right_id)?;
            if right.len() > self.min_sibling_len(&right) {
                self.borrow_from_right(pa, keys, children, idx, child, right)?;
                return Ok(());
            }
        }
        if idx > 0 {
            let left_id = children[idx - 1];
            let left = self.read_node(pa, left_id)?;
            self.merge_with_left(pa, keys, children, idx, left, child)?;
        } else {
            let right_id = children[idx + 1];
            let right = self.read_node(pa, right_id)?;
            self.merge_with_left(pa, keys, children, idx + 1, child, right)?;
        }
        Ok(())
    }

    fn min_sibling_len(&self, node: &BTreeNode) -> usize {
        if node.is_leaf() {
            self.min_leaf()
        } else {
            self.min_internal()
        }
    }

    fn borrow_from_left(
        &mut self,
        pa: &mut impl PageAccess,
        keys: &mut [IndexKey],
        children: &[PageId],
        idx: usize,
        left: BTreeNode,
        child: BTreeNode,
    ) -> DbResult<()> {
        match (left, child) {
            (
                BTreeNode::Leaf { entries: mut left_entries, next_leaf: left_next },
                BTreeNode::Leaf { mut entries, next_leaf },
            ) => {
                let borrowed = left_entries.pop().unwrap();
                entries.insert(0, borrowed);
                keys[idx - 1] = entries[0].0.clone();
                self.write_node(pa, children[idx - 1], &BTreeNode::Leaf { entries: left_entries, next_leaf: left_next })?;
                self.write_node(pa, children[idx], &BTreeNode::Leaf { entries, next_leaf })?;
            }
            (
                BTreeNode::Internal { keys: mut left_keys, children: mut left_children },
                BTreeNode::Internal { mut keys: child_keys, mut children: child_children },
            ) => {
                let borrowed_key = left_keys.pop().unwrap();
                let borrowed_child = left_children.pop().unwrap();
                child_keys.insert(0, keys[idx - 1].clone());
                child_children.insert(0, borrowed_child);
                keys[idx - 1] = borrowed_key;
                self.write_node(pa, children[idx - 1], &BTreeNode::Internal { keys: left_keys, children: left_children })?;
                self.write_node(pa, children[idx], &BTreeNode::Internal { keys: child_keys, children: child_children })?;
            }
            _ => return Err(DbError::CorruptDatabase("sibling node type mismatch".into())),
        }
        Ok(())
    }

    fn borrow_from_right(
        &mut self,
        pa: &mut impl PageAccess,
        keys: &mut [IndexKey],
        children: &[PageId],
        idx: usize,
        child: BTreeNode,
        right: BTreeNode,
    ) -> DbResult<()> {
        match (child, right) {
            (
                BTreeNode::Leaf { mut entries, next_leaf },
                BTreeNode::Leaf { entries: mut right_entries, next_leaf: right_next },
            ) => {
                let borrowed = right_entries.remove(0);
                entries.push(borrowed);
                keys[idx] = right_entries[0].0.clone();
                self.write_node(pa, children[idx], &BTreeNode::Leaf { entries, next_leaf })?;
                self.write_node(pa, children[idx + 1], &BTreeNode::Leaf { entries: right_entries, next_leaf: right_next })?;
            }
            (
                BTreeNode::Internal { mut keys: child_keys, mut children: child_children },
                BTreeNode::Internal { keys: mut right_keys, children: mut right_children },
            ) => {
                let borrowed_key = right_keys.remove(0);
                let borrowed_child = right_children.remove(0);
                child_keys.push(keys[idx].clone());
                child_children.push(borrowed_child);
                keys[idx] = borrowed_key;
                self.write_node(pa, children[idx], &BTreeNode::Internal { keys: child_keys, children: child_children })?;
                self.write_node(pa, children[idx + 1], &BTreeNode::Internal { keys: right_keys, children: right_children })?;
            }
            _ => return Err(DbError::CorruptDatabase("sibling node type mismatch".into())),
        }
        Ok(())
    }

    /// Merge `children[left_idx + 1]` into `children[left_idx]`, removing
    /// the separator key at `keys[left_idx]` and the right child pointer.
    fn merge_with_left(
        &mut self,
        pa: &mut impl PageAccess,
        keys: &mut Vec<IndexKey>,
        children: &mut Vec<PageId>,
        left_idx_plus_one: usize,
        left: BTreeNode,
        right: BTreeNode,
    ) -> DbResult<()> {
        let left_idx = left_idx_plus_one - 1;
        let left_page = children[left_idx];
        let right_page = children[left_idx_plus_one];

        match (left, right) {
            (
                BTreeNode::Leaf { mut entries, .. },
                BTreeNode::Leaf { entries: right_entries, next_leaf: right_next },
            ) => {
                entries.extend(right_entries);
                self.write_node(pa, left_page, &BTreeNode::Leaf { entries, next_leaf: right_next })?;
            }
            (
                BTreeNode::Internal { mut keys: left_keys, mut children: left_children },
                BTreeNode::Internal { keys: right_keys, children: right_children },
            ) => {
                left_keys.push(keys[left_idx].clone());
                left_keys.extend(right_keys);
                left_children.extend(right_children);
                self.write_node(pa, left_page, &BTreeNode::Internal { keys: left_keys, children: left_children })?;
            }
            _ => return Err(DbError::CorruptDatabase("sibling node type mismatch".into())),
        }

        pa.free_page(right_page)?;
        keys.remove(left_idx);
        children.remove(left_idx_plus_one);
        Ok(())
    }
}

/// Project an index's declared fields out of a document into a composite
/// key. A missing field contributes `Value::Null` (null sorts lowest, per
/// the index-key ordering rule).
pub fn key_for_fields(doc: &Document, fields: &[String]) -> IndexKey {
    fields
        .iter()
        .map(|field| doc.get_ci(field).map(|(_, v)| v.clone()).unwrap_or(Value::Null))
        .collect()
}

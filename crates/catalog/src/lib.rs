//! Collection catalog: the registry of collections, their `_id` field
//! descriptors, index descriptors, and identity sequence state (spec §6,
//! "Catalog entry"). The catalog itself lives in a chain of pages rooted at
//! the database header's `catalog_root`, encoded the same way the overflow
//! chain in `storage::CollectionStore` threads bytes across pages.

use ahash::RandomState;
use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_to_vec};
use common::{DbError, DbResult, PageId};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use storage::{Page, PageAccess};

type Map<K, V> = HashMap<K, V, RandomState>;

fn bincode_config() -> impl Config {
    config::legacy()
}

const CHAIN_HEADER_LEN: usize = 12; // next_page(8) + used_len(4)

/// The fixed type of a collection's `_id` field, set on creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdKind {
    ObjectId,
    Int32,
    Int64,
    String,
}

/// One index attached to a collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub unique: bool,
    pub fields: Vec<String>,
    pub root_page: PageId,
}

impl IndexDescriptor {
    pub fn new(name: impl Into<String>, unique: bool, fields: Vec<String>, root_page: PageId) -> Self {
        Self {
            name: name.into(),
            unique,
            fields,
            root_page,
        }
    }
}

/// A registered collection: its data chain root, `_id` descriptor, identity
/// sequence state, and attached indexes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionEntry {
    pub name: String,
    pub id_field_name: String,
    pub id_kind: IdKind,
    pub root_page: PageId,
    /// Root page of the implicit unique B+Tree over `id_field_name` every
    /// collection carries (spec §4.5) — what `Strategy::PrimaryKeyLookup`
    /// descends instead of falling back to a scan.
    pub primary_root: PageId,
    pub sequence_state: u64,
    pub indexes: Vec<IndexDescriptor>,
}

impl CollectionEntry {
    fn new(name: String, root_page: PageId, primary_root: PageId) -> Self {
        Self {
            name,
            id_field_name: "_id".to_string(),
            id_kind: IdKind::ObjectId,
            root_page,
            primary_root,
            sequence_state: 0,
            indexes: Vec::new(),
        }
    }

    pub fn index(&self, name: &str) -> DbResult<&IndexDescriptor> {
        self.indexes
            .iter()
            .find(|idx| idx.name == name)
            .ok_or_else(|| DbError::NotFound(format!("index '{name}' on collection '{}'", self.name)))
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.iter().any(|idx| idx.name == name)
    }

    /// The best index (if any) whose leading field matches `field`, unique
    /// indexes preferred over non-unique when both qualify.
    pub fn index_on_field(&self, field: &str) -> Option<&IndexDescriptor> {
        self.indexes
            .iter()
            .filter(|idx| idx.fields.first().map(String::as_str) == Some(field))
            .max_by_key(|idx| idx.unique)
    }

    /// Allocate and return the next identity value for an auto `_id`.
    pub fn next_sequence(&mut self) -> u64 {
        self.sequence_state += 1;
        self.sequence_state
    }
}

/// In-memory view of the catalog; persisted as a chain of pages rooted at
/// the database header's `catalog_root`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    collections: Vec<CollectionEntry>,
    #[serde(skip)]
    name_index: Map<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the catalog from its page chain. An empty/zero root yields an
    /// empty catalog (a brand-new database).
    pub fn load(pa: &mut impl PageAccess, root: PageId) -> DbResult<Self> {
        if root.0 == 0 {
            return Ok(Self::new());
        }
        let bytes = read_chain(pa, root)?;
        if bytes.is_empty() {
            return Ok(Self::new());
        }
        let (mut catalog, _): (Catalog, usize) = decode_from_slice(&bytes, bincode_config())
            .map_err(|e| DbError::CorruptDatabase(format!("decode catalog: {e}")))?;
        catalog.rebuild_index();
        Ok(catalog)
    }

    /// Write the catalog back to its page chain, allocating a fresh chain
    /// root the first time (root page id `0`) and reusing/extending the
    /// existing chain thereafter. Returns the (possibly new) root page id.
    pub fn save(&self, pa: &mut impl PageAccess, root: PageId) -> DbResult<PageId> {
        let bytes = encode_to_vec(self, bincode_config())
            .map_err(|e| DbError::CorruptDatabase(format!("encode catalog: {e}")))?;
        write_chain(pa, root, &bytes)
    }

    /// A human-diffable export of the catalog contents, for debugging and
    /// snapshot comparisons outside the paged file.
    pub fn to_json_pretty(&self) -> DbResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| DbError::CorruptDatabase(format!("serialize catalog: {e}")))
    }

    pub fn from_json_str(data: &str) -> DbResult<Self> {
        let mut catalog: Catalog =
            serde_json::from_str(data).map_err(|e| DbError::CorruptDatabase(format!("invalid catalog json: {e}")))?;
        catalog.rebuild_index();
        Ok(catalog)
    }

    pub fn create_collection(
        &mut self,
        name: &str,
        root_page: PageId,
        primary_root: PageId,
    ) -> DbResult<&mut CollectionEntry> {
        if self.name_index.contains_key(name) {
            return Err(DbError::BadArgument(format!("collection '{name}' already exists")));
        }
        let idx = self.collections.len();
        self.collections
            .push(CollectionEntry::new(name.to_string(), root_page, primary_root));
        self.name_index.insert(name.to_string(), idx);
        Ok(&mut self.collections[idx])
    }

    pub fn collection(&self, name: &str) -> DbResult<&CollectionEntry> {
        let idx = self
            .name_index
            .get(name)
            .copied()
            .ok_or_else(|| DbError::NotFound(format!("collection '{name}'")))?;
        Ok(&self.collections[idx])
    }

    pub fn collection_mut(&mut self, name: &str) -> DbResult<&mut CollectionEntry> {
        let idx = self
            .name_index
            .get(name)
            .copied()
            .ok_or_else(|| DbError::NotFound(format!("collection '{name}'")))?;
        Ok(&mut self.collections[idx])
    }

    pub fn collections(&self) -> impl Iterator<Item = &CollectionEntry> {
        self.collections.iter()
    }

    fn rebuild_index(&mut self) {
        self.name_index.clear();
        for (idx, entry) in self.collections.iter().enumerate() {
            self.name_index.insert(entry.name.clone(), idx);
        }
    }
}

/// Read a catalog chain rooted at `root`: each page starts with
/// `[next_page u64][used_len u32]` followed by up to `page_size - 12` bytes
/// of payload, mirroring the overflow-chain layout used by documents.
fn read_chain(pa: &mut impl PageAccess, root: PageId) -> DbResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut current = root;
    loop {
        let page = pa.get(current)?;
        let next = PageId(u64::from_le_bytes(page.data[0..8].try_into().unwrap()));
        let used = u32::from_le_bytes(page.data[8..12].try_into().unwrap()) as usize;
        out.extend_from_slice(&page.data[CHAIN_HEADER_LEN..CHAIN_HEADER_LEN + used]);
        if next.0 == 0 {
            break;
        }
        current = next;
    }
    Ok(out)
}

/// Write `bytes` across a chain starting at `root` (or a freshly allocated
/// page if `root` is the sentinel `PageId(0)`), freeing any pages the
/// previous chain held beyond what the new content needs.
fn write_chain(pa: &mut impl PageAccess, root: PageId, bytes: &[u8]) -> DbResult<PageId> {
    let page_size = pa.page_size() as usize;
    let chunk_cap = page_size - CHAIN_HEADER_LEN;

    let mut old_pages = Vec::new();
    if root.0 != 0 {
        let mut current = root;
        loop {
            let page = pa.get(current)?;
            old_pages.push(current);
            let next = PageId(u64::from_le_bytes(page.data[0..8].try_into().unwrap()));
            if next.0 == 0 {
                break;
            }
            current = next;
        }
    }

    let chunks: Vec<&[u8]> = if bytes.is_empty() {
        vec![&[]]
    } else {
        bytes.chunks(chunk_cap).collect()
    };

    let mut page_ids = Vec::with_capacity(chunks.len());
    for (i, _) in chunks.iter().enumerate() {
        if let Some(existing) = old_pages.get(i) {
            page_ids.push(*existing);
        } else {
            page_ids.push(pa.allocate_page()?);
        }
    }
    for extra in &old_pages[page_ids.len()..] {
        pa.free_page(*extra)?;
    }

    for (i, chunk) in chunks.iter().enumerate() {
        let mut page = Page::zeroed(page_ids[i], page_size as u32);
        let next = page_ids.get(i + 1).copied().unwrap_or(PageId(0));
        page.data[0..8].copy_from_slice(&next.0.to_le_bytes());
        page.data[8..12].copy_from_slice(&(chunk.len() as u32).to_le_bytes());
        page.data[CHAIN_HEADER_LEN..CHAIN_HEADER_LEN + chunk.len()].copy_from_slice(chunk);
        pa.put(page)?;
    }

    Ok(page_ids[0])
}

//! Pager: single-file page allocation, the database header, and the
//! free-list, plus the slotted-page Collection Store built on top of it.
//!
//! A TinyDb database is one file. Page 0 is always the header; every other
//! page is either a free page (threaded into the free-list), a catalog
//! page, a B+Tree index page, a collection data page, or an overflow page.
//! Everything above this crate reaches pages through the [`PageAccess`]
//! trait rather than the raw file, so the buffer crate's cache can sit
//! transparently in front of [`Pager`].

mod collection;

pub use collection::{CollectionStore, SlotFlag};

use common::{DbError, DbResult, PageId};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Default page size; overridden per-database by `Config::page_size` and
/// persisted in the header, since it is immutable once a database exists.
pub const DEFAULT_PAGE_SIZE: u32 = 4096;

const MAGIC: &[u8; 8] = b"TINYDBv1";
const FORMAT_VERSION: u32 = 1;
const HEADER_LAYOUT_LEN: usize = 60; // through the checksum field, §6

/// A single fixed-size page, addressed by [`PageId`].
#[derive(Debug, Clone)]
pub struct Page {
    pub id: PageId,
    pub data: Vec<u8>,
}

impl Page {
    pub fn zeroed(id: PageId, page_size: u32) -> Self {
        Self {
            id,
            data: vec![0u8; page_size as usize],
        }
    }
}

/// The database header, page 0's fixed fields (spec §6).
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub version: u32,
    pub page_size: u32,
    pub catalog_root: PageId,
    pub freelist_head: PageId,
    pub next_page_counter: u64,
    pub created_at: i64,
    pub modified_at: i64,
}

impl Header {
    fn encode(&self, page_size: u32) -> Vec<u8> {
        let mut buf = vec![0u8; page_size as usize];
        buf[0..8].copy_from_slice(MAGIC);
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf[12..16].copy_from_slice(&self.page_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.catalog_root.0.to_le_bytes());
        buf[24..32].copy_from_slice(&self.freelist_head.0.to_le_bytes());
        buf[32..40].copy_from_slice(&self.next_page_counter.to_le_bytes());
        buf[40..48].copy_from_slice(&self.created_at.to_le_bytes());
        buf[48..56].copy_from_slice(&self.modified_at.to_le_bytes());
        let checksum = crc32fast::hash(&buf[0..56]);
        buf[56..60].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> DbResult<Self> {
        if buf.len() < HEADER_LAYOUT_LEN || &buf[0..8] != MAGIC {
            return Err(DbError::CorruptDatabase("header magic mismatch".into()));
        }
        let version = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(DbError::CorruptDatabase(format!(
                "unsupported format version {version}"
            )));
        }
        let checksum = u32::from_le_bytes(buf[56..60].try_into().unwrap());
        if crc32fast::hash(&buf[0..56]) != checksum {
            return Err(DbError::CorruptDatabase("header checksum mismatch".into()));
        }
        let page_size = u32::from_le_bytes(buf[12..16].try_into().unwrap());
        Ok(Self {
            version,
            page_size,
            catalog_root: PageId(u64::from_le_bytes(buf[16..24].try_into().unwrap())),
            freelist_head: PageId(u64::from_le_bytes(buf[24..32].try_into().unwrap())),
            next_page_counter: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
            created_at: i64::from_le_bytes(buf[40..48].try_into().unwrap()),
            modified_at: i64::from_le_bytes(buf[48..56].try_into().unwrap()),
        })
    }
}

/// Uniform page access, implemented directly by [`Pager`] and, with caching
/// layered on top, by `buffer::PageCache`. Everything above `storage`
/// (the B+Tree, the Collection Store, the catalog) is generic over this
/// trait rather than tied to one or the other.
pub trait PageAccess {
    fn get(&mut self, id: PageId) -> DbResult<Page>;
    fn put(&mut self, page: Page) -> DbResult<()>;
    fn allocate_page(&mut self) -> DbResult<PageId>;
    fn free_page(&mut self, id: PageId) -> DbResult<()>;
    fn flush_all_dirty(&mut self) -> DbResult<()>;
    fn page_size(&self) -> u32;
    fn catalog_root(&mut self) -> DbResult<PageId>;
    fn set_catalog_root(&mut self, id: PageId) -> DbResult<()>;
    fn sync(&mut self) -> DbResult<()>;
}

/// Owns the single database file. Allocation pops the free-list; on an
/// empty list it extends the file by one page.
#[derive(Debug)]
pub struct Pager {
    file: File,
    page_size: u32,
    header: Header,
}

impl Pager {
    /// Create a brand-new database file with a freshly initialized header.
    pub fn create(path: &Path, page_size: u32, now_micros: i64) -> DbResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let header = Header {
            version: FORMAT_VERSION,
            page_size,
            catalog_root: PageId(0),
            freelist_head: PageId(0),
            next_page_counter: 1,
            created_at: now_micros,
            modified_at: now_micros,
        };
        file.write_all(&header.encode(page_size))?;
        file.sync_all()?;
        Ok(Self {
            file,
            page_size,
            header,
        })
    }

    /// Open an existing database file, validating the header.
    pub fn open(path: &Path) -> DbResult<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut probe = vec![0u8; HEADER_LAYOUT_LEN];
        file.read_exact(&mut probe)?;
        let page_size = u32::from_le_bytes(probe[12..16].try_into().unwrap());
        let mut full = vec![0u8; page_size as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut full)?;
        let header = Header::decode(&full)?;
        let file_len = file.metadata()?.len();
        let expected_pages = header.next_page_counter;
        if file_len < expected_pages * page_size as u64 {
            return Err(DbError::CorruptDatabase(
                "file shorter than next-page counter implies".into(),
            ));
        }
        Ok(Self {
            file,
            page_size,
            header,
        })
    }

    fn write_header(&mut self) -> DbResult<()> {
        let bytes = self.header.encode(self.page_size);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&bytes)?;
        Ok(())
    }

    fn touch_modified(&mut self, now_micros: i64) {
        self.header.modified_at = now_micros;
    }

    pub fn header(&self) -> Header {
        self.header
    }

    pub fn set_modified_at(&mut self, now_micros: i64) -> DbResult<()> {
        self.touch_modified(now_micros);
        self.write_header()
    }

    fn ensure_allocated(&self, id: PageId) -> DbResult<()> {
        if id.0 >= self.header.next_page_counter {
            return Err(DbError::CorruptDatabase(format!(
                "page {} exceeds allocated range",
                id.0
            )));
        }
        Ok(())
    }

    fn seek_to(&mut self, id: PageId) -> DbResult<()> {
        self.file
            .seek(SeekFrom::Start(id.0 * self.page_size as u64))?;
        Ok(())
    }
}

impl PageAccess for Pager {
    fn get(&mut self, id: PageId) -> DbResult<Page> {
        self.ensure_allocated(id)?;
        self.seek_to(id)?;
        let mut data = vec![0u8; self.page_size as usize];
        self.file.read_exact(&mut data)?;
        Ok(Page { id, data })
    }

    fn put(&mut self, page: Page) -> DbResult<()> {
        self.ensure_allocated(page.id)?;
        self.seek_to(page.id)?;
        self.file.write_all(&page.data)?;
        Ok(())
    }

    fn allocate_page(&mut self) -> DbResult<PageId> {
        if self.header.freelist_head.0 != 0 {
            let id = self.header.freelist_head;
            let page = self.get(id)?;
            let next = u64::from_le_bytes(page.data[0..8].try_into().unwrap());
            self.header.freelist_head = PageId(next);
            self.write_header()?;
            return Ok(id);
        }
        let id = PageId(self.header.next_page_counter);
        self.header.next_page_counter += 1;
        self.write_header()?;
        self.put(Page::zeroed(id, self.page_size))?;
        Ok(id)
    }

    fn free_page(&mut self, id: PageId) -> DbResult<()> {
        let mut page = Page::zeroed(id, self.page_size);
        page.data[0..8].copy_from_slice(&self.header.freelist_head.0.to_le_bytes());
        self.put(page)?;
        self.header.freelist_head = id;
        self.write_header()
    }

    fn flush_all_dirty(&mut self) -> DbResult<()> {
        Ok(())
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn catalog_root(&mut self) -> DbResult<PageId> {
        Ok(self.header.catalog_root)
    }

    fn set_catalog_root(&mut self, id: PageId) -> DbResult<()> {
        self.header.catalog_root = id;
        self.write_header()
    }

    fn sync(&mut self) -> DbResult<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

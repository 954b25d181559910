//! Slotted-page Collection Store (spec §4.4): documents live in a chain of
//! data pages, each laid out as a slot directory growing from the page
//! start and a free region growing from the end. Oversized documents spill
//! into an overflow chain; the in-page slot keeps a pointer plus a few head
//! bytes for locality.

use crate::{Page, PageAccess};
use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_to_vec};
use common::{DbError, DbResult, DocumentId, PageId};
use types::Document;

fn bincode_config() -> impl Config {
    config::legacy()
}

const DATA_HEADER_LEN: usize = 12; // num_slots(2) + free_offset(2) + next_page(8)
const SLOT_LEN: usize = 5; // offset(2) + len(2) + flags(1)
const OVERFLOW_HEADER_LEN: usize = 12; // next_page(8) + used_len(4)
const OVERFLOW_POINTER_HEAD: usize = 16; // first_page(8) + head_len(2) + reserved(2) + small head sample
const MARGIN: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotFlag {
    InPlace,
    Overflow,
    Deleted,
}

impl SlotFlag {
    fn from_byte(b: u8) -> DbResult<Self> {
        match b {
            0 => Ok(Self::InPlace),
            1 => Ok(Self::Overflow),
            2 => Ok(Self::Deleted),
            other => Err(DbError::CorruptDatabase(format!("bad slot flag {other}"))),
        }
    }
    fn to_byte(self) -> u8 {
        match self {
            Self::InPlace => 0,
            Self::Overflow => 1,
            Self::Deleted => 2,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    offset: u16,
    len: u16,
    flags: SlotFlag,
}

struct DataPageHeader {
    num_slots: u16,
    free_offset: u16,
    next_page: PageId,
}

fn read_header(page: &Page) -> DataPageHeader {
    DataPageHeader {
        num_slots: u16::from_le_bytes(page.data[0..2].try_into().unwrap()),
        free_offset: u16::from_le_bytes(page.data[2..4].try_into().unwrap()),
        next_page: PageId(u64::from_le_bytes(page.data[4..12].try_into().unwrap())),
    }
}

fn write_header(page: &mut Page, header: &DataPageHeader) {
    page.data[0..2].copy_from_slice(&header.num_slots.to_le_bytes());
    page.data[2..4].copy_from_slice(&header.free_offset.to_le_bytes());
    page.data[4..12].copy_from_slice(&header.next_page.0.to_le_bytes());
}

fn slot_offset(idx: u16) -> usize {
    DATA_HEADER_LEN + idx as usize * SLOT_LEN
}

fn read_slot(page: &Page, idx: u16) -> DbResult<Slot> {
    let start = slot_offset(idx);
    Ok(Slot {
        offset: u16::from_le_bytes(page.data[start..start + 2].try_into().unwrap()),
        len: u16::from_le_bytes(page.data[start + 2..start + 4].try_into().unwrap()),
        flags: SlotFlag::from_byte(page.data[start + 4])?,
    })
}

fn write_slot(page: &mut Page, idx: u16, slot: &Slot) {
    let start = slot_offset(idx);
    page.data[start..start + 2].copy_from_slice(&slot.offset.to_le_bytes());
    page.data[start + 2..start + 4].copy_from_slice(&slot.len.to_le_bytes());
    page.data[start + 4] = slot.flags.to_byte();
}

fn new_data_page(id: PageId, page_size: u32, next_page: PageId) -> Page {
    let mut page = Page::zeroed(id, page_size);
    write_header(
        &mut page,
        &DataPageHeader {
            num_slots: 0,
            free_offset: page_size as u16,
            next_page,
        },
    );
    page
}

fn free_space(page: &Page, header: &DataPageHeader) -> usize {
    let slots_end = slot_offset(header.num_slots);
    (header.free_offset as usize).saturating_sub(slots_end)
}

/// Append raw bytes as a new slot, returning its index. Caller guarantees
/// the page has `bytes.len() + SLOT_LEN` free.
fn append_tuple(page: &mut Page, flags: SlotFlag, bytes: &[u8]) -> DbResult<u16> {
    let mut header = read_header(page);
    if header.num_slots == u16::MAX {
        return Err(DbError::CorruptDatabase("slot index overflow".into()));
    }
    let new_free_offset = header.free_offset - bytes.len() as u16;
    page.data[new_free_offset as usize..header.free_offset as usize].copy_from_slice(bytes);
    let idx = header.num_slots;
    write_slot(
        page,
        idx,
        &Slot {
            offset: new_free_offset,
            len: bytes.len() as u16,
            flags,
        },
    );
    header.num_slots += 1;
    header.free_offset = new_free_offset;
    write_header(page, &header);
    Ok(idx)
}

pub struct CollectionStore {
    page_size: u32,
    free_hint: Option<PageId>,
}

impl CollectionStore {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            free_hint: None,
        }
    }

    fn max_inline(&self) -> usize {
        self.page_size as usize - DATA_HEADER_LEN - SLOT_LEN - MARGIN
    }

    /// Allocate the first (and initially only) data page for a new collection.
    pub fn create_chain(&mut self, pa: &mut impl PageAccess) -> DbResult<PageId> {
        let id = pa.allocate_page()?;
        pa.put(new_data_page(id, self.page_size, PageId(0)))?;
        Ok(id)
    }

    /// Find a page in the chain `root..` with room for `needed` bytes,
    /// extending the chain with a freshly allocated page if none qualifies.
    fn find_or_extend(
        &mut self,
        pa: &mut impl PageAccess,
        root: PageId,
        needed: usize,
    ) -> DbResult<Page> {
        let start = self.free_hint.unwrap_or(root);
        let mut current = start;
        let mut last_seen = start;
        loop {
            let page = pa.get(current)?;
            let header = read_header(&page);
            if free_space(&page, &header) >= needed {
                return Ok(page);
            }
            last_seen = current;
            if header.next_page.0 == 0 {
                break;
            }
            current = header.next_page;
        }
        // No page in a hinted suffix had room; also sweep from root if we
        // started mid-chain via the hint.
        if start != root {
            let mut current = root;
            loop {
                let page = pa.get(current)?;
                let header = read_header(&page);
                if free_space(&page, &header) >= needed {
                    return Ok(page);
                }
                if current == start {
                    break;
                }
                if header.next_page.0 == 0 {
                    break;
                }
                current = header.next_page;
            }
        }
        let new_id = pa.allocate_page()?;
        let mut tail = pa.get(last_seen)?;
        let mut tail_header = read_header(&tail);
        tail_header.next_page = new_id;
        write_header(&mut tail, &tail_header);
        pa.put(tail)?;
        let fresh = new_data_page(new_id, self.page_size, PageId(0));
        pa.put(fresh.clone())?;
        self.free_hint = Some(new_id);
        Ok(fresh)
    }

    pub fn insert(&mut self, pa: &mut impl PageAccess, root: PageId, doc: &Document) -> DbResult<DocumentId> {
        let bytes = encode_to_vec(doc, bincode_config())
            .map_err(|e| DbError::CorruptDatabase(format!("serialize document: {e}")))?;

        if bytes.len() <= self.max_inline() {
            let mut page = self.find_or_extend(pa, root, bytes.len() + SLOT_LEN)?;
            let slot = append_tuple(&mut page, SlotFlag::InPlace, &bytes)?;
            let page_id = page.id;
            pa.put(page)?;
            return Ok(DocumentId::new(page_id, slot));
        }

        let first_overflow = self.write_overflow_chain(pa, &bytes)?;
        let head_len = bytes.len().min(OVERFLOW_POINTER_HEAD - 12);
        let mut pointer = Vec::with_capacity(OVERFLOW_POINTER_HEAD);
        pointer.extend_from_slice(&first_overflow.0.to_le_bytes());
        pointer.extend_from_slice(&(head_len as u16).to_le_bytes());
        pointer.extend_from_slice(&[0u8; 2]);
        pointer.extend_from_slice(&bytes[..head_len]);

        let mut page = self.find_or_extend(pa, root, pointer.len() + SLOT_LEN)?;
        let slot = append_tuple(&mut page, SlotFlag::Overflow, &pointer)?;
        let page_id = page.id;
        pa.put(page)?;
        Ok(DocumentId::new(page_id, slot))
    }

    fn write_overflow_chain(&mut self, pa: &mut impl PageAccess, bytes: &[u8]) -> DbResult<PageId> {
        let chunk_cap = self.page_size as usize - OVERFLOW_HEADER_LEN;
        let chunks: Vec<&[u8]> = bytes.chunks(chunk_cap).collect();
        let mut page_ids = Vec::with_capacity(chunks.len());
        for _ in &chunks {
            page_ids.push(pa.allocate_page()?);
        }
        for (i, chunk) in chunks.iter().enumerate() {
            let mut page = Page::zeroed(page_ids[i], self.page_size);
            let next = page_ids.get(i + 1).copied().unwrap_or(PageId(0));
            page.data[0..8].copy_from_slice(&next.0.to_le_bytes());
            page.data[8..12].copy_from_slice(&(chunk.len() as u32).to_le_bytes());
            page.data[OVERFLOW_HEADER_LEN..OVERFLOW_HEADER_LEN + chunk.len()].copy_from_slice(chunk);
            pa.put(page)?;
        }
        Ok(page_ids[0])
    }

    fn read_overflow_chain(&self, pa: &mut impl PageAccess, first: PageId) -> DbResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut current = first;
        loop {
            let page = pa.get(current)?;
            let next = PageId(u64::from_le_bytes(page.data[0..8].try_into().unwrap()));
            let used = u32::from_le_bytes(page.data[8..12].try_into().unwrap()) as usize;
            out.extend_from_slice(&page.data[OVERFLOW_HEADER_LEN..OVERFLOW_HEADER_LEN + used]);
            if next.0 == 0 {
                break;
            }
            current = next;
        }
        Ok(out)
    }

    fn free_overflow_chain(&self, pa: &mut impl PageAccess, first: PageId) -> DbResult<()> {
        let mut current = first;
        loop {
            let page = pa.get(current)?;
            let next = PageId(u64::from_le_bytes(page.data[0..8].try_into().unwrap()));
            pa.free_page(current)?;
            if next.0 == 0 {
                break;
            }
            current = next;
        }
        Ok(())
    }

    pub fn get(&self, pa: &mut impl PageAccess, id: DocumentId) -> DbResult<Document> {
        let page = pa.get(id.page_id)?;
        let header = read_header(&page);
        if id.slot >= header.num_slots {
            return Err(DbError::NotFound(format!("document {id}")));
        }
        let slot = read_slot(&page, id.slot)?;
        if slot.flags == SlotFlag::Deleted {
            return Err(DbError::NotFound(format!("document {id}")));
        }
        let start = slot.offset as usize;
        let end = start + slot.len as usize;
        let bytes = match slot.flags {
            SlotFlag::InPlace => page.data[start..end].to_vec(),
            SlotFlag::Overflow => {
                let first_page = PageId(u64::from_le_bytes(page.data[start..start + 8].try_into().unwrap()));
                self.read_overflow_chain(pa, first_page)?
            }
            SlotFlag::Deleted => unreachable!(),
        };
        let (mut doc, _): (Document, usize) = decode_from_slice(&bytes, bincode_config())
            .map_err(|e| DbError::CorruptDatabase(format!("deserialize document: {e}")))?;
        doc.rebuild_index();
        Ok(doc)
    }

    pub fn update(
        &mut self,
        pa: &mut impl PageAccess,
        root: PageId,
        id: DocumentId,
        doc: &Document,
    ) -> DbResult<DocumentId> {
        let bytes = encode_to_vec(doc, bincode_config())
            .map_err(|e| DbError::CorruptDatabase(format!("serialize document: {e}")))?;
        let mut page = pa.get(id.page_id)?;
        let header = read_header(&page);
        if id.slot >= header.num_slots {
            return Err(DbError::NotFound(format!("document {id}")));
        }
        let slot = read_slot(&page, id.slot)?;
        if slot.flags == SlotFlag::InPlace && bytes.len() <= slot.len as usize {
            let start = slot.offset as usize;
            page.data[start..start + bytes.len()].copy_from_slice(&bytes);
            write_slot(
                &mut page,
                id.slot,
                &Slot {
                    offset: slot.offset,
                    len: bytes.len() as u16,
                    flags: SlotFlag::InPlace,
                },
            );
            pa.put(page)?;
            return Ok(id);
        }
        self.delete(pa, id)?;
        self.insert(pa, root, doc)
    }

    pub fn delete(&mut self, pa: &mut impl PageAccess, id: DocumentId) -> DbResult<()> {
        let mut page = pa.get(id.page_id)?;
        let header = read_header(&page);
        if id.slot >= header.num_slots {
            return Err(DbError::NotFound(format!("document {id}")));
        }
        let slot = read_slot(&page, id.slot)?;
        if slot.flags == SlotFlag::Deleted {
            return Err(DbError::NotFound(format!("document {id}")));
        }
        if slot.flags == SlotFlag::Overflow {
            let start = slot.offset as usize;
            let first_page = PageId(u64::from_le_bytes(page.data[start..start + 8].try_into().unwrap()));
            self.free_overflow_chain(pa, first_page)?;
        }
        write_slot(
            &mut page,
            id.slot,
            &Slot {
                offset: slot.offset,
                len: 0,
                flags: SlotFlag::Deleted,
            },
        );
        let page_id = page.id;
        let utilization = 1.0 - (free_space(&page, &header) as f64 / self.page_size as f64);
        pa.put(page)?;
        if utilization < 0.5 {
            self.free_hint = Some(page_id);
        }
        Ok(())
    }

    /// Ascending `(PageId, SlotIndex)` order — stable, not insertion order.
    pub fn scan(&self, pa: &mut impl PageAccess, root: PageId) -> DbResult<Vec<(DocumentId, Document)>> {
        let mut results = Vec::new();
        let mut current = root;
        loop {
            let page = pa.get(current)?;
            let header = read_header(&page);
            for idx in 0..header.num_slots {
                let slot = read_slot(&page, idx)?;
                if slot.flags == SlotFlag::Deleted {
                    continue;
                }
                let doc_id = DocumentId::new(current, idx);
                results.push((doc_id, self.get(pa, doc_id)?));
            }
            if header.next_page.0 == 0 {
                break;
            }
            current = header.next_page;
        }
        // Chain order follows `next_page` linkage, which the free-list can
        // break: an overflow extension can land on a lower-numbered page
        // that a prior deletion freed, so the chain itself isn't guaranteed
        // page-id ascending. Sort explicitly to honor the ordering contract.
        results.sort_by_key(|(id, _)| (id.page_id.0, id.slot));
        Ok(results)
    }
}

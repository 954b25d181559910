use super::*;
use storage::{DEFAULT_PAGE_SIZE, Page, Pager};
use tempfile::tempdir;

#[test]
fn frame_round_trips_through_parse() {
    let dir = tempdir().unwrap();
    let mut journal = Journal::open(dir.path().join("test.journal")).unwrap();
    journal.append_frame(PageId(1), &[1, 2, 3, 4]).unwrap();
    journal.append_frame(PageId(2), &[5, 6]).unwrap();
    journal.fsync().unwrap();

    let bytes = journal.read_all().unwrap();
    let (frames, ends_with_marker) = parse_frames_for_test(&bytes).unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].page_id, PageId(1));
    assert_eq!(frames[0].before_image, vec![1, 2, 3, 4]);
    assert!(!ends_with_marker);
}

#[test]
fn commit_marker_is_detected() {
    let dir = tempdir().unwrap();
    let mut journal = Journal::open(dir.path().join("test.journal")).unwrap();
    journal.append_frame(PageId(1), &[9, 9]).unwrap();
    journal.write_commit_marker().unwrap();
    journal.fsync().unwrap();

    let bytes = journal.read_all().unwrap();
    let (frames, ends_with_marker) = parse_frames_for_test(&bytes).unwrap();
    assert_eq!(frames.len(), 1);
    assert!(ends_with_marker);
}

#[test]
fn truncated_last_frame_is_tolerated_not_an_error() {
    let dir = tempdir().unwrap();
    let mut journal = Journal::open(dir.path().join("test.journal")).unwrap();
    journal.append_frame(PageId(1), &[1, 2, 3]).unwrap();
    journal.fsync().unwrap();

    // Simulate a crash mid-append of a second frame: header present, body cut short.
    let path = dir.path().join("test.journal");
    let mut bytes = std::fs::read(&path).unwrap();
    bytes.extend_from_slice(&2u64.to_le_bytes());
    bytes.extend_from_slice(&100u32.to_le_bytes());
    bytes.extend_from_slice(&[0xAA; 10]); // far short of the declared 100 bytes
    std::fs::write(&path, bytes).unwrap();

    let mut reopened = Journal::open(&path).unwrap();
    let all = reopened.read_all().unwrap();
    let (frames, ends_with_marker) = parse_frames_for_test(&all).unwrap();
    assert_eq!(frames.len(), 1, "only the complete first frame is recovered");
    assert!(!ends_with_marker);
}

#[test]
fn bit_flip_in_a_frame_body_is_reported_as_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.journal");
    let mut journal = Journal::open(&path).unwrap();
    journal.append_frame(PageId(1), &[1, 2, 3, 4]).unwrap();
    journal.fsync().unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    let body_offset = 12; // past [page_id u64][len u32]
    bytes[body_offset] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let err = parse_frames_for_test(&bytes).unwrap_err();
    assert!(matches!(err, DbError::CorruptJournal(_)));
}

#[test]
fn truncate_clears_the_journal() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.journal");
    let mut journal = Journal::open(&path).unwrap();
    journal.append_frame(PageId(1), &[1]).unwrap();
    journal.truncate().unwrap();
    assert!(journal.read_all().unwrap().is_empty());
}

fn scratch_pager(dir: &tempfile::TempDir) -> Pager {
    Pager::create(&dir.path().join("db.tinydb"), DEFAULT_PAGE_SIZE, 0).unwrap()
}

#[test]
fn recover_with_no_journal_file_is_a_no_op() {
    let dir = tempdir().unwrap();
    let mut pager = scratch_pager(&dir);
    recover(dir.path().join("missing.journal"), &mut pager).unwrap();
}

#[test]
fn recover_replays_before_images_when_marker_absent() {
    let dir = tempdir().unwrap();
    let mut pager = scratch_pager(&dir);
    let id = pager.allocate_page().unwrap();
    let mut original = pager.get(id).unwrap();
    original.data[0] = 0xFF;
    pager.put(original.clone()).unwrap();
    pager.sync().unwrap();

    // A transaction dirtied the page (without committing) and the journal
    // recorded its before-image before the crash.
    let journal_path = dir.path().join("db.journal");
    let mut journal = Journal::open(&journal_path).unwrap();
    journal.append_frame(id, &original.data).unwrap();
    journal.fsync().unwrap();

    let mut clobbered = pager.get(id).unwrap();
    clobbered.data[0] = 0x00;
    pager.put(clobbered).unwrap();
    pager.sync().unwrap();

    recover(&journal_path, &mut pager).unwrap();
    assert_eq!(pager.get(id).unwrap().data[0], 0xFF);
    assert!(Journal::open(&journal_path).unwrap().read_all().unwrap().is_empty());
}

#[test]
fn recover_just_truncates_when_marker_present() {
    let dir = tempdir().unwrap();
    let mut pager = scratch_pager(&dir);
    let id = pager.allocate_page().unwrap();

    let journal_path = dir.path().join("db.journal");
    let mut journal = Journal::open(&journal_path).unwrap();
    journal.append_frame(id, &vec![0u8; DEFAULT_PAGE_SIZE as usize]).unwrap();
    journal.write_commit_marker().unwrap();
    journal.fsync().unwrap();

    let mut current = pager.get(id).unwrap();
    current.data[5] = 0x42;
    pager.put(current).unwrap();

    recover(&journal_path, &mut pager).unwrap();

    // The marker means the data file was already fsynced before the crash
    // interrupted truncation, so recovery must not touch live pages.
    assert_eq!(pager.get(id).unwrap().data[5], 0x42);
}

#[test]
fn recover_is_idempotent() {
    let dir = tempdir().unwrap();
    let mut pager = scratch_pager(&dir);
    let id = pager.allocate_page().unwrap();

    let journal_path = dir.path().join("db.journal");
    let mut journal = Journal::open(&journal_path).unwrap();
    journal.append_frame(id, &vec![7u8; DEFAULT_PAGE_SIZE as usize]).unwrap();
    journal.fsync().unwrap();

    recover(&journal_path, &mut pager).unwrap();
    let first = pager.get(id).unwrap().data;
    recover(&journal_path, &mut pager).unwrap();
    let second = pager.get(id).unwrap().data;
    assert_eq!(first, second);
}

#[allow(dead_code)]
fn unused_page_constructor_reference(id: PageId) -> Page {
    storage::Page::zeroed(id, DEFAULT_PAGE_SIZE)
}

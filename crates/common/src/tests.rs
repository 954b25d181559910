use super::*;
use std::io;

#[test]
fn config_defaults_are_sane() {
    let cfg = Config::default();
    assert_eq!(cfg.page_size, 4096);
    assert_eq!(cfg.cache_size, 256);
    assert!(cfg.enable_journaling);
    assert_eq!(cfg.resolved_database_name(), "tinydb");
}

#[test]
fn config_paths_join_data_dir() {
    let cfg = Config::builder()
        .data_dir(PathBuf::from("/tmp/dbs"))
        .database_name("orders".to_string())
        .build();
    assert_eq!(cfg.database_path(), PathBuf::from("/tmp/dbs/orders"));
    assert_eq!(cfg.journal_path(), PathBuf::from("/tmp/dbs/orders.journal"));
}

#[test]
fn db_error_formats_cleanly() {
    let err = DbError::CorruptDatabase("header magic mismatch".into());
    assert!(format!("{err}").contains("header magic mismatch"));
}

#[test]
fn io_error_converts_to_io_failure() {
    let e = io::Error::other("disk full");
    let db_err: DbError = e.into();
    assert!(matches!(db_err, DbError::IoFailure(_)));
}

#[test]
fn document_id_displays_as_pair() {
    let id = DocumentId::new(PageId(42), 3);
    assert_eq!(id.to_string(), "(42, 3)");
}

#[test]
fn execution_stats_total_time_sums_components() {
    let stats = ExecutionStats {
        plan_time: Duration::from_millis(5),
        pipeline_time: Duration::from_millis(150),
        documents_scanned: 100,
        documents_filtered: 18,
        pages_read: 10,
    };
    assert_eq!(stats.total_time().as_millis(), 155);
}

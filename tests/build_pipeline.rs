//! End-to-end builds against synthetic documents
//!
//! These tests drive `PdfDatabaseBuilder` with an in-memory `PageSource` so
//! page counts, failures and interrupts can be controlled exactly.

use pdfdb_rs::extract::RawPage;
use pdfdb_rs::storage::schema::keys;
use pdfdb_rs::{BuildState, Config, Database, PageSource, PdfDatabaseBuilder, PdfDbError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A document of `pages` generated pages
struct SyntheticManual {
    pages: usize,
    /// Pages whose extraction returns an error
    broken: BTreeSet<u32>,
    /// Raise the flag once this many extractions have run
    interrupt_after: Option<(usize, Arc<AtomicBool>)>,
    extracted: AtomicUsize,
}

impl SyntheticManual {
    fn new(pages: usize) -> Self {
        Self {
            pages,
            broken: BTreeSet::new(),
            interrupt_after: None,
            extracted: AtomicUsize::new(0),
        }
    }

    fn with_broken(mut self, pages: &[u32]) -> Self {
        self.broken = pages.iter().copied().collect();
        self
    }
}

impl PageSource for SyntheticManual {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("Title".to_string(), "RH850 Hardware Manual".to_string()),
            ("Producer".to_string(), "synthetic".to_string()),
        ])
    }

    fn extract_page(&self, page_num: u32) -> pdfdb_rs::Result<RawPage> {
        let n = self.extracted.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, flag)) = &self.interrupt_after {
            if n >= *limit {
                flag.store(true, Ordering::SeqCst);
            }
        }

        if self.broken.contains(&page_num) {
            return Err(PdfDbError::Extraction {
                page: page_num,
                reason: "corrupt content stream".to_string(),
            });
        }

        let tables = (0..page_num % 3)
            .map(|i| {
                vec![
                    vec![Some("Register".to_string()), Some("Offset".to_string())],
                    vec![Some(format!("CTL{}", i)), Some(format!("0x{:02X}", page_num))],
                ]
            })
            .collect();

        Ok(RawPage {
            text: format!("Section {} timer channel {} configuration", page_num / 10, page_num),
            tables,
        })
    }
}

enum WriteLock {
    Idle,
    Held(rusqlite::Connection),
    Released,
}

/// Takes the output database's write lock on its first page, so batch
/// commits from the builder cannot proceed
struct LockingManual {
    inner: SyntheticManual,
    db_path: PathBuf,
    lock: Mutex<WriteLock>,
}

impl LockingManual {
    fn new(pages: usize, db_path: PathBuf) -> Self {
        Self {
            inner: SyntheticManual::new(pages),
            db_path,
            lock: Mutex::new(WriteLock::Idle),
        }
    }

    fn release(&self) {
        let mut lock = self.lock.lock().unwrap();
        if let WriteLock::Held(conn) = std::mem::replace(&mut *lock, WriteLock::Released) {
            conn.execute_batch("ROLLBACK").unwrap();
        }
    }

    fn extracted(&self) -> usize {
        self.inner.extracted.load(Ordering::SeqCst)
    }
}

impl PageSource for LockingManual {
    fn page_count(&self) -> usize {
        self.inner.page_count()
    }

    fn metadata(&self) -> BTreeMap<String, String> {
        self.inner.metadata()
    }

    fn extract_page(&self, page_num: u32) -> pdfdb_rs::Result<RawPage> {
        {
            let mut lock = self.lock.lock().unwrap();
            if matches!(*lock, WriteLock::Idle) {
                let conn = rusqlite::Connection::open(&self.db_path).unwrap();
                conn.execute_batch("BEGIN IMMEDIATE").unwrap();
                *lock = WriteLock::Held(conn);
            }
        }
        std::thread::sleep(Duration::from_millis(2));
        self.inner.extract_page(page_num)
    }
}

fn config(batch_size: usize, workers: usize) -> Config {
    let mut config = Config::default();
    config.build.batch_size = batch_size;
    config.build.workers = workers;
    config.build.show_progress = false;
    config
}

#[test]
fn test_250_pages_commit_in_three_batches() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("manual.db");

    let mut builder = PdfDatabaseBuilder::new(&db_path, config(100, 4)).unwrap();
    let report = builder
        .build(Arc::new(SyntheticManual::new(250)), "manual.pdf")
        .unwrap();

    assert_eq!(report.state, BuildState::Done);
    assert_eq!(report.batches_committed, 3);
    assert_eq!(report.pages_committed, 250);
    assert_eq!(report.stats.page_count, 250);

    let db = Database::open(&db_path).unwrap();
    assert_eq!(db.stats().unwrap().page_count, 250);
}

#[test]
fn test_completed_build_keeps_counts_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("manual.db");

    let mut builder = PdfDatabaseBuilder::new(&db_path, config(16, 3)).unwrap();
    let report = builder
        .build(Arc::new(SyntheticManual::new(60)), "manual.pdf")
        .unwrap();
    assert!(report.is_complete());

    let db = Database::open(&db_path).unwrap();
    let integrity = db.verify(Some(60)).unwrap();
    assert!(integrity.passed());
    // Pages 1..=60 carry page_num % 3 tables each
    assert_eq!(integrity.stats.table_count, 60);
    assert_eq!(integrity.table_count_sum, integrity.stats.table_count);
    assert_eq!(integrity.stats.fts_count, integrity.stats.page_count);
    assert_eq!(report.tables_committed, 60);
}

#[test]
fn test_rebuild_replaces_previous_output() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("manual.db");

    let mut builder = PdfDatabaseBuilder::new(&db_path, config(25, 4)).unwrap();
    let first = builder
        .build(Arc::new(SyntheticManual::new(90)), "manual.pdf")
        .unwrap();
    let second = builder
        .build(Arc::new(SyntheticManual::new(90)), "manual.pdf")
        .unwrap();

    assert_eq!(first.stats.page_count, second.stats.page_count);
    assert_eq!(first.stats.table_count, second.stats.table_count);
    assert_eq!(first.stats.metadata_count, second.stats.metadata_count);
    assert_eq!(first.stats.fts_count, second.stats.fts_count);
    assert_eq!(builder.state(), BuildState::Done);
}

#[test]
fn test_broken_pages_are_stored_empty() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("manual.db");

    let source = SyntheticManual::new(40).with_broken(&[7, 31]);
    let mut builder = PdfDatabaseBuilder::new(&db_path, config(10, 4)).unwrap();
    let report = builder.build(Arc::new(source), "manual.pdf").unwrap();

    assert!(report.is_complete());
    assert_eq!(report.extraction.failed_pages, vec![7, 31]);

    let db = Database::open(&db_path).unwrap();
    for page_num in [7, 31] {
        let page = db.get_page(page_num).unwrap().unwrap();
        assert_eq!(page.record.text, "");
        assert_eq!(page.record.char_count, 0);
        assert_eq!(page.record.table_count, 0);
        assert!(page.tables.is_empty());
    }
    let intact = db.get_page(8).unwrap().unwrap();
    assert!(intact.record.text.contains("channel 8"));
    assert_eq!(
        db.get_metadata(keys::FAILED_PAGES).unwrap().as_deref(),
        Some("[7,31]")
    );
    assert!(db.verify(Some(40)).unwrap().passed());
}

#[test]
fn test_interrupt_keeps_committed_batches() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("manual.db");

    let mut builder = PdfDatabaseBuilder::new(&db_path, config(100, 4)).unwrap();
    let mut source = SyntheticManual::new(250);
    source.interrupt_after = Some((120, builder.shutdown_flag()));

    let report = builder.build(Arc::new(source), "manual.pdf").unwrap();

    assert_eq!(report.state, BuildState::Interrupted);
    assert!(report.is_interrupted());
    assert_eq!(
        builder.history().last().copied(),
        Some(BuildState::Interrupted)
    );

    let db = Database::open(&db_path).unwrap();
    let stored = db.stats().unwrap().page_count;
    assert!((100..=124).contains(&stored), "stored {} pages", stored);
    assert_eq!(stored, report.pages_committed);
    assert_eq!(
        db.get_metadata(keys::BUILD_STATUS).unwrap().as_deref(),
        Some("interrupted")
    );

    // Whatever was saved is internally consistent
    let integrity = db.verify(None).unwrap();
    assert!(integrity.passed());
}

#[test]
fn test_missing_input_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("manual.db");

    let mut builder = PdfDatabaseBuilder::new(&db_path, config(100, 4)).unwrap();
    let err = builder
        .build_from_file(dir.path().join("does-not-exist.pdf"))
        .unwrap_err();

    assert!(matches!(err, PdfDbError::MissingInput(_)));
    assert_eq!(builder.state(), BuildState::Failed);
    assert!(!db_path.exists());
}

#[test]
fn test_metadata_records_document_and_pipeline_entries() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("manual.db");

    let mut builder = PdfDatabaseBuilder::new(&db_path, config(50, 2)).unwrap();
    builder
        .build(Arc::new(SyntheticManual::new(12)), "rh850.pdf")
        .unwrap();

    let metadata = Database::open(&db_path).unwrap().metadata().unwrap();
    assert_eq!(metadata["Title"], "RH850 Hardware Manual");
    assert_eq!(metadata[keys::SOURCE_FILE], "rh850.pdf");
    assert_eq!(metadata[keys::TOTAL_PAGES], "12");
    assert_eq!(metadata[keys::BUILD_STATUS], "completed");
    assert_eq!(metadata[keys::FAILED_PAGES], "[]");
    assert_eq!(metadata[keys::BUILDER], "pdfdb-rs");
    assert_eq!(metadata[keys::BUILDER_VERSION], pdfdb_rs::VERSION);
    assert_eq!(metadata[keys::SCHEMA_VERSION], "1");
    assert!(chrono::DateTime::parse_from_rfc3339(&metadata[keys::BUILD_TIME]).is_ok());
}

#[test]
fn test_search_finds_page_text() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("manual.db");

    let mut builder = PdfDatabaseBuilder::new(&db_path, config(8, 2)).unwrap();
    builder
        .build(Arc::new(SyntheticManual::new(30)), "manual.pdf")
        .unwrap();

    let db = Database::open(&db_path).unwrap();
    assert_eq!(db.count_matches("timer").unwrap(), 30);

    let hits = db.search("\"channel 17\"", 5).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].page_num, 17);
    assert!(
        hits[0].snippet.contains("[channel 17]"),
        "snippet {:?}",
        hits[0].snippet
    );

    // A single token is highlighted on its own
    let hits = db.search("configuration", 1).unwrap();
    assert!(hits[0].snippet.contains("[configuration]"));
}

#[test]
fn test_commit_failure_fails_the_build() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("manual.db");

    let mut config = config(4, 2);
    config.storage.busy_timeout_ms = 0;
    let mut builder = PdfDatabaseBuilder::new(&db_path, config).unwrap();

    let source = Arc::new(LockingManual::new(400, db_path.clone()));
    let err = builder.build(source.clone(), "manual.pdf").unwrap_err();

    assert!(matches!(err, PdfDbError::Commit { batch: 1, .. }), "got {}", err);
    assert_eq!(builder.state(), BuildState::Failed);
    assert!(builder
        .history()
        .ends_with(&[BuildState::Extracting, BuildState::Failed]));

    source.release();
    std::thread::sleep(Duration::from_millis(100));
    assert!(source.extracted() < 400, "extracted {} pages", source.extracted());

    // Nothing after extraction ran
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let indexes: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(indexes, 0);
    let pages: i64 = conn
        .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))
        .unwrap();
    assert_eq!(pages, 0);
    let status: String = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [keys::BUILD_STATUS],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(status, "running");
}

//! Database schema definitions
//!
//! Four logical stores: `pages`, `tables`, `metadata` and the FTS5 index
//! `pages_fts`. Secondary indexes are created after ingestion so bulk
//! inserts don't pay for index maintenance.

use crate::config::StorageConfig;
use crate::error::{PdfDbError, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::time::Duration;

/// Database schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Metadata keys written by the pipeline
pub mod keys {
    pub const SCHEMA_VERSION: &str = "schema_version";
    pub const BUILD_TIME: &str = "build_time";
    pub const BUILDER: &str = "builder";
    pub const BUILDER_VERSION: &str = "builder_version";
    pub const SOURCE_FILE: &str = "source_file";
    pub const TOTAL_PAGES: &str = "total_pages";
    pub const BUILD_STATUS: &str = "build_status";
    pub const FAILED_PAGES: &str = "failed_pages";
}

/// SQL for creating the pages table
pub const CREATE_PAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pages (
    page_num INTEGER PRIMARY KEY,
    text TEXT NOT NULL DEFAULT '',
    char_count INTEGER NOT NULL,
    table_count INTEGER NOT NULL
);
"#;

/// SQL for creating the tables table
pub const CREATE_TABLES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tables (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_num INTEGER NOT NULL,
    table_index INTEGER NOT NULL,
    content TEXT NOT NULL,
    FOREIGN KEY (page_num) REFERENCES pages(page_num)
);
"#;

/// SQL for creating the metadata table
pub const CREATE_METADATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// SQL for creating the full-text index. The FTS rowid is the page number.
pub const CREATE_PAGES_FTS: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS pages_fts USING fts5(
    page_num UNINDEXED,
    text,
    tokenize='unicode61 remove_diacritics 2'
);
"#;

/// SQL for creating secondary indexes once ingestion is done
pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_pages_char_count ON pages(char_count);
CREATE INDEX IF NOT EXISTS idx_pages_table_count ON pages(table_count);
CREATE INDEX IF NOT EXISTS idx_tables_page ON tables(page_num);
"#;

/// Apply connection pragmas. `page_size` has to precede the switch to WAL.
pub fn apply_pragmas(conn: &Connection, config: &StorageConfig) -> Result<()> {
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|e| PdfDbError::Storage(format!("Failed to set busy timeout: {}", e)))?;

    conn.execute_batch(&format!("PRAGMA page_size = {};", config.page_size))
        .map_err(|e| PdfDbError::Storage(format!("Failed to set page size: {}", e)))?;

    let journal_mode: String = conn
        .query_row(
            &format!("PRAGMA journal_mode = {}", config.journal_mode),
            [],
            |row| row.get(0),
        )
        .map_err(|e| PdfDbError::Storage(format!("Failed to set journal mode: {}", e)))?;

    let temp_store = if config.temp_store_memory { "MEMORY" } else { "DEFAULT" };
    let foreign_keys = if config.enforce_foreign_keys { "ON" } else { "OFF" };
    conn.execute_batch(&format!(
        "PRAGMA synchronous = {};
         PRAGMA cache_size = -{};
         PRAGMA temp_store = {};
         PRAGMA foreign_keys = {};",
        config.synchronous, config.cache_size_kib, temp_store, foreign_keys,
    ))
    .map_err(|e| PdfDbError::Storage(format!("Failed to apply pragmas: {}", e)))?;

    // Reports the effective size, or nothing when mmap is compiled out
    let mmap_size: Option<i64> = conn
        .query_row(&format!("PRAGMA mmap_size = {}", config.mmap_size), [], |row| row.get(0))
        .optional()
        .map_err(|e| PdfDbError::Storage(format!("Failed to set mmap size: {}", e)))?;

    log::debug!(
        "Storage pragmas applied: journal_mode={}, synchronous={}, cache={} KiB, mmap={}",
        journal_mode,
        config.synchronous,
        config.cache_size_kib,
        mmap_size.unwrap_or(0)
    );
    Ok(())
}

/// Create all stores if they are absent
pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_PAGES_TABLE)
        .map_err(|e| PdfDbError::Storage(format!("Failed to create pages table: {}", e)))?;
    conn.execute_batch(CREATE_TABLES_TABLE)
        .map_err(|e| PdfDbError::Storage(format!("Failed to create tables table: {}", e)))?;
    conn.execute_batch(CREATE_METADATA_TABLE)
        .map_err(|e| PdfDbError::Storage(format!("Failed to create metadata table: {}", e)))?;
    conn.execute_batch(CREATE_PAGES_FTS)
        .map_err(|e| PdfDbError::Storage(format!("Failed to create full-text index: {}", e)))?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        params![keys::SCHEMA_VERSION, SCHEMA_VERSION.to_string()],
    )
    .map_err(|e| PdfDbError::Storage(format!("Failed to set schema version: {}", e)))?;

    log::info!("Database schema initialized (version {})", SCHEMA_VERSION);
    Ok(())
}

/// Create secondary indexes
pub fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_INDEXES)
        .map_err(|e| PdfDbError::Storage(format!("Failed to create indexes: {}", e)))?;
    log::info!("Secondary indexes created");
    Ok(())
}

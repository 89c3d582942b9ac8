//! SQLite database operations for pdfdb-rs
//!
//! This module owns the connection to the output database: creation with
//! the configured pragmas, batch transactions, metadata upserts, and the
//! query and verification API used after a build.

use crate::config::StorageConfig;
use crate::error::{PdfDbError, Result};
use crate::storage::schema;
use crate::storage::{
    DatabaseStats, IntegrityReport, PageRecord, SearchHit, StoredPage, TableRecord, codec,
};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Database connection and operations
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Create or open a database for writing and make sure the schema exists
    pub fn create<P: AsRef<Path>>(path: P, config: &StorageConfig) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| PdfDbError::Storage(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        db.initialize(config)?;
        Ok(db)
    }

    /// Open an existing database read-only
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PdfDbError::MissingInput(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| PdfDbError::Storage(format!("Failed to open database: {}", e)))?;

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Create an in-memory database (for testing)
    pub fn memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            PdfDbError::Storage(format!("Failed to create in-memory database: {}", e))
        })?;

        let db = Self { conn, path: None };
        db.initialize(&StorageConfig::default())?;
        Ok(db)
    }

    fn initialize(&self, config: &StorageConfig) -> Result<()> {
        schema::apply_pragmas(&self.conn, config)?;
        schema::initialize(&self.conn)
    }

    /// Create the secondary indexes
    pub fn create_indexes(&self) -> Result<()> {
        schema::create_indexes(&self.conn)
    }

    /// Write one batch in a single transaction.
    ///
    /// Pages are upserted by page number; the page's previous table rows and
    /// full-text entry are replaced, so re-ingesting a page never duplicates.
    pub fn write_batch(
        &mut self,
        pages: &[PageRecord],
        tables: &[TableRecord],
    ) -> rusqlite::Result<()> {
        let tx = self.conn.transaction()?;

        {
            let mut upsert_page = tx.prepare_cached(
                r#"
                INSERT INTO pages (page_num, text, char_count, table_count)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(page_num) DO UPDATE SET
                    text = excluded.text,
                    char_count = excluded.char_count,
                    table_count = excluded.table_count
                "#,
            )?;
            let mut delete_tables = tx.prepare_cached("DELETE FROM tables WHERE page_num = ?1")?;
            let mut delete_fts = tx.prepare_cached("DELETE FROM pages_fts WHERE rowid = ?1")?;
            let mut insert_fts = tx.prepare_cached(
                "INSERT INTO pages_fts (rowid, page_num, text) VALUES (?1, ?1, ?2)",
            )?;

            for page in pages {
                upsert_page.execute(params![
                    page.page_num,
                    page.text,
                    page.char_count as i64,
                    page.table_count as i64,
                ])?;
                delete_tables.execute(params![page.page_num])?;
                delete_fts.execute(params![page.page_num])?;
                insert_fts.execute(params![page.page_num, page.text])?;
            }

            let mut insert_table = tx.prepare_cached(
                "INSERT INTO tables (page_num, table_index, content) VALUES (?1, ?2, ?3)",
            )?;
            for table in tables {
                insert_table.execute(params![
                    table.page_num,
                    table.table_index as i64,
                    table.content,
                ])?;
            }
        }

        tx.commit()
    }

    /// Insert or replace metadata entries in one transaction
    pub fn upsert_metadata<K, V, I>(&mut self, entries: I) -> Result<usize>
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| PdfDbError::Storage(format!("Failed to start transaction: {}", e)))?;

        let mut count = 0;
        {
            let mut stmt = tx
                .prepare("INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)")
                .map_err(|e| PdfDbError::Storage(format!("Failed to prepare statement: {}", e)))?;
            for (key, value) in entries {
                stmt.execute(params![key.as_ref(), value.as_ref()]).map_err(|e| {
                    PdfDbError::Storage(format!("Failed to store metadata {}: {}", key.as_ref(), e))
                })?;
                count += 1;
            }
        }

        tx.commit()
            .map_err(|e| PdfDbError::Storage(format!("Failed to commit metadata: {}", e)))?;
        Ok(count)
    }

    /// Set a single metadata entry
    pub fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.upsert_metadata([(key, value)]).map(|_| ())
    }

    /// Get a single metadata value
    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .map_err(|e| PdfDbError::Storage(format!("Failed to query metadata: {}", e)))
    }

    /// All metadata entries
    pub fn metadata(&self) -> Result<BTreeMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM metadata")
            .map_err(|e| PdfDbError::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| PdfDbError::Storage(format!("Failed to query metadata: {}", e)))?;

        let mut result = BTreeMap::new();
        for row in rows {
            let (key, value) =
                row.map_err(|e| PdfDbError::Storage(format!("Failed to read metadata row: {}", e)))?;
            result.insert(key, value);
        }
        Ok(result)
    }

    /// Full-text search over page text using the FTS5 query syntax
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT p.page_num,
                       p.char_count,
                       snippet(pages_fts, 1, '[', ']', '...', 30),
                       pages_fts.rank
                FROM pages_fts
                JOIN pages p ON p.page_num = pages_fts.rowid
                WHERE pages_fts MATCH ?1
                ORDER BY pages_fts.rank
                LIMIT ?2
                "#,
            )
            .map_err(|e| PdfDbError::Storage(format!("Failed to prepare search query: {}", e)))?;

        let hits = stmt
            .query_map(params![query, limit as i64], |row| {
                Ok(SearchHit {
                    page_num: row.get(0)?,
                    char_count: row.get::<_, i64>(1)? as usize,
                    snippet: row.get(2)?,
                    rank: row.get(3)?,
                })
            })
            .map_err(|e| PdfDbError::Storage(format!("Failed to search pages: {}", e)))?;

        let mut result = Vec::new();
        for hit in hits {
            result.push(
                hit.map_err(|e| PdfDbError::Storage(format!("Failed to read search hit: {}", e)))?,
            );
        }
        Ok(result)
    }

    /// Number of pages matching a full-text query
    pub fn count_matches(&self, query: &str) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM pages_fts WHERE pages_fts MATCH ?1",
                [query],
                |row| row.get(0),
            )
            .map_err(|e| PdfDbError::Storage(format!("Failed to count matches: {}", e)))?;
        Ok(count as usize)
    }

    /// Get a page with its decoded tables
    pub fn get_page(&self, page_num: u32) -> Result<Option<StoredPage>> {
        let record = self
            .conn
            .query_row(
                "SELECT page_num, text, char_count, table_count FROM pages WHERE page_num = ?1",
                [page_num],
                |row| {
                    Ok(PageRecord {
                        page_num: row.get(0)?,
                        text: row.get(1)?,
                        char_count: row.get::<_, i64>(2)? as usize,
                        table_count: row.get::<_, i64>(3)? as usize,
                    })
                },
            )
            .optional()
            .map_err(|e| PdfDbError::Storage(format!("Failed to query page: {}", e)))?;

        let Some(record) = record else {
            return Ok(None);
        };

        let mut stmt = self
            .conn
            .prepare("SELECT content FROM tables WHERE page_num = ?1 ORDER BY table_index")
            .map_err(|e| PdfDbError::Storage(format!("Failed to prepare query: {}", e)))?;
        let contents = stmt
            .query_map([page_num], |row| row.get::<_, String>(0))
            .map_err(|e| PdfDbError::Storage(format!("Failed to query tables: {}", e)))?;

        let mut tables = Vec::new();
        for content in contents {
            let content = content
                .map_err(|e| PdfDbError::Storage(format!("Failed to read table row: {}", e)))?;
            tables.push(codec::decode_table(&content)?);
        }

        Ok(Some(StoredPage { record, tables }))
    }

    /// Pages with the most tables, highest first
    pub fn pages_with_most_tables(&self, limit: usize) -> Result<Vec<(u32, usize)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT page_num, COUNT(*) AS cnt FROM tables
                 GROUP BY page_num ORDER BY cnt DESC, page_num LIMIT ?1",
            )
            .map_err(|e| PdfDbError::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok((row.get::<_, u32>(0)?, row.get::<_, i64>(1)? as usize))
            })
            .map_err(|e| PdfDbError::Storage(format!("Failed to query table counts: {}", e)))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(
                row.map_err(|e| PdfDbError::Storage(format!("Failed to read table count: {}", e)))?,
            );
        }
        Ok(result)
    }

    fn count(&self, sql: &str) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(sql, [], |row| row.get(0))
            .map_err(|e| PdfDbError::Storage(format!("Failed to run `{}`: {}", sql, e)))?;
        Ok(count as usize)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DatabaseStats> {
        let file_size_bytes = match &self.path {
            Some(path) => std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            None => {
                let size: i64 = self
                    .conn
                    .query_row(
                        "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                        [],
                        |row| row.get(0),
                    )
                    .map_err(|e| {
                        PdfDbError::Storage(format!("Failed to get database size: {}", e))
                    })?;
                size as u64
            }
        };

        Ok(DatabaseStats {
            page_count: self.count("SELECT COUNT(*) FROM pages")?,
            table_count: self.count("SELECT COUNT(*) FROM tables")?,
            metadata_count: self.count("SELECT COUNT(*) FROM metadata")?,
            fts_count: self.count("SELECT COUNT(*) FROM pages_fts")?,
            total_chars: self.count("SELECT COALESCE(SUM(char_count), 0) FROM pages")?,
            file_size_bytes,
        })
    }

    /// Run the post-build integrity checks
    pub fn verify(&self, expected_pages: Option<usize>) -> Result<IntegrityReport> {
        let report = IntegrityReport {
            stats: self.stats()?,
            table_count_sum: self.count("SELECT COALESCE(SUM(table_count), 0) FROM pages")?,
            orphan_tables: self.count(
                "SELECT COUNT(*) FROM tables t
                 WHERE NOT EXISTS (SELECT 1 FROM pages p WHERE p.page_num = t.page_num)",
            )?,
            expected_pages,
        };

        if report.passed() {
            log::info!("Integrity checks passed for {} pages", report.stats.page_count);
        } else {
            log::warn!(
                "Integrity checks failed: pages={}, fts={}, tables={}, table_count_sum={}, orphans={}",
                report.stats.page_count,
                report.stats.fts_count,
                report.stats.table_count,
                report.table_count_sum,
                report.orphan_tables
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(page_num: u32, text: &str, table_count: usize) -> PageRecord {
        PageRecord {
            page_num,
            text: text.to_string(),
            char_count: text.chars().count(),
            table_count,
        }
    }

    fn table(page_num: u32, table_index: usize, content: &str) -> TableRecord {
        TableRecord {
            page_num,
            table_index,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_write_batch_and_read_back() {
        let mut db = Database::memory().unwrap();
        db.write_batch(
            &[page(1, "timer array unit", 1), page(2, "clock generator", 0)],
            &[table(1, 0, r#"[["TAUJ0",null]]"#)],
        )
        .unwrap();

        let stored = db.get_page(1).unwrap().unwrap();
        assert_eq!(stored.record, page(1, "timer array unit", 1));
        assert_eq!(stored.tables, vec![vec![vec![Some("TAUJ0".to_string()), None]]]);
        assert!(db.get_page(3).unwrap().is_none());

        let stats = db.stats().unwrap();
        assert_eq!(stats.page_count, 2);
        assert_eq!(stats.table_count, 1);
        assert_eq!(stats.fts_count, 2);
        assert_eq!(stats.total_chars, 31);
    }

    #[test]
    fn test_rewriting_a_page_replaces_it() {
        let mut db = Database::memory().unwrap();
        db.write_batch(&[page(5, "old text", 2)], &[table(5, 0, "[]"), table(5, 1, "[]")])
            .unwrap();
        db.write_batch(&[page(5, "new text", 1)], &[table(5, 0, "[]")]).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.page_count, 1);
        assert_eq!(stats.table_count, 1);
        assert_eq!(stats.fts_count, 1);
        assert_eq!(db.count_matches("old").unwrap(), 0);
        assert_eq!(db.count_matches("new").unwrap(), 1);
        assert!(db.verify(Some(1)).unwrap().passed());
    }

    #[test]
    fn test_table_for_missing_page_is_rejected() {
        let mut db = Database::memory().unwrap();
        let result = db.write_batch(&[page(1, "text", 0)], &[table(99, 0, "[]")]);
        assert!(result.is_err());

        // The failed transaction left nothing behind
        assert_eq!(db.stats().unwrap().page_count, 0);
    }

    #[test]
    fn test_search_returns_ranked_snippets() {
        let mut db = Database::memory().unwrap();
        db.write_batch(
            &[
                page(1, "The interrupt controller handles interrupt requests", 0),
                page(2, "Port configuration registers", 0),
                page(3, "interrupt priority levels", 0),
            ],
            &[],
        )
        .unwrap();

        let hits = db.search("interrupt", 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.snippet.contains("[interrupt]")));
        assert!(hits.iter().any(|hit| hit.page_num == 1));
        assert!(hits.windows(2).all(|w| w[0].rank <= w[1].rank));

        assert_eq!(db.search("interrupt", 1).unwrap().len(), 1);
        assert!(db.search("nonexistentterm", 10).unwrap().is_empty());
    }

    #[test]
    fn test_metadata_upsert_replaces_values() {
        let mut db = Database::memory().unwrap();
        db.upsert_metadata([("Title", "RH850 Manual"), ("Author", "Renesas")]).unwrap();
        db.set_metadata("Title", "RH850/F1KM Manual").unwrap();

        let metadata = db.metadata().unwrap();
        assert_eq!(metadata.get("Title").map(String::as_str), Some("RH850/F1KM Manual"));
        assert_eq!(db.get_metadata("Author").unwrap().as_deref(), Some("Renesas"));
        assert_eq!(db.get_metadata("Missing").unwrap(), None);
        // Title, Author and schema_version
        assert_eq!(db.stats().unwrap().metadata_count, 3);
    }

    #[test]
    fn test_pages_with_most_tables() {
        let mut db = Database::memory().unwrap();
        db.write_batch(
            &[page(1, "a", 1), page(2, "b", 3)],
            &[table(1, 0, "[]"), table(2, 0, "[]"), table(2, 1, "[]"), table(2, 2, "[]")],
        )
        .unwrap();

        assert_eq!(db.pages_with_most_tables(5).unwrap(), vec![(2, 3), (1, 1)]);
    }

    #[test]
    fn test_open_missing_database() {
        let result = Database::open("/nonexistent/manual.db");
        assert!(matches!(result, Err(PdfDbError::MissingInput(_))));
    }
}

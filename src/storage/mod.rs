//! Storage functionality for pdfdb-rs
//!
//! This module provides the SQLite schema, the table serializer, the batch
//! writer and the read/verification API over a finished database.

pub mod codec;
pub mod database;
pub mod schema;
pub mod writer;

use crate::extract::{ExtractedPage, RawTable};

// Re-export main types
pub use database::Database;
pub use writer::{BatchWriter, CommitSummary};

/// A stored page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub page_num: u32,
    pub text: String,
    pub char_count: usize,
    pub table_count: usize,
}

/// A stored table, owned by its page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRecord {
    pub page_num: u32,
    /// 0-based, dense per page
    pub table_index: usize,
    /// Serialized grid, see [`codec`]
    pub content: String,
}

/// Split an extracted page into its page row and table rows
pub fn into_records(page: ExtractedPage) -> (PageRecord, Vec<TableRecord>) {
    let table_count = page.table_count();
    let tables = page
        .tables
        .into_iter()
        .enumerate()
        .map(|(table_index, content)| TableRecord {
            page_num: page.page_num,
            table_index,
            content,
        })
        .collect();

    let record = PageRecord {
        page_num: page.page_num,
        text: page.text,
        char_count: page.char_count,
        table_count,
    };
    (record, tables)
}

/// A page read back together with its decoded tables
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPage {
    pub record: PageRecord,
    pub tables: Vec<RawTable>,
}

/// A full-text search hit
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub page_num: u32,
    pub char_count: usize,
    /// Matching excerpt with hits wrapped in `[` `]`
    pub snippet: String,
    /// FTS5 rank, lower is better
    pub rank: f64,
}

/// Database statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseStats {
    pub page_count: usize,
    pub table_count: usize,
    pub metadata_count: usize,
    pub fts_count: usize,
    pub total_chars: usize,
    pub file_size_bytes: u64,
}

impl DatabaseStats {
    pub fn avg_chars_per_page(&self) -> usize {
        if self.page_count == 0 {
            0
        } else {
            self.total_chars / self.page_count
        }
    }
}

/// Outcome of the post-build integrity checks
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrityReport {
    pub stats: DatabaseStats,

    /// Sum of `pages.table_count`
    pub table_count_sum: usize,

    /// Table rows whose page does not exist
    pub orphan_tables: usize,

    /// Page count the caller expected, if any
    pub expected_pages: Option<usize>,
}

impl IntegrityReport {
    /// Every page has exactly one full-text entry
    pub fn fts_complete(&self) -> bool {
        self.stats.page_count == self.stats.fts_count
    }

    /// Per-page table counts agree with the tables store
    pub fn table_counts_consistent(&self) -> bool {
        self.table_count_sum == self.stats.table_count
    }

    pub fn page_count_matches(&self) -> bool {
        self.expected_pages
            .is_none_or(|expected| expected == self.stats.page_count)
    }

    pub fn passed(&self) -> bool {
        self.fts_complete()
            && self.table_counts_consistent()
            && self.page_count_matches()
            && self.orphan_tables == 0
    }
}

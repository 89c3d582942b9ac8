//! Page extraction for pdfdb-rs
//!
//! This module wraps the PDF-reading capability behind the [`PageSource`]
//! trait and turns each page into an owned [`PageOutcome`] that the batch
//! writer can store.

pub mod pdf;
pub mod page;
pub mod tables;

use crate::error::Result;
use std::collections::BTreeMap;

// Re-export main types
pub use pdf::LopdfSource;
pub use page::PageExtractor;
pub use tables::TableDetector;

/// A raw table as a grid of cells. `None` marks a cell the extractor
/// could not fill, which is distinct from an empty string.
pub type RawTable = Vec<Vec<Option<String>>>;

/// Raw extraction output for one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPage {
    pub text: String,
    pub tables: Vec<RawTable>,
}

/// An opened document that can be read page by page from several threads.
///
/// Page numbers are 1-based and dense: `1..=page_count()`.
pub trait PageSource: Send + Sync {
    /// Number of pages in the document
    fn page_count(&self) -> usize;

    /// Document-level properties (title, author, ...)
    fn metadata(&self) -> BTreeMap<String, String>;

    /// Extract text and tables from one page
    fn extract_page(&self, page_num: u32) -> Result<RawPage>;
}

/// A fully extracted page with its tables already serialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    /// 1-based page number
    pub page_num: u32,

    /// Extracted text, empty when nothing could be read
    pub text: String,

    /// Character count of `text`
    pub char_count: usize,

    /// Serialized tables in detection order
    pub tables: Vec<String>,
}

impl ExtractedPage {
    /// Build a page record from text and serialized tables
    pub fn new(page_num: u32, text: String, tables: Vec<String>) -> Self {
        let char_count = text.chars().count();
        Self {
            page_num,
            text,
            char_count,
            tables,
        }
    }

    /// The stored form of a page whose extraction failed
    pub fn empty(page_num: u32) -> Self {
        Self::new(page_num, String::new(), Vec::new())
    }

    /// Number of tables found on the page
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

/// Result of extracting one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// The page was read successfully
    Extracted(ExtractedPage),

    /// The page could not be read; it is stored as an empty record
    Failed { page_num: u32, reason: String },
}

impl PageOutcome {
    /// 1-based page number this outcome belongs to
    pub fn page_num(&self) -> u32 {
        match self {
            PageOutcome::Extracted(page) => page.page_num,
            PageOutcome::Failed { page_num, .. } => *page_num,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PageOutcome::Failed { .. })
    }

    /// Convert into the page to store, substituting an empty page on failure
    pub fn into_page(self) -> ExtractedPage {
        match self {
            PageOutcome::Extracted(page) => page,
            PageOutcome::Failed { page_num, .. } => ExtractedPage::empty(page_num),
        }
    }
}

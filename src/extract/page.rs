//! Page Extractor Adapter
//!
//! Runs one page through the [`PageSource`], serializes its tables and
//! isolates failures: an error or a panic while reading a page becomes a
//! [`PageOutcome::Failed`], never an error for the whole build.

use crate::error::PdfDbError;
use crate::extract::{ExtractedPage, PageOutcome, PageSource};
use crate::storage::codec;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Extracts individual pages from a shared document
#[derive(Clone)]
pub struct PageExtractor {
    source: Arc<dyn PageSource>,
}

impl PageExtractor {
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        Self { source }
    }

    pub fn page_count(&self) -> usize {
        self.source.page_count()
    }

    /// Extract one page. Never fails; see [`PageOutcome`].
    pub fn extract(&self, page_num: u32) -> PageOutcome {
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| self.try_extract(page_num)));

        let reason = match attempt {
            Ok(Ok(page)) => return PageOutcome::Extracted(page),
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };

        log::warn!("Page {} could not be extracted, storing empty page: {}", page_num, reason);
        PageOutcome::Failed { page_num, reason }
    }

    fn try_extract(&self, page_num: u32) -> Result<ExtractedPage, PdfDbError> {
        let raw = self.source.extract_page(page_num)?;

        let mut tables = Vec::with_capacity(raw.tables.len());
        for table in &raw.tables {
            let encoded = codec::encode_table(table).map_err(|e| PdfDbError::Extraction {
                page: page_num,
                reason: format!("Failed to serialize table: {}", e),
            })?;
            tables.push(encoded);
        }

        Ok(ExtractedPage::new(page_num, raw.text, tables))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("extractor panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("extractor panicked: {}", message)
    } else {
        "extractor panicked".to_string()
    }
}

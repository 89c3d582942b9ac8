//! Batch Writer
//!
//! Completed pages are appended to an in-memory batch behind a single lock.
//! Extraction workers never call the writer: their results arrive over the
//! scheduler's channel and the coordinating thread appends them. The lock
//! marks the hand-off boundary between the buffer and a commit. It covers
//! only the append, the running counters and the threshold check, and the
//! batch is taken out of it before the commit starts.

use crate::error::{PdfDbError, Result};
use crate::extract::PageOutcome;
use crate::storage::{Database, PageRecord, TableRecord, into_records};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Summary of one committed batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    /// 1-based batch number
    pub batch: usize,

    /// Pages in this batch
    pub pages: usize,

    /// Tables in this batch
    pub tables: usize,

    /// Pages committed so far, this batch included
    pub pages_committed: usize,

    /// Tables committed so far, this batch included
    pub tables_committed: usize,
}

/// Running totals over every appended page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterCounters {
    pub pages_received: usize,
    pub chars_received: usize,
    pub tables_received: usize,
    /// Pages whose extraction failed, in arrival order
    pub failed_pages: Vec<u32>,
}

#[derive(Debug, Default)]
struct PendingBatch {
    pages: Vec<PageRecord>,
    tables: Vec<TableRecord>,
}

#[derive(Debug, Default)]
struct BufferState {
    batch: PendingBatch,
    counters: WriterCounters,
}

/// Buffers page results and writes them one transaction per batch
pub struct BatchWriter {
    state: Mutex<BufferState>,
    batch_size: usize,
    total_pages: usize,
    batches_committed: usize,
    pages_committed: usize,
    tables_committed: usize,
}

impl BatchWriter {
    /// Create a writer for a document of `total_pages` pages
    pub fn new(batch_size: usize, total_pages: usize) -> Self {
        Self {
            state: Mutex::new(BufferState::default()),
            batch_size: batch_size.max(1),
            total_pages,
            batches_committed: 0,
            pages_committed: 0,
            tables_committed: 0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one page result.
    ///
    /// Returns `true` once the batch is full or the final page of the
    /// document has arrived, i.e. when the caller should [`flush`](Self::flush).
    pub fn append(&self, outcome: PageOutcome) -> bool {
        let failed_page = outcome.is_failed().then(|| outcome.page_num());
        let (record, tables) = into_records(outcome.into_page());

        let mut state = self.lock();
        state.counters.pages_received += 1;
        state.counters.chars_received += record.char_count;
        state.counters.tables_received += tables.len();
        if let Some(page_num) = failed_page {
            state.counters.failed_pages.push(page_num);
        }
        state.batch.pages.push(record);
        state.batch.tables.extend(tables);

        state.batch.pages.len() >= self.batch_size
            || state.counters.pages_received >= self.total_pages
    }

    /// Commit the buffered batch.
    ///
    /// Returns `Ok(None)` when nothing is buffered. On failure the batch is
    /// put back into the buffer and the error is returned.
    pub fn flush(&mut self, db: &mut Database) -> Result<Option<CommitSummary>> {
        let batch = std::mem::take(&mut self.lock().batch);
        if batch.pages.is_empty() {
            return Ok(None);
        }

        let number = self.batches_committed + 1;
        if let Err(source) = db.write_batch(&batch.pages, &batch.tables) {
            log::error!("Batch #{} ({} pages) failed to commit: {}", number, batch.pages.len(), source);
            self.restore(batch);
            return Err(PdfDbError::Commit {
                batch: number,
                source,
            });
        }

        self.batches_committed = number;
        self.pages_committed += batch.pages.len();
        self.tables_committed += batch.tables.len();

        let summary = CommitSummary {
            batch: number,
            pages: batch.pages.len(),
            tables: batch.tables.len(),
            pages_committed: self.pages_committed,
            tables_committed: self.tables_committed,
        };
        log::debug!("Committed batch #{}: {} pages, {} tables", number, summary.pages, summary.tables);
        Ok(Some(summary))
    }

    /// Put an uncommitted batch back in front of anything appended since
    fn restore(&self, mut batch: PendingBatch) {
        let mut state = self.lock();
        batch.pages.append(&mut state.batch.pages);
        batch.tables.append(&mut state.batch.tables);
        state.batch = batch;
    }

    /// Pages buffered but not yet committed
    pub fn pending_pages(&self) -> usize {
        self.lock().batch.pages.len()
    }

    pub fn pages_received(&self) -> usize {
        self.lock().counters.pages_received
    }

    /// Snapshot of the running totals
    pub fn counters(&self) -> WriterCounters {
        self.lock().counters.clone()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    pub fn batches_committed(&self) -> usize {
        self.batches_committed
    }

    pub fn pages_committed(&self) -> usize {
        self.pages_committed
    }

    pub fn tables_committed(&self) -> usize {
        self.tables_committed
    }
}

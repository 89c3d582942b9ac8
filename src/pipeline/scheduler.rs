//! Parallel Scheduler
//!
//! Page extraction fans out over a fixed-size rayon pool. Workers send each
//! [`PageOutcome`] to the coordinating thread over a crossbeam channel, and
//! only the coordinator touches the [`BatchWriter`] flush path and the
//! database, so commits never run concurrently.
//!
//! On shutdown the coordinator stops new extractions from starting, keeps
//! receiving until every in-flight result has arrived, then performs one
//! final commit of whatever is buffered.

use crate::error::Result;
use crate::extract::{PageExtractor, PageOutcome};
use crate::pipeline::progress::ProgressReporter;
use crate::storage::{BatchWriter, Database};
use crossbeam_channel::RecvTimeoutError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How often the coordinator wakes to check the shutdown flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What an interrupt handler should do with a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// First signal: stop scheduling and save what has been extracted
    Drain,
    /// Repeated signal: the caller should exit immediately
    ForceExit,
}

/// Record an interrupt on `shutdown`
pub fn signal_interrupt(shutdown: &AtomicBool) -> InterruptAction {
    if shutdown.swap(true, Ordering::SeqCst) {
        InterruptAction::ForceExit
    } else {
        InterruptAction::Drain
    }
}

/// Result of one scheduling run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// Shutdown was requested before every page was extracted
    pub interrupted: bool,
    pub total_pages: usize,
    pub pages_received: usize,
    pub chars_received: usize,
    pub tables_received: usize,
    /// Failed pages, sorted
    pub failed_pages: Vec<u32>,
}

impl ExtractionSummary {
    pub fn is_complete(&self) -> bool {
        !self.interrupted && self.pages_received == self.total_pages
    }
}

/// Distributes page extraction across a worker pool
pub struct ParallelScheduler {
    workers: usize,
    shutdown: Arc<AtomicBool>,
}

impl ParallelScheduler {
    /// Create a scheduler with `workers` threads that observes `shutdown`
    pub fn new(workers: usize, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            workers: workers.max(1),
            shutdown,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Extract every page of `extractor` and commit through `writer`.
    ///
    /// A commit failure aborts the run; pages that were still queued are
    /// skipped and the error is returned.
    pub fn run(
        &self,
        extractor: &PageExtractor,
        writer: &mut BatchWriter,
        db: &mut Database,
        progress: &ProgressReporter,
    ) -> Result<ExtractionSummary> {
        let total_pages = extractor.page_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("pdfdb-extract-{}", i))
            .build()?;

        log::info!(
            "Extracting {} pages with {} workers (batch size {})",
            total_pages,
            self.workers,
            writer.batch_size()
        );

        // Set when the coordinator bails out, so queued work is dropped
        let abort = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = crossbeam_channel::unbounded::<PageOutcome>();

        for page_num in 1..=total_pages as u32 {
            let sender = sender.clone();
            let extractor = extractor.clone();
            let shutdown = Arc::clone(&self.shutdown);
            let abort = Arc::clone(&abort);

            pool.spawn(move || {
                if shutdown.load(Ordering::SeqCst) || abort.load(Ordering::SeqCst) {
                    return;
                }
                let outcome = extractor.extract(page_num);
                // The receiver only goes away when the run has been aborted
                let _ = sender.send(outcome);
            });
        }
        drop(sender);

        let result = self.collect(&receiver, writer, db, progress);
        if result.is_err() {
            abort.store(true, Ordering::SeqCst);
        }
        let interrupted = result?;

        let counters = writer.counters();
        let mut failed_pages = counters.failed_pages;
        failed_pages.sort_unstable();

        Ok(ExtractionSummary {
            interrupted,
            total_pages,
            pages_received: counters.pages_received,
            chars_received: counters.chars_received,
            tables_received: counters.tables_received,
            failed_pages,
        })
    }

    /// Coordinator loop; returns whether shutdown was observed
    fn collect(
        &self,
        receiver: &crossbeam_channel::Receiver<PageOutcome>,
        writer: &mut BatchWriter,
        db: &mut Database,
        progress: &ProgressReporter,
    ) -> Result<bool> {
        let mut interrupted = false;

        loop {
            if !interrupted && self.shutdown.load(Ordering::SeqCst) {
                interrupted = true;
                log::warn!(
                    "Shutdown requested, waiting for in-flight pages ({} received so far)",
                    writer.pages_received()
                );
            }

            match receiver.recv_timeout(POLL_INTERVAL) {
                Ok(outcome) => {
                    let flush_due = writer.append(outcome);
                    progress.page_done(writer.pages_received());
                    if flush_due {
                        self.commit(writer, db, progress)?;
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                // Every worker task has finished or been skipped
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // Pages skipped after a shutdown leave a partial batch behind
        if writer.pending_pages() > 0 {
            if interrupted {
                log::info!("Flushing {} buffered pages before exit", writer.pending_pages());
            }
            self.commit(writer, db, progress)?;
        }

        // A flag raised after the last page arrived changes nothing
        Ok(interrupted && writer.pages_received() < writer.total_pages())
    }

    fn commit(
        &self,
        writer: &mut BatchWriter,
        db: &mut Database,
        progress: &ProgressReporter,
    ) -> Result<()> {
        if let Some(summary) = writer.flush(db)? {
            let chars = writer.counters().chars_received;
            progress.batch_committed(&summary, chars);
        }
        Ok(())
    }
}

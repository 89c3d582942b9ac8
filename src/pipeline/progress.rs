//! Progress/ETA tracking
//!
//! [`ProgressSnapshot`] does the arithmetic: throughput and a linear ETA,
//! both well-defined when nothing has happened yet. [`ProgressReporter`]
//! drives an indicatif bar and the per-batch log line.

use crate::storage::CommitSummary;
use crate::utils::{calculate_progress, format_duration, format_number};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

/// Pages completed against the total at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    pub fn new(completed: usize, total: usize, elapsed: Duration) -> Self {
        Self {
            completed,
            total,
            elapsed,
        }
    }

    /// Pages per second; 0 when no time has elapsed
    pub fn throughput(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds <= 0.0 {
            0.0
        } else {
            self.completed as f64 / seconds
        }
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }

    /// Estimated time remaining, `None` while throughput is unknown
    pub fn eta(&self) -> Option<Duration> {
        let throughput = self.throughput();
        if throughput <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(self.remaining() as f64 / throughput))
    }

    pub fn percent(&self) -> f64 {
        calculate_progress(self.completed, self.total)
    }
}

/// Wall-clock tracker for one extraction run
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    start: Instant,
    total: usize,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            start: Instant::now(),
            total,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn snapshot(&self, completed: usize) -> ProgressSnapshot {
        ProgressSnapshot::new(completed, self.total, self.elapsed())
    }
}

/// Progress bar plus per-batch log output
pub struct ProgressReporter {
    bar: ProgressBar,
    tracker: ProgressTracker,
}

impl ProgressReporter {
    /// Create a reporter; the bar stays hidden unless `visible` is set
    pub fn new(total: usize, visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(total as u64)
        } else {
            ProgressBar::hidden()
        };

        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pages ({per_sec}, ETA {eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
        bar.set_style(style);

        Self {
            bar,
            tracker: ProgressTracker::new(total),
        }
    }

    /// A hidden reporter (for tests and library use)
    pub fn hidden(total: usize) -> Self {
        Self::new(total, false)
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Record that `completed` pages have been extracted
    pub fn page_done(&self, completed: usize) {
        self.bar.set_position(completed as u64);
    }

    /// Log one committed batch with throughput and ETA
    pub fn batch_committed(&self, summary: &CommitSummary, total_chars: usize) {
        let snapshot = self.tracker.snapshot(summary.pages_committed);
        let eta = snapshot
            .eta()
            .map(|eta| format_duration(eta.as_secs_f64()))
            .unwrap_or_else(|| "unknown".to_string());

        self.bar.set_message(format!("batch #{}", summary.batch));
        self.bar.suspend(|| {
            log::info!(
                "Batch #{}: {}/{} pages ({:.1}%) | {:.1} pages/s | elapsed {} | ETA {} | chars {} | tables {}",
                summary.batch,
                format_number(snapshot.completed),
                format_number(snapshot.total),
                snapshot.percent(),
                snapshot.throughput(),
                format_duration(snapshot.elapsed.as_secs_f64()),
                eta,
                format_number(total_chars),
                format_number(summary.tables_committed),
            );
        });
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

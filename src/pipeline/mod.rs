//! Ingestion pipeline for pdfdb-rs
//!
//! The scheduler fans page extraction out over a worker pool and feeds the
//! batch writer; the builder sequences a whole build around it.

pub mod builder;
pub mod progress;
pub mod scheduler;

// Re-export main types
pub use builder::{BuildReport, BuildState, PdfDatabaseBuilder};
pub use progress::{ProgressReporter, ProgressSnapshot, ProgressTracker};
pub use scheduler::{ExtractionSummary, InterruptAction, ParallelScheduler, signal_interrupt};

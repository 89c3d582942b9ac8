//! Error types for pdfdb-rs
//!
//! This module provides the error taxonomy for the ingestion pipeline.
//! Only per-page extraction errors are recovered locally; everything else
//! surfaces to the builder, which decides the terminal state.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for pdfdb operations
#[derive(Error, Debug)]
pub enum PdfDbError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The input document does not exist
    #[error("Input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    /// Document-level PDF errors (open, page tree)
    #[error("PDF processing error: {0}")]
    Pdf(String),

    /// Extraction of a single page failed
    #[error("Extraction error on page {page}: {reason}")]
    Extraction { page: u32, reason: String },

    /// Database/storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// A batch transaction could not be committed
    #[error("Failed to commit batch #{batch}: {source}")]
    Commit {
        batch: usize,
        #[source]
        source: rusqlite::Error,
    },

    /// Worker pool errors
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for pdfdb operations
pub type Result<T> = std::result::Result<T, PdfDbError>;

impl From<rayon::ThreadPoolBuildError> for PdfDbError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        PdfDbError::Scheduler(err.to_string())
    }
}

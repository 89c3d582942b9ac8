//! # pdfdb-rs
//!
//! Parallel, batched ingestion of large PDF documents into a single SQLite
//! database with a full-text index over every page.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfdb_rs::{Config, Database, PdfDatabaseBuilder};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Build the page database with default settings
//!     let mut builder = PdfDatabaseBuilder::new("manual.db", Config::default())?;
//!     let report = builder.build_from_file("manual.pdf")?;
//!     println!("Stored {} pages in {} batches", report.pages_committed, report.batches_committed);
//!
//!     // Query it
//!     let db = Database::open("manual.db")?;
//!     for hit in db.search("brake caliper", 5)? {
//!         println!("Page {}: {}", hit.page_num, hit.snippet);
//!     }
//!
//!     Ok(())
//! }
//! ```

// Core modules
pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod storage;
pub mod utils;

// Re-export main API types
pub use config::{BuildConfig, Config, StorageConfig, TableConfig};
pub use error::{PdfDbError, Result};
pub use extract::{ExtractedPage, LopdfSource, PageExtractor, PageOutcome, PageSource, RawPage};
pub use pipeline::{BuildReport, BuildState, PdfDatabaseBuilder};
pub use storage::{BatchWriter, Database, DatabaseStats, IntegrityReport, SearchHit};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

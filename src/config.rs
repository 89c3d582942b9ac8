//! Configuration for pdfdb-rs
//!
//! All settings have working defaults; a JSON file can override any subset.

use crate::error::{PdfDbError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Pipeline settings
    pub build: BuildConfig,

    /// SQLite connection settings
    pub storage: StorageConfig,

    /// Table detection settings
    pub tables: TableConfig,
}

/// Pipeline settings: batching and parallelism
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildConfig {
    /// Pages per committed transaction
    pub batch_size: usize,

    /// Fixed number of extraction workers
    pub workers: usize,

    /// Show an interactive progress bar
    pub show_progress: bool,

    /// Builder identity recorded in the metadata store
    pub builder_name: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            workers: 4,
            show_progress: true,
            builder_name: "pdfdb-rs".to_string(),
        }
    }
}

/// SQLite pragmas applied when the output database is opened
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub journal_mode: String,
    pub synchronous: String,
    /// Page cache size in KiB
    pub cache_size_kib: i64,
    /// Memory-mapped I/O size in bytes (0 disables)
    pub mmap_size: i64,
    pub temp_store_memory: bool,
    /// Only effective on a freshly created file
    pub page_size: u32,
    pub enforce_foreign_keys: bool,
    /// How long a write waits for a lock held by another connection
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
            cache_size_kib: 128_000,
            mmap_size: 268_435_456,
            temp_store_memory: true,
            page_size: 8192,
            enforce_foreign_keys: true,
            busy_timeout_ms: 5000,
        }
    }
}

/// Table detection thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TableConfig {
    /// Minimum consecutive aligned lines to form a table
    pub min_rows: usize,

    /// Minimum cells per line to count as a table row
    pub min_columns: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            min_rows: 2,
            min_columns: 2,
        }
    }
}

const JOURNAL_MODES: &[&str] = &["DELETE", "TRUNCATE", "PERSIST", "MEMORY", "WAL", "OFF"];
const SYNCHRONOUS_MODES: &[&str] = &["OFF", "NORMAL", "FULL", "EXTRA"];

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PdfDbError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every setting is usable
    pub fn validate(&self) -> Result<()> {
        if self.build.batch_size == 0 {
            return Err(PdfDbError::Config("batch_size must be at least 1".to_string()));
        }
        if self.build.workers == 0 {
            return Err(PdfDbError::Config("workers must be at least 1".to_string()));
        }
        if self.tables.min_rows == 0 {
            return Err(PdfDbError::Config("tables.min_rows must be at least 1".to_string()));
        }
        if self.tables.min_columns < 2 {
            return Err(PdfDbError::Config(
                "tables.min_columns must be at least 2".to_string(),
            ));
        }

        let journal = self.storage.journal_mode.to_ascii_uppercase();
        if !JOURNAL_MODES.contains(&journal.as_str()) {
            return Err(PdfDbError::Config(format!(
                "Unknown journal_mode: {}",
                self.storage.journal_mode
            )));
        }
        let synchronous = self.storage.synchronous.to_ascii_uppercase();
        if !SYNCHRONOUS_MODES.contains(&synchronous.as_str()) {
            return Err(PdfDbError::Config(format!(
                "Unknown synchronous mode: {}",
                self.storage.synchronous
            )));
        }
        Ok(())
    }
}

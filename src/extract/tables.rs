//! Table detection from page text layout
//!
//! Lines whose cells are separated by tabs or runs of two or more spaces are
//! treated as table rows; a run of such lines forms one table.

use crate::config::TableConfig;
use crate::error::{PdfDbError, Result};
use crate::extract::RawTable;
use regex::Regex;

/// Detects column-aligned tables in extracted text
pub struct TableDetector {
    min_rows: usize,
    min_columns: usize,
    cell_separator: Regex,
}

impl TableDetector {
    pub fn new(config: &TableConfig) -> Result<Self> {
        let cell_separator = Regex::new(r"\t+|\s{2,}").map_err(|e| {
            PdfDbError::Config(format!("Failed to compile cell separator regex: {}", e))
        })?;

        Ok(Self {
            min_rows: config.min_rows,
            min_columns: config.min_columns,
            cell_separator,
        })
    }

    /// Create a detector with the default thresholds
    pub fn with_default_config() -> Result<Self> {
        Self::new(&TableConfig::default())
    }

    /// Detect every table in `text`, in reading order
    pub fn detect(&self, text: &str) -> Vec<RawTable> {
        let mut tables = Vec::new();
        let mut run: Vec<Vec<String>> = Vec::new();

        for line in text.lines() {
            let cells = self.split_cells(line);
            if cells.len() >= self.min_columns {
                run.push(cells);
            } else {
                self.close_run(&mut run, &mut tables);
            }
        }
        self.close_run(&mut run, &mut tables);

        tables
    }

    fn split_cells(&self, line: &str) -> Vec<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        self.cell_separator
            .split(trimmed)
            .map(|cell| cell.to_string())
            .collect()
    }

    fn close_run(&self, run: &mut Vec<Vec<String>>, tables: &mut Vec<RawTable>) {
        if run.len() >= self.min_rows {
            let width = run.iter().map(Vec::len).max().unwrap_or(0);
            let table = run
                .drain(..)
                .map(|row| {
                    let mut cells: Vec<Option<String>> = row.into_iter().map(Some).collect();
                    cells.resize(width, None);
                    cells
                })
                .collect();
            tables.push(table);
        }
        run.clear();
    }
}

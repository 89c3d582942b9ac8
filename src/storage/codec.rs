//! Table Serializer
//!
//! Tables are stored as JSON arrays of rows, each row an array of cells.
//! Absent cells are `null`, empty cells are `""`, and non-ASCII text is
//! written as-is rather than escaped.

use crate::error::Result;
use crate::extract::RawTable;

/// Encode a table grid for storage
pub fn encode_table(table: &RawTable) -> Result<String> {
    Ok(serde_json::to_string(table)?)
}

/// Decode a stored table grid
pub fn decode_table(content: &str) -> Result<RawTable> {
    Ok(serde_json::from_str(content)?)
}

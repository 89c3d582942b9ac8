//! lopdf-backed [`PageSource`]
//!
//! Loads the whole document once and serves per-page text to the worker
//! pool. Tables are derived from the page text with a [`TableDetector`].

use crate::config::TableConfig;
use crate::error::{PdfDbError, Result};
use crate::extract::{PageSource, RawPage, TableDetector};
use lopdf::{Dictionary, Document, Object};
use std::collections::BTreeMap;
use std::path::Path;

/// A PDF document opened with lopdf
pub struct LopdfSource {
    document: Document,
    /// Page numbers as numbered by the page tree, in document order
    page_numbers: Vec<u32>,
    detector: TableDetector,
}

impl LopdfSource {
    /// Open a PDF file
    pub fn open<P: AsRef<Path>>(path: P, tables: &TableConfig) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PdfDbError::MissingInput(path.to_path_buf()));
        }

        let document = Document::load(path)
            .map_err(|e| PdfDbError::Pdf(format!("Failed to open {}: {}", path.display(), e)))?;
        let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();

        log::info!("Opened {} ({} pages)", path.display(), page_numbers.len());

        Ok(Self {
            document,
            page_numbers,
            detector: TableDetector::new(tables)?,
        })
    }

    fn info_dictionary(&self) -> Option<&Dictionary> {
        match self.document.trailer.get(b"Info").ok()? {
            Object::Reference(id) => self.document.get_dictionary(*id).ok(),
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    fn object_to_string(&self, object: &Object) -> Option<String> {
        match object {
            Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
            Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
            Object::Integer(value) => Some(value.to_string()),
            Object::Real(value) => Some(value.to_string()),
            Object::Boolean(value) => Some(value.to_string()),
            Object::Reference(id) => match self.document.get_object(*id).ok()? {
                Object::Reference(_) => None,
                resolved => self.object_to_string(resolved),
            },
            _ => None,
        }
    }
}

impl PageSource for LopdfSource {
    fn page_count(&self) -> usize {
        self.page_numbers.len()
    }

    fn metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        if let Some(info) = self.info_dictionary() {
            for (key, value) in info.iter() {
                if let Some(value) = self.object_to_string(value) {
                    metadata.insert(String::from_utf8_lossy(key).into_owned(), value);
                }
            }
        }
        metadata
    }

    fn extract_page(&self, page_num: u32) -> Result<RawPage> {
        // `page_num` is the 1-based position; the page tree numbering is
        // normally identical but is looked up rather than assumed.
        let tree_number = page_num
            .checked_sub(1)
            .and_then(|index| self.page_numbers.get(index as usize))
            .copied()
            .ok_or_else(|| PdfDbError::Extraction {
                page: page_num,
                reason: format!("page out of range (document has {})", self.page_count()),
            })?;

        let text = self
            .document
            .extract_text(&[tree_number])
            .map_err(|e| PdfDbError::Extraction {
                page: page_num,
                reason: e.to_string(),
            })?;
        let tables = self.detector.detect(&text);

        Ok(RawPage { text, tables })
    }
}

/// Decode a PDF text string: UTF-16BE with a byte-order mark, otherwise
/// UTF-8 when valid, otherwise a byte-per-character Latin-1 reading.
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

//! PDF text extraction.
//!
//! Thin wrapper over `pdf-extract`: bytes in, one text per page out. The
//! ingestion pipeline decides what an empty extraction means; this module
//! only reports what the document contains.

use thiserror::Error;

/// Extraction failure. The pipeline stores the message on the document
/// record for operator visibility.
#[derive(Debug, Error)]
#[error("PDF extraction failed: {0}")]
pub struct ExtractError(pub String);

/// Extract per-page text from a PDF. Page order follows document order.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| ExtractError(e.to_string()))
}

/// Join page texts into a single string with one `--- Page N ---` marker
/// line ahead of each page. This is the delimiter convention the chunker
/// parses; page numbers start at 1.
pub fn page_marked_text(pages: &[String]) -> String {
    let mut out = String::new();
    for (i, page) in pages.iter().enumerate() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("--- Page {} ---\n", i + 1));
        out.push_str(page.trim_end());
    }
    out
}

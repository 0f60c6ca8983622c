//! Page-marker text chunker.
//!
//! Splits extracted document text into bounded-size [`PageChunk`]s while
//! tracking which page each chunk came from. Input is expected to carry one
//! `--- Page N ---` marker line ahead of each page (see
//! [`crate::extract::page_marked_text`]); a marker whose number does not
//! parse advances the page counter by one instead of failing.
//!
//! No overlap is applied between chunks; the overlap setting in
//! [`crate::config::ChunkingConfig`] is reserved for a future splitter.

use crate::models::PageChunk;

/// Split page-marked text into chunks of at most roughly `max_chars` bytes.
///
/// A chunk is flushed when a page marker is encountered (attributed to the
/// page the buffer was read from) and whenever the running buffer exceeds
/// `max_chars` (attributed to the current page, even mid-page). Returns an
/// empty vector only for empty or whitespace-only input.
pub fn chunk_pages(raw: &str, max_chars: usize) -> Vec<PageChunk> {
    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut page: u32 = 1;

    for line in raw.lines() {
        match parse_page_marker(line) {
            Some(marker) => {
                flush(&mut chunks, &mut buf, page);
                page = marker.unwrap_or(page + 1);
            }
            None => {
                if !buf.is_empty() {
                    buf.push('\n');
                }
                buf.push_str(line);
                if buf.len() > max_chars {
                    flush(&mut chunks, &mut buf, page);
                }
            }
        }
    }

    flush(&mut chunks, &mut buf, page);
    chunks
}

fn flush(chunks: &mut Vec<PageChunk>, buf: &mut String, page: u32) {
    let text = buf.trim();
    if !text.is_empty() {
        chunks.push(PageChunk {
            text: text.to_string(),
            page,
        });
    }
    buf.clear();
}

/// Recognize a `--- Page N ---` marker line (case-insensitive, whitespace
/// tolerated). Returns `None` for ordinary lines, `Some(None)` for a marker
/// whose number cannot be parsed, and `Some(Some(n))` otherwise.
fn parse_page_marker(line: &str) -> Option<Option<u32>> {
    let inner = line
        .trim()
        .strip_prefix("---")?
        .strip_suffix("---")?
        .trim();
    let lower = inner.to_lowercase();
    let number = lower.strip_prefix("page")?.trim();
    match number.parse::<u32>() {
        Ok(n) if n >= 1 => Some(Some(n)),
        _ => Some(None),
    }
}

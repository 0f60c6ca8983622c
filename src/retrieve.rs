use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;

use crate::models::DocumentStatus;

/// A stored chunk scored against a question.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk_id: i64,
    pub document_id: i64,
    pub text: String,
    pub page: i64,
    pub filename: String,
    /// Number of distinct question terms found in the chunk text.
    pub score: usize,
}

/// Lexical score: how many distinct question terms appear as literal
/// substrings of the lowercased chunk text. A term counts once no matter how
/// often it occurs.
pub fn score_text(terms: &HashSet<String>, text: &str) -> usize {
    let lower = text.to_lowercase();
    terms.iter().filter(|t| lower.contains(t.as_str())).count()
}

/// Lowercase, whitespace-tokenized question terms, deduplicated.
pub fn question_terms(question: &str) -> HashSet<String> {
    question
        .to_lowercase()
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

/// Score every chunk of every `ready` document under `chatbot` against the
/// question and return the top `limit`, descending by score. Zero-score
/// chunks are dropped; ties keep store iteration order (document id, then
/// chunk index). The full scan is fine at this corpus scale; an inverted
/// index would be an optimization, not a behavior change.
pub async fn search_chunks(
    pool: &SqlitePool,
    chatbot: &str,
    question: &str,
    limit: usize,
) -> Result<Vec<ScoredChunk>> {
    let terms = question_terms(question);
    if terms.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query(
        r#"
        SELECT c.id, c.document_id, c.text, c.page_number, d.original_filename
        FROM document_chunks c
        JOIN documents d ON d.id = c.document_id
        WHERE d.chatbot = ? AND d.status = ?
        ORDER BY c.document_id, c.chunk_index
        "#,
    )
    .bind(chatbot)
    .bind(DocumentStatus::Ready.as_str())
    .fetch_all(pool)
    .await?;

    let mut scored: Vec<ScoredChunk> = rows
        .iter()
        .filter_map(|row| {
            let text: String = row.get("text");
            let score = score_text(&terms, &text);
            if score == 0 {
                return None;
            }
            Some(ScoredChunk {
                chunk_id: row.get("id"),
                document_id: row.get("document_id"),
                text,
                page: row.get("page_number"),
                filename: row.get("original_filename"),
                score,
            })
        })
        .collect();

    // Stable sort keeps the iteration order for equal scores
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.truncate(limit);

    Ok(scored)
}

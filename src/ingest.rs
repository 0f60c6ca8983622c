//! Document ingestion pipeline.
//!
//! Coordinates the flow from a staged upload to searchable chunks:
//! record creation → per-page extraction → page-marked chunking → bulk chunk
//! storage → status transition. Runs off the request path on a spawned task.
//! There is no partial success: either every chunk lands and the document
//! becomes `ready`, or none do and it becomes `failed` with the error stored
//! for operator visibility. The staged file is removed on both paths.

use anyhow::{bail, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

use crate::chunk::chunk_pages;
use crate::config::Config;
use crate::extract;
use crate::models::DocumentStatus;

/// Outcome reported to the upload caller and the logs.
#[derive(Debug, Serialize)]
pub struct IngestReport {
    pub status: &'static str,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Document listing entry for the admin surface.
#[derive(Debug, Serialize)]
pub struct DocumentInfo {
    pub id: i64,
    pub filename: String,
    pub status: String,
    pub pages: Option<i64>,
    pub chunks: Option<i64>,
    pub uploaded_at: Option<String>,
    pub processed_at: Option<String>,
}

/// Run the full pipeline for a staged upload.
pub async fn process_document(
    pool: &SqlitePool,
    config: &Config,
    staged_path: &Path,
    original_filename: &str,
    chatbot: &str,
) -> IngestReport {
    let document_id = match create_document_record(pool, chatbot, original_filename, staged_path)
        .await
    {
        Ok(id) => id,
        Err(error) => {
            warn!(%error, filename = original_filename, "failed to create document record");
            remove_staged_file(staged_path).await;
            return IngestReport {
                status: "error",
                filename: original_filename.to_string(),
                document_id: None,
                pages: None,
                chunks: None,
                message: None,
                error: Some(error.to_string()),
            };
        }
    };

    info!(document_id, filename = original_filename, "processing document");

    let outcome = run_pipeline(pool, config, document_id, staged_path).await;
    remove_staged_file(staged_path).await;

    match outcome {
        Ok((pages, chunks)) => {
            info!(document_id, pages, chunks, "document processing completed");
            IngestReport {
                status: "success",
                filename: original_filename.to_string(),
                document_id: Some(document_id),
                pages: Some(pages as i64),
                chunks: Some(chunks as i64),
                message: Some(format!("Successfully processed {}", original_filename)),
                error: None,
            }
        }
        Err(error) => {
            warn!(document_id, %error, "document processing failed");
            if let Err(mark_error) = mark_failed(pool, document_id, &error.to_string()).await {
                warn!(document_id, %mark_error, "failed to record processing failure");
            }
            IngestReport {
                status: "error",
                filename: original_filename.to_string(),
                document_id: Some(document_id),
                pages: None,
                chunks: None,
                message: None,
                error: Some(error.to_string()),
            }
        }
    }
}

async fn run_pipeline(
    pool: &SqlitePool,
    config: &Config,
    document_id: i64,
    staged_path: &Path,
) -> Result<(usize, usize)> {
    let bytes = tokio::fs::read(staged_path).await?;
    let pages = extract::extract_pages(&bytes)?;

    if pages.iter().all(|p| p.trim().is_empty()) {
        bail!("no content extracted from PDF");
    }

    ingest_pages(pool, config.chunking.chunk_size, document_id, &pages).await
}

/// Chunk extracted page texts and persist them, transitioning the document
/// to `ready`. Exposed separately from [`process_document`] so the chunking
/// and storage stages can be driven without a real PDF.
pub async fn ingest_pages(
    pool: &SqlitePool,
    chunk_size: usize,
    document_id: i64,
    pages: &[String],
) -> Result<(usize, usize)> {
    let marked = extract::page_marked_text(pages);
    let chunks = chunk_pages(&marked, chunk_size);
    if chunks.is_empty() {
        bail!("document produced no text chunks");
    }

    let now = Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    for (index, chunk) in chunks.iter().enumerate() {
        sqlx::query(
            "INSERT INTO document_chunks (document_id, chunk_index, text, page_number) VALUES (?, ?, ?, ?)",
        )
        .bind(document_id)
        .bind(index as i64)
        .bind(&chunk.text)
        .bind(chunk.page as i64)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        "UPDATE documents SET status = ?, page_count = ?, chunk_count = ?, processed_at = ? WHERE id = ?",
    )
    .bind(DocumentStatus::Ready.as_str())
    .bind(pages.len() as i64)
    .bind(chunks.len() as i64)
    .bind(now)
    .bind(document_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok((pages.len(), chunks.len()))
}

async fn create_document_record(
    pool: &SqlitePool,
    chatbot: &str,
    original_filename: &str,
    staged_path: &Path,
) -> Result<i64> {
    let now = Utc::now().timestamp();
    let file_size = tokio::fs::metadata(staged_path)
        .await
        .map(|m| m.len() as i64)
        .unwrap_or(0);
    let stored_name = format!("student_{}_{}", now, original_filename);

    let result = sqlx::query(
        r#"
        INSERT INTO documents (chatbot, filename, original_filename, file_path, file_size,
                               status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(chatbot)
    .bind(&stored_name)
    .bind(original_filename)
    .bind(staged_path.display().to_string())
    .bind(file_size)
    .bind(DocumentStatus::Processing.as_str())
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

async fn mark_failed(pool: &SqlitePool, document_id: i64, error: &str) -> Result<()> {
    sqlx::query("UPDATE documents SET status = ?, processing_error = ? WHERE id = ?")
        .bind(DocumentStatus::Failed.as_str())
        .bind(error)
        .bind(document_id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn remove_staged_file(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await {
        if error.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), %error, "failed to remove staged upload");
        }
    }
}

/// List documents under a chatbot scope, newest first.
pub async fn list_documents(pool: &SqlitePool, chatbot: &str) -> Result<Vec<DocumentInfo>> {
    let rows = sqlx::query(
        r#"
        SELECT id, original_filename, status, page_count, chunk_count, created_at, processed_at
        FROM documents WHERE chatbot = ? ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(chatbot)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| DocumentInfo {
            id: row.get("id"),
            filename: row.get("original_filename"),
            status: row.get("status"),
            pages: row.get("page_count"),
            chunks: row.get("chunk_count"),
            uploaded_at: iso_timestamp(Some(row.get("created_at"))),
            processed_at: iso_timestamp(row.get("processed_at")),
        })
        .collect())
}

/// Delete a document and, via the cascade, all of its chunks. Returns false
/// when the document does not exist.
pub async fn delete_document(pool: &SqlitePool, document_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(document_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn iso_timestamp(value: Option<i64>) -> Option<String> {
    value
        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.to_rfc3339())
}

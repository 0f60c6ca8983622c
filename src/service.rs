//! The answering service behind the HTTP surface.
//!
//! [`Responder`] is the capability the request handlers hold: answer a
//! question, ingest a staged upload, manage documents, report health. Two
//! implementations exist and are chosen once at startup:
//!
//! - [`ChatService`] — the real pipeline, owning the store handle and the
//!   language-model provider.
//! - [`OfflineResponder`] — a degraded stand-in used when the model provider
//!   cannot be constructed; every answer is a fixed apology and ingestion is
//!   refused, but the process stays up and the direct-chat relay keeps
//!   working.
//!
//! Selection happens at construction time, never by swapping attributes at
//! runtime, and handlers receive the service by reference through the
//! application state.

use async_trait::async_trait;
use serde_json::json;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use crate::config::Config;
use crate::ingest::{self, DocumentInfo, IngestReport};
use crate::llm::{self, LanguageModel};
use crate::models::{ChatAnswer, DocumentStatus, STUDENT_CHATBOT};
use crate::query;

/// Canned reply when the whole service is degraded.
pub const UNAVAILABLE_REPLY: &str = "I'm sorry, I'm having trouble processing your \
    question right now. Please try again later.";

/// Capabilities the HTTP layer needs from the answering service.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn answer(&self, question: &str, session_id: Option<String>) -> ChatAnswer;

    async fn ingest(&self, staged_path: PathBuf, original_filename: String) -> IngestReport;

    async fn list_documents(&self) -> anyhow::Result<Vec<DocumentInfo>>;

    async fn delete_document(&self, document_id: i64) -> anyhow::Result<bool>;

    async fn health_check(&self) -> serde_json::Value;
}

/// Build the responder for this process. Falls back to the degraded variant
/// when the language-model provider cannot be constructed (missing API key,
/// unknown provider), so a misconfigured deployment still serves canned
/// replies and the relay.
pub fn build_responder(config: Arc<Config>, pool: SqlitePool) -> Arc<dyn Responder> {
    match llm::create_model(&config.llm) {
        Ok(model) => Arc::new(ChatService {
            pool,
            config,
            model,
        }),
        Err(error) => {
            warn!(%error, "language model unavailable; starting degraded responder");
            Arc::new(OfflineResponder)
        }
    }
}

/// The real answering service.
pub struct ChatService {
    pool: SqlitePool,
    config: Arc<Config>,
    model: Box<dyn LanguageModel>,
}

impl ChatService {
    pub fn new(config: Arc<Config>, pool: SqlitePool, model: Box<dyn LanguageModel>) -> Self {
        Self {
            pool,
            config,
            model,
        }
    }
}

#[async_trait]
impl Responder for ChatService {
    async fn answer(&self, question: &str, session_id: Option<String>) -> ChatAnswer {
        query::answer_question(
            &self.pool,
            &self.config,
            self.model.as_ref(),
            question,
            session_id,
        )
        .await
    }

    async fn ingest(&self, staged_path: PathBuf, original_filename: String) -> IngestReport {
        ingest::process_document(
            &self.pool,
            &self.config,
            &staged_path,
            &original_filename,
            STUDENT_CHATBOT,
        )
        .await
    }

    async fn list_documents(&self) -> anyhow::Result<Vec<DocumentInfo>> {
        ingest::list_documents(&self.pool, STUDENT_CHATBOT).await
    }

    async fn delete_document(&self, document_id: i64) -> anyhow::Result<bool> {
        ingest::delete_document(&self.pool, document_id).await
    }

    async fn health_check(&self) -> serde_json::Value {
        let documents: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM documents WHERE chatbot = ? AND status = ?",
        )
        .bind(STUDENT_CHATBOT)
        .bind(DocumentStatus::Ready.as_str())
        .fetch_one(&self.pool)
        .await
        .unwrap_or(0);

        json!({
            "status": "healthy",
            "llm": self.model.model_name(),
            "documents": documents,
        })
    }
}

/// Degraded no-op variant.
pub struct OfflineResponder;

#[async_trait]
impl Responder for OfflineResponder {
    async fn answer(&self, _question: &str, session_id: Option<String>) -> ChatAnswer {
        ChatAnswer {
            answer: UNAVAILABLE_REPLY.to_string(),
            sources: Vec::new(),
            response_time_ms: 0,
            session_id,
        }
    }

    async fn ingest(&self, staged_path: PathBuf, original_filename: String) -> IngestReport {
        // Nothing will process the staged file; remove it here
        let _ = tokio::fs::remove_file(&staged_path).await;
        IngestReport {
            status: "error",
            filename: original_filename,
            document_id: None,
            pages: None,
            chunks: None,
            message: None,
            error: Some("answering service is unavailable".to_string()),
        }
    }

    async fn list_documents(&self) -> anyhow::Result<Vec<DocumentInfo>> {
        Ok(Vec::new())
    }

    async fn delete_document(&self, _document_id: i64) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn health_check(&self) -> serde_json::Value {
        json!({ "status": "degraded", "llm": "unavailable" })
    }
}

//! Core data types used throughout the chatbot backend.
//!
//! These types represent the documents, chunks, relay chats, and answers that
//! flow through the ingestion, question-answering, and direct-chat pipelines.

use serde::Serialize;

/// The only chatbot scope this deployment serves.
pub const STUDENT_CHATBOT: &str = "student";

/// Lifecycle status of an uploaded document.
///
/// Moves forward only: `uploading → processing → {ready|failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploading,
    Processing,
    Ready,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploading => "uploading",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "uploading" => Some(DocumentStatus::Uploading),
            "processing" => Some(DocumentStatus::Processing),
            "ready" => Some(DocumentStatus::Ready),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }
}

/// An uploaded source document as stored in SQLite.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: i64,
    pub chatbot: String,
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub status: DocumentStatus,
    pub page_count: Option<i64>,
    pub chunk_count: Option<i64>,
    pub processing_error: Option<String>,
    pub created_at: i64,
    pub processed_at: Option<i64>,
}

/// A bounded span of extracted text produced by the chunker, before storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageChunk {
    pub text: String,
    pub page: u32,
}

/// Status of a direct (human-handoff) chat session.
///
/// `waiting → active` on the first admin reply; `{waiting|active} → closed`
/// is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    Waiting,
    Active,
    Closed,
}

impl ChatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatStatus::Waiting => "waiting",
            ChatStatus::Active => "active",
            ChatStatus::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "waiting" => Some(ChatStatus::Waiting),
            "active" => Some(ChatStatus::Active),
            "closed" => Some(ChatStatus::Closed),
            _ => None,
        }
    }
}

/// Who sent a relay message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Admin,
    System,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Admin => "admin",
            Sender::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Sender::User),
            "admin" => Some(Sender::Admin),
            "system" => Some(Sender::System),
            _ => None,
        }
    }
}

/// One direct-chat session between an anonymous visitor and the admin.
#[derive(Debug, Clone, Serialize)]
pub struct DirectChat {
    pub id: i64,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_ip: Option<String>,
    pub status: ChatStatus,
    pub created_at: i64,
    pub last_activity: i64,
}

/// One message in a direct chat. The identifier is strictly increasing and
/// doubles as the client polling watermark.
#[derive(Debug, Clone, Serialize)]
pub struct DirectMessage {
    pub id: i64,
    pub chat_id: i64,
    pub sender: Sender,
    pub text: String,
    pub sent_at: i64,
}

/// Citation for one retrieved chunk, computed for analytics and suppressed
/// from public responses.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub page: i64,
    pub filename: String,
    pub chunk_id: i64,
    pub confidence: f64,
}

/// Structured result of the question-answering pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub response_time_ms: i64,
    pub session_id: Option<String>,
}

//! Question-answering orchestration.
//!
//! Sequences the intent gate, lexical retrieval, and grounded generation,
//! then logs the interaction best-effort. Every failure on this path
//! degrades to a canned reply: the student-facing surface always gets an
//! answer, never an error.

use sqlx::SqlitePool;
use std::time::Instant;
use tracing::warn;

use crate::answer::{self, NO_CONTEXT_REPLY};
use crate::config::Config;
use crate::intent::{self, Intent};
use crate::llm::LanguageModel;
use crate::models::{ChatAnswer, SourceRef, STUDENT_CHATBOT};
use crate::retrieve;

/// Fixed placeholder latency reported for small-talk replies; nothing is
/// measured on that path.
pub const SMALL_TALK_LATENCY_MS: i64 = 5;

/// Answer a student question.
///
/// Small talk returns its canned reply immediately. Otherwise chunks are
/// retrieved and a grounded answer generated, with the wall clock measured
/// across retrieval plus generation. Sources are always computed here for
/// the audit log; the HTTP layer strips them before responding.
pub async fn answer_question(
    pool: &SqlitePool,
    config: &Config,
    model: &dyn LanguageModel,
    question: &str,
    session_id: Option<String>,
) -> ChatAnswer {
    if let Intent::SmallTalk(reply) = intent::classify(question) {
        return ChatAnswer {
            answer: reply.to_string(),
            sources: Vec::new(),
            response_time_ms: SMALL_TALK_LATENCY_MS,
            session_id,
        };
    }

    let started = Instant::now();

    let chunks = match retrieve::search_chunks(
        pool,
        STUDENT_CHATBOT,
        question,
        config.retrieval.top_k,
    )
    .await
    {
        Ok(chunks) => chunks,
        Err(error) => {
            warn!(%error, "chunk retrieval failed; degrading to canned reply");
            Vec::new()
        }
    };

    if chunks.is_empty() {
        return ChatAnswer {
            answer: NO_CONTEXT_REPLY.to_string(),
            sources: Vec::new(),
            response_time_ms: 0,
            session_id,
        };
    }

    let term_count = retrieve::question_terms(question).len().max(1);
    let sources: Vec<SourceRef> = chunks
        .iter()
        .map(|c| SourceRef {
            page: c.page,
            filename: c.filename.clone(),
            chunk_id: c.chunk_id,
            confidence: c.score as f64 / term_count as f64,
        })
        .collect();

    let (answer_text, response_time_ms) = match answer::generate(model, question, &chunks).await {
        Ok(text) => (text, started.elapsed().as_millis() as i64),
        Err(error) => {
            warn!(%error, "answer generation failed; degrading to canned reply");
            (NO_CONTEXT_REPLY.to_string(), 0)
        }
    };

    if config.analytics.enabled {
        log_conversation(
            pool,
            question,
            &answer_text,
            &sources,
            response_time_ms,
            session_id.as_deref(),
        );
    }

    ChatAnswer {
        answer: answer_text,
        sources,
        response_time_ms,
        session_id,
    }
}

/// Fire-and-forget audit write. A logging failure must never affect the
/// answer, so the insert runs on its own task and only warns.
fn log_conversation(
    pool: &SqlitePool,
    question: &str,
    answer: &str,
    sources: &[SourceRef],
    response_time_ms: i64,
    session_id: Option<&str>,
) {
    let pool = pool.clone();
    let question = question.to_string();
    let answer = answer.to_string();
    let sources_json = serde_json::to_string(sources).unwrap_or_default();
    let session_id = session_id.unwrap_or("anonymous").to_string();
    let now = chrono::Utc::now().timestamp();

    tokio::spawn(async move {
        let result = sqlx::query(
            r#"
            INSERT INTO conversations (chatbot, session_id, question, answer,
                                       response_time_ms, sources_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(STUDENT_CHATBOT)
        .bind(&session_id)
        .bind(&question)
        .bind(&answer)
        .bind(response_time_ms)
        .bind(&sources_json)
        .bind(now)
        .execute(&pool)
        .await;

        if let Err(error) = result {
            warn!(%error, "failed to record conversation");
        }
    });
}

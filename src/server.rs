//! HTTP surface for the chatbot backend.
//!
//! Exposes the question-answering pipeline, document management, and the
//! direct-chat relay over a JSON API suitable for the embeddable widget and
//! the admin dashboard.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (database + responder status) |
//! | `POST` | `/chat/student` | Public widget chat endpoint |
//! | `POST` | `/admin/chat/test` | Admin test chat endpoint |
//! | `POST` | `/admin/documents` | Upload a PDF (multipart), processed in background |
//! | `GET`  | `/admin/documents` | List documents |
//! | `DELETE` | `/admin/documents/{id}` | Delete a document and its chunks |
//! | `GET`  | `/admin/analytics` | Conversation totals and recent questions |
//! | `POST` | `/direct/message` | Visitor relay message (creates the chat) |
//! | `GET`  | `/direct/poll` | Visitor polling (`?session_id=&last_seen_id=`) |
//! | `POST` | `/direct/close` | Close a relay session |
//! | `GET`  | `/admin/direct` | Admin relay inbox |
//! | `POST` | `/admin/direct/{chat_id}/message` | Admin relay reply |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `chat_closed` (409),
//! `internal` (500).
//!
//! # Response Policy
//!
//! Chat responses expose `sources: []` and `response_time_ms: 0` on both the
//! public and the admin-test endpoint. The pipeline computes real values for
//! the audit log; the suppression here is product behavior (answers read as
//! natural conversation, without citations), not an omission.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the widget can be
//! embedded on any site.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::models::{ChatAnswer, STUDENT_CHATBOT};
use crate::relay::{self, RelayError};
use crate::service::{self, Responder};
use crate::{db, migrate};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    responder: Arc<dyn Responder>,
}

impl AppState {
    pub fn new(config: Arc<Config>, pool: SqlitePool, responder: Arc<dyn Responder>) -> Self {
        Self {
            config,
            pool,
            responder,
        }
    }
}

/// Start the HTTP server: connect the store, run migrations, construct the
/// responder once, and serve until the process is terminated.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config);

    let pool = db::connect(&config).await?;
    migrate::run_migrations(&pool).await?;

    let responder = service::build_responder(config.clone(), pool.clone());
    let state = AppState::new(config, pool, responder);
    let app = build_router(state);

    info!(addr = %bind_addr, "chatbot backend listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Assemble the router. Kept separate from [`run_server`] so tests can drive
/// the routes directly.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let upload_limit = (state.config.uploads.max_file_size_mb as usize + 1) * 1024 * 1024;

    Router::new()
        .route("/health", get(handle_health))
        .route("/chat/student", post(handle_public_chat))
        .route("/admin/chat/test", post(handle_admin_test_chat))
        .route(
            "/admin/documents",
            get(handle_list_documents).post(handle_upload_document),
        )
        .route("/admin/documents/{id}", delete(handle_delete_document))
        .route("/admin/analytics", get(handle_analytics))
        .route("/direct/message", post(handle_user_message))
        .route("/direct/poll", get(handle_poll))
        .route("/direct/close", post(handle_close))
        .route("/admin/direct", get(handle_list_chats))
        .route("/admin/direct/{chat_id}/message", post(handle_admin_message))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

/// JSON error body shared by every endpoint.
#[derive(serde::Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(serde::Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::NotFound => not_found("chat not found"),
            RelayError::Closed => AppError {
                status: StatusCode::CONFLICT,
                code: "chat_closed".to_string(),
                message: "chat is closed".to_string(),
            },
            RelayError::Storage(e) => internal(e.to_string()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        internal(err.to_string())
    }
}

// ============ GET /health ============

async fn handle_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let database = sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
        "responder": state.responder.health_check().await,
    }))
}

// ============ Chat endpoints ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

/// Public widget endpoint. A missing session id is generated server-side so
/// follow-up questions can be correlated in the audit log.
async fn handle_public_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatAnswer>, AppError> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let session_id = request
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let reply = state.responder.answer(message, Some(session_id)).await;
    Ok(Json(suppress_citations(reply)))
}

/// Admin test endpoint; behaves like the public one under a tagged session
/// id so test traffic is distinguishable in the audit log.
async fn handle_admin_test_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatAnswer>, AppError> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let session_id = format!("admin_test_{}", Uuid::new_v4());
    let reply = state.responder.answer(message, Some(session_id)).await;
    Ok(Json(suppress_citations(reply)))
}

/// Product policy: the conversational surface never exposes citations or
/// timings, even though the pipeline computes both for the audit log.
fn suppress_citations(mut reply: ChatAnswer) -> ChatAnswer {
    reply.sources.clear();
    reply.response_time_ms = 0;
    reply
}

// ============ Document endpoints ============

async fn handle_upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(sanitize_filename)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| bad_request("uploaded file must have a name"))?;

        if !extension_allowed(&filename, &state.config.uploads.allowed_extensions) {
            return Err(bad_request(format!(
                "File type not allowed. Only {} are supported.",
                state.config.uploads.allowed_extensions.join(", ")
            )));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| bad_request(e.to_string()))?;

        let max_bytes = state.config.uploads.max_file_size_mb * 1024 * 1024;
        if data.len() as u64 > max_bytes {
            return Err(bad_request(format!(
                "File too large. Maximum size is {}MB.",
                state.config.uploads.max_file_size_mb
            )));
        }

        tokio::fs::create_dir_all(&state.config.uploads.dir)
            .await
            .map_err(|e| internal(e.to_string()))?;
        let staged = state
            .config
            .uploads
            .dir
            .join(format!("{}_{}", Uuid::new_v4(), filename));
        tokio::fs::write(&staged, &data)
            .await
            .map_err(|e| internal(e.to_string()))?;

        info!(filename = %filename, staged = %staged.display(), "PDF upload accepted");

        // Ingestion continues after this response returns
        let responder = state.responder.clone();
        let original = filename.clone();
        tokio::spawn(async move {
            let report = responder.ingest(staged, original).await;
            info!(
                status = report.status,
                filename = %report.filename,
                "background ingestion finished"
            );
        });

        return Ok(Json(json!({
            "message": format!("File {} uploaded successfully. Processing in background.", filename),
            "filename": filename,
            "status": "processing",
        })));
    }

    Err(bad_request("multipart field 'file' is required"))
}

/// Keep only the final path component of a client-supplied filename.
fn sanitize_filename(raw: &str) -> String {
    raw.rsplit(['/', '\\']).next().unwrap_or("").to_string()
}

fn extension_allowed(filename: &str, allowed: &[String]) -> bool {
    let lower = filename.to_lowercase();
    allowed.iter().any(|ext| lower.ends_with(ext.as_str()))
}

async fn handle_list_documents(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let documents = state
        .responder
        .list_documents()
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(json!({ "documents": documents })))
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = state
        .responder
        .delete_document(id)
        .await
        .map_err(|e| internal(e.to_string()))?;

    if !deleted {
        return Err(not_found("document not found"));
    }
    Ok(Json(json!({ "message": "Document deleted successfully" })))
}

// ============ Analytics ============

async fn handle_analytics(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE chatbot = ?")
        .bind(STUDENT_CHATBOT)
        .fetch_one(&state.pool)
        .await?;

    let rows = sqlx::query(
        r#"
        SELECT question, response_time_ms, created_at
        FROM conversations WHERE chatbot = ?
        ORDER BY created_at DESC, id DESC LIMIT 10
        "#,
    )
    .bind(STUDENT_CHATBOT)
    .fetch_all(&state.pool)
    .await?;

    let recent: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            let question: String = row.get("question");
            let truncated = if question.chars().count() > 100 {
                let head: String = question.chars().take(100).collect();
                format!("{head}...")
            } else {
                question
            };
            json!({
                "question": truncated,
                "response_time_ms": row.get::<Option<i64>, _>("response_time_ms"),
                "created_at": row.get::<i64, _>("created_at"),
            })
        })
        .collect();

    Ok(Json(json!({
        "total_conversations": total,
        "recent_conversations": recent,
    })))
}

// ============ Direct-chat relay ============

#[derive(Deserialize)]
struct UserMessageRequest {
    session_id: String,
    text: String,
}

async fn handle_user_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<UserMessageRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if request.session_id.trim().is_empty() {
        return Err(bad_request("session_id must not be empty"));
    }
    if request.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }

    let user_ip = client_ip(&headers);
    let message = relay::post_user_message(
        &state.pool,
        request.session_id.trim(),
        request.text.trim(),
        user_ip.as_deref(),
    )
    .await?;

    Ok(Json(json!({ "message": message })))
}

/// First address in `x-forwarded-for`, when a proxy supplies one.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Deserialize)]
struct PollParams {
    session_id: String,
    #[serde(default)]
    last_seen_id: i64,
}

async fn handle_poll(
    State(state): State<AppState>,
    Query(params): Query<PollParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let messages =
        relay::poll_new_messages(&state.pool, &params.session_id, params.last_seen_id).await?;
    Ok(Json(json!({ "messages": messages })))
}

#[derive(Deserialize)]
struct CloseRequest {
    session_id: String,
    #[serde(default)]
    reason: Option<String>,
}

async fn handle_close(
    State(state): State<AppState>,
    Json(request): Json<CloseRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let closed =
        relay::close_session(&state.pool, &request.session_id, request.reason.as_deref()).await?;
    Ok(Json(json!({ "closed": closed })))
}

async fn handle_list_chats(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let chats = relay::list_chats(&state.pool).await?;
    Ok(Json(json!({ "chats": chats })))
}

#[derive(Deserialize)]
struct AdminMessageRequest {
    text: String,
}

async fn handle_admin_message(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Json(request): Json<AdminMessageRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if request.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }

    let message = relay::post_admin_message(&state.pool, chat_id, request.text.trim()).await?;
    Ok(Json(json!({ "message": message })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{DocumentInfo, IngestReport};
    use crate::models::SourceRef;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use std::path::PathBuf;
    use tower::ServiceExt;

    /// Responder that reports sources and latency, to prove the HTTP layer
    /// strips them.
    struct CitingResponder;

    #[async_trait]
    impl Responder for CitingResponder {
        async fn answer(&self, _question: &str, session_id: Option<String>) -> ChatAnswer {
            ChatAnswer {
                answer: "Enrollment opens March 1.".to_string(),
                sources: vec![SourceRef {
                    page: 1,
                    filename: "handbook.pdf".to_string(),
                    chunk_id: 7,
                    confidence: 1.0,
                }],
                response_time_ms: 42,
                session_id,
            }
        }

        async fn ingest(&self, _staged_path: PathBuf, original_filename: String) -> IngestReport {
            IngestReport {
                status: "success",
                filename: original_filename,
                document_id: Some(1),
                pages: Some(1),
                chunks: Some(1),
                message: None,
                error: None,
            }
        }

        async fn list_documents(&self) -> anyhow::Result<Vec<DocumentInfo>> {
            Ok(Vec::new())
        }

        async fn delete_document(&self, _document_id: i64) -> anyhow::Result<bool> {
            Ok(false)
        }

        async fn health_check(&self) -> serde_json::Value {
            json!({ "status": "healthy" })
        }
    }

    async fn test_state(responder: Arc<dyn Responder>) -> AppState {
        let pool = db::connect_memory().await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        AppState::new(Arc::new(Config::minimal()), pool, responder)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_database_and_responder() {
        let app = build_router(test_state(Arc::new(CitingResponder)).await);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], true);
        assert_eq!(body["responder"]["status"], "healthy");
    }

    #[tokio::test]
    async fn public_chat_suppresses_sources_and_timing() {
        let app = build_router(test_state(Arc::new(CitingResponder)).await);
        let response = app
            .oneshot(json_request(
                Method::POST,
                "/chat/student",
                json!({ "message": "When does enrollment open?" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["answer"], "Enrollment opens March 1.");
        assert_eq!(body["sources"], json!([]));
        assert_eq!(body["response_time_ms"], 0);
        assert!(body["session_id"].as_str().is_some(), "session id generated");
    }

    #[tokio::test]
    async fn empty_chat_message_is_rejected() {
        let app = build_router(test_state(Arc::new(CitingResponder)).await);
        let response = app
            .oneshot(json_request(
                Method::POST,
                "/chat/student",
                json!({ "message": "   " }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn relay_flow_over_http() {
        let state = test_state(Arc::new(CitingResponder)).await;
        let app = build_router(state.clone());

        // Visitor posts a message; the chat is created implicitly
        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/direct/message",
                json!({ "session_id": "sess-http", "text": "is anyone there?" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Admin sees the chat in the inbox
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/admin/direct")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        let chat_id = body["chats"][0]["id"].as_i64().unwrap();
        assert_eq!(body["chats"][0]["status"], "waiting");

        // Admin replies; the visitor polls everything past watermark 0
        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                &format!("/admin/direct/{chat_id}/message"),
                json!({ "text": "yes, how can I help?" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/direct/poll?session_id=sess-http&last_seen_id=0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["sender"], "admin");

        // Replying to an unknown chat is a 404
        let response = app
            .oneshot(json_request(
                Method::POST,
                "/admin/direct/9999/message",
                json!({ "text": "hello?" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_missing_document_is_not_found() {
        let app = build_router(test_state(Arc::new(CitingResponder)).await);
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/admin/documents/5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn upload_validation_helpers() {
        let allowed = vec![".pdf".to_string()];
        assert!(extension_allowed("handbook.pdf", &allowed));
        assert!(extension_allowed("HANDBOOK.PDF", &allowed));
        assert!(!extension_allowed("notes.docx", &allowed));
        assert!(!extension_allowed("pdf", &allowed));

        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename(r"C:\docs\handbook.pdf"), "handbook.pdf");
        assert_eq!(sanitize_filename("handbook.pdf"), "handbook.pdf");
    }
}

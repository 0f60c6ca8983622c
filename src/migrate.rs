use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Uploaded source documents
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chatbot TEXT NOT NULL,
            filename TEXT NOT NULL,
            original_filename TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'uploading',
            page_count INTEGER,
            chunk_count INTEGER,
            processing_error TEXT,
            created_at INTEGER NOT NULL,
            processed_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Extracted text chunks, bulk-written by ingestion and immutable after
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            page_number INTEGER NOT NULL,
            start_char INTEGER,
            end_char INTEGER,
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Human-handoff chat sessions; session_id uniqueness guards the
    // create-on-first-message race
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS direct_chats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL UNIQUE,
            user_ip TEXT,
            status TEXT NOT NULL DEFAULT 'waiting',
            created_at INTEGER NOT NULL,
            last_activity INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Relay messages; the rowid is the client polling watermark
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS direct_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id INTEGER NOT NULL,
            sender TEXT NOT NULL,
            text TEXT NOT NULL,
            sent_at INTEGER NOT NULL,
            FOREIGN KEY (chat_id) REFERENCES direct_chats(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Write-only audit log of answered questions
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chatbot TEXT NOT NULL,
            session_id TEXT NOT NULL,
            question TEXT NOT NULL,
            answer TEXT NOT NULL,
            response_time_ms INTEGER,
            sources_json TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON document_chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(chatbot, status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_chat_id ON direct_messages(chat_id, id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_conversations_created ON conversations(chatbot, created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

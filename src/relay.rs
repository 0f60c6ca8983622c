//! Direct-chat relay between website visitors and a live admin.
//!
//! A chat is created in `waiting` on the first user message (or implicitly
//! by any user message for an unknown session token), becomes `active` the
//! moment the admin replies, and is `closed` terminally by an explicit close
//! or a user-departure signal. Delivery is pull-based: both sides poll with
//! a last-seen message id and receive everything strictly newer, so a client
//! that never moves its watermark backwards sees every message at least
//! once.
//!
//! Every operation re-reads current state from the store; the unique index
//! on `session_id` is what makes concurrent first messages collapse into a
//! single chat.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use crate::models::{ChatStatus, DirectChat, DirectMessage, Sender};

/// Relay failures callers branch on. `NotFound` and `Closed` are
/// admin-facing conditions; `Storage` is a genuine fault.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("chat not found")]
    NotFound,
    #[error("chat is closed")]
    Closed,
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// Append a visitor message, creating the chat in `waiting` if the session
/// is new. Creation is upsert-based, so two racing first messages for the
/// same session end up in one chat. Posting into a closed chat appends the
/// message without reopening it.
pub async fn post_user_message(
    pool: &SqlitePool,
    session_id: &str,
    text: &str,
    user_ip: Option<&str>,
) -> Result<DirectMessage, RelayError> {
    let now = Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO direct_chats (session_id, user_ip, status, created_at, last_activity)
        VALUES (?, ?, 'waiting', ?, ?)
        ON CONFLICT(session_id) DO UPDATE SET last_activity = excluded.last_activity
        "#,
    )
    .bind(session_id)
    .bind(user_ip)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let chat_id: i64 = sqlx::query_scalar("SELECT id FROM direct_chats WHERE session_id = ?")
        .bind(session_id)
        .fetch_one(pool)
        .await?;

    append_message(pool, chat_id, Sender::User, text, now).await
}

/// Append an admin reply. The chat must exist and not be closed; a reply
/// into a `waiting` chat activates it.
pub async fn post_admin_message(
    pool: &SqlitePool,
    chat_id: i64,
    text: &str,
) -> Result<DirectMessage, RelayError> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM direct_chats WHERE id = ?")
            .bind(chat_id)
            .fetch_optional(pool)
            .await?;

    match status.as_deref().and_then(ChatStatus::parse) {
        None => return Err(RelayError::NotFound),
        Some(ChatStatus::Closed) => return Err(RelayError::Closed),
        Some(_) => {}
    }

    let now = Utc::now().timestamp();
    let message = append_message(pool, chat_id, Sender::Admin, text, now).await?;

    sqlx::query(
        "UPDATE direct_chats SET status = 'active', last_activity = ? WHERE id = ? AND status = 'waiting'",
    )
    .bind(now)
    .bind(chat_id)
    .execute(pool)
    .await?;

    Ok(message)
}

/// Return all messages with id strictly greater than `last_seen_id`, oldest
/// first. Polling an unknown session is a normal condition and yields an
/// empty list.
pub async fn poll_new_messages(
    pool: &SqlitePool,
    session_id: &str,
    last_seen_id: i64,
) -> Result<Vec<DirectMessage>, RelayError> {
    let chat_id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM direct_chats WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(pool)
            .await?;

    let Some(chat_id) = chat_id else {
        return Ok(Vec::new());
    };

    let rows = sqlx::query(
        "SELECT id, chat_id, sender, text, sent_at FROM direct_messages WHERE chat_id = ? AND id > ? ORDER BY id ASC",
    )
    .bind(chat_id)
    .bind(last_seen_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_message).collect())
}

/// Mark the chat closed and record the reason as a system message. A no-op
/// (not an error) when the session is unknown or already closed. Returns
/// whether a chat was actually closed.
pub async fn close_session(
    pool: &SqlitePool,
    session_id: &str,
    reason: Option<&str>,
) -> Result<bool, RelayError> {
    let row = sqlx::query("SELECT id, status FROM direct_chats WHERE session_id = ?")
        .bind(session_id)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(false);
    };
    let chat_id: i64 = row.get("id");
    let status: String = row.get("status");
    if ChatStatus::parse(&status) == Some(ChatStatus::Closed) {
        return Ok(false);
    }

    let now = Utc::now().timestamp();
    let note = match reason {
        Some(r) if !r.trim().is_empty() => format!("chat closed: {}", r.trim()),
        _ => "chat closed".to_string(),
    };

    sqlx::query("UPDATE direct_chats SET status = 'closed', last_activity = ? WHERE id = ?")
        .bind(now)
        .bind(chat_id)
        .execute(pool)
        .await?;

    append_message(pool, chat_id, Sender::System, &note, now).await?;
    Ok(true)
}

/// All chats, most recent activity first, for the admin inbox.
pub async fn list_chats(pool: &SqlitePool) -> Result<Vec<DirectChat>, RelayError> {
    let rows = sqlx::query(
        "SELECT id, session_id, user_ip, status, created_at, last_activity FROM direct_chats ORDER BY last_activity DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let status: String = row.get("status");
            DirectChat {
                id: row.get("id"),
                session_id: row.get("session_id"),
                user_ip: row.get("user_ip"),
                status: ChatStatus::parse(&status).unwrap_or(ChatStatus::Closed),
                created_at: row.get("created_at"),
                last_activity: row.get("last_activity"),
            }
        })
        .collect())
}

async fn append_message(
    pool: &SqlitePool,
    chat_id: i64,
    sender: Sender,
    text: &str,
    now: i64,
) -> Result<DirectMessage, RelayError> {
    let result = sqlx::query(
        "INSERT INTO direct_messages (chat_id, sender, text, sent_at) VALUES (?, ?, ?, ?)",
    )
    .bind(chat_id)
    .bind(sender.as_str())
    .bind(text)
    .bind(now)
    .execute(pool)
    .await?;

    sqlx::query("UPDATE direct_chats SET last_activity = ? WHERE id = ?")
        .bind(now)
        .bind(chat_id)
        .execute(pool)
        .await?;

    Ok(DirectMessage {
        id: result.last_insert_rowid(),
        chat_id,
        sender,
        text: text.to_string(),
        sent_at: now,
    })
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> DirectMessage {
    let sender: String = row.get("sender");
    DirectMessage {
        id: row.get("id"),
        chat_id: row.get("chat_id"),
        sender: Sender::parse(&sender).unwrap_or(Sender::System),
        text: row.get("text"),
        sent_at: row.get("sent_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};

    async fn test_pool() -> SqlitePool {
        let pool = db::connect_memory().await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn repeated_user_messages_share_one_chat() {
        let pool = test_pool().await;

        post_user_message(&pool, "sess-1", "first", Some("203.0.113.9"))
            .await
            .unwrap();
        post_user_message(&pool, "sess-1", "second", None)
            .await
            .unwrap();

        let chats = list_chats(&pool).await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].status, ChatStatus::Waiting);
        assert_eq!(chats[0].user_ip.as_deref(), Some("203.0.113.9"));

        let messages = poll_new_messages(&pool, "sess-1", 0).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "first");
        assert_eq!(messages[1].text, "second");
    }

    #[tokio::test]
    async fn admin_reply_activates_and_watermark_advances() {
        let pool = test_pool().await;

        post_user_message(&pool, "sess-2", "anyone there?", None)
            .await
            .unwrap();
        let chats = list_chats(&pool).await.unwrap();
        let chat_id = chats[0].id;

        post_admin_message(&pool, chat_id, "yes, how can I help?")
            .await
            .unwrap();
        assert_eq!(list_chats(&pool).await.unwrap()[0].status, ChatStatus::Active);

        let all = poll_new_messages(&pool, "sess-2", 0).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].sender, Sender::Admin);

        // Strictly-greater-than filter: re-polling past the watermark is empty
        let newer = poll_new_messages(&pool, "sess-2", all[1].id).await.unwrap();
        assert!(newer.is_empty());

        // A stale watermark re-delivers; nothing is ever skipped
        let replay = poll_new_messages(&pool, "sess-2", all[0].id).await.unwrap();
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0].id, all[1].id);
    }

    #[tokio::test]
    async fn closing_is_terminal_and_rejects_admin_messages() {
        let pool = test_pool().await;

        post_user_message(&pool, "sess-3", "hello?", None).await.unwrap();
        let chat_id = list_chats(&pool).await.unwrap()[0].id;

        assert!(close_session(&pool, "sess-3", Some("user left the page"))
            .await
            .unwrap());
        assert_eq!(list_chats(&pool).await.unwrap()[0].status, ChatStatus::Closed);

        // The departure note is visible to a polling client
        let messages = poll_new_messages(&pool, "sess-3", 0).await.unwrap();
        let last = messages.last().unwrap();
        assert_eq!(last.sender, Sender::System);
        assert!(last.text.contains("user left the page"));

        let err = post_admin_message(&pool, chat_id, "too late").await.unwrap_err();
        assert!(matches!(err, RelayError::Closed));
        assert_eq!(list_chats(&pool).await.unwrap()[0].status, ChatStatus::Closed);

        // Closing again is a no-op, not an error
        assert!(!close_session(&pool, "sess-3", None).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_sessions_are_not_errors_for_the_user_side() {
        let pool = test_pool().await;

        assert!(poll_new_messages(&pool, "missing", 0).await.unwrap().is_empty());
        assert!(!close_session(&pool, "missing", None).await.unwrap());

        let err = post_admin_message(&pool, 42, "hello").await.unwrap_err();
        assert!(matches!(err, RelayError::NotFound));
    }
}

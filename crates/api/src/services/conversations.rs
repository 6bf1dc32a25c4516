use chrono::Utc;
use serde::Deserialize;
use sqlx::{Row, SqliteConnection, SqlitePool};

use mentorlink_auth::{new_public_id, User};

use super::{error::ServiceError, requests, users};
use crate::models::{Conversation, Message, UserRef};

pub const MAX_MESSAGE_CHARS: usize = 4_000;

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub participant_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// A conversation the caller participates in, resolved from its public id.
#[derive(Debug, Clone)]
pub struct Membership {
    pub conversation_id: i64,
    pub public_id: String,
    pub participant_ids: Vec<i64>,
}

impl Membership {
    pub fn others(&self, user_id: i64) -> Vec<i64> {
        self.participant_ids
            .iter()
            .copied()
            .filter(|id| *id != user_id)
            .collect()
    }
}

fn direct_key(a: i64, b: i64) -> String {
    format!("{}:{}", a.min(b), a.max(b))
}

/// Find the two-person conversation between `a` and `b`, creating it when absent.
///
/// The insert comes first and is keyed on the unique `direct_key`, so the
/// write lock is taken before anything is read and concurrent callers for the
/// same pair end up with the same row. Run it inside a transaction.
pub async fn ensure_direct_conversation(
    conn: &mut SqliteConnection,
    a: i64,
    b: i64,
) -> Result<(i64, String), ServiceError> {
    let key = direct_key(a, b);
    let now = Utc::now().to_rfc3339();
    let public_id = new_public_id();

    let inserted = sqlx::query(
        r#"
        INSERT INTO conversations (public_id, direct_key, title, created_at, updated_at)
        VALUES (?, ?, NULL, ?, ?)
        ON CONFLICT (direct_key) DO NOTHING
        "#,
    )
    .bind(&public_id)
    .bind(&key)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    if inserted.rows_affected() == 0 {
        let row = sqlx::query("SELECT id, public_id FROM conversations WHERE direct_key = ?")
            .bind(&key)
            .fetch_one(&mut *conn)
            .await?;
        return Ok((row.try_get("id")?, row.try_get("public_id")?));
    }

    let id = inserted.last_insert_rowid();
    for (position, user_id) in [a, b].into_iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO conversation_participants (conversation_id, user_id, position, joined_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(position as i64)
        .bind(&now)
        .execute(&mut *conn)
        .await?;
    }

    Ok((id, public_id))
}

/// Resolve a conversation and check that `user_id` takes part in it.
pub async fn membership(
    pool: &SqlitePool,
    conversation_public_id: &str,
    user_id: i64,
) -> Result<Membership, ServiceError> {
    let conversation_id: i64 = sqlx::query_scalar("SELECT id FROM conversations WHERE public_id = ?")
        .bind(conversation_public_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Conversation not found"))?;

    let participant_ids: Vec<i64> = sqlx::query_scalar(
        "SELECT user_id FROM conversation_participants WHERE conversation_id = ? ORDER BY position",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    if !participant_ids.contains(&user_id) {
        return Err(ServiceError::forbidden("Not a participant of this conversation"));
    }

    Ok(Membership {
        conversation_id,
        public_id: conversation_public_id.to_string(),
        participant_ids,
    })
}

pub async fn shares_conversation(pool: &SqlitePool, a: i64, b: i64) -> Result<bool, ServiceError> {
    let shared: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT 1 FROM conversation_participants pa
        JOIN conversation_participants pb ON pb.conversation_id = pa.conversation_id
        WHERE pa.user_id = ? AND pb.user_id = ?
        LIMIT 1
        "#,
    )
    .bind(a)
    .bind(b)
    .fetch_optional(pool)
    .await?;
    Ok(shared.is_some())
}

async fn load_conversation(
    pool: &SqlitePool,
    conversation_id: i64,
    viewer_id: i64,
) -> Result<Conversation, ServiceError> {
    let row = sqlx::query(
        r#"
        SELECT c.id, c.public_id, c.title, c.created_at, c.updated_at, p.last_read_message_id
        FROM conversations c
        JOIN conversation_participants p ON p.conversation_id = c.id AND p.user_id = ?
        WHERE c.id = ?
        "#,
    )
    .bind(viewer_id)
    .bind(conversation_id)
    .fetch_one(pool)
    .await?;

    let last_read: Option<i64> = row.try_get("last_read_message_id")?;

    let participants = sqlx::query(
        r#"
        SELECT u.public_id, u.display_name
        FROM conversation_participants p
        JOIN users u ON u.id = p.user_id
        WHERE p.conversation_id = ?
        ORDER BY p.position
        "#,
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| {
        Ok(UserRef {
            public_id: row.try_get("public_id")?,
            display_name: row.try_get("display_name")?,
        })
    })
    .collect::<Result<Vec<_>, sqlx::Error>>()?;

    let last_message = sqlx::query(&format!(
        "{} WHERE m.conversation_id = ? ORDER BY m.id DESC LIMIT 1",
        Message::SELECT
    ))
    .bind(conversation_id)
    .fetch_optional(pool)
    .await?
    .as_ref()
    .map(Message::from_row)
    .transpose()?;

    let unread_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM messages WHERE conversation_id = ? AND sender_id != ? AND id > ?",
    )
    .bind(conversation_id)
    .bind(viewer_id)
    .bind(last_read.unwrap_or(0))
    .fetch_one(pool)
    .await?;

    Ok(Conversation {
        id: row.try_get("id")?,
        public_id: row.try_get("public_id")?,
        title: row.try_get("title")?,
        participants,
        last_message,
        unread_count,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn list_conversations(pool: &SqlitePool, user_id: i64) -> Result<Vec<Conversation>, ServiceError> {
    let ids: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT c.id FROM conversations c
        JOIN conversation_participants p ON p.conversation_id = c.id
        WHERE p.user_id = ?
        ORDER BY c.updated_at DESC, c.id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut conversations = Vec::with_capacity(ids.len());
    for id in ids {
        conversations.push(load_conversation(pool, id, user_id).await?);
    }
    Ok(conversations)
}

/// Open a direct conversation with another user. Requires a shared accepted
/// mentorship; an existing conversation between the pair is returned as is.
pub async fn create_conversation(
    pool: &SqlitePool,
    user: &User,
    req: CreateConversationRequest,
) -> Result<Conversation, ServiceError> {
    let other = users::find_by_public_id(pool, req.participant_id.trim()).await?;
    if other.id == user.id {
        return Err(ServiceError::bad_request("Cannot start a conversation with yourself"));
    }
    if requests::accepted_between(pool, user.id, other.id).await?.is_none() {
        return Err(ServiceError::forbidden(
            "Conversations require an accepted mentorship",
        ));
    }

    let mut tx = pool.begin().await?;
    let (id, _) = ensure_direct_conversation(&mut tx, user.id, other.id).await?;
    tx.commit().await?;

    load_conversation(pool, id, user.id).await
}

/// Messages newest first. `before` is a message public id acting as cursor.
pub async fn list_messages(
    pool: &SqlitePool,
    conversation_public_id: &str,
    user_id: i64,
    before: Option<&str>,
    limit: i64,
) -> Result<Vec<Message>, ServiceError> {
    let membership = membership(pool, conversation_public_id, user_id).await?;

    let cursor = match before {
        Some(before) => Some(
            sqlx::query_scalar::<_, i64>(
                "SELECT id FROM messages WHERE public_id = ? AND conversation_id = ?",
            )
            .bind(before)
            .bind(membership.conversation_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ServiceError::bad_request("Unknown `before` cursor"))?,
        ),
        None => None,
    };

    let rows = sqlx::query(&format!(
        "{} WHERE m.conversation_id = ? AND (? IS NULL OR m.id < ?) ORDER BY m.id DESC LIMIT ?",
        Message::SELECT
    ))
    .bind(membership.conversation_id)
    .bind(cursor)
    .bind(cursor)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(Message::from_row).collect()
}

pub fn validate_content(content: &str) -> Result<&str, ServiceError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ServiceError::bad_request("Message content cannot be empty"));
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ServiceError::bad_request(format!(
            "Message content must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(content)
}

/// Store a message. Returns it together with the recipients (every other
/// participant) so the caller can relay it.
pub async fn send_message(
    pool: &SqlitePool,
    conversation_public_id: &str,
    sender: &User,
    content: &str,
) -> Result<(Message, Vec<i64>), ServiceError> {
    let content = validate_content(content)?;
    let membership = membership(pool, conversation_public_id, sender.id).await?;
    let now = Utc::now().to_rfc3339();
    let public_id = new_public_id();

    let mut tx = pool.begin().await?;

    let id = sqlx::query(
        r#"
        INSERT INTO messages (public_id, conversation_id, sender_id, content, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(membership.conversation_id)
    .bind(sender.id)
    .bind(content)
    .bind(&now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
        .bind(&now)
        .bind(membership.conversation_id)
        .execute(&mut *tx)
        .await?;

    // The sender has read everything up to their own message.
    sqlx::query(
        "UPDATE conversation_participants SET last_read_message_id = ? WHERE conversation_id = ? AND user_id = ?",
    )
    .bind(id)
    .bind(membership.conversation_id)
    .bind(sender.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let message = Message {
        id,
        public_id,
        conversation_id: membership.public_id.clone(),
        sender: UserRef {
            public_id: sender.public_id.clone(),
            display_name: sender.display_name.clone(),
        },
        content: content.to_string(),
        created_at: now,
    };

    Ok((message, membership.others(sender.id)))
}

/// Move the caller's read marker forward. Without `message_id` the marker
/// jumps to the newest message. Returns the public id of the marker message.
pub async fn mark_read(
    pool: &SqlitePool,
    conversation_public_id: &str,
    user_id: i64,
    message_id: Option<&str>,
) -> Result<Option<String>, ServiceError> {
    let membership = membership(pool, conversation_public_id, user_id).await?;

    let target = match message_id {
        Some(message_id) => sqlx::query(
            "SELECT id, public_id FROM messages WHERE public_id = ? AND conversation_id = ?",
        )
        .bind(message_id)
        .bind(membership.conversation_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Message not found"))
        .map(Some)?,
        None => sqlx::query(
            "SELECT id, public_id FROM messages WHERE conversation_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(membership.conversation_id)
        .fetch_optional(pool)
        .await?,
    };

    let Some(target) = target else {
        return Ok(None);
    };
    let target_id: i64 = target.try_get("id")?;
    let target_public_id: String = target.try_get("public_id")?;

    // Markers never move backwards.
    sqlx::query(
        r#"
        UPDATE conversation_participants
        SET last_read_message_id = MAX(COALESCE(last_read_message_id, 0), ?)
        WHERE conversation_id = ? AND user_id = ?
        "#,
    )
    .bind(target_id)
    .bind(membership.conversation_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(Some(target_public_id))
}

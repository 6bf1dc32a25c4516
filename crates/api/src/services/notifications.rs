use chrono::Utc;
use sqlx::SqlitePool;

use super::error::ServiceError;
use crate::models::Notification;

/// Fields of a notification about to be stored.
#[derive(Debug, Clone, Copy)]
pub struct NewNotification<'a> {
    pub kind: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub link: Option<&'a str>,
}

pub async fn create(
    pool: &SqlitePool,
    user_id: i64,
    notification: NewNotification<'_>,
) -> Result<Notification, ServiceError> {
    let now = Utc::now().to_rfc3339();

    let id = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, type, title, body, link, read, created_at)
        VALUES (?, ?, ?, ?, ?, FALSE, ?)
        "#,
    )
    .bind(user_id)
    .bind(notification.kind)
    .bind(notification.title)
    .bind(notification.body)
    .bind(notification.link)
    .bind(&now)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(Notification {
        id,
        kind: notification.kind.to_string(),
        title: notification.title.to_string(),
        body: notification.body.to_string(),
        link: notification.link.map(str::to_string),
        read: false,
        created_at: now,
    })
}

pub async fn list(
    pool: &SqlitePool,
    user_id: i64,
    unread_only: bool,
    limit: i64,
    offset: i64,
) -> Result<Vec<Notification>, ServiceError> {
    let rows = sqlx::query(
        r#"
        SELECT id, type, title, body, link, read, created_at
        FROM notifications
        WHERE user_id = ? AND (? = FALSE OR read = FALSE)
        ORDER BY id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(user_id)
    .bind(unread_only)
    .bind(limit)
    .bind(offset.max(0))
    .fetch_all(pool)
    .await?;

    rows.iter().map(Notification::from_row).collect()
}

pub async fn unread_count(pool: &SqlitePool, user_id: i64) -> Result<i64, ServiceError> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND read = FALSE",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub async fn mark_read(
    pool: &SqlitePool,
    user_id: i64,
    notification_id: i64,
) -> Result<Notification, ServiceError> {
    let row = sqlx::query(
        r#"
        UPDATE notifications SET read = TRUE
        WHERE id = ? AND user_id = ?
        RETURNING id, type, title, body, link, read, created_at
        "#,
    )
    .bind(notification_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ServiceError::not_found("Notification not found"))?;

    Notification::from_row(&row)
}

pub async fn mark_all_read(pool: &SqlitePool, user_id: i64) -> Result<u64, ServiceError> {
    let result = sqlx::query("UPDATE notifications SET read = TRUE WHERE user_id = ? AND read = FALSE")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete(pool: &SqlitePool, user_id: i64, notification_id: i64) -> Result<(), ServiceError> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND user_id = ?")
        .bind(notification_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::not_found("Notification not found"));
    }
    Ok(())
}

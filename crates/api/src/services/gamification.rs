use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use super::error::ServiceError;

const POINTS_PER_LEVEL_STEP: f64 = 50.0;

/// `1 + floor(sqrt(points / 50))`; negative totals count as zero.
pub fn level_for_points(points: i64) -> i64 {
    let points = points.max(0) as f64;
    1 + (points / POINTS_PER_LEVEL_STEP).sqrt().floor() as i64
}

/// Add `points` to a user's total, log the event and recompute the level.
///
/// Takes a connection so callers can run it inside their own transaction.
pub async fn award_points(
    conn: &mut SqliteConnection,
    user_id: i64,
    points: i64,
    reason: &str,
) -> Result<i64, ServiceError> {
    if points == 0 {
        return Ok(0);
    }

    let now = Utc::now().to_rfc3339();

    sqlx::query("INSERT INTO point_events (user_id, reason, points, created_at) VALUES (?, ?, ?, ?)")
        .bind(user_id)
        .bind(reason)
        .bind(points)
        .bind(&now)
        .execute(&mut *conn)
        .await?;

    let total: i64 = sqlx::query_scalar(
        "UPDATE users SET points = points + ?, updated_at = ? WHERE id = ? RETURNING points",
    )
    .bind(points)
    .bind(&now)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    let level = level_for_points(total);
    sqlx::query("UPDATE users SET level = ? WHERE id = ?")
        .bind(level)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    debug!(user_id, points, total, level, reason, "points awarded");
    Ok(total)
}

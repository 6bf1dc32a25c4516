use serde::Serialize;
use sqlx::SqlitePool;

use super::error::ServiceError;
use crate::models::UserSummary;

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    #[serde(flatten)]
    pub user: UserSummary,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CommunityStats {
    pub mentors: i64,
    pub mentees: i64,
    pub active_mentorships: i64,
    pub completed_sessions: i64,
    pub completed_goals: i64,
    pub resources: i64,
    pub reviews: i64,
    pub average_rating: Option<f64>,
    pub online_users: usize,
}

/// Users ordered by points, ties broken by who registered first.
pub async fn leaderboard(pool: &SqlitePool, limit: i64) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    let rows = sqlx::query(
        r#"
        SELECT id, public_id, display_name, role, points, level, last_seen_at, created_at
        FROM users
        WHERE role != 'admin'
        ORDER BY points DESC, created_at ASC, id ASC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            Ok(LeaderboardEntry {
                rank: index + 1,
                user: UserSummary::from_row(row)?,
            })
        })
        .collect()
}

/// Platform-wide counters. `online_users` is filled in by the caller from
/// the realtime hub.
pub async fn stats(pool: &SqlitePool) -> Result<CommunityStats, ServiceError> {
    let (mentors, mentees): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(role = 'mentor'), 0), COALESCE(SUM(role = 'mentee'), 0)
        FROM users
        "#,
    )
    .fetch_one(pool)
    .await?;

    let active_mentorships =
        sqlx::query_scalar("SELECT COUNT(*) FROM mentorship_requests WHERE status = 'ACCEPTED'")
            .fetch_one(pool)
            .await?;
    let completed_sessions =
        sqlx::query_scalar("SELECT COUNT(*) FROM mentorship_sessions WHERE status = 'COMPLETED'")
            .fetch_one(pool)
            .await?;
    let completed_goals = sqlx::query_scalar("SELECT COUNT(*) FROM goals WHERE status = 'COMPLETED'")
        .fetch_one(pool)
        .await?;
    let resources = sqlx::query_scalar("SELECT COUNT(*) FROM resources")
        .fetch_one(pool)
        .await?;
    let (reviews, average_rating): (i64, Option<f64>) =
        sqlx::query_as("SELECT COUNT(*), AVG(CAST(rating AS REAL)) FROM reviews")
            .fetch_one(pool)
            .await?;

    Ok(CommunityStats {
        mentors,
        mentees,
        active_mentorships,
        completed_sessions,
        completed_goals,
        resources,
        reviews,
        average_rating,
        online_users: 0,
    })
}

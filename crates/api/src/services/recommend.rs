//! Embedding-based recommendations with a recency fallback.

use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::{error::ServiceError, users};
use crate::models::{decode_embedding, Resource, UserView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Similarity,
    Recent,
}

/// A recommended item with its similarity score (`None` in recency mode).
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation<T> {
    #[serde(flatten)]
    pub item: T,
    pub score: Option<f32>,
    pub strategy: Strategy,
}

impl<T> Recommendation<T> {
    fn similar(item: T, score: f32) -> Self {
        Self {
            item,
            score: Some(score),
            strategy: Strategy::Similarity,
        }
    }

    fn recent(item: T) -> Self {
        Self {
            item,
            score: None,
            strategy: Strategy::Recent,
        }
    }
}

/// `dot(a, b) / (|a| * |b|)`.
///
/// Returns `None` when the lengths differ, either vector is empty, either
/// has zero magnitude, or the result is not finite (overflowing components).
///
/// ```
/// use mentorlink_api::services::recommend::cosine_similarity;
///
/// assert_eq!(cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]), Some(1.0));
/// assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), None);
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt())).filter(|score| score.is_finite())
}

/// Score every candidate against `query`, drop those without a comparable
/// embedding and keep the `limit` best. Ties keep their input order.
pub fn rank_by_similarity<T, F>(query: &[f32], candidates: Vec<T>, embedding: F, limit: usize) -> Vec<(T, f32)>
where
    F: Fn(&T) -> Option<&[f32]>,
{
    let mut scored: Vec<(T, f32)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let score = embedding(&candidate).and_then(|vector| cosine_similarity(query, vector))?;
            Some((candidate, score))
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(limit);
    scored
}

async fn caller_embedding(pool: &SqlitePool, user_id: i64) -> Result<Option<Vec<f32>>, ServiceError> {
    let embedding: Option<Option<String>> =
        sqlx::query_scalar("SELECT embedding FROM profiles WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    Ok(decode_embedding(embedding.flatten()))
}

/// Mentors closest to the caller's profile, or the most recently active ones
/// when nothing is comparable.
pub async fn recommend_mentors(
    pool: &SqlitePool,
    user_id: i64,
    limit: usize,
) -> Result<Vec<Recommendation<UserView>>, ServiceError> {
    if let Some(query) = caller_embedding(pool, user_id).await? {
        let rows = sqlx::query(
            r#"
            SELECT u.id, p.embedding
            FROM users u
            JOIN profiles p ON p.user_id = u.id
            WHERE u.role = 'mentor' AND u.id != ? AND p.embedding IS NOT NULL
            ORDER BY u.id
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            if let Some(embedding) = decode_embedding(row.try_get("embedding")?) {
                candidates.push((id, embedding));
            }
        }

        let ranked = rank_by_similarity(&query, candidates, |(_, embedding)| Some(embedding.as_slice()), limit);
        if !ranked.is_empty() {
            let mut recommendations = Vec::with_capacity(ranked.len());
            for ((id, _), score) in ranked {
                recommendations.push(Recommendation::similar(users::user_view(pool, id, false, false).await?, score));
            }
            return Ok(recommendations);
        }
    }

    debug!(user_id, "no comparable mentor embeddings, falling back to recent mentors");
    let ids: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT u.id
        FROM users u
        JOIN profiles p ON p.user_id = u.id
        WHERE u.role = 'mentor' AND u.id != ?
        ORDER BY p.updated_at DESC, u.id DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    let mut recommendations = Vec::with_capacity(ids.len());
    for id in ids {
        recommendations.push(Recommendation::recent(users::user_view(pool, id, false, false).await?));
    }
    Ok(recommendations)
}

/// Resources closest to the caller's profile, or the newest ones.
pub async fn recommend_resources(
    pool: &SqlitePool,
    user_id: i64,
    limit: usize,
) -> Result<Vec<Recommendation<Resource>>, ServiceError> {
    if let Some(query) = caller_embedding(pool, user_id).await? {
        let rows = sqlx::query(&format!(
            "{} WHERE r.embedding IS NOT NULL ORDER BY r.id",
            Resource::SELECT
        ))
        .fetch_all(pool)
        .await?;
        let candidates = rows.iter().map(Resource::from_row).collect::<Result<Vec<_>, _>>()?;

        let ranked = rank_by_similarity(&query, candidates, |resource| resource.embedding.as_deref(), limit);
        if !ranked.is_empty() {
            return Ok(ranked
                .into_iter()
                .map(|(resource, score)| Recommendation::similar(resource, score))
                .collect());
        }
    }

    debug!(user_id, "no comparable resource embeddings, falling back to newest resources");
    let rows = sqlx::query(&format!(
        "{} ORDER BY r.created_at DESC, r.id DESC LIMIT ?",
        Resource::SELECT
    ))
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| Resource::from_row(row).map(Recommendation::recent))
        .collect()
}

use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;

use mentorlink_auth::{new_public_id, User};

use super::{error::ServiceError, gamification, notifications::NewNotification};
use crate::models::{RequestStatus, Review};
use crate::AppState;

pub const MAX_COMMENT_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub mentorship_id: String,
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

/// Leave a review of the mentor of an accepted mentorship. The reviewer must
/// be its mentee and at least one session must have been completed.
pub async fn create_review(
    state: &AppState,
    reviewer: &User,
    req: CreateReviewRequest,
) -> Result<Review, ServiceError> {
    let pool = state.db_pool();

    if !(1..=5).contains(&req.rating) {
        return Err(ServiceError::bad_request("rating must be between 1 and 5"));
    }
    let comment = req.comment.trim();
    if comment.chars().count() > MAX_COMMENT_CHARS {
        return Err(ServiceError::bad_request(format!(
            "comment must be at most {MAX_COMMENT_CHARS} characters"
        )));
    }

    let (mentorship_id, mentor_id, mentee_id, status): (i64, i64, i64, String) = sqlx::query_as(
        "SELECT id, mentor_id, mentee_id, status FROM mentorship_requests WHERE public_id = ?",
    )
    .bind(req.mentorship_id.trim())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ServiceError::not_found("Mentorship not found"))?;

    if mentee_id != reviewer.id {
        return Err(ServiceError::forbidden("Only the mentee can review this mentorship"));
    }
    if status.parse::<RequestStatus>()? != RequestStatus::Accepted {
        return Err(ServiceError::bad_request("Only accepted mentorships can be reviewed"));
    }

    let completed_sessions: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM mentorship_sessions WHERE mentorship_id = ? AND status = 'COMPLETED'",
    )
    .bind(mentorship_id)
    .fetch_one(pool)
    .await?;
    if completed_sessions == 0 {
        return Err(ServiceError::bad_request(
            "A review requires at least one completed session",
        ));
    }

    let public_id = new_public_id();
    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO reviews (public_id, mentorship_id, reviewer_id, mentor_id, rating, comment, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(mentorship_id)
    .bind(reviewer.id)
    .bind(mentor_id)
    .bind(req.rating)
    .bind(comment)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *tx)
    .await
    .map_err(|error| match ServiceError::from(error) {
        ServiceError::Conflict(_) => ServiceError::conflict("This mentorship was already reviewed"),
        other => other,
    })?;

    gamification::award_points(
        &mut tx,
        reviewer.id,
        state.config().gamification.points_per_review,
        "review_submitted",
    )
    .await?;
    tx.commit().await?;

    let review = get_review(pool, &public_id).await?;
    info!(review = %review.public_id, rating = review.rating, "review submitted");

    state
        .notify_quietly(
            mentor_id,
            NewNotification {
                kind: "review",
                title: "New review",
                body: &format!("{} rated you {}/5", reviewer.display_name, review.rating),
                link: Some(&format!("/users/{}", review.mentor_id)),
            },
        )
        .await;

    Ok(review)
}

pub async fn get_review(pool: &SqlitePool, public_id: &str) -> Result<Review, ServiceError> {
    let row = sqlx::query(&format!("{} WHERE v.public_id = ?", Review::SELECT))
        .bind(public_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Review not found"))?;
    Review::from_row(&row)
}

/// Reviews received by a mentor, newest first.
pub async fn list_for_mentor(
    pool: &SqlitePool,
    mentor_id: i64,
    limit: i64,
) -> Result<Vec<Review>, ServiceError> {
    let rows = sqlx::query(&format!(
        "{} WHERE v.mentor_id = ? ORDER BY v.created_at DESC, v.id DESC LIMIT ?",
        Review::SELECT
    ))
    .bind(mentor_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(Review::from_row).collect()
}

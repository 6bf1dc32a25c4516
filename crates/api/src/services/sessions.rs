use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;

use mentorlink_auth::{new_public_id, User};

use super::{error::ServiceError, gamification, notifications::NewNotification};
use crate::models::{MentorshipSession, RequestStatus, SessionStatus};
use crate::AppState;

pub const MIN_DURATION_MINUTES: i64 = 15;
pub const MAX_DURATION_MINUTES: i64 = 480;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub mentorship_id: String,
    pub title: String,
    #[serde(default)]
    pub agenda: Option<String>,
    pub scheduled_at: String,
    pub duration_minutes: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSessionRequest {
    pub title: Option<String>,
    pub agenda: Option<String>,
    pub scheduled_at: Option<String>,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub rating: i64,
    #[serde(default)]
    pub feedback: Option<String>,
}

fn parse_future_time(value: &str) -> Result<String, ServiceError> {
    let scheduled = DateTime::parse_from_rfc3339(value.trim())
        .map_err(|_| ServiceError::bad_request("scheduled_at must be an RFC 3339 timestamp"))?
        .with_timezone(&Utc);
    if scheduled <= Utc::now() {
        return Err(ServiceError::bad_request("scheduled_at must be in the future"));
    }
    Ok(scheduled.to_rfc3339())
}

fn validate_duration(minutes: i64) -> Result<i64, ServiceError> {
    if (MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&minutes) {
        Ok(minutes)
    } else {
        Err(ServiceError::bad_request(format!(
            "duration_minutes must be between {MIN_DURATION_MINUTES} and {MAX_DURATION_MINUTES}"
        )))
    }
}

fn validate_title(title: &str) -> Result<&str, ServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ServiceError::bad_request("title is required"));
    }
    Ok(title)
}

async fn load(pool: &SqlitePool, public_id: &str) -> Result<MentorshipSession, ServiceError> {
    let row = sqlx::query(&format!("{} WHERE s.public_id = ?", MentorshipSession::SELECT))
        .bind(public_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Session not found"))?;
    MentorshipSession::from_row(&row)
}

/// Load a session the caller takes part in.
pub async fn get_session(
    pool: &SqlitePool,
    user_id: i64,
    public_id: &str,
) -> Result<MentorshipSession, ServiceError> {
    let session = load(pool, public_id).await?;
    if session.mentor_id != user_id && session.mentee_id != user_id {
        return Err(ServiceError::forbidden("Not a participant of this session"));
    }
    Ok(session)
}

fn require_scheduled(session: &MentorshipSession) -> Result<(), ServiceError> {
    if session.status != SessionStatus::Scheduled {
        return Err(ServiceError::conflict(format!(
            "Session is already {}",
            session.status.as_str().to_ascii_lowercase()
        )));
    }
    Ok(())
}

fn other_party(session: &MentorshipSession, user_id: i64) -> i64 {
    if session.mentor_id == user_id {
        session.mentee_id
    } else {
        session.mentor_id
    }
}

pub async fn create_session(
    state: &AppState,
    user: &User,
    req: CreateSessionRequest,
) -> Result<MentorshipSession, ServiceError> {
    let pool = state.db_pool();

    let (mentorship_id, mentor_id, mentee_id, status): (i64, i64, i64, String) = sqlx::query_as(
        "SELECT id, mentor_id, mentee_id, status FROM mentorship_requests WHERE public_id = ?",
    )
    .bind(req.mentorship_id.trim())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ServiceError::not_found("Mentorship not found"))?;

    if user.id != mentor_id && user.id != mentee_id {
        return Err(ServiceError::forbidden("Not part of this mentorship"));
    }
    if status.parse::<RequestStatus>()? != RequestStatus::Accepted {
        return Err(ServiceError::bad_request("Sessions require an accepted mentorship"));
    }

    let title = validate_title(&req.title)?;
    let scheduled_at = parse_future_time(&req.scheduled_at)?;
    let duration = validate_duration(req.duration_minutes)?;
    let now = Utc::now().to_rfc3339();
    let public_id = new_public_id();

    sqlx::query(
        r#"
        INSERT INTO mentorship_sessions
            (public_id, mentorship_id, mentor_id, mentee_id, title, agenda, scheduled_at,
             duration_minutes, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'SCHEDULED', ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(mentorship_id)
    .bind(mentor_id)
    .bind(mentee_id)
    .bind(title)
    .bind(req.agenda.as_deref().map(str::trim))
    .bind(&scheduled_at)
    .bind(duration)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    let session = load(pool, &public_id).await?;
    info!(session = %session.public_id, scheduled_at = %session.scheduled_at, "session scheduled");

    state
        .notify_quietly(
            other_party(&session, user.id),
            NewNotification {
                kind: "session_scheduled",
                title: "Session scheduled",
                body: &format!("{} scheduled \"{}\" for {}", user.display_name, session.title, session.scheduled_at),
                link: Some(&format!("/sessions/{}", session.public_id)),
            },
        )
        .await;

    Ok(session)
}

pub async fn list_sessions(
    pool: &SqlitePool,
    user_id: i64,
    status: Option<SessionStatus>,
) -> Result<Vec<MentorshipSession>, ServiceError> {
    let rows = sqlx::query(&format!(
        "{} WHERE (s.mentor_id = ?1 OR s.mentee_id = ?1) AND (?2 IS NULL OR s.status = ?2) ORDER BY s.scheduled_at ASC",
        MentorshipSession::SELECT
    ))
    .bind(user_id)
    .bind(status.map(|status| status.as_str()))
    .fetch_all(pool)
    .await?;

    rows.iter().map(MentorshipSession::from_row).collect()
}

pub async fn update_session(
    pool: &SqlitePool,
    user_id: i64,
    public_id: &str,
    req: UpdateSessionRequest,
) -> Result<MentorshipSession, ServiceError> {
    let session = get_session(pool, user_id, public_id).await?;
    require_scheduled(&session)?;

    let title = req.title.as_deref().map(validate_title).transpose()?;
    let scheduled_at = req.scheduled_at.as_deref().map(parse_future_time).transpose()?;
    let duration = req.duration_minutes.map(validate_duration).transpose()?;

    sqlx::query(
        r#"
        UPDATE mentorship_sessions
        SET title = COALESCE(?, title),
            agenda = COALESCE(?, agenda),
            scheduled_at = COALESCE(?, scheduled_at),
            duration_minutes = COALESCE(?, duration_minutes),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(title)
    .bind(req.agenda.as_deref().map(str::trim))
    .bind(scheduled_at)
    .bind(duration)
    .bind(Utc::now().to_rfc3339())
    .bind(session.id)
    .execute(pool)
    .await?;

    load(pool, public_id).await
}

async fn transition(
    pool: &SqlitePool,
    session: &MentorshipSession,
    status: SessionStatus,
) -> Result<(), ServiceError> {
    let updated = sqlx::query(
        "UPDATE mentorship_sessions SET status = ?, updated_at = ? WHERE id = ? AND status = 'SCHEDULED'",
    )
    .bind(status.as_str())
    .bind(Utc::now().to_rfc3339())
    .bind(session.id)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ServiceError::conflict("Session is no longer scheduled"));
    }
    Ok(())
}

/// Mark a scheduled session as held; both participants earn session points.
pub async fn complete_session(
    state: &AppState,
    user: &User,
    public_id: &str,
) -> Result<MentorshipSession, ServiceError> {
    let pool = state.db_pool();
    let session = get_session(pool, user.id, public_id).await?;
    require_scheduled(&session)?;

    let mut tx = pool.begin().await?;
    let updated = sqlx::query(
        "UPDATE mentorship_sessions SET status = 'COMPLETED', updated_at = ? WHERE id = ? AND status = 'SCHEDULED'",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(session.id)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ServiceError::conflict("Session is no longer scheduled"));
    }

    let points = state.config().gamification.points_per_session;
    gamification::award_points(&mut tx, session.mentor_id, points, "session_completed").await?;
    gamification::award_points(&mut tx, session.mentee_id, points, "session_completed").await?;
    tx.commit().await?;

    let session = load(pool, public_id).await?;
    state
        .notify_quietly(
            other_party(&session, user.id),
            NewNotification {
                kind: "session_completed",
                title: "Session completed",
                body: &format!("\"{}\" was marked as completed", session.title),
                link: Some(&format!("/sessions/{}", session.public_id)),
            },
        )
        .await;
    Ok(session)
}

pub async fn cancel_session(
    state: &AppState,
    user: &User,
    public_id: &str,
) -> Result<MentorshipSession, ServiceError> {
    let pool = state.db_pool();
    let session = get_session(pool, user.id, public_id).await?;
    require_scheduled(&session)?;
    transition(pool, &session, SessionStatus::Cancelled).await?;

    let session = load(pool, public_id).await?;
    state
        .notify_quietly(
            other_party(&session, user.id),
            NewNotification {
                kind: "session_cancelled",
                title: "Session cancelled",
                body: &format!("{} cancelled \"{}\"", user.display_name, session.title),
                link: Some(&format!("/sessions/{}", session.public_id)),
            },
        )
        .await;
    Ok(session)
}

/// Record the mentee's rating of a completed session. Allowed once.
pub async fn submit_feedback(
    pool: &SqlitePool,
    user_id: i64,
    public_id: &str,
    req: FeedbackRequest,
) -> Result<MentorshipSession, ServiceError> {
    let session = get_session(pool, user_id, public_id).await?;

    if session.mentee_id != user_id {
        return Err(ServiceError::forbidden("Only the mentee can leave session feedback"));
    }
    if session.status != SessionStatus::Completed {
        return Err(ServiceError::bad_request("Feedback requires a completed session"));
    }
    if !(1..=5).contains(&req.rating) {
        return Err(ServiceError::bad_request("rating must be between 1 and 5"));
    }

    let updated = sqlx::query(
        r#"
        UPDATE mentorship_sessions
        SET rating = ?, feedback = ?, updated_at = ?
        WHERE id = ? AND rating IS NULL
        "#,
    )
    .bind(req.rating)
    .bind(req.feedback.as_deref().map(str::trim))
    .bind(Utc::now().to_rfc3339())
    .bind(session.id)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ServiceError::conflict("Feedback was already submitted"));
    }

    load(pool, public_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_utils::{
        create_test_db, create_test_mentorship, create_test_user, test_state,
    };
    use chrono::Duration;
    use mentorlink_auth::Role;

    fn tomorrow() -> String {
        (Utc::now() + Duration::days(1)).to_rfc3339()
    }

    fn new_session(mentorship_id: &str) -> CreateSessionRequest {
        CreateSessionRequest {
            mentorship_id: mentorship_id.to_string(),
            title: "Code review".into(),
            agenda: Some("Walk through the PR".into()),
            scheduled_at: tomorrow(),
            duration_minutes: 60,
        }
    }

    #[tokio::test]
    async fn create_session_validates_schedule_and_duration() {
        let (pool, _dir) = create_test_db().await;
        let state = test_state(&pool);
        let mentor = create_test_user(&pool, "mentor", Role::Mentor).await;
        let mentee = create_test_user(&pool, "mentee", Role::Mentee).await;
        let (_, mentorship) = create_test_mentorship(&pool, &mentor, &mentee, "ACCEPTED").await;

        let mut past = new_session(&mentorship);
        past.scheduled_at = (Utc::now() - Duration::hours(1)).to_rfc3339();
        assert!(matches!(
            create_session(&state, &mentee, past).await,
            Err(ServiceError::BadRequest(_))
        ));

        let mut garbled = new_session(&mentorship);
        garbled.scheduled_at = "next tuesday".into();
        assert!(matches!(
            create_session(&state, &mentee, garbled).await,
            Err(ServiceError::BadRequest(_))
        ));

        for minutes in [14, 481] {
            let mut bad = new_session(&mentorship);
            bad.duration_minutes = minutes;
            assert!(matches!(
                create_session(&state, &mentee, bad).await,
                Err(ServiceError::BadRequest(_))
            ));
        }

        let session = create_session(&state, &mentee, new_session(&mentorship)).await.unwrap();
        assert_eq!(session.status, SessionStatus::Scheduled);
        assert_eq!(session.mentor.public_id, mentor.public_id);
        assert_eq!(session.mentorship_id, mentorship);
    }

    #[tokio::test]
    async fn create_session_requires_accepted_mentorship_participant() {
        let (pool, _dir) = create_test_db().await;
        let state = test_state(&pool);
        let mentor = create_test_user(&pool, "mentor", Role::Mentor).await;
        let mentee = create_test_user(&pool, "mentee", Role::Mentee).await;
        let outsider = create_test_user(&pool, "outsider", Role::Mentee).await;
        let (_, pending) = create_test_mentorship(&pool, &mentor, &mentee, "PENDING").await;

        assert!(matches!(
            create_session(&state, &mentee, new_session(&pending)).await,
            Err(ServiceError::BadRequest(_))
        ));
        assert!(matches!(
            create_session(&state, &outsider, new_session(&pending)).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn only_scheduled_sessions_change() {
        let (pool, _dir) = create_test_db().await;
        let state = test_state(&pool);
        let mentor = create_test_user(&pool, "mentor", Role::Mentor).await;
        let mentee = create_test_user(&pool, "mentee", Role::Mentee).await;
        let (_, mentorship) = create_test_mentorship(&pool, &mentor, &mentee, "ACCEPTED").await;

        let session = create_session(&state, &mentor, new_session(&mentorship)).await.unwrap();

        let updated = update_session(
            &pool,
            mentee.id,
            &session.public_id,
            UpdateSessionRequest {
                duration_minutes: Some(90),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.duration_minutes, 90);
        assert_eq!(updated.title, "Code review");

        let cancelled = cancel_session(&state, &mentee, &session.public_id).await.unwrap();
        assert_eq!(cancelled.status, SessionStatus::Cancelled);

        assert!(matches!(
            complete_session(&state, &mentor, &session.public_id).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            update_session(&pool, mentor.id, &session.public_id, UpdateSessionRequest::default()).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn feedback_once_by_mentee_after_completion() {
        let (pool, _dir) = create_test_db().await;
        let state = test_state(&pool);
        let mentor = create_test_user(&pool, "mentor", Role::Mentor).await;
        let mentee = create_test_user(&pool, "mentee", Role::Mentee).await;
        let (_, mentorship) = create_test_mentorship(&pool, &mentor, &mentee, "ACCEPTED").await;
        let session = create_session(&state, &mentor, new_session(&mentorship)).await.unwrap();

        let feedback = |rating| FeedbackRequest {
            rating,
            feedback: Some("Very helpful".into()),
        };

        assert!(matches!(
            submit_feedback(&pool, mentee.id, &session.public_id, feedback(5)).await,
            Err(ServiceError::BadRequest(_))
        ));

        let completed = complete_session(&state, &mentor, &session.public_id).await.unwrap();
        assert_eq!(completed.status, SessionStatus::Completed);

        assert!(matches!(
            submit_feedback(&pool, mentor.id, &session.public_id, feedback(5)).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            submit_feedback(&pool, mentee.id, &session.public_id, feedback(6)).await,
            Err(ServiceError::BadRequest(_))
        ));

        let rated = submit_feedback(&pool, mentee.id, &session.public_id, feedback(4))
            .await
            .unwrap();
        assert_eq!(rated.rating, Some(4));
        assert!(matches!(
            submit_feedback(&pool, mentee.id, &session.public_id, feedback(5)).await,
            Err(ServiceError::Conflict(_))
        ));

        let points: i64 = sqlx::query_scalar("SELECT points FROM users WHERE id = ?")
            .bind(mentor.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(points, state.config().gamification.points_per_session);
    }
}

use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;

use mentorlink_auth::{new_public_id, Role, User};

use super::{conversations, error::ServiceError, gamification, notifications::NewNotification, users};
use crate::models::{MentorshipRequest, RequestStatus};
use crate::realtime::ServerEvent;
use crate::AppState;

const MAX_REQUEST_MESSAGE_CHARS: usize = 1_000;

#[derive(Debug, Deserialize)]
pub struct CreateRequestRequest {
    pub mentor_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Outcome of accepting or rejecting a request.
#[derive(Debug, Clone)]
pub struct Response {
    pub request: MentorshipRequest,
    pub conversation_id: Option<String>,
}

pub async fn get_request(pool: &SqlitePool, public_id: &str) -> Result<MentorshipRequest, ServiceError> {
    let row = sqlx::query(&format!("{} WHERE r.public_id = ?", MentorshipRequest::SELECT))
        .bind(public_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Mentorship request not found"))?;
    MentorshipRequest::from_row(&row)
}

async fn get_request_by_id(pool: &SqlitePool, id: i64) -> Result<MentorshipRequest, ServiceError> {
    let row = sqlx::query(&format!("{} WHERE r.id = ?", MentorshipRequest::SELECT))
        .bind(id)
        .fetch_one(pool)
        .await?;
    MentorshipRequest::from_row(&row)
}

pub async fn create_request(
    state: &AppState,
    mentee: &User,
    req: CreateRequestRequest,
) -> Result<MentorshipRequest, ServiceError> {
    let pool = state.db_pool();
    let mentor = users::find_by_public_id(pool, req.mentor_id.trim()).await?;

    if mentor.id == mentee.id {
        return Err(ServiceError::bad_request("You cannot request mentorship from yourself"));
    }
    if mentor.role != Role::Mentor {
        return Err(ServiceError::bad_request("Target user is not a mentor"));
    }

    let message = req.message.unwrap_or_default().trim().to_string();
    if message.chars().count() > MAX_REQUEST_MESSAGE_CHARS {
        return Err(ServiceError::bad_request(format!(
            "message must be at most {MAX_REQUEST_MESSAGE_CHARS} characters"
        )));
    }

    let open: Option<String> = sqlx::query_scalar(
        r#"
        SELECT status FROM mentorship_requests
        WHERE mentor_id = ? AND mentee_id = ? AND status IN ('PENDING', 'ACCEPTED')
        "#,
    )
    .bind(mentor.id)
    .bind(mentee.id)
    .fetch_optional(pool)
    .await?;

    if let Some(status) = open {
        return Err(ServiceError::conflict(format!(
            "A {} mentorship request already exists for this mentor",
            status.to_ascii_lowercase()
        )));
    }

    let id = sqlx::query(
        r#"
        INSERT INTO mentorship_requests (public_id, mentor_id, mentee_id, message, status, created_at)
        VALUES (?, ?, ?, ?, 'PENDING', ?)
        "#,
    )
    .bind(new_public_id())
    .bind(mentor.id)
    .bind(mentee.id)
    .bind(&message)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?
    .last_insert_rowid();

    let request = get_request_by_id(pool, id).await?;
    info!(request = %request.public_id, mentor = mentor.id, mentee = mentee.id, "mentorship requested");

    state
        .notify_quietly(
            mentor.id,
            NewNotification {
                kind: "mentorship_request",
                title: "New mentorship request",
                body: &format!("{} would like you to mentor them", mentee.display_name),
                link: Some("/requests"),
            },
        )
        .await;
    state
        .broadcast_to_user(
            mentor.id,
            &ServerEvent::MentorshipRequest {
                request: request.clone(),
            },
        )
        .await;

    Ok(request)
}

pub async fn list_requests(
    pool: &SqlitePool,
    user_id: i64,
    direction: Option<Direction>,
    status: Option<RequestStatus>,
) -> Result<Vec<MentorshipRequest>, ServiceError> {
    let filter = match direction {
        Some(Direction::Incoming) => "r.mentor_id = ?1",
        Some(Direction::Outgoing) => "r.mentee_id = ?1",
        None => "(r.mentor_id = ?1 OR r.mentee_id = ?1)",
    };

    let rows = sqlx::query(&format!(
        "{} WHERE {filter} AND (?2 IS NULL OR r.status = ?2) ORDER BY r.id DESC",
        MentorshipRequest::SELECT
    ))
    .bind(user_id)
    .bind(status.map(|status| status.as_str()))
    .fetch_all(pool)
    .await?;

    rows.iter().map(MentorshipRequest::from_row).collect()
}

/// Accept or reject a pending request. Only the addressed mentor may respond.
///
/// Accepting opens (or reuses) the two-person conversation and awards
/// mentorship points to both sides in the same transaction.
pub async fn respond(
    state: &AppState,
    mentor: &User,
    request_id: &str,
    accept: bool,
) -> Result<Response, ServiceError> {
    let pool = state.db_pool();
    let request = get_request(pool, request_id).await?;

    if request.mentor_id != mentor.id {
        return Err(ServiceError::forbidden("Only the mentor can respond to this request"));
    }
    if request.status != RequestStatus::Pending {
        return Err(ServiceError::conflict(format!(
            "Request is already {}",
            request.status.as_str().to_ascii_lowercase()
        )));
    }

    let new_status = if accept {
        RequestStatus::Accepted
    } else {
        RequestStatus::Rejected
    };

    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        "UPDATE mentorship_requests SET status = ?, responded_at = ? WHERE id = ? AND status = 'PENDING'",
    )
    .bind(new_status.as_str())
    .bind(Utc::now().to_rfc3339())
    .bind(request.id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ServiceError::conflict("Request was answered concurrently"));
    }

    let conversation_id = if accept {
        let (_, public_id) =
            conversations::ensure_direct_conversation(&mut tx, request.mentor_id, request.mentee_id)
                .await?;

        let points = state.config().gamification.points_per_mentorship;
        gamification::award_points(&mut tx, request.mentor_id, points, "mentorship_accepted").await?;
        gamification::award_points(&mut tx, request.mentee_id, points, "mentorship_accepted").await?;
        Some(public_id)
    } else {
        None
    };

    tx.commit().await?;

    let request = get_request_by_id(pool, request.id).await?;
    info!(request = %request.public_id, status = %request.status, "mentorship request answered");

    let (title, body) = if accept {
        (
            "Mentorship request accepted",
            format!("{} accepted your mentorship request", mentor.display_name),
        )
    } else {
        (
            "Mentorship request declined",
            format!("{} declined your mentorship request", mentor.display_name),
        )
    };
    let link = conversation_id
        .as_ref()
        .map(|id| format!("/messages/{id}"))
        .unwrap_or_else(|| "/requests".to_string());

    state
        .notify_quietly(
            request.mentee_id,
            NewNotification {
                kind: "mentorship_response",
                title,
                body: &body,
                link: Some(&link),
            },
        )
        .await;
    state
        .broadcast_to_users(
            [request.mentee_id, request.mentor_id],
            &ServerEvent::MentorshipResponse {
                request: request.clone(),
            },
        )
        .await;

    Ok(Response {
        request,
        conversation_id,
    })
}

/// Withdraw a pending request. Only the requesting mentee may do so.
pub async fn withdraw(pool: &SqlitePool, mentee: &User, request_id: &str) -> Result<(), ServiceError> {
    let request = get_request(pool, request_id).await?;

    if request.mentee_id != mentee.id {
        return Err(ServiceError::forbidden("Only the requesting mentee can withdraw this request"));
    }
    if request.status != RequestStatus::Pending {
        return Err(ServiceError::conflict("Only pending requests can be withdrawn"));
    }

    sqlx::query("DELETE FROM mentorship_requests WHERE id = ? AND status = 'PENDING'")
        .bind(request.id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Id of the accepted mentorship between two users, in either direction.
pub async fn accepted_between(pool: &SqlitePool, a: i64, b: i64) -> Result<Option<i64>, ServiceError> {
    let id = sqlx::query_scalar(
        r#"
        SELECT id FROM mentorship_requests
        WHERE status = 'ACCEPTED'
          AND ((mentor_id = ?1 AND mentee_id = ?2) OR (mentor_id = ?2 AND mentee_id = ?1))
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(a)
    .bind(b)
    .fetch_optional(pool)
    .await?;
    Ok(id)
}

/// Users with an accepted mentorship involving `user_id`.
pub async fn partner_ids(pool: &SqlitePool, user_id: i64) -> Result<Vec<i64>, ServiceError> {
    let ids = sqlx::query_scalar(
        r#"
        SELECT CASE WHEN mentor_id = ?1 THEN mentee_id ELSE mentor_id END
        FROM mentorship_requests
        WHERE status = 'ACCEPTED' AND (mentor_id = ?1 OR mentee_id = ?1)
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_utils::{create_test_db, create_test_user, test_state};

    fn ask(mentor: &User) -> CreateRequestRequest {
        CreateRequestRequest {
            mentor_id: mentor.public_id.clone(),
            message: Some("Would love your help with Rust".into()),
        }
    }

    #[tokio::test]
    async fn create_request_validates_target() {
        let (pool, _dir) = create_test_db().await;
        let state = test_state(&pool);
        let mentee = create_test_user(&pool, "mentee", Role::Mentee).await;
        let other_mentee = create_test_user(&pool, "peer", Role::Mentee).await;

        assert!(matches!(
            create_request(&state, &mentee, ask(&mentee)).await,
            Err(ServiceError::BadRequest(_))
        ));
        assert!(matches!(
            create_request(&state, &mentee, ask(&other_mentee)).await,
            Err(ServiceError::BadRequest(_))
        ));

        let missing = CreateRequestRequest {
            mentor_id: "nobody".into(),
            message: None,
        };
        assert!(matches!(
            create_request(&state, &mentee, missing).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_open_request_conflicts_and_notifies_once() {
        let (pool, _dir) = create_test_db().await;
        let state = test_state(&pool);
        let mentor = create_test_user(&pool, "mentor", Role::Mentor).await;
        let mentee = create_test_user(&pool, "mentee", Role::Mentee).await;

        let request = create_request(&state, &mentee, ask(&mentor)).await.unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.mentor.public_id, mentor.public_id);

        assert!(matches!(
            create_request(&state, &mentee, ask(&mentor)).await,
            Err(ServiceError::Conflict(_))
        ));

        let notifications: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND type = 'mentorship_request'",
        )
        .bind(mentor.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(notifications, 1);
    }

    #[tokio::test]
    async fn accept_opens_conversation_and_awards_points() {
        let (pool, _dir) = create_test_db().await;
        let state = test_state(&pool);
        let mentor = create_test_user(&pool, "mentor", Role::Mentor).await;
        let mentee = create_test_user(&pool, "mentee", Role::Mentee).await;

        let request = create_request(&state, &mentee, ask(&mentor)).await.unwrap();

        assert!(matches!(
            respond(&state, &mentee, &request.public_id, true).await,
            Err(ServiceError::Forbidden(_))
        ));

        let response = respond(&state, &mentor, &request.public_id, true).await.unwrap();
        assert_eq!(response.request.status, RequestStatus::Accepted);
        assert!(response.request.responded_at.is_some());
        let conversation_id = response.conversation_id.expect("conversation opened");

        let participants: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM conversation_participants p
            JOIN conversations c ON c.id = p.conversation_id
            WHERE c.public_id = ?
            "#,
        )
        .bind(&conversation_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(participants, 2);

        let points: i64 = sqlx::query_scalar("SELECT points FROM users WHERE id = ?")
            .bind(mentee.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(points, state.config().gamification.points_per_mentorship);

        assert!(matches!(
            respond(&state, &mentor, &request.public_id, false).await,
            Err(ServiceError::Conflict(_))
        ));
        assert_eq!(accepted_between(&pool, mentee.id, mentor.id).await.unwrap(), Some(request.id));
        assert_eq!(partner_ids(&pool, mentor.id).await.unwrap(), vec![mentee.id]);
    }

    #[tokio::test]
    async fn reject_frees_the_pair_for_a_new_request() {
        let (pool, _dir) = create_test_db().await;
        let state = test_state(&pool);
        let mentor = create_test_user(&pool, "mentor", Role::Mentor).await;
        let mentee = create_test_user(&pool, "mentee", Role::Mentee).await;

        let request = create_request(&state, &mentee, ask(&mentor)).await.unwrap();
        let response = respond(&state, &mentor, &request.public_id, false).await.unwrap();
        assert_eq!(response.request.status, RequestStatus::Rejected);
        assert!(response.conversation_id.is_none());

        create_request(&state, &mentee, ask(&mentor)).await.unwrap();

        let incoming = list_requests(&pool, mentor.id, Some(Direction::Incoming), None)
            .await
            .unwrap();
        assert_eq!(incoming.len(), 2);
        let pending = list_requests(&pool, mentee.id, Some(Direction::Outgoing), Some(RequestStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert!(list_requests(&pool, mentee.id, Some(Direction::Incoming), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn only_the_mentee_withdraws_pending_requests() {
        let (pool, _dir) = create_test_db().await;
        let state = test_state(&pool);
        let mentor = create_test_user(&pool, "mentor", Role::Mentor).await;
        let mentee = create_test_user(&pool, "mentee", Role::Mentee).await;

        let request = create_request(&state, &mentee, ask(&mentor)).await.unwrap();
        assert!(matches!(
            withdraw(&pool, &mentor, &request.public_id).await,
            Err(ServiceError::Forbidden(_))
        ));

        withdraw(&pool, &mentee, &request.public_id).await.unwrap();
        assert!(matches!(
            get_request(&pool, &request.public_id).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;

use mentorlink_auth::{new_public_id, User};

use super::{error::ServiceError, gamification, notifications::NewNotification};
use crate::models::{Goal, GoalStatus};
use crate::realtime::ServerEvent;
use crate::AppState;

const GOAL_COLUMNS: &str = "id, public_id, user_id, title, specific, measurable, achievable, relevant, \
     time_bound, target_date, status, completed_at, created_at, updated_at";

#[derive(Debug, Default, Deserialize)]
pub struct CreateGoalRequest {
    pub title: String,
    #[serde(default)]
    pub specific: Option<String>,
    #[serde(default)]
    pub measurable: Option<String>,
    #[serde(default)]
    pub achievable: Option<String>,
    #[serde(default)]
    pub relevant: Option<String>,
    #[serde(default)]
    pub time_bound: Option<String>,
    #[serde(default)]
    pub target_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateGoalRequest {
    pub title: Option<String>,
    pub specific: Option<String>,
    pub measurable: Option<String>,
    pub achievable: Option<String>,
    pub relevant: Option<String>,
    pub time_bound: Option<String>,
    pub target_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: GoalStatus,
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Accepts a calendar date (`2025-06-30`) or a full RFC 3339 timestamp.
fn validate_target_date(value: &str) -> Result<String, ServiceError> {
    let value = value.trim();
    if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok() || DateTime::parse_from_rfc3339(value).is_ok() {
        Ok(value.to_string())
    } else {
        Err(ServiceError::bad_request(
            "target_date must be YYYY-MM-DD or an RFC 3339 timestamp",
        ))
    }
}

fn points_reason(goal: &Goal) -> String {
    format!("goal_completed:{}", goal.public_id)
}

/// Load a goal owned by `user_id`.
pub async fn get_goal(pool: &SqlitePool, user_id: i64, public_id: &str) -> Result<Goal, ServiceError> {
    let row = sqlx::query(&format!("SELECT {GOAL_COLUMNS} FROM goals WHERE public_id = ?"))
        .bind(public_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Goal not found"))?;
    let goal = Goal::from_row(&row)?;

    if goal.user_id != user_id {
        return Err(ServiceError::forbidden("Goal belongs to another user"));
    }
    Ok(goal)
}

pub async fn list_goals(
    pool: &SqlitePool,
    user_id: i64,
    status: Option<GoalStatus>,
) -> Result<Vec<Goal>, ServiceError> {
    let rows = sqlx::query(&format!(
        "SELECT {GOAL_COLUMNS} FROM goals WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2) ORDER BY created_at DESC, id DESC"
    ))
    .bind(user_id)
    .bind(status.map(|status| status.as_str()))
    .fetch_all(pool)
    .await?;

    rows.iter().map(Goal::from_row).collect()
}

pub async fn create_goal(pool: &SqlitePool, user_id: i64, req: CreateGoalRequest) -> Result<Goal, ServiceError> {
    let title = trimmed(Some(&req.title)).ok_or_else(|| ServiceError::bad_request("title is required"))?;
    let target_date = trimmed(req.target_date.as_deref())
        .map(validate_target_date)
        .transpose()?;
    let now = Utc::now().to_rfc3339();
    let public_id = new_public_id();

    sqlx::query(
        r#"
        INSERT INTO goals
            (public_id, user_id, title, specific, measurable, achievable, relevant, time_bound,
             target_date, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'NOT_STARTED', ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(user_id)
    .bind(title)
    .bind(trimmed(req.specific.as_deref()))
    .bind(trimmed(req.measurable.as_deref()))
    .bind(trimmed(req.achievable.as_deref()))
    .bind(trimmed(req.relevant.as_deref()))
    .bind(trimmed(req.time_bound.as_deref()))
    .bind(target_date)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_goal(pool, user_id, &public_id).await
}

pub async fn update_goal(
    pool: &SqlitePool,
    user_id: i64,
    public_id: &str,
    req: UpdateGoalRequest,
) -> Result<Goal, ServiceError> {
    let goal = get_goal(pool, user_id, public_id).await?;

    if matches!(req.title.as_deref(), Some(title) if title.trim().is_empty()) {
        return Err(ServiceError::bad_request("title cannot be empty"));
    }
    let target_date = trimmed(req.target_date.as_deref())
        .map(validate_target_date)
        .transpose()?;

    sqlx::query(
        r#"
        UPDATE goals
        SET title = COALESCE(?, title),
            specific = COALESCE(?, specific),
            measurable = COALESCE(?, measurable),
            achievable = COALESCE(?, achievable),
            relevant = COALESCE(?, relevant),
            time_bound = COALESCE(?, time_bound),
            target_date = COALESCE(?, target_date),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(req.title.as_deref().map(str::trim))
    .bind(trimmed(req.specific.as_deref()))
    .bind(trimmed(req.measurable.as_deref()))
    .bind(trimmed(req.achievable.as_deref()))
    .bind(trimmed(req.relevant.as_deref()))
    .bind(trimmed(req.time_bound.as_deref()))
    .bind(target_date)
    .bind(Utc::now().to_rfc3339())
    .bind(goal.id)
    .execute(pool)
    .await?;

    get_goal(pool, user_id, public_id).await
}

pub async fn delete_goal(pool: &SqlitePool, user_id: i64, public_id: &str) -> Result<(), ServiceError> {
    let goal = get_goal(pool, user_id, public_id).await?;
    sqlx::query("DELETE FROM goals WHERE id = ?")
        .bind(goal.id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Move a goal to `status`. The first transition to COMPLETED awards points,
/// notifies the owner and emits `goal_completed` to their personal room.
pub async fn set_status(
    state: &AppState,
    user: &User,
    public_id: &str,
    status: GoalStatus,
) -> Result<Goal, ServiceError> {
    let pool = state.db_pool();
    let goal = get_goal(pool, user.id, public_id).await?;
    if goal.status == status {
        return Ok(goal);
    }

    let now = Utc::now().to_rfc3339();
    let completed_at = match status {
        GoalStatus::Completed => Some(now.as_str()),
        _ => None,
    };

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE goals SET status = ?, completed_at = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(completed_at)
        .bind(&now)
        .bind(goal.id)
        .execute(&mut *tx)
        .await?;

    let mut points_awarded = 0;
    if status == GoalStatus::Completed {
        let reason = points_reason(&goal);
        let already_awarded: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM point_events WHERE user_id = ? AND reason = ?)",
        )
        .bind(user.id)
        .bind(&reason)
        .fetch_one(&mut *tx)
        .await?;

        if !already_awarded {
            points_awarded = state.config().gamification.points_per_goal;
            gamification::award_points(&mut tx, user.id, points_awarded, &reason).await?;
        }
    }
    tx.commit().await?;

    let goal = get_goal(pool, user.id, public_id).await?;
    info!(user_id = user.id, goal = %goal.public_id, status = %goal.status, "goal status changed");

    if goal.status == GoalStatus::Completed {
        state
            .notify_quietly(
                user.id,
                NewNotification {
                    kind: "goal_completed",
                    title: "Goal completed",
                    body: &if points_awarded > 0 {
                        format!("You completed \"{}\" and earned {points_awarded} points", goal.title)
                    } else {
                        format!("You completed \"{}\"", goal.title)
                    },
                    link: Some(&format!("/goals/{}", goal.public_id)),
                },
            )
            .await;
        state
            .broadcast_to_user(
                user.id,
                &ServerEvent::GoalCompleted {
                    goal_id: goal.public_id.clone(),
                    title: goal.title.clone(),
                    points_awarded,
                },
            )
            .await;
    }

    Ok(goal)
}

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::info;

use mentorlink_auth::{Role, User};

use super::{error::ServiceError, users};
use crate::models::UserSummary;

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminUser {
    #[serde(flatten)]
    pub user: UserSummary,
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AdminStats {
    pub users: i64,
    pub mentors: i64,
    pub mentees: i64,
    pub admins: i64,
    pub pending_requests: i64,
    pub accepted_requests: i64,
    pub rejected_requests: i64,
    pub scheduled_sessions: i64,
    pub completed_sessions: i64,
    pub cancelled_sessions: i64,
    pub goals: i64,
    pub messages: i64,
    pub resources: i64,
    pub reviews: i64,
    pub active_sessions: i64,
}

pub async fn list_users(
    pool: &SqlitePool,
    role: Option<Role>,
    limit: i64,
    offset: i64,
) -> Result<Vec<AdminUser>, ServiceError> {
    let rows = sqlx::query(
        r#"
        SELECT id, public_id, email, display_name, role, points, level, last_seen_at, created_at
        FROM users
        WHERE (?1 IS NULL OR role = ?1)
        ORDER BY created_at ASC, id ASC
        LIMIT ?2 OFFSET ?3
        "#,
    )
    .bind(role.map(|role| role.as_str()))
    .bind(limit)
    .bind(offset.max(0))
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(AdminUser {
                user: UserSummary::from_row(row)?,
                email: row.try_get("email")?,
            })
        })
        .collect()
}

/// Change a user's role. Admins cannot demote themselves.
pub async fn set_role(
    pool: &SqlitePool,
    admin: &User,
    public_id: &str,
    role: Role,
) -> Result<UserSummary, ServiceError> {
    let target = users::find_by_public_id(pool, public_id).await?;
    if target.id == admin.id && role != Role::Admin {
        return Err(ServiceError::bad_request("Admins cannot demote themselves"));
    }

    sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
        .bind(role.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(target.id)
        .execute(pool)
        .await?;

    info!(admin_id = admin.id, user_id = target.id, role = %role, "role changed");
    users::user_summary(pool, target.id).await
}

/// Remove a user and everything that references them.
pub async fn delete_user(pool: &SqlitePool, admin: &User, public_id: &str) -> Result<(), ServiceError> {
    let target = users::find_by_public_id(pool, public_id).await?;
    if target.id == admin.id {
        return Err(ServiceError::bad_request("Admins cannot delete their own account"));
    }

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(target.id)
        .execute(pool)
        .await?;

    info!(admin_id = admin.id, user_id = target.id, "user deleted");
    Ok(())
}

async fn count(pool: &SqlitePool, sql: &str) -> Result<i64, ServiceError> {
    Ok(sqlx::query_scalar(sql).fetch_one(pool).await?)
}

pub async fn stats(pool: &SqlitePool) -> Result<AdminStats, ServiceError> {
    Ok(AdminStats {
        users: count(pool, "SELECT COUNT(*) FROM users").await?,
        mentors: count(pool, "SELECT COUNT(*) FROM users WHERE role = 'mentor'").await?,
        mentees: count(pool, "SELECT COUNT(*) FROM users WHERE role = 'mentee'").await?,
        admins: count(pool, "SELECT COUNT(*) FROM users WHERE role = 'admin'").await?,
        pending_requests: count(pool, "SELECT COUNT(*) FROM mentorship_requests WHERE status = 'PENDING'").await?,
        accepted_requests: count(pool, "SELECT COUNT(*) FROM mentorship_requests WHERE status = 'ACCEPTED'").await?,
        rejected_requests: count(pool, "SELECT COUNT(*) FROM mentorship_requests WHERE status = 'REJECTED'").await?,
        scheduled_sessions: count(pool, "SELECT COUNT(*) FROM mentorship_sessions WHERE status = 'SCHEDULED'").await?,
        completed_sessions: count(pool, "SELECT COUNT(*) FROM mentorship_sessions WHERE status = 'COMPLETED'").await?,
        cancelled_sessions: count(pool, "SELECT COUNT(*) FROM mentorship_sessions WHERE status = 'CANCELLED'").await?,
        goals: count(pool, "SELECT COUNT(*) FROM goals").await?,
        messages: count(pool, "SELECT COUNT(*) FROM messages").await?,
        resources: count(pool, "SELECT COUNT(*) FROM resources").await?,
        reviews: count(pool, "SELECT COUNT(*) FROM reviews").await?,
        active_sessions: count(pool, "SELECT COUNT(*) FROM sessions").await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_utils::{create_test_db, create_test_mentorship, create_test_user};

    #[tokio::test]
    async fn set_role_promotes_but_never_self_demotes() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_test_user(&pool, "admin", Role::Admin).await;
        let user = create_test_user(&pool, "user", Role::Mentee).await;

        let promoted = set_role(&pool, &admin, &user.public_id, Role::Mentor).await.unwrap();
        assert_eq!(promoted.role, Role::Mentor);

        assert!(matches!(
            set_role(&pool, &admin, &admin.public_id, Role::Mentee).await,
            Err(ServiceError::BadRequest(_))
        ));
        assert!(matches!(
            set_role(&pool, &admin, "missing", Role::Mentor).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_user_cascades() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_test_user(&pool, "admin", Role::Admin).await;
        let mentor = create_test_user(&pool, "mentor", Role::Mentor).await;
        let mentee = create_test_user(&pool, "mentee", Role::Mentee).await;
        create_test_mentorship(&pool, &mentor, &mentee, "PENDING").await;

        delete_user(&pool, &admin, &mentor.public_id).await.unwrap();

        let requests: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mentorship_requests")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(requests, 0);
        assert!(matches!(
            delete_user(&pool, &admin, &admin.public_id).await,
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn list_users_and_stats() {
        let (pool, _dir) = create_test_db().await;
        create_test_user(&pool, "admin", Role::Admin).await;
        create_test_user(&pool, "mentor", Role::Mentor).await;
        create_test_user(&pool, "mentee", Role::Mentee).await;

        let all = list_users(&pool, None, 50, 0).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].email, "admin@example.com");

        let mentors = list_users(&pool, Some(Role::Mentor), 50, 0).await.unwrap();
        assert_eq!(mentors.len(), 1);

        let counts = stats(&pool).await.unwrap();
        assert_eq!(counts.users, 3);
        assert_eq!(counts.admins, 1);
        assert_eq!(counts.pending_requests, 0);
    }
}

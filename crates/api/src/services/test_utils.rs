//! Test utilities for service layer testing

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;

use mentorlink_auth::{Authenticator, Role, User};
use mentorlink_config::{AppConfig, DatabaseConfig};

use crate::AppState;

/// Creates a migrated test database in a temporary directory.
pub async fn create_test_db() -> (SqlitePool, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = DatabaseConfig {
        url: format!("sqlite://{}", temp_dir.path().join("test.db").display()),
        max_connections: 4,
    };

    let pool = mentorlink_database::initialize_database(&config)
        .await
        .expect("Failed to create test database");

    (pool, temp_dir)
}

pub fn test_state(pool: &SqlitePool) -> AppState {
    let config = AppConfig::default();
    let authenticator = Authenticator::new(pool.clone(), config.auth.clone());
    AppState::new(pool.clone(), authenticator, None, config)
}

/// Creates a user with an empty profile.
pub async fn create_test_user(pool: &SqlitePool, handle: &str, role: Role) -> User {
    let now = Utc::now().to_rfc3339();
    let public_id = format!("user-{handle}");
    let email = format!("{handle}@example.com");
    let display_name = format!("User {handle}");

    let id = sqlx::query(
        r#"
        INSERT INTO users (public_id, email, display_name, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(&email)
    .bind(&display_name)
    .bind(role.as_str())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("insert user")
    .last_insert_rowid();

    sqlx::query("INSERT INTO profiles (user_id, updated_at) VALUES (?, ?)")
        .bind(id)
        .bind(&now)
        .execute(pool)
        .await
        .expect("insert profile");

    User {
        id,
        public_id,
        email,
        display_name,
        role,
    }
}

/// Inserts a mentorship request with the given status and returns its row id.
pub async fn create_test_mentorship(
    pool: &SqlitePool,
    mentor: &User,
    mentee: &User,
    status: &str,
) -> (i64, String) {
    let public_id = format!("req-{}-{}-{}", mentor.id, mentee.id, status.to_ascii_lowercase());
    let now = Utc::now().to_rfc3339();
    let id = sqlx::query(
        r#"
        INSERT INTO mentorship_requests (public_id, mentor_id, mentee_id, message, status, created_at, responded_at)
        VALUES (?, ?, ?, '', ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(mentor.id)
    .bind(mentee.id)
    .bind(status)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("insert mentorship")
    .last_insert_rowid();

    (id, public_id)
}

/// Inserts a session for a mentorship with the given status.
pub async fn create_test_session(
    pool: &SqlitePool,
    mentorship_id: i64,
    mentor: &User,
    mentee: &User,
    status: &str,
) -> String {
    let public_id = format!("session-{mentorship_id}-{}", cuid_suffix());
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO mentorship_sessions
            (public_id, mentorship_id, mentor_id, mentee_id, title, scheduled_at, duration_minutes, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, 'Session', ?, 60, ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(mentorship_id)
    .bind(mentor.id)
    .bind(mentee.id)
    .bind((now + Duration::days(1)).to_rfc3339())
    .bind(status)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(pool)
    .await
    .expect("insert session");

    public_id
}

pub async fn set_profile_embedding(pool: &SqlitePool, user_id: i64, embedding: &[f32]) {
    sqlx::query("UPDATE profiles SET embedding = ? WHERE user_id = ?")
        .bind(serde_json::to_string(embedding).expect("serialise embedding"))
        .bind(user_id)
        .execute(pool)
        .await
        .expect("update embedding");
}

fn cuid_suffix() -> String {
    mentorlink_auth::new_public_id()
}

//! MentorLink database crate
//!
//! Connection preparation for the SQLite store and the embedded schema
//! migrations shared by every other crate in the workspace.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use mentorlink_config::DatabaseConfig;

pub mod connection;
pub mod migrations;

pub use connection::{prepare_database, DatabaseConnection};
pub use migrations::{run_migrations, MIGRATOR};

/// Re-export commonly used types for convenience
pub use sqlx::{Sqlite, SqlitePool as Pool};

/// Connect to the configured database and bring the schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> Result<SqlitePool> {
    let pool = prepare_database(config).await?;
    run_migrations(&pool).await?;
    info!(url = %config.url, "database ready");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_database() -> (SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let config = DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            max_connections: 2,
        };

        let pool = initialize_database(&config).await.unwrap();
        (pool, temp_dir)
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let (pool, _temp_dir) = create_test_database().await;

        let result: (bool,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();

        assert!(result.0);
    }

    #[tokio::test]
    async fn test_schema_contains_core_tables() {
        let (pool, _temp_dir) = create_test_database().await;

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();

        for expected in [
            "users",
            "sessions",
            "profiles",
            "mentorship_requests",
            "mentorship_sessions",
            "goals",
            "conversations",
            "messages",
            "notifications",
            "resources",
            "reviews",
            "ai_conversations",
            "point_events",
        ] {
            assert!(tables.iter().any(|name| name == expected), "missing table {expected}");
        }
    }

    #[tokio::test]
    async fn test_open_request_pair_is_unique() {
        let (pool, _temp_dir) = create_test_database().await;
        let now = "2024-01-01T00:00:00Z";

        for (id, email) in [(1_i64, "mentor@example.com"), (2, "mentee@example.com")] {
            sqlx::query(
                "INSERT INTO users (id, public_id, email, display_name, role, created_at, updated_at) VALUES (?, ?, ?, ?, 'mentor', ?, ?)",
            )
            .bind(id)
            .bind(format!("user-{id}"))
            .bind(email)
            .bind("User")
            .bind(now)
            .bind(now)
            .execute(&pool)
            .await
            .unwrap();
        }

        let insert = |public_id: &'static str, status: &'static str| {
            sqlx::query(
                "INSERT INTO mentorship_requests (public_id, mentor_id, mentee_id, status, created_at) VALUES (?, 1, 2, ?, ?)",
            )
            .bind(public_id)
            .bind(status)
            .bind(now)
        };

        insert("req-1", "REJECTED").execute(&pool).await.unwrap();
        insert("req-2", "PENDING").execute(&pool).await.unwrap();
        let duplicate = insert("req-3", "PENDING").execute(&pool).await;
        assert!(duplicate.is_err(), "second open request for the pair must fail");
    }
}

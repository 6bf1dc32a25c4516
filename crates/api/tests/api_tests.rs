use chrono::{Duration, Utc};
use http_body_util::BodyExt;

use axum::{
    body::Body,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_HEADERS,
            ACCESS_CONTROL_REQUEST_METHOD, AUTHORIZATION, CONTENT_TYPE, ORIGIN,
        },
        Method, Request, StatusCode,
    },
    Router,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

use mentorlink_api::{build_router, AppState};
use mentorlink_auth::Authenticator;
use mentorlink_config::{AppConfig, DatabaseConfig};

type TestResult<T = ()> = anyhow::Result<T>;

struct TestContext {
    _temp_dir: TempDir,
    pool: SqlitePool,
    state: AppState,
}

struct Account {
    token: String,
    public_id: String,
}

impl TestContext {
    async fn new() -> TestResult<Self> {
        let temp_dir = TempDir::new()?;
        let mut config = AppConfig::default();
        config.database = DatabaseConfig {
            url: format!(
                "sqlite://{}",
                temp_dir.path().join("api_tests.sqlite").display()
            ),
            max_connections: 5,
        };

        let pool = mentorlink_database::initialize_database(&config.database).await?;
        let authenticator = Authenticator::new(pool.clone(), config.auth.clone());
        let state = AppState::new(pool.clone(), authenticator, None, config);

        Ok(Self {
            _temp_dir: temp_dir,
            pool,
            state,
        })
    }

    fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResult<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router().oneshot(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        let payload = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, payload))
    }

    async fn register(&self, handle: &str, role: &str) -> TestResult<Account> {
        let (status, payload) = self
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "email": format!("{handle}@example.com"),
                    "password": "correct horse battery",
                    "display_name": handle,
                    "role": role,
                })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "register failed: {payload}");

        Ok(Account {
            token: payload["token"].as_str().unwrap_or_default().to_string(),
            public_id: payload["user"]["public_id"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        })
    }

    /// Mentee requests the mentor and the mentor accepts. Returns the
    /// mentorship id.
    async fn accepted_mentorship(&self, mentor: &Account, mentee: &Account) -> TestResult<String> {
        let (status, request) = self
            .send(
                Method::POST,
                "/api/requests",
                Some(&mentee.token),
                Some(json!({ "mentor_id": mentor.public_id, "message": "Hi!" })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED);
        let request_id = request["public_id"].as_str().unwrap_or_default().to_string();

        let (status, accepted) = self
            .send(
                Method::POST,
                &format!("/api/requests/{request_id}/accept"),
                Some(&mentor.token),
                None,
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(accepted["request"]["status"], "ACCEPTED");
        assert!(accepted["conversation_id"].is_string());

        Ok(request_id)
    }
}

mod router_tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_ok() -> TestResult {
        let ctx = TestContext::new().await?;
        let response = ctx
            .router()
            .oneshot(Request::builder().uri("/health").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await?.to_bytes();
        let payload: Value = serde_json::from_slice(&body)?;
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["ai_configured"], false);

        Ok(())
    }

    #[tokio::test]
    async fn cors_layer_allows_configured_methods_and_headers() -> TestResult {
        let ctx = TestContext::new().await?;
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/goals")
            .header(ORIGIN, "https://example.com")
            .header(ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(
                ACCESS_CONTROL_REQUEST_HEADERS,
                "authorization, content-type",
            )
            .body(Body::empty())?;

        let response = ctx.router().oneshot(request).await?;
        assert!(matches!(
            response.status(),
            StatusCode::NO_CONTENT | StatusCode::OK
        ));

        let header = |name| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_ascii_lowercase()
        };
        assert_eq!(header(ACCESS_CONTROL_ALLOW_ORIGIN), "*");
        assert!(header(ACCESS_CONTROL_ALLOW_METHODS).contains("post"));
        assert!(header(ACCESS_CONTROL_ALLOW_HEADERS).contains("authorization"));

        Ok(())
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() -> TestResult {
        let ctx = TestContext::new().await?;
        let (status, payload) = ctx.send(Method::GET, "/api/goals", None, None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(payload["error"].is_string());

        let (status, _) = ctx
            .send(Method::GET, "/api/goals", Some("not-a-token"), None)
            .await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        Ok(())
    }
}

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn register_login_me_logout() -> TestResult {
        let ctx = TestContext::new().await?;
        let account = ctx.register("ada", "mentor").await?;

        let (status, me) = ctx
            .send(Method::GET, "/api/auth/me", Some(&account.token), None)
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["role"], "mentor");
        assert_eq!(me["email"], "ada@example.com");

        let (status, login) = ctx
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "ADA@example.com", "password": "correct horse battery" })),
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(login["token"], account.token.as_str());

        let (status, _) = ctx
            .send(Method::POST, "/api/auth/logout", Some(&account.token), None)
            .await?;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = ctx
            .send(Method::GET, "/api/auth/me", Some(&account.token), None)
            .await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_duplicates_and_admin_role() -> TestResult {
        let ctx = TestContext::new().await?;
        ctx.register("grace", "mentee").await?;

        let body = json!({
            "email": "grace@example.com",
            "password": "correct horse battery",
            "display_name": "Grace",
        });
        let (status, _) = ctx
            .send(Method::POST, "/api/auth/register", None, Some(body))
            .await?;
        assert_eq!(status, StatusCode::CONFLICT);

        let body = json!({
            "email": "root@example.com",
            "password": "correct horse battery",
            "role": "admin",
        });
        let (status, _) = ctx
            .send(Method::POST, "/api/auth/register", None, Some(body))
            .await?;
        assert!(status.is_client_error());

        let (status, _) = ctx
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "grace@example.com", "password": "wrong password" })),
            )
            .await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        Ok(())
    }
}

mod mentorship_tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_request_conflicts() -> TestResult {
        let ctx = TestContext::new().await?;
        let mentor = ctx.register("mentor", "mentor").await?;
        let mentee = ctx.register("mentee", "mentee").await?;

        let body = json!({ "mentor_id": mentor.public_id });
        let (status, _) = ctx
            .send(Method::POST, "/api/requests", Some(&mentee.token), Some(body.clone()))
            .await?;
        assert_eq!(status, StatusCode::CREATED);

        let (status, payload) = ctx
            .send(Method::POST, "/api/requests", Some(&mentee.token), Some(body))
            .await?;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(payload["error"].is_string());

        let (status, incoming) = ctx
            .send(
                Method::GET,
                "/api/requests?direction=incoming&status=pending",
                Some(&mentor.token),
                None,
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(incoming.as_array().map(Vec::len), Some(1));

        let (status, _) = ctx
            .send(
                Method::GET,
                "/api/requests?status=archived",
                Some(&mentor.token),
                None,
            )
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        Ok(())
    }

    #[tokio::test]
    async fn requesting_a_mentee_is_rejected() -> TestResult {
        let ctx = TestContext::new().await?;
        let first = ctx.register("first", "mentee").await?;
        let second = ctx.register("second", "mentee").await?;

        let (status, _) = ctx
            .send(
                Method::POST,
                "/api/requests",
                Some(&first.token),
                Some(json!({ "mentor_id": second.public_id })),
            )
            .await?;
        assert!(status.is_client_error());

        Ok(())
    }

    #[tokio::test]
    async fn session_review_flow_awards_points_and_rejects_second_review() -> TestResult {
        let ctx = TestContext::new().await?;
        let mentor = ctx.register("mentor", "mentor").await?;
        let mentee = ctx.register("mentee", "mentee").await?;
        let mentorship_id = ctx.accepted_mentorship(&mentor, &mentee).await?;

        let review = json!({ "mentorship_id": mentorship_id, "rating": 5, "comment": "Great" });
        let (status, _) = ctx
            .send(Method::POST, "/api/reviews", Some(&mentee.token), Some(review.clone()))
            .await?;
        assert!(status.is_client_error(), "no completed session yet");

        let scheduled_at = (Utc::now() + Duration::days(2)).to_rfc3339();
        let (status, session) = ctx
            .send(
                Method::POST,
                "/api/sessions",
                Some(&mentor.token),
                Some(json!({
                    "mentorship_id": mentorship_id,
                    "title": "Kickoff",
                    "scheduled_at": scheduled_at,
                    "duration_minutes": 60,
                })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "{session}");
        let session_id = session["public_id"].as_str().unwrap_or_default().to_string();

        let (status, completed) = ctx
            .send(
                Method::POST,
                &format!("/api/sessions/{session_id}/complete"),
                Some(&mentor.token),
                None,
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(completed["status"], "COMPLETED");

        let (status, _) = ctx
            .send(Method::POST, "/api/reviews", Some(&mentee.token), Some(review.clone()))
            .await?;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = ctx
            .send(Method::POST, "/api/reviews", Some(&mentee.token), Some(review))
            .await?;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, reviews) = ctx
            .send(
                Method::GET,
                &format!("/api/users/{}/reviews", mentor.public_id),
                Some(&mentee.token),
                None,
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reviews[0]["rating"], 5);

        // accept 50 + session 20 for the mentor
        let points: i64 = sqlx::query_scalar("SELECT points FROM users WHERE public_id = ?")
            .bind(&mentor.public_id)
            .fetch_one(&ctx.pool)
            .await?;
        assert_eq!(points, 70);

        let (status, unread) = ctx
            .send(
                Method::GET,
                "/api/notifications/unread-count",
                Some(&mentor.token),
                None,
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert!(unread["unread_count"].as_i64().unwrap_or_default() >= 2);

        Ok(())
    }

    #[tokio::test]
    async fn conversation_messages_round_trip() -> TestResult {
        let ctx = TestContext::new().await?;
        let mentor = ctx.register("mentor", "mentor").await?;
        let mentee = ctx.register("mentee", "mentee").await?;
        ctx.accepted_mentorship(&mentor, &mentee).await?;

        let (status, conversations) = ctx
            .send(Method::GET, "/api/conversations", Some(&mentee.token), None)
            .await?;
        assert_eq!(status, StatusCode::OK);
        let conversation_id = conversations[0]["public_id"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        let uri = format!("/api/conversations/{conversation_id}/messages");
        let (status, sent) = ctx
            .send(
                Method::POST,
                &uri,
                Some(&mentee.token),
                Some(json!({ "content": "  When can we meet?  " })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(sent["content"], "When can we meet?");

        let (status, _) = ctx
            .send(Method::POST, &uri, Some(&mentee.token), Some(json!({ "content": "   " })))
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, messages) = ctx.send(Method::GET, &uri, Some(&mentor.token), None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(messages.as_array().map(Vec::len), Some(1));

        let (status, read) = ctx
            .send(
                Method::POST,
                &format!("/api/conversations/{conversation_id}/read"),
                Some(&mentor.token),
                None,
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(read["last_read_message_id"], sent["public_id"]);

        let outsider = ctx.register("outsider", "mentee").await?;
        let (status, _) = ctx.send(Method::GET, &uri, Some(&outsider.token), None).await?;
        assert_eq!(status, StatusCode::FORBIDDEN);

        Ok(())
    }
}

mod goal_tests {
    use super::*;

    #[tokio::test]
    async fn goal_lifecycle() -> TestResult {
        let ctx = TestContext::new().await?;
        let owner = ctx.register("owner", "mentee").await?;
        let other = ctx.register("other", "mentee").await?;

        let (status, goal) = ctx
            .send(
                Method::POST,
                "/api/goals",
                Some(&owner.token),
                Some(json!({ "title": "Ship a crate", "target_date": "2030-01-31" })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(goal["status"], "NOT_STARTED");
        let uri = format!("/api/goals/{}", goal["public_id"].as_str().unwrap_or_default());

        let (status, _) = ctx.send(Method::GET, &uri, Some(&other.token), None).await?;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, completed) = ctx
            .send(
                Method::POST,
                &format!("{uri}/status"),
                Some(&owner.token),
                Some(json!({ "status": "COMPLETED" })),
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert!(completed["completed_at"].is_string());

        let (status, listed) = ctx
            .send(Method::GET, "/api/goals?status=completed", Some(&owner.token), None)
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().map(Vec::len), Some(1));

        let (status, _) = ctx.send(Method::DELETE, &uri, Some(&owner.token), None).await?;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = ctx.send(Method::GET, &uri, Some(&owner.token), None).await?;
        assert_eq!(status, StatusCode::NOT_FOUND);

        Ok(())
    }
}

mod discovery_tests {
    use super::*;

    #[tokio::test]
    async fn discover_falls_back_to_recent_mentors() -> TestResult {
        let ctx = TestContext::new().await?;
        ctx.register("mentor", "mentor").await?;
        let mentee = ctx.register("mentee", "mentee").await?;

        let (status, mentors) = ctx
            .send(Method::GET, "/api/discover/mentors?limit=5", Some(&mentee.token), None)
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mentors.as_array().map(Vec::len), Some(1));
        assert_eq!(mentors[0]["strategy"], "recent");
        assert!(mentors[0]["score"].is_null());
        assert_eq!(mentors[0]["role"], "mentor");

        Ok(())
    }

    #[tokio::test]
    async fn community_stats_count_users() -> TestResult {
        let ctx = TestContext::new().await?;
        ctx.register("mentor", "mentor").await?;
        let mentee = ctx.register("mentee", "mentee").await?;

        let (status, stats) = ctx
            .send(Method::GET, "/api/community/stats", Some(&mentee.token), None)
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["mentors"], 1);
        assert_eq!(stats["mentees"], 1);
        assert_eq!(stats["online_users"], 0);

        let (status, board) = ctx
            .send(Method::GET, "/api/community/leaderboard", Some(&mentee.token), None)
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(board[0]["rank"], 1);

        Ok(())
    }

    #[tokio::test]
    async fn ai_routes_report_missing_provider() -> TestResult {
        let ctx = TestContext::new().await?;
        let user = ctx.register("learner", "mentee").await?;

        let (status, payload) = ctx
            .send(
                Method::POST,
                "/api/ai/chat",
                Some(&user.token),
                Some(json!({ "message": "How do I start?" })),
            )
            .await?;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(payload["error"].is_string());

        let (status, history) = ctx
            .send(Method::GET, "/api/ai/history", Some(&user.token), None)
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history, json!([]));

        Ok(())
    }
}

mod access_tests {
    use super::*;

    #[tokio::test]
    async fn admin_routes_reject_other_roles() -> TestResult {
        let ctx = TestContext::new().await?;
        let mentor = ctx.register("mentor", "mentor").await?;

        for uri in ["/api/admin/users", "/api/admin/stats"] {
            let (status, _) = ctx.send(Method::GET, uri, Some(&mentor.token), None).await?;
            assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        }

        sqlx::query("UPDATE users SET role = 'admin' WHERE public_id = ?")
            .bind(&mentor.public_id)
            .execute(&ctx.pool)
            .await?;

        let (status, stats) = ctx
            .send(Method::GET, "/api/admin/stats", Some(&mentor.token), None)
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["admins"], 1);

        Ok(())
    }

    #[tokio::test]
    async fn websocket_requires_valid_token() -> TestResult {
        let ctx = TestContext::new().await?;

        let (status, _) = ctx.send(Method::GET, "/ws", None, None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = ctx.send(Method::GET, "/ws?token=bogus", None, None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let account = ctx.register("socket", "mentee").await?;
        let (status, _) = ctx
            .send(Method::GET, &format!("/ws?token={}", account.token), None, None)
            .await?;
        assert_eq!(status, StatusCode::UPGRADE_REQUIRED);

        Ok(())
    }
}

//! HTTP and WebSocket surface of the MentorLink backend.

mod error;
mod state;
mod util;

pub mod models;
pub mod realtime;
pub mod routes;
pub mod services;

pub use error::ApiError;
pub use realtime::{ClientEvent, ServerEvent};
pub use state::AppState;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        // Auth routes
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/auth/me", get(routes::auth::me))
        // User routes
        .route("/api/users/me", get(routes::users::me))
        .route("/api/users/me/profile", put(routes::users::update_profile))
        .route(
            "/api/users/me/availability",
            put(routes::users::update_availability),
        )
        .route("/api/users/mentors", get(routes::users::list_mentors))
        .route("/api/users/:user_id", get(routes::users::get_user))
        .route(
            "/api/users/:user_id/reviews",
            get(routes::users::user_reviews),
        )
        // Mentorship request routes
        .route("/api/requests", get(routes::requests::list_requests))
        .route("/api/requests", post(routes::requests::create_request))
        .route(
            "/api/requests/:request_id/accept",
            post(routes::requests::accept_request),
        )
        .route(
            "/api/requests/:request_id/reject",
            post(routes::requests::reject_request),
        )
        .route(
            "/api/requests/:request_id",
            delete(routes::requests::withdraw_request),
        )
        // Session routes
        .route("/api/sessions", get(routes::sessions::list_sessions))
        .route("/api/sessions", post(routes::sessions::create_session))
        .route(
            "/api/sessions/:session_id",
            get(routes::sessions::get_session),
        )
        .route(
            "/api/sessions/:session_id",
            put(routes::sessions::update_session),
        )
        .route(
            "/api/sessions/:session_id/complete",
            post(routes::sessions::complete_session),
        )
        .route(
            "/api/sessions/:session_id/cancel",
            post(routes::sessions::cancel_session),
        )
        .route(
            "/api/sessions/:session_id/feedback",
            post(routes::sessions::submit_feedback),
        )
        // Goal routes
        .route("/api/goals", get(routes::goals::list_goals))
        .route("/api/goals", post(routes::goals::create_goal))
        .route("/api/goals/:goal_id", get(routes::goals::get_goal))
        .route("/api/goals/:goal_id", put(routes::goals::update_goal))
        .route("/api/goals/:goal_id", delete(routes::goals::delete_goal))
        .route(
            "/api/goals/:goal_id/status",
            post(routes::goals::set_goal_status),
        )
        // Conversation routes
        .route(
            "/api/conversations",
            get(routes::conversations::list_conversations),
        )
        .route(
            "/api/conversations",
            post(routes::conversations::create_conversation),
        )
        .route(
            "/api/conversations/:conversation_id/messages",
            get(routes::conversations::list_messages),
        )
        .route(
            "/api/conversations/:conversation_id/messages",
            post(routes::conversations::send_message),
        )
        .route(
            "/api/conversations/:conversation_id/read",
            post(routes::conversations::mark_read),
        )
        // Notification routes
        .route(
            "/api/notifications",
            get(routes::notifications::list_notifications),
        )
        .route(
            "/api/notifications/unread-count",
            get(routes::notifications::unread_count),
        )
        .route(
            "/api/notifications/read-all",
            post(routes::notifications::mark_all_read),
        )
        .route(
            "/api/notifications/:notification_id/read",
            put(routes::notifications::mark_read),
        )
        .route(
            "/api/notifications/:notification_id",
            delete(routes::notifications::delete_notification),
        )
        // Review routes
        .route("/api/reviews", post(routes::reviews::create_review))
        // Resource routes
        .route("/api/resources", get(routes::resources::list_resources))
        .route("/api/resources", post(routes::resources::create_resource))
        .route(
            "/api/resources/:resource_id",
            get(routes::resources::get_resource),
        )
        .route(
            "/api/resources/:resource_id",
            delete(routes::resources::delete_resource),
        )
        // Discovery and community
        .route(
            "/api/discover/mentors",
            get(routes::discover::recommend_mentors),
        )
        .route(
            "/api/discover/resources",
            get(routes::discover::recommend_resources),
        )
        .route(
            "/api/community/leaderboard",
            get(routes::community::leaderboard),
        )
        .route("/api/community/stats", get(routes::community::stats))
        // Assistant routes
        .route("/api/ai/chat", post(routes::ai::chat))
        .route("/api/ai/history", get(routes::ai::history))
        .route("/api/ai/history", delete(routes::ai::clear_history))
        .route("/api/ai/goals/suggest", post(routes::ai::suggest_goals))
        .route(
            "/api/ai/embeddings/profile",
            post(routes::ai::refresh_profile_embedding),
        )
        // Admin routes
        .route("/api/admin/users", get(routes::admin::list_users))
        .route("/api/admin/users/:user_id/role", put(routes::admin::set_role))
        .route(
            "/api/admin/users/:user_id",
            delete(routes::admin::delete_user),
        )
        .route("/api/admin/stats", get(routes::admin::stats))
        // WebSocket route
        .route("/ws", get(realtime::websocket_handler))
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}

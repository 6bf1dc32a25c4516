use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use crate::{
    models::{MentorshipSession, SessionStatus},
    services::sessions::{self, CreateSessionRequest, FeedbackRequest, UpdateSessionRequest},
    util::parse_filter,
    ApiError, AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    pub status: Option<String>,
}

pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<MentorshipSession>), ApiError> {
    let user = state.current_user(&headers).await?;
    let session = sessions::create_session(&state, &user, req).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<Vec<MentorshipSession>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let status = parse_filter::<SessionStatus>(query.status.as_deref())?;
    Ok(Json(sessions::list_sessions(state.db_pool(), user.id, status).await?))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MentorshipSession>, ApiError> {
    let user = state.current_user(&headers).await?;
    Ok(Json(sessions::get_session(state.db_pool(), user.id, &session_id).await?))
}

pub async fn update_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateSessionRequest>,
) -> Result<Json<MentorshipSession>, ApiError> {
    let user = state.current_user(&headers).await?;
    Ok(Json(
        sessions::update_session(state.db_pool(), user.id, &session_id, req).await?,
    ))
}

pub async fn complete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MentorshipSession>, ApiError> {
    let user = state.current_user(&headers).await?;
    Ok(Json(sessions::complete_session(&state, &user, &session_id).await?))
}

pub async fn cancel_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MentorshipSession>, ApiError> {
    let user = state.current_user(&headers).await?;
    Ok(Json(sessions::cancel_session(&state, &user, &session_id).await?))
}

pub async fn submit_feedback(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<MentorshipSession>, ApiError> {
    let user = state.current_user(&headers).await?;
    Ok(Json(
        sessions::submit_feedback(state.db_pool(), user.id, &session_id, req).await?,
    ))
}

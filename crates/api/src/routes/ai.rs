use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

use mentorlink_ai::GoalSuggestion;

use crate::{
    models::{AiTurn, Profile},
    services::ai::{self, ChatReply, ChatRequest, SuggestGoalsRequest},
    util::page_size,
    ApiError, AppState,
};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<GoalSuggestion>,
}

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let user = state.current_user(&headers).await?;
    Ok(Json(ai::chat(&state, &user, req).await?))
}

pub async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<AiTurn>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let limit = query
        .limit
        .map(|limit| page_size(Some(limit)) as usize)
        .unwrap_or(state.config().ai.history_window);
    Ok(Json(ai::history(state.db_pool(), user.id, limit).await?))
}

pub async fn clear_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state.current_user(&headers).await?;
    let deleted = ai::clear_history(state.db_pool(), user.id).await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

pub async fn suggest_goals(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<SuggestGoalsRequest>>,
) -> Result<Json<SuggestionsResponse>, ApiError> {
    let user = state.current_user(&headers).await?;
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let suggestions = ai::suggest_goals(&state, &user, req).await?;
    Ok(Json(SuggestionsResponse { suggestions }))
}

pub async fn refresh_profile_embedding(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Profile>, ApiError> {
    let user = state.current_user(&headers).await?;
    Ok(Json(ai::refresh_profile_embedding(&state, user.id).await?))
}

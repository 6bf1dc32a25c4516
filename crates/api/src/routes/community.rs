use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use crate::{
    services::community::{self, CommunityStats, LeaderboardEntry},
    util::page_size,
    ApiError, AppState,
};

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
}

pub async fn leaderboard(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    state.current_user(&headers).await?;
    Ok(Json(
        community::leaderboard(state.db_pool(), page_size(query.limit)).await?,
    ))
}

pub async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CommunityStats>, ApiError> {
    state.current_user(&headers).await?;
    let mut stats = community::stats(state.db_pool()).await?;
    stats.online_users = state.hub().online_users().await.len();
    Ok(Json(stats))
}

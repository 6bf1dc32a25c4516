use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use crate::{
    models::{Resource, UserView},
    services::recommend::{self, Recommendation},
    util::page_size,
    ApiError, AppState,
};

const DEFAULT_RECOMMENDATIONS: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct DiscoverQuery {
    pub limit: Option<i64>,
}

impl DiscoverQuery {
    fn limit(&self) -> usize {
        page_size(Some(self.limit.unwrap_or(DEFAULT_RECOMMENDATIONS))) as usize
    }
}

pub async fn recommend_mentors(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DiscoverQuery>,
) -> Result<Json<Vec<Recommendation<UserView>>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let mut mentors = recommend::recommend_mentors(state.db_pool(), user.id, query.limit()).await?;
    for mentor in &mut mentors {
        mentor.item.online = state.hub().is_online(mentor.item.user.id).await;
    }
    Ok(Json(mentors))
}

pub async fn recommend_resources(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DiscoverQuery>,
) -> Result<Json<Vec<Recommendation<Resource>>>, ApiError> {
    let user = state.current_user(&headers).await?;
    Ok(Json(
        recommend::recommend_resources(state.db_pool(), user.id, query.limit()).await?,
    ))
}

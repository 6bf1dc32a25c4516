use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use crate::{
    models::Resource,
    services::resources::{self, CreateResourceRequest},
    util::page_size,
    ApiError, AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListResourcesQuery {
    pub tag: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_resources(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListResourcesQuery>,
) -> Result<Json<Vec<Resource>>, ApiError> {
    state.current_user(&headers).await?;
    let resources = resources::list_resources(
        state.db_pool(),
        query.tag.as_deref(),
        page_size(query.limit),
        query.offset.unwrap_or(0),
    )
    .await?;
    Ok(Json(resources))
}

pub async fn create_resource(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateResourceRequest>,
) -> Result<(StatusCode, Json<Resource>), ApiError> {
    let user = state.current_user(&headers).await?;
    let resource = resources::create_resource(&state, &user, req).await?;
    Ok((StatusCode::CREATED, Json(resource)))
}

pub async fn get_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Resource>, ApiError> {
    state.current_user(&headers).await?;
    Ok(Json(resources::get_resource(state.db_pool(), &resource_id).await?))
}

pub async fn delete_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let user = state.current_user(&headers).await?;
    resources::delete_resource(state.db_pool(), &user, &resource_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

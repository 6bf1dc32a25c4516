use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use crate::{
    models::Notification,
    services::notifications,
    util::page_size,
    ApiError, AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let notifications = notifications::list(
        state.db_pool(),
        user.id,
        query.unread_only,
        page_size(query.limit),
        query.offset.unwrap_or(0),
    )
    .await?;
    Ok(Json(notifications))
}

pub async fn unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state.current_user(&headers).await?;
    let count = notifications::unread_count(state.db_pool(), user.id).await?;
    Ok(Json(serde_json::json!({ "unread_count": count })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Notification>, ApiError> {
    let user = state.current_user(&headers).await?;
    Ok(Json(
        notifications::mark_read(state.db_pool(), user.id, notification_id).await?,
    ))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state.current_user(&headers).await?;
    let updated = notifications::mark_all_read(state.db_pool(), user.id).await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Path(notification_id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let user = state.current_user(&headers).await?;
    notifications::delete(state.db_pool(), user.id, notification_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

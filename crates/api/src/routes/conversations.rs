use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    models::{Conversation, Message},
    services::conversations::{self, CreateConversationRequest, SendMessageRequest},
    util::page_size,
    ApiError, AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    pub before: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MarkReadRequest {
    #[serde(default)]
    pub message_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub last_read_message_id: Option<String>,
}

pub async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let user = state.current_user(&headers).await?;
    Ok(Json(conversations::list_conversations(state.db_pool(), user.id).await?))
}

pub async fn create_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let user = state.current_user(&headers).await?;
    let conversation = conversations::create_conversation(state.db_pool(), &user, req).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let messages = conversations::list_messages(
        state.db_pool(),
        &conversation_id,
        user.id,
        query.before.as_deref(),
        page_size(query.limit),
    )
    .await?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let user = state.current_user(&headers).await?;
    let (message, recipients) =
        conversations::send_message(state.db_pool(), &conversation_id, &user, &req.content).await?;
    state
        .publish_message(&message, &user.display_name, &recipients)
        .await;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<MarkReadRequest>>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let user = state.current_user(&headers).await?;
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let membership = conversations::membership(state.db_pool(), &conversation_id, user.id).await?;
    let marker = conversations::mark_read(
        state.db_pool(),
        &conversation_id,
        user.id,
        req.message_id.as_deref(),
    )
    .await?;

    if let Some(message_id) = marker.clone() {
        state.publish_read_receipt(&membership, &user, message_id).await;
    }
    Ok(Json(MarkReadResponse {
        last_read_message_id: marker,
    }))
}

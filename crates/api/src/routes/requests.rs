use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    models::{MentorshipRequest, RequestStatus},
    services::requests::{self, CreateRequestRequest, Direction},
    util::parse_filter,
    ApiError, AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListRequestsQuery {
    pub direction: Option<Direction>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RespondResponse {
    pub request: MentorshipRequest,
    pub conversation_id: Option<String>,
}

pub async fn create_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateRequestRequest>,
) -> Result<(StatusCode, Json<MentorshipRequest>), ApiError> {
    let user = state.current_user(&headers).await?;
    let request = requests::create_request(&state, &user, req).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_requests(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListRequestsQuery>,
) -> Result<Json<Vec<MentorshipRequest>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let status = parse_filter::<RequestStatus>(query.status.as_deref())?;
    Ok(Json(
        requests::list_requests(state.db_pool(), user.id, query.direction, status).await?,
    ))
}

async fn respond(
    state: AppState,
    headers: HeaderMap,
    request_id: String,
    accept: bool,
) -> Result<Json<RespondResponse>, ApiError> {
    let user = state.current_user(&headers).await?;
    let response = requests::respond(&state, &user, &request_id, accept).await?;
    Ok(Json(RespondResponse {
        request: response.request,
        conversation_id: response.conversation_id,
    }))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RespondResponse>, ApiError> {
    respond(state, headers, request_id, true).await
}

pub async fn reject_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RespondResponse>, ApiError> {
    respond(state, headers, request_id, false).await
}

pub async fn withdraw_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let user = state.current_user(&headers).await?;
    requests::withdraw(state.db_pool(), &user, &request_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

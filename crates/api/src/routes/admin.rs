use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use mentorlink_auth::{Role, User};

use crate::{
    models::UserSummary,
    services::admin::{self, AdminStats, AdminUser, SetRoleRequest},
    util::{page_size, require_role},
    ApiError, AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let user = state.current_user(headers).await?;
    require_role(&user, Role::Admin)?;
    Ok(user)
}

pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<AdminUser>>, ApiError> {
    require_admin(&state, &headers).await?;
    let role = match query.role.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(role) => Some(role.parse::<Role>().map_err(|_| {
            ApiError::bad_request(format!("unknown role: {role}"))
        })?),
    };

    let users = admin::list_users(
        state.db_pool(),
        role,
        page_size(query.limit),
        query.offset.unwrap_or(0),
    )
    .await?;
    Ok(Json(users))
}

pub async fn set_role(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SetRoleRequest>,
) -> Result<Json<UserSummary>, ApiError> {
    let caller = require_admin(&state, &headers).await?;
    Ok(Json(
        admin::set_role(state.db_pool(), &caller, &user_id, req.role).await?,
    ))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let caller = require_admin(&state, &headers).await?;
    admin::delete_user(state.db_pool(), &caller, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AdminStats>, ApiError> {
    require_admin(&state, &headers).await?;
    Ok(Json(admin::stats(state.db_pool()).await?))
}

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use crate::{
    models::{Goal, GoalStatus},
    services::goals::{self, CreateGoalRequest, SetStatusRequest, UpdateGoalRequest},
    util::parse_filter,
    ApiError, AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListGoalsQuery {
    pub status: Option<String>,
}

pub async fn list_goals(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListGoalsQuery>,
) -> Result<Json<Vec<Goal>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let status = parse_filter::<GoalStatus>(query.status.as_deref())?;
    Ok(Json(goals::list_goals(state.db_pool(), user.id, status).await?))
}

pub async fn create_goal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateGoalRequest>,
) -> Result<(StatusCode, Json<Goal>), ApiError> {
    let user = state.current_user(&headers).await?;
    let goal = goals::create_goal(state.db_pool(), user.id, req).await?;
    Ok((StatusCode::CREATED, Json(goal)))
}

pub async fn get_goal(
    State(state): State<AppState>,
    Path(goal_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Goal>, ApiError> {
    let user = state.current_user(&headers).await?;
    Ok(Json(goals::get_goal(state.db_pool(), user.id, &goal_id).await?))
}

pub async fn update_goal(
    State(state): State<AppState>,
    Path(goal_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateGoalRequest>,
) -> Result<Json<Goal>, ApiError> {
    let user = state.current_user(&headers).await?;
    Ok(Json(goals::update_goal(state.db_pool(), user.id, &goal_id, req).await?))
}

pub async fn delete_goal(
    State(state): State<AppState>,
    Path(goal_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let user = state.current_user(&headers).await?;
    goals::delete_goal(state.db_pool(), user.id, &goal_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_goal_status(
    State(state): State<AppState>,
    Path(goal_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SetStatusRequest>,
) -> Result<Json<Goal>, ApiError> {
    let user = state.current_user(&headers).await?;
    Ok(Json(goals::set_status(&state, &user, &goal_id, req.status).await?))
}

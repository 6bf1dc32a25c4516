use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use mentorlink_auth::Role;

use crate::{
    models::{Profile, Review, UserView},
    services::{reviews, users},
    util::page_size,
    ApiError, AppState,
};

#[derive(Debug, Deserialize)]
pub struct MentorsQuery {
    pub skill: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub availability: Value,
}

pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<UserView>, ApiError> {
    let user = state.current_user(&headers).await?;
    let online = state.hub().is_online(user.id).await;
    Ok(Json(users::user_view(state.db_pool(), user.id, true, online).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<users::UpdateProfileRequest>,
) -> Result<Json<Profile>, ApiError> {
    let user = state.current_user(&headers).await?;
    Ok(Json(users::update_profile(state.db_pool(), user.id, req).await?))
}

pub async fn update_availability(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<Profile>, ApiError> {
    let user = state.current_user(&headers).await?;
    Ok(Json(users::publish_availability(&state, &user, &req.availability).await?))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<UserView>, ApiError> {
    let viewer = state.current_user(&headers).await?;
    let target = users::find_by_public_id(state.db_pool(), &user_id).await?;

    let include_email = viewer.id == target.id || viewer.role == Role::Admin;
    let online = state.hub().is_online(target.id).await;
    Ok(Json(
        users::user_view(state.db_pool(), target.id, include_email, online).await?,
    ))
}

pub async fn list_mentors(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<MentorsQuery>,
) -> Result<Json<Vec<UserView>>, ApiError> {
    state.current_user(&headers).await?;

    let mut mentors =
        users::list_mentors(state.db_pool(), query.skill.as_deref(), page_size(query.limit)).await?;
    for mentor in &mut mentors {
        mentor.online = state.hub().is_online(mentor.user.id).await;
    }
    Ok(Json(mentors))
}

pub async fn user_reviews(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Review>>, ApiError> {
    state.current_user(&headers).await?;
    let mentor = users::find_by_public_id(state.db_pool(), &user_id).await?;
    Ok(Json(
        reviews::list_for_mentor(state.db_pool(), mentor.id, page_size(query.limit)).await?,
    ))
}

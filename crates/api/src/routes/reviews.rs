use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    models::Review,
    services::reviews::{self, CreateReviewRequest},
    ApiError, AppState,
};

pub async fn create_review(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    let user = state.current_user(&headers).await?;
    let review = reviews::create_review(&state, &user, req).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

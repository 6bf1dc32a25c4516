use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use mentorlink_auth::{AuthSession, Registration, Role, User};

use crate::{util::require_bearer, ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub expires_at: String,
    pub user: User,
}

impl AuthResponse {
    fn new(user: User, session: AuthSession) -> Self {
        Self {
            token: session.token,
            expires_at: session.expires_at.to_rfc3339(),
            user,
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let role = match req.role.as_deref().map(str::trim) {
        None | Some("") => Role::Mentee,
        Some(role) => role.parse::<Role>()?,
    };

    let user = state
        .authenticator()
        .register_with_password(Registration {
            email: &req.email,
            password: &req.password,
            display_name: &req.display_name,
            role,
        })
        .await?;
    let (user, session) = state
        .authenticator()
        .login_with_password(&user.email, &req.password)
        .await?;

    info!(user_id = user.id, role = %user.role, "user registered");
    Ok((StatusCode::CREATED, Json(AuthResponse::new(user, session))))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let (user, session) = state
        .authenticator()
        .login_with_password(&req.email, &req.password)
        .await?;
    Ok(Json(AuthResponse::new(user, session)))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    let token = require_bearer(&headers)?;
    state.authenticator().revoke_session(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<User>, ApiError> {
    Ok(Json(state.current_user(&headers).await?))
}

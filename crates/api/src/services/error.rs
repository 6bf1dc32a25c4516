use std::fmt;

use mentorlink_ai::AiError;
use mentorlink_auth::AuthError;

use crate::ApiError;

#[derive(Debug)]
pub enum ServiceError {
    NotFound(String),
    Forbidden(String),
    BadRequest(String),
    Conflict(String),
    Database(sqlx::Error),
    Auth(AuthError),
    Ai(AiError),
    Internal(String),
}

impl ServiceError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg)
            | Self::Internal(msg) => f.write_str(msg),
            Self::Database(err) => write!(f, "database error: {err}"),
            Self::Auth(err) => write!(f, "{err}"),
            Self::Ai(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(msg) => ApiError::not_found(msg),
            ServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ServiceError::BadRequest(msg) => ApiError::bad_request(msg),
            ServiceError::Conflict(msg) => ApiError::conflict(msg),
            ServiceError::Database(db_err) => {
                tracing::error!(error = %db_err, "database error");
                ApiError::internal_server_error("Database operation failed")
            }
            ServiceError::Auth(auth_err) => ApiError::from(auth_err),
            ServiceError::Ai(ai_err) => ApiError::from(ai_err),
            ServiceError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                ApiError::internal_server_error("internal server error")
            }
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound("Resource not found".into()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict("Resource already exists".into())
            }
            _ => Self::Database(err),
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<AiError> for ServiceError {
    fn from(err: AiError) -> Self {
        Self::Ai(err)
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("stored JSON is malformed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn row_not_found_maps_to_404() {
        let err = ServiceError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(ApiError::from(err).status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn database_errors_hide_details() {
        let api = ApiError::from(ServiceError::from(sqlx::Error::PoolTimedOut));
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.message, "Database operation failed");
    }

    #[test]
    fn conflict_and_ai_errors_keep_their_status() {
        assert_eq!(
            ApiError::from(ServiceError::conflict("taken")).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(ServiceError::from(AiError::NotConfigured)).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}

use std::str::FromStr;

use axum::http::{header::AUTHORIZATION, HeaderMap};

use mentorlink_auth::{Role, User};

use crate::{services::ServiceError, ApiError};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

pub fn require_bearer(headers: &HeaderMap) -> Result<String, ApiError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;

    let mut parts = value.split_whitespace();
    let scheme = parts.next().unwrap_or("");
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return Err(ApiError::unauthorized("invalid authorization scheme"));
    }

    let token = parts.next().unwrap_or("");
    if token.is_empty() {
        return Err(ApiError::unauthorized("missing bearer token"));
    }

    Ok(token.to_string())
}

pub fn require_role(user: &User, role: Role) -> Result<(), ApiError> {
    if user.role == role {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!("{role} role required")))
    }
}

/// Clamp an optional `limit` query parameter to `1..=MAX_PAGE_SIZE`.
pub fn page_size(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

/// Parse an optional status-like query parameter; blank counts as absent.
pub fn parse_filter<T>(value: Option<&str>) -> Result<Option<T>, ApiError>
where
    T: FromStr<Err = ServiceError>,
{
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.parse::<T>())
        .transpose()
        .map_err(ApiError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};

    #[test]
    fn require_bearer_extracts_token_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer TOKEN123"));

        let token = require_bearer(&headers).expect("token should be extracted");
        assert_eq!(token, "TOKEN123");
    }

    #[test]
    fn require_bearer_rejects_missing_token() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer"));

        let error = require_bearer(&headers).expect_err("should reject missing token");
        assert_eq!(error.status, StatusCode::UNAUTHORIZED);
        assert!(error.message.contains("missing bearer token"));
    }

    #[test]
    fn require_bearer_rejects_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(
            require_bearer(&headers).unwrap_err().status,
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn require_role_returns_forbidden() {
        let user = User {
            id: 1,
            public_id: "u1".into(),
            email: "u1@example.com".into(),
            display_name: "U1".into(),
            role: Role::Mentee,
        };
        assert!(require_role(&user, Role::Mentee).is_ok());
        assert_eq!(
            require_role(&user, Role::Admin).unwrap_err().status,
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(page_size(None), DEFAULT_PAGE_SIZE);
        assert_eq!(page_size(Some(0)), 1);
        assert_eq!(page_size(Some(1_000)), MAX_PAGE_SIZE);
    }

    #[test]
    fn parse_filter_ignores_blank_and_rejects_unknown() {
        use crate::models::RequestStatus;

        assert_eq!(parse_filter::<RequestStatus>(None).unwrap(), None);
        assert_eq!(parse_filter::<RequestStatus>(Some(" ")).unwrap(), None);
        assert_eq!(
            parse_filter::<RequestStatus>(Some("accepted")).unwrap(),
            Some(RequestStatus::Accepted)
        );
        assert_eq!(
            parse_filter::<RequestStatus>(Some("archived")).unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
    }
}

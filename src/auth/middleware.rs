use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{
        HeaderValue, StatusCode,
        header::{AUTHORIZATION, COOKIE, WWW_AUTHENTICATE},
        request::Parts,
    },
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::helpers::{SessionValidationError, extract_session_token, validate_session};
use crate::server::AppState;
use crate::types::{Session, User};

/// Extractor that requires a valid session.
pub struct RequireSession {
    pub session: Session,
    pub user: User,
}

/// Extractor for routes readable anonymously. A missing credential yields
/// `None`; a present but invalid one is still rejected.
pub struct OptionalSession(pub Option<User>);

impl OptionalSession {
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.0.as_ref()
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingSession,
    InvalidScheme,
    InvalidSession,
    SessionExpired,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingSession => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidSession => (StatusCode::UNAUTHORIZED, "Invalid session"),
            AuthError::SessionExpired => (StatusCode::UNAUTHORIZED, "Session expired"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });
        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"playvault\""),
            );
        }

        response
    }
}

impl From<SessionValidationError> for AuthError {
    fn from(e: SessionValidationError) -> Self {
        match e {
            SessionValidationError::InvalidScheme => AuthError::InvalidScheme,
            SessionValidationError::InvalidSession => AuthError::InvalidSession,
            SessionValidationError::SessionExpired => AuthError::SessionExpired,
            SessionValidationError::InternalError => AuthError::InternalError,
        }
    }
}

impl FromRequestParts<Arc<AppState>> for RequireSession {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        resolve_session(parts, state)?.ok_or(AuthError::MissingSession)
    }
}

impl FromRequestParts<Arc<AppState>> for OptionalSession {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let session = resolve_session(parts, state)?;
        Ok(OptionalSession(session.map(|s| s.user)))
    }
}

fn resolve_session(
    parts: &Parts,
    state: &Arc<AppState>,
) -> Result<Option<RequireSession>, AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    let cookie_header = parts.headers.get(COOKIE).and_then(|h| h.to_str().ok());

    let Some(raw_token) = extract_session_token(auth_header, cookie_header)? else {
        return Ok(None);
    };

    let validated = validate_session(state.store.as_ref(), &raw_token)?;

    Ok(Some(RequireSession {
        session: validated.session,
        user: validated.user,
    }))
}

use chrono::Utc;

use super::{SessionTokens, parse_token};
use crate::store::Store;
use crate::types::{Session, User};

pub const SESSION_COOKIE: &str = "pv_session";

#[derive(Debug)]
pub enum SessionValidationError {
    InvalidScheme,
    InvalidSession,
    SessionExpired,
    InternalError,
}

pub struct ValidatedSession {
    pub session: Session,
    pub user: User,
}

/// Finds the session cookie in a `Cookie` header value.
pub fn extract_session_cookie(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// Extracts the raw session token from the Authorization header (Bearer) or
/// the session cookie. The Authorization header wins when both are present.
/// Returns Ok(None) when neither carries a credential.
pub fn extract_session_token(
    auth_header: Option<&str>,
    cookie_header: Option<&str>,
) -> Result<Option<String>, SessionValidationError> {
    match auth_header {
        Some(header) => match header.strip_prefix("Bearer ") {
            Some(token) => Ok(Some(token.trim().to_string())),
            None => Err(SessionValidationError::InvalidScheme),
        },
        None => Ok(cookie_header.and_then(extract_session_cookie)),
    }
}

/// Validates a raw session token against the store and loads its user.
pub fn validate_session(
    store: &dyn Store,
    raw_token: &str,
) -> Result<ValidatedSession, SessionValidationError> {
    let (lookup, _secret) =
        parse_token(raw_token).map_err(|_| SessionValidationError::InvalidSession)?;

    let session = store
        .get_session_by_lookup(&lookup)
        .map_err(|_| SessionValidationError::InternalError)?
        .ok_or(SessionValidationError::InvalidSession)?;

    if !SessionTokens::new()
        .verify(raw_token, &session.token_hash)
        .map_err(|_| SessionValidationError::InternalError)?
    {
        return Err(SessionValidationError::InvalidSession);
    }

    if let Some(expires_at) = &session.expires_at {
        if expires_at < &Utc::now() {
            return Err(SessionValidationError::SessionExpired);
        }
    }

    let user = store
        .get_user(&session.user_id)
        .map_err(|_| SessionValidationError::InternalError)?
        .ok_or(SessionValidationError::InvalidSession)?;

    if let Err(e) = store.update_session_last_used(&session.id) {
        tracing::warn!("Failed to update session last_used_at: {e}");
    }

    Ok(ValidatedSession { session, user })
}

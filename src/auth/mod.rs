mod helpers;
mod middleware;
mod token;

pub use helpers::{SESSION_COOKIE, extract_session_cookie};
pub use middleware::{AuthError, OptionalSession, RequireSession};
pub use token::{SessionTokens, parse_token};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::store::Store;
use crate::types::Session;

/// Creates and persists a session for `user_id`, returning the raw token.
/// The raw token is never stored and cannot be recovered later.
pub fn issue_session(
    store: &dyn Store,
    user_id: &str,
    expires_at: Option<DateTime<Utc>>,
) -> Result<(Session, String)> {
    let (raw_token, lookup, hash) = SessionTokens::new().generate()?;
    let session = Session {
        id: Uuid::new_v4().to_string(),
        token_hash: hash,
        token_lookup: lookup,
        user_id: user_id.to_string(),
        created_at: Utc::now(),
        expires_at,
        last_used_at: None,
    };
    store.create_session(&session)?;
    Ok((session, raw_token))
}

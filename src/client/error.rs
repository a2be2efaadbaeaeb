use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("offline: {0}")]
    Offline(String),

    #[error("request timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("local store unavailable: {0}")]
    LocalStore(String),

    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },
}

impl ClientError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Api { status, .. } if *status == StatusCode::NOT_FOUND.as_u16())
    }

    #[must_use]
    pub fn is_offline(&self) -> bool {
        matches!(self, ClientError::Offline(_))
    }

    /// Failures where the request never got an answer from the server.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            ClientError::Offline(_) | ClientError::Timeout | ClientError::Network(_)
        )
    }
}

impl From<crate::error::Error> for ClientError {
    fn from(err: crate::error::Error) -> Self {
        match err {
            crate::error::Error::BadRequest(message) => ClientError::Invalid(message),
            other => ClientError::LocalStore(other.to_string()),
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

use std::time::Duration;

use thiserror::Error;

use crate::config::connection::ConnectionField;

pub type TokenResult<T> = Result<T, TokenError>;

#[derive(Error, Debug)]
pub enum TokenError {
    /// Credentials rejected by the Token Service (HTTP 401). Never retried here.
    #[error("Authentication failed: Token Service returned {0}")]
    AuthenticationFailed(String),

    #[error("Server error: {message}")]
    ServerError {
        status: Option<u16>,
        message: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Service account source error: {0}")]
    ServiceAccount(String),

    #[error("Missing configuration: {}", ConnectionField::join(.0))]
    MissingConfiguration(Vec<ConnectionField>),

    #[error("No password available for user '{0}'")]
    MissingPassword(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Timed out after {}s waiting for the authorization redirect", .0.as_secs())]
    Timeout(Duration),

    #[error("Redirect listener error: {0}")]
    Listener(String),

    #[error("Secret store error: {0}")]
    SecretStore(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TokenError {
    pub fn server(status: Option<u16>, message: impl Into<String>) -> Self {
        TokenError::ServerError {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TokenError::ServerError { status, .. } => *status,
            TokenError::AuthenticationFailed(_) => Some(401),
            _ => None,
        }
    }

    /// Transport failures are the only ones worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            TokenError::Http(err) => err.is_connect() || err.is_timeout() || err.is_request(),
            _ => false,
        }
    }
}

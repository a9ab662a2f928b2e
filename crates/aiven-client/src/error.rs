//! Aiven client errors

use thiserror::Error;

/// Errors that can occur when interacting with the Aiven API
#[derive(Debug, Error)]
pub enum AivenError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Aiven API returned a non-success status
    #[error("Aiven API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Message from the response body
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (invalid token, expired, etc.)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl AivenError {
    /// Maps an HTTP status and response message onto an error variant.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Authentication(message),
            404 => Self::NotFound(message),
            409 if message.to_lowercase().contains("already exists") => Self::AlreadyExists(message),
            _ => Self::Api { status, message },
        }
    }

    /// HTTP status code carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Authentication(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::AlreadyExists(_) => Some(409),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Serialization(_) | Self::InvalidRequest(_) => None,
        }
    }

    /// Remote resource does not exist.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Remote resource already exists.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// 5xx response.
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| s >= 500)
    }

    /// The token was rejected.
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// Deletion refused because other resources still depend on this one.
    pub fn is_dependency_error(&self) -> bool {
        match self {
            Self::Api { status: 400 | 409, message } => {
                let message = message.to_lowercase();
                message.contains("dependen") || message.contains("in use")
            }
            _ => false,
        }
    }

    /// Transient failure worth retrying after a short delay.
    ///
    /// Covers 5xx (except 501), request timeouts, rate limiting and transport
    /// failures that never reached the API.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) if e.is_timeout() || e.is_connect() => true,
            _ => matches!(self.status(), Some(408 | 429 | 500 | 502..=599)),
        }
    }
}

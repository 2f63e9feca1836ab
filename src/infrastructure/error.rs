use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Credential storage error: {0}")]
    Credential(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Rate limited on {method} {endpoint}; gave up after retry budget (last Retry-After {retry_after:?})")]
    RateLimited {
        method: String,
        endpoint: String,
        retry_after: Duration,
    },
    #[error("HTTP {status} on {method} {endpoint}: {body}")]
    Http {
        method: String,
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("Network error on {endpoint}: {message}")]
    Network { endpoint: String, message: String },
    #[error("Unexpected payload from {endpoint}: {message}")]
    Payload { endpoint: String, message: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Calendar error: {0}")]
    Calendar(String),
}

impl InfraError {
    /// Only server-imposed rate limiting is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

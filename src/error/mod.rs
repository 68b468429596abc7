use crate::rate_limit::types::LimitKind;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Result type for rate limiter operations
pub type Result<T> = std::result::Result<T, RateLimiterError>;

/// Body returned to clients that exceeded a limit
pub const LIMIT_EXCEEDED_MESSAGE: &str =
    "you have reached the maximum number of requests or actions allowed within a certain time frame";

/// Rate limiter error types
#[derive(Error, Debug)]
pub enum RateLimiterError {
    #[error("you have reached the maximum number of requests or actions allowed within a certain time frame")]
    LimitExceeded { kind: LimitKind },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for RateLimiterError {
    fn from(err: redis::RedisError) -> Self {
        RateLimiterError::StoreUnavailable(err.to_string())
    }
}

impl From<config::ConfigError> for RateLimiterError {
    fn from(err: config::ConfigError) -> Self {
        RateLimiterError::Config(err.to_string())
    }
}

impl RateLimiterError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RateLimiterError::LimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            RateLimiterError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RateLimiterError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RateLimiterError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RateLimiterError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error is an expected client condition rather than a fault
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, RateLimiterError::LimitExceeded { .. })
    }
}

impl IntoResponse for RateLimiterError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Only the limit message is meant for clients; anything else stays in the logs.
        let body = if self.is_limit_exceeded() {
            self.to_string()
        } else {
            "Internal Server Error".to_string()
        };

        (status, body).into_response()
    }
}

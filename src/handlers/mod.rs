//! Demonstration handlers served behind the admission filter.

use axum::{extract::State, http::HeaderMap, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// JSON body returned by every handler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct HandlerState {
    credential_header: Arc<str>,
}

impl HandlerState {
    pub fn new(credential_header: &str) -> Self {
        Self {
            credential_header: Arc::from(credential_header),
        }
    }
}

/// `GET /`
pub async fn home_handler() -> Json<MessageResponse> {
    Json(MessageResponse::new("Welcome to the Rate Limiter API"))
}

/// `GET /test`, echoing the credential so limits are easy to try out
pub async fn test_handler(
    State(state): State<HandlerState>,
    headers: HeaderMap,
) -> Json<MessageResponse> {
    let token = headers
        .get(&*state.credential_header)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    let message = match token {
        Some(token) => format!("Request successful with token: {}", token),
        None => "Request successful".to_string(),
    };

    Json(MessageResponse::new(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_home_handler() {
        let Json(body) = home_handler().await;
        assert_eq!(body.message, "Welcome to the Rate Limiter API");
    }

    #[tokio::test]
    async fn test_test_handler_echoes_token() {
        let state = HandlerState::new("API_KEY");

        let mut headers = HeaderMap::new();
        headers.insert("api_key", HeaderValue::from_static("abc123"));
        let Json(body) = test_handler(State(state.clone()), headers).await;
        assert_eq!(body.message, "Request successful with token: abc123");

        let Json(body) = test_handler(State(state), HeaderMap::new()).await;
        assert_eq!(body.message, "Request successful");
    }
}

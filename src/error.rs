use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Only Pinterest URLs are allowed")]
    UnsupportedDomain,

    #[error("Missing API key. Provide it via the x-api-key header or api_key query parameter")]
    MissingApiKey,

    #[error("Invalid API key")]
    InvalidKey,

    #[error("API key expired")]
    KeyExpired,

    #[error("Access to this URL is disallowed by robots.txt")]
    PolicyDenied,

    #[error("Unable to verify robots.txt rules")]
    PolicyUnverifiable,

    #[error("Upstream fetch failed: {0}")]
    UpstreamFetchFailed(String),

    #[error("Unable to find a public video URL on this pin. It may be private or not a video.")]
    NoVideoFound,

    #[error("Daily request limit exceeded")]
    DailyLimitExceeded { limit: u32 },

    #[error("Too many requests")]
    TooManyRequests { retry_after: u64 },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) | AppError::UnsupportedDomain => StatusCode::BAD_REQUEST,
            AppError::MissingApiKey | AppError::InvalidKey | AppError::KeyExpired => {
                StatusCode::UNAUTHORIZED
            }
            AppError::PolicyDenied => StatusCode::FORBIDDEN,
            AppError::PolicyUnverifiable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::UpstreamFetchFailed(_) | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::NoVideoFound => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DailyLimitExceeded { .. } | AppError::TooManyRequests { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::Json(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Quota errors carry their hint fields alongside the message.
        let body = match &self {
            AppError::DailyLimitExceeded { limit } => json!({
                "success": false,
                "error": self.to_string(),
                "limit": limit,
            }),
            AppError::TooManyRequests { retry_after } => json!({
                "success": false,
                "error": self.to_string(),
                "retryAfter": retry_after,
            }),
            _ => json!({
                "success": false,
                "error": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_errors_are_client_errors() {
        assert_eq!(
            AppError::DailyLimitExceeded { limit: 100 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::TooManyRequests { retry_after: 60 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn policy_errors_map_to_403_and_503() {
        assert_eq!(AppError::PolicyDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::PolicyUnverifiable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn no_video_is_unprocessable() {
        assert_eq!(
            AppError::NoVideoFound.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}

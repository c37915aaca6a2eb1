use crate::error::{GenerationError, ProviderError};
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Failure of an HTTP call, rendered as `{"error": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Listing models upstream failed.
    #[error("Upstream error: {0}")]
    Upstream(#[from] ProviderError),
}

impl ApiError {
    /// Text shown to the end user.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Generation(e) => e.user_message(),
            ApiError::Unauthorized(_) => "Your session is invalid or has expired.".to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Upstream(_) => "The model provider could not be reached.".to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Generation(e) => match e {
                GenerationError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
                GenerationError::QuotaUnavailable(_)
                | GenerationError::AllModelsFailed { .. }
                | GenerationError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
                GenerationError::MissingOwner | GenerationError::InvalidInput(_) => {
                    StatusCode::BAD_REQUEST
                }
                GenerationError::Provider(_)
                | GenerationError::Extraction
                | GenerationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed with {}: {}", status.as_u16(), self);
        } else {
            log::warn!("Request rejected with {}: {}", status.as_u16(), self);
        }

        let body = match self {
            ApiError::Generation(GenerationError::QuotaExceeded { limit, current }) => json!({
                "error": self.public_message(),
                "limit": limit,
                "current": current,
            }),
            _ => json!({ "error": self.public_message() }),
        };
        HttpResponse::build(status).json(body)
    }
}

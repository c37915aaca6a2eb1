use thiserror::Error;

/// Infrastructure failures: configuration, transport, storage.
#[derive(Debug, Error)]
pub enum BanneriaError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Request error: {0}")]
    RequestError(String),
    #[error("Response error: {0}")]
    ResponseError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Authentication error: {0}")]
    AuthError(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, BanneriaError>;

/// Failure reported by the generative-model collaborator for one attempt.
#[derive(Debug, Clone, Error)]
#[error("{}", self.describe())]
pub struct ProviderError {
    /// HTTP status returned by the provider, when the call got that far.
    pub status: Option<u16>,
    /// Provider-side status string such as `UNAVAILABLE` or `INVALID_ARGUMENT`.
    pub code: Option<String>,
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    fn describe(&self) -> String {
        match (self.status, &self.code) {
            (Some(status), Some(code)) => format!("[{} {}] {}", status, code, self.message),
            (Some(status), None) => format!("[{}] {}", status, self.message),
            (None, Some(code)) => format!("[{}] {}", code, self.message),
            (None, None) => self.message.clone(),
        }
    }
}

/// Outcome taxonomy of one generation request.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation limit reached: {current} of {limit} banners used on this plan")]
    QuotaExceeded { limit: u32, current: u32 },

    #[error("Usage quota could not be verified")]
    QuotaUnavailable(#[source] BanneriaError),

    #[error("All {attempts} candidate models are overloaded")]
    AllModelsFailed { attempts: usize },

    #[error("Model provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("The provider response did not contain a usable banner image")]
    Extraction,

    #[error("Generation did not finish within {0} seconds")]
    Timeout(u64),

    #[error("A user identity or anonymous session token is required")]
    MissingOwner,

    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Internal(#[from] BanneriaError),
}

impl GenerationError {
    /// Message shown to the end user.
    pub fn user_message(&self) -> String {
        match self {
            GenerationError::QuotaExceeded { limit, .. } => format!(
                "You have reached the limit of {} banners on your plan. Upgrade to keep creating.",
                limit
            ),
            GenerationError::QuotaUnavailable(_) => {
                "We could not verify your plan right now. Please try again in a moment.".into()
            }
            GenerationError::AllModelsFailed { .. } | GenerationError::Timeout(_) => {
                "We are experiencing high demand. Please try again shortly.".into()
            }
            GenerationError::Extraction => {
                "The banner could not be generated or the returned format was invalid.".into()
            }
            GenerationError::MissingOwner => {
                "Sign in or provide an anonymous session token to generate banners.".into()
            }
            GenerationError::InvalidInput(msg) => msg.clone(),
            GenerationError::Provider(e) => format!("Error: {}.", e.message),
            GenerationError::Internal(e) => format!("Error: {}.", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_display_includes_status_and_code() {
        let err = ProviderError::new("model is overloaded")
            .with_status(503)
            .with_code("UNAVAILABLE");
        assert_eq!(err.to_string(), "[503 UNAVAILABLE] model is overloaded");
        assert_eq!(ProviderError::new("boom").to_string(), "boom");
    }

    #[test]
    fn quota_message_mentions_limit() {
        let err = GenerationError::QuotaExceeded {
            limit: 5,
            current: 5,
        };
        assert!(err.user_message().contains('5'));
        assert!(err.to_string().contains("5 of 5"));
    }
}

pub mod gemini;

use crate::{
    error::ProviderError,
    models::{ModelInfo, ModelInput, ModelResponse},
};
use async_trait::async_trait;

pub use gemini::GeminiClient;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// A generative backend that can run one attempt against a named model.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, model_id: &str, input: &ModelInput) -> ProviderResult<ModelResponse>;

    async fn list_models(&self) -> ProviderResult<Vec<ModelInfo>> {
        Ok(Vec::new())
    }
}

/// Decides whether a provider failure should move on to the next model.
pub trait TransientClassifier: Send + Sync {
    fn is_transient(&self, error: &ProviderError) -> bool;
}

impl<F> TransientClassifier for F
where
    F: Fn(&ProviderError) -> bool + Send + Sync,
{
    fn is_transient(&self, error: &ProviderError) -> bool {
        self(error)
    }
}

/// Explicit overload signals: HTTP 503, `UNAVAILABLE`, or "overloaded"/"high demand" wording.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverloadClassifier;

const OVERLOAD_PHRASES: &[&str] = &["overloaded", "high demand", "try again later"];

impl TransientClassifier for OverloadClassifier {
    fn is_transient(&self, error: &ProviderError) -> bool {
        if error.status == Some(503) {
            return true;
        }
        if error
            .code
            .as_deref()
            .map_or(false, |code| code.eq_ignore_ascii_case("UNAVAILABLE"))
        {
            return true;
        }
        let message = error.message.to_ascii_lowercase();
        OVERLOAD_PHRASES.iter().any(|phrase| message.contains(phrase))
    }
}

use crate::{
    error::{BanneriaError, GenerationError},
    models::{ModelInput, ModelResponse},
    provider::{GenerativeModel, OverloadClassifier, TransientClassifier},
};
use std::sync::Arc;
use std::time::Instant;

/// Runs a request against an ordered list of models, moving on only after
/// transient failures.
#[derive(Clone)]
pub struct ModelInvoker {
    provider: Arc<dyn GenerativeModel>,
    classifier: Arc<dyn TransientClassifier>,
}

impl ModelInvoker {
    pub fn new(provider: Arc<dyn GenerativeModel>) -> Self {
        Self {
            provider,
            classifier: Arc::new(OverloadClassifier),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn TransientClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn provider(&self) -> &Arc<dyn GenerativeModel> {
        &self.provider
    }

    pub async fn invoke(
        &self,
        input: &ModelInput,
        candidates: &[String],
    ) -> Result<ModelResponse, GenerationError> {
        if candidates.is_empty() {
            return Err(BanneriaError::ConfigError("No candidate models configured".into()).into());
        }

        for (attempt, model_id) in candidates.iter().enumerate() {
            let started = Instant::now();
            match self.provider.generate(model_id, input).await {
                Ok(response) => {
                    log::info!(
                        "Model {} answered in {}ms (attempt {}/{})",
                        model_id,
                        started.elapsed().as_millis(),
                        attempt + 1,
                        candidates.len()
                    );
                    return Ok(response);
                }
                Err(e) if self.classifier.is_transient(&e) => {
                    log::warn!(
                        "Model {} is unavailable after {}ms ({}), trying next candidate",
                        model_id,
                        started.elapsed().as_millis(),
                        e
                    );
                }
                Err(e) => {
                    log::error!("Model {} failed: {}", model_id, e);
                    return Err(GenerationError::Provider(e));
                }
            }
        }

        log::error!("All {} candidate models are overloaded", candidates.len());
        Err(GenerationError::AllModelsFailed {
            attempts: candidates.len(),
        })
    }
}

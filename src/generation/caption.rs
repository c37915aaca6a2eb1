use super::{invoker::ModelInvoker, prompt::compose_caption_prompt};
use crate::{
    config::DEFAULT_PROVIDER_TIMEOUT,
    error::{GenerationError, ProviderError},
    models::ModelInput,
};
use std::time::Duration;

/// Writes the social-media caption that goes with a banner.
#[derive(Clone)]
pub struct CaptionWriter {
    invoker: ModelInvoker,
    models: Vec<String>,
    timeout: Duration,
}

impl CaptionWriter {
    pub fn new(invoker: ModelInvoker, models: Vec<String>) -> Self {
        Self {
            invoker,
            models,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    /// Deadline for all caption model attempts together.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn write(&self, briefing: &str) -> Result<String, GenerationError> {
        if briefing.trim().is_empty() {
            return Err(GenerationError::InvalidInput("Prompt is required".into()));
        }

        let preview: String = briefing.chars().take(50).collect();
        log::info!("Generating caption for briefing: {}...", preview);

        let input = ModelInput::text(compose_caption_prompt(briefing));
        let response = tokio::time::timeout(self.timeout, self.invoker.invoke(&input, &self.models))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout.as_secs()))??;

        let caption = response.text().trim().to_string();
        if caption.is_empty() {
            return Err(GenerationError::Provider(ProviderError::new(
                "The model returned no text",
            )));
        }
        Ok(caption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::invoker::tests::ScriptedModel;
    use crate::models::ModelResponse;
    use std::sync::Arc;

    fn writer(provider: Arc<ScriptedModel>) -> CaptionWriter {
        CaptionWriter::new(
            ModelInvoker::new(provider),
            vec!["text-a".to_string(), "text-b".to_string()],
        )
    }

    #[tokio::test]
    async fn empty_briefing_is_rejected_without_calling_the_model() {
        let provider = Arc::new(ScriptedModel::new());
        let err = writer(provider.clone()).write("   ").await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidInput(_)));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn caption_is_trimmed_text() {
        let provider = Arc::new(ScriptedModel::new().answer(
            "text-a",
            Ok(ModelResponse::new("text-a").with_text("\n  Peça já! 🍕 #pizza  \n")),
        ));
        let caption = writer(provider).write("Pizza night").await.unwrap();
        assert_eq!(caption, "Peça já! 🍕 #pizza");
    }

    /// Text model that never answers.
    struct Silent;

    #[async_trait::async_trait]
    impl crate::provider::GenerativeModel for Silent {
        async fn generate(
            &self,
            _model_id: &str,
            _input: &ModelInput,
        ) -> crate::provider::ProviderResult<ModelResponse> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silent_model_hits_the_deadline() {
        let writer = CaptionWriter::new(ModelInvoker::new(Arc::new(Silent)), vec!["text-a".into()])
            .with_timeout(Duration::from_secs(20));

        let err = tokio::time::timeout(Duration::from_secs(3600), writer.write("Pizza night"))
            .await
            .expect("caption finished")
            .unwrap_err();
        assert!(matches!(err, GenerationError::Timeout(20)));
    }

    #[tokio::test]
    async fn blank_answer_is_an_error() {
        let provider = Arc::new(
            ScriptedModel::new().answer("text-a", Ok(ModelResponse::new("text-a").with_text(" "))),
        );
        assert!(writer(provider).write("Pizza night").await.is_err());
    }
}

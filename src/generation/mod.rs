pub mod caption;
pub mod extract;
pub mod invoker;
pub mod persist;
pub mod prompt;
pub mod quota;

use crate::{
    config::Config,
    error::GenerationError,
    models::{Artifact, Caller, GenerationRequest, ModelInput},
    storage::StorageManager,
};
use std::{future::Future, time::Duration};
use tokio::time::{timeout, timeout_at, Instant};
use uuid::Uuid;

pub use caption::CaptionWriter;
pub use extract::ResultExtractor;
pub use invoker::ModelInvoker;
pub use persist::{PersistenceSink, SaveOutcome};
pub use prompt::compose_prompt;
pub use quota::{Admission, QuotaDecision, QuotaEvaluator, QuotaFailurePolicy};

#[derive(Debug, Clone)]
pub struct GeneratedBanner {
    pub artifact: Artifact,
    pub saved: SaveOutcome,
}

/// Sequences quota, prompt, model fallback, extraction and persistence for one request.
pub struct BannerGenerator {
    quota: QuotaEvaluator,
    invoker: ModelInvoker,
    extractor: ResultExtractor,
    sink: PersistenceSink,
    models: Vec<String>,
    timeout: Duration,
    store_timeout: Duration,
    require_owner: bool,
}

impl BannerGenerator {
    pub fn new(invoker: ModelInvoker, storage: &StorageManager, config: &Config) -> Self {
        let generation = &config.generation;
        Self {
            quota: QuotaEvaluator::new(
                storage.profiles().clone(),
                config.quota.tiers.clone(),
                generation.quota_failure,
            ),
            invoker,
            extractor: ResultExtractor::new(generation.base64_min_length),
            sink: PersistenceSink::new(storage.banners().clone(), storage.profiles().clone()),
            models: generation.image_models.clone(),
            timeout: generation.timeout,
            store_timeout: generation.store_timeout,
            require_owner: generation.require_owner,
        }
    }

    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GeneratedBanner, GenerationError> {
        let generation_id = Uuid::new_v4();
        log::info!(
            "[gen:{}] {} banner requested by {}",
            generation_id,
            request.size.as_str(),
            describe_caller(&request.caller)
        );

        if self.require_owner && request.caller == Caller::Nobody {
            return Err(GenerationError::MissingOwner);
        }

        let deadline = Instant::now() + self.timeout;
        let admission = match self.before(deadline, self.quota.check(&request.caller)).await? {
            QuotaDecision::Allow(admission) => admission,
            QuotaDecision::Deny { limit, current } => {
                return Err(GenerationError::QuotaExceeded { limit, current })
            }
        };
        let guard = self.quota.guard(&admission);

        let artifact = match self.produce(&request, deadline).await {
            Ok(artifact) => {
                guard.commit();
                artifact
            }
            Err(e) => {
                log::error!("[gen:{}] Generation failed: {}", generation_id, e);
                if timeout(self.store_timeout, guard.release()).await.is_err() {
                    log::error!("[gen:{}] Releasing the reservation timed out", generation_id);
                }
                return Err(e);
            }
        };

        let save = self.sink.save(&artifact, &request, &admission);
        let saved = match timeout(self.store_timeout, save).await {
            Ok(saved) => saved,
            Err(_) => {
                log::error!(
                    "[gen:{}] Saving the banner took longer than {}s, giving up",
                    generation_id,
                    self.store_timeout.as_secs()
                );
                SaveOutcome::Failed
            }
        };
        log::info!(
            "[gen:{}] Banner ready from {} ({} bytes, {})",
            generation_id,
            artifact.model,
            artifact.data.len(),
            artifact.mime_type
        );

        Ok(GeneratedBanner { artifact, saved })
    }

    /// Runs `step` unless the request deadline passes first.
    async fn before<T, F>(&self, deadline: Instant, step: F) -> Result<T, GenerationError>
    where
        F: Future<Output = Result<T, GenerationError>>,
    {
        timeout_at(deadline, step)
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout.as_secs()))?
    }

    async fn produce(
        &self,
        request: &GenerationRequest,
        deadline: Instant,
    ) -> Result<Artifact, GenerationError> {
        let prompt = compose_prompt(
            &request.briefing,
            request.size,
            !request.reference_images.is_empty(),
            request.logo.is_some(),
            request.brand_name(),
        );

        // Logo first so the prompt can refer to it as the first attachment.
        let images = request
            .logo
            .iter()
            .chain(request.reference_images.iter())
            .cloned()
            .collect();
        let input = ModelInput::image(prompt, images);

        let response = self
            .before(deadline, self.invoker.invoke(&input, &self.models))
            .await?;

        match self.extractor.extract(&response) {
            Some(artifact) => Ok(artifact),
            None => {
                let text = response.text();
                log::error!(
                    "No image found in response from {} ({} chars of text)",
                    response.model,
                    text.chars().count()
                );
                if !text.is_empty() {
                    log::debug!("Response sample: {}", sample(&text, 500));
                }
                Err(GenerationError::Extraction)
            }
        }
    }
}

fn describe_caller(caller: &Caller) -> String {
    match caller {
        Caller::User(user) if user.is_admin => format!("admin {}", user.id),
        Caller::User(user) => format!("user {}", user.id),
        Caller::Anonymous(_) => "anonymous session".to_string(),
        Caller::Nobody => "unidentified caller".to_string(),
    }
}

/// Head and tail of a long text, for diagnostics.
fn sample(text: &str, edge: usize) -> String {
    let total = text.chars().count();
    if total <= edge * 2 {
        return text.to_string();
    }
    let head: String = text.chars().take(edge).collect();
    let tail: String = text.chars().skip(total - edge).collect();
    format!("{} [...] {}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::invoker::tests::ScriptedModel;
    use super::*;
    use crate::{
        config::GenerationConfig,
        error::ProviderError,
        models::{
            InlineImage, InsertResult, ModelResponse, NewAnonymousBanner, NewBanner, Profile,
            Reservation, UserIdentity,
        },
        provider::{GenerativeModel, ProviderResult},
        storage::{BannerStore, MemoryStore, ProfileStore},
    };
    use async_trait::async_trait;
    use std::sync::Arc;

    fn png() -> ProviderResult<ModelResponse> {
        Ok(ModelResponse::new("secondary").with_inline_data(Some("image/png"), vec![0x89, 0x50]))
    }

    fn config() -> Config {
        Config::new().with_generation(
            GenerationConfig::new().with_image_models(["primary", "secondary"]),
        )
    }

    fn generator(provider: Arc<dyn GenerativeModel>, store: &Arc<MemoryStore>, config: &Config) -> BannerGenerator {
        let storage = StorageManager::from_shared(store.clone());
        BannerGenerator::new(ModelInvoker::new(provider), &storage, config)
    }

    fn user(id: &str) -> Caller {
        Caller::User(UserIdentity::new(id))
    }

    #[tokio::test]
    async fn quota_gate_blocks_before_any_provider_call() {
        let store = Arc::new(MemoryStore::new());
        store.add_profile("u1", "free", 5).await;
        let provider = Arc::new(ScriptedModel::new().answer("primary", png()));

        let err = generator(provider.clone(), &store, &config())
            .generate(GenerationRequest::new("x").with_caller(user("u1")))
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::QuotaExceeded { limit: 5, current: 5 }));
        assert!(provider.calls().is_empty());
        assert_eq!(store.usage("u1").await, Some(5));
    }

    #[tokio::test]
    async fn fallback_model_is_recorded_on_the_banner() {
        let store = Arc::new(MemoryStore::new());
        store.add_profile("u1", "free", 0).await;
        let provider = Arc::new(
            ScriptedModel::new()
                .answer("primary", Err(ProviderError::new("high demand").with_status(503)))
                .answer("secondary", png()),
        );

        let banner = generator(provider.clone(), &store, &config())
            .generate(GenerationRequest::new("x").with_caller(user("u1")))
            .await
            .unwrap();

        assert_eq!(banner.artifact.model, "secondary");
        assert_eq!(banner.artifact.mime_type, "image/png");
        assert_eq!(store.banners().await[0].model, "secondary");
        assert_eq!(store.usage("u1").await, Some(1));
        assert_eq!(provider.calls(), vec!["primary", "secondary"]);
    }

    #[tokio::test]
    async fn exhausted_fallbacks_release_the_reservation() {
        let store = Arc::new(MemoryStore::new());
        store.add_profile("u1", "free", 2).await;
        let overloaded = || Err(ProviderError::new("overloaded").with_status(503));
        let provider = Arc::new(
            ScriptedModel::new()
                .answer("primary", overloaded())
                .answer("secondary", overloaded()),
        );

        let err = generator(provider.clone(), &store, &config())
            .generate(GenerationRequest::new("x").with_caller(user("u1")))
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::AllModelsFailed { attempts: 2 }));
        assert_eq!(provider.calls().len(), 2);
        assert_eq!(store.usage("u1").await, Some(2));
        assert!(store.banners().await.is_empty());
    }

    #[tokio::test]
    async fn extraction_failure_persists_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.add_profile("u1", "free", 0).await;
        let provider = Arc::new(ScriptedModel::new().answer(
            "primary",
            Ok(ModelResponse::new("primary").with_text("Sorry, I can only describe it.")),
        ));

        let err = generator(provider, &store, &config())
            .generate(GenerationRequest::new("x").with_caller(user("u1")))
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Extraction));
        assert!(err.user_message().contains("could not be generated"));
        assert!(store.banners().await.is_empty());
        assert_eq!(store.usage("u1").await, Some(0));
    }

    #[tokio::test]
    async fn missing_owner_policy() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedModel::new().answer("primary", png()));

        let lenient = generator(provider.clone(), &store, &config())
            .generate(GenerationRequest::new("x"))
            .await
            .unwrap();
        assert_eq!(lenient.saved, SaveOutcome::Skipped);

        let strict_config = Config::new().with_generation(
            GenerationConfig::new()
                .with_image_models(["primary"])
                .with_require_owner(true),
        );
        let err = generator(provider.clone(), &store, &strict_config)
            .generate(GenerationRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MissingOwner));
        assert_eq!(provider.calls().len(), 1);
    }

    /// Provider that never answers in time and records what it was sent.
    struct SlowModel {
        seen: std::sync::Mutex<Vec<ModelInput>>,
    }

    #[async_trait]
    impl GenerativeModel for SlowModel {
        async fn generate(&self, _model_id: &str, input: &ModelInput) -> ProviderResult<ModelResponse> {
            self.seen.lock().unwrap().push(input.clone());
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ModelResponse::new("slow"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_is_reported_and_releases() {
        let store = Arc::new(MemoryStore::new());
        store.add_profile("u1", "free", 0).await;
        let provider = Arc::new(SlowModel {
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let config = Config::new().with_generation(
            GenerationConfig::new()
                .with_image_models(["primary"])
                .with_timeout(Duration::from_secs(30)),
        );

        let logo = InlineImage::new("image/png", vec![1]);
        let photo = InlineImage::new("image/jpeg", vec![2]);
        let request = GenerationRequest::new("x")
            .with_caller(user("u1"))
            .with_logo(logo.clone())
            .with_reference_image(photo.clone());

        let err = generator(provider.clone(), &store, &config)
            .generate(request)
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Timeout(30)));
        assert_eq!(store.usage("u1").await, Some(0));
        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].images, vec![logo, photo]);
    }

    /// Store whose every call hangs, like a database that stopped answering.
    struct Stuck;

    #[async_trait]
    impl ProfileStore for Stuck {
        async fn get_profile(&self, _user_id: &str) -> crate::error::Result<Option<Profile>> {
            std::future::pending().await
        }

        async fn reserve_generation(
            &self,
            _user_id: &str,
            _limit: Option<u32>,
        ) -> crate::error::Result<Reservation> {
            std::future::pending().await
        }

        async fn release_generation(&self, _user_id: &str) -> crate::error::Result<()> {
            std::future::pending().await
        }

        async fn increment_generations(&self, _user_id: &str) -> crate::error::Result<u32> {
            std::future::pending().await
        }
    }

    #[async_trait]
    impl BannerStore for Stuck {
        async fn insert_banner(&self, _banner: NewBanner) -> crate::error::Result<InsertResult> {
            std::future::pending().await
        }

        async fn insert_anonymous_banner(
            &self,
            _banner: NewAnonymousBanner,
        ) -> crate::error::Result<InsertResult> {
            std::future::pending().await
        }

        async fn health_check(&self) -> crate::error::Result<bool> {
            std::future::pending().await
        }
    }

    fn deadline_config() -> Config {
        Config::new().with_generation(
            GenerationConfig::new()
                .with_image_models(["primary"])
                .with_timeout(Duration::from_secs(30))
                .with_store_timeout(Duration::from_secs(5)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_gallery_write_does_not_hold_the_request() {
        let store = Arc::new(MemoryStore::new());
        store.add_profile("u1", "free", 0).await;
        let provider = Arc::new(ScriptedModel::new().answer("primary", png()));
        let storage = StorageManager::from_parts(store.clone(), Arc::new(Stuck));
        let generator = BannerGenerator::new(ModelInvoker::new(provider), &storage, &deadline_config());

        let started = Instant::now();
        let banner = tokio::time::timeout(
            Duration::from_secs(3600),
            generator.generate(GenerationRequest::new("x").with_caller(user("u1"))),
        )
        .await
        .expect("generation finished")
        .unwrap();

        assert_eq!(banner.saved, SaveOutcome::Failed);
        assert!(started.elapsed() <= Duration::from_secs(35));
        assert_eq!(store.usage("u1").await, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_quota_store_times_out_before_any_model_call() {
        let provider = Arc::new(ScriptedModel::new().answer("primary", png()));
        let storage = StorageManager::from_shared(Arc::new(Stuck));
        let generator =
            BannerGenerator::new(ModelInvoker::new(provider.clone()), &storage, &deadline_config());

        let err = tokio::time::timeout(
            Duration::from_secs(3600),
            generator.generate(GenerationRequest::new("x").with_caller(user("u1"))),
        )
        .await
        .expect("generation finished")
        .unwrap_err();

        assert!(matches!(err, GenerationError::Timeout(30)));
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn sample_keeps_head_and_tail() {
        assert_eq!(sample("short", 10), "short");
        let long = "a".repeat(30) + &"b".repeat(30);
        assert_eq!(sample(&long, 5), "aaaaa [...] bbbbb");
    }
}

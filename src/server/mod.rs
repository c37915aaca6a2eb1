pub mod error;
pub mod handlers;

use crate::{
    auth::{Authenticator, SupabaseAuth},
    config::{Config, QuotaConfig},
    error::Result,
    generation::{BannerGenerator, CaptionWriter, ModelInvoker},
    provider::{GeminiClient, GenerativeModel},
    storage::StorageManager,
};
use actix_web::{web, App, HttpServer};
use std::sync::Arc;

pub use error::ApiError;

pub const DEFAULT_PORT: u16 = 8080;
/// Uploads travel inline as base64, so the default JSON limit is far too small.
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Everything the handlers share, built once at boot.
pub struct AppState {
    pub generator: BannerGenerator,
    pub captions: CaptionWriter,
    pub provider: Arc<dyn GenerativeModel>,
    pub storage: StorageManager,
    pub auth: Option<Arc<dyn Authenticator>>,
    pub quota: QuotaConfig,
    pub image_models: Vec<String>,
    pub caption_models: Vec<String>,
}

impl AppState {
    pub async fn from_config(config: &Config) -> Result<Self> {
        let provider: Arc<dyn GenerativeModel> = Arc::new(GeminiClient::new(&config.gemini)?);
        let storage = StorageManager::new(config).await?;
        let auth: Option<Arc<dyn Authenticator>> = match &config.supabase {
            Some(supabase) => Some(Arc::new(SupabaseAuth::new(supabase)?)),
            None => {
                log::warn!("Supabase is not configured, bearer tokens will be rejected");
                None
            }
        };
        Ok(Self::new(provider, storage, auth, config))
    }

    pub fn new(
        provider: Arc<dyn GenerativeModel>,
        storage: StorageManager,
        auth: Option<Arc<dyn Authenticator>>,
        config: &Config,
    ) -> Self {
        let invoker = ModelInvoker::new(provider.clone());
        Self {
            generator: BannerGenerator::new(invoker.clone(), &storage, config),
            captions: CaptionWriter::new(invoker, config.generation.caption_models.clone())
                .with_timeout(config.generation.timeout),
            provider,
            storage,
            auth,
            quota: config.quota.clone(),
            image_models: config.generation.image_models.clone(),
            caption_models: config.generation.caption_models.clone(),
        }
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health)).service(
        web::scope("/api")
            .route("/generate", web::post().to(handlers::generate))
            .route("/caption", web::post().to(handlers::caption))
            .route("/models", web::get().to(handlers::list_models)),
    );
}

/// JSON extractor settings; malformed bodies answer 400 in the usual error shape.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into())
}

pub async fn run(state: AppState, config: &Config) -> std::io::Result<()> {
    let port = config.port.unwrap_or(DEFAULT_PORT);
    let limit = config.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
    let state = web::Data::new(state);

    log::info!("Listening on 0.0.0.0:{}", port);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(json_config(limit))
            .configure(routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

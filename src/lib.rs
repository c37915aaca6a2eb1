pub mod auth;
pub mod config;
pub mod error;
pub mod generation;
pub mod logger;
pub mod models;
pub mod provider;
#[cfg(feature = "server")]
pub mod server;
pub mod storage;

pub use auth::{Authenticator, SupabaseAuth};
pub use config::{Config, GeminiConfig, GenerationConfig, PostgresConfig, QuotaConfig, SupabaseConfig};
pub use error::{BanneriaError, GenerationError, ProviderError, Result};
pub use generation::{BannerGenerator, CaptionWriter, GeneratedBanner, ModelInvoker, SaveOutcome};
pub use models::*;
pub use provider::{GeminiClient, GenerativeModel, OverloadClassifier, TransientClassifier};
pub use storage::{BannerStore, MemoryStore, ProfileStore, StorageManager};

use crate::{
    error::{BanneriaError, Result},
    generation::quota::QuotaFailurePolicy,
    models::TierLimits,
};
use std::{env, time::Duration};

pub const DEFAULT_IMAGE_MODELS: &[&str] = &["gemini-3-pro-image-preview", "gemini-2.5-flash-image"];
pub const DEFAULT_CAPTION_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.0-flash"];
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Per-request ceiling for calls to the model provider.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(120);
/// Per-request ceiling for database and auth calls.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

fn env_flag(name: &str) -> bool {
    env::var(name).ok().map_or(false, |val| val == "true")
}

fn env_secs(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
}

fn env_list(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect()
    })
}

#[derive(Debug, Clone, Default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
}

impl GeminiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        GeminiConfig {
            api_key: env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            base_url: env::var("GEMINI_BASE_URL").ok(),
            timeout: env_secs("GEMINI_TIMEOUT_SECS"),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct SupabaseConfig {
    pub url: Option<String>,
    pub service_role_key: Option<String>,
    pub timeout: Option<Duration>,
}

impl SupabaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        SupabaseConfig {
            url: env::var("SUPABASE_URL").ok(),
            service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),
            timeout: env_secs("SUPABASE_TIMEOUT_SECS"),
        }
    }

    pub fn with_credentials(mut self, url: impl Into<String>, key: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self.service_role_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostgresConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl PostgresConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        PostgresConfig {
            host: env::var("POSTGRES_HOST").ok(),
            port: env::var("POSTGRES_PORT").ok().and_then(|s| s.parse().ok()),
            username: env::var("POSTGRES_USERNAME").ok(),
            password: env::var("POSTGRES_PASSWORD").ok(),
            database: env::var("POSTGRES_DATABASE").ok(),
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_connection_info(
        mut self,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
    ) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self.database = Some(database.into());
        self
    }
}

/// Knobs of the generation pipeline.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Tried in order; later entries only after a transient failure.
    pub image_models: Vec<String>,
    pub caption_models: Vec<String>,
    /// Deadline for quota check and model attempts together.
    pub timeout: Duration,
    /// Budget for each store write that follows the model call (save or release).
    pub store_timeout: Duration,
    /// Minimum base64 run length the text fallback accepts as an image.
    pub base64_min_length: usize,
    pub require_owner: bool,
    pub quota_failure: QuotaFailurePolicy,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            image_models: DEFAULT_IMAGE_MODELS.iter().map(|m| m.to_string()).collect(),
            caption_models: DEFAULT_CAPTION_MODELS.iter().map(|m| m.to_string()).collect(),
            timeout: Duration::from_secs(120),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            base64_min_length: 4000,
            require_owner: false,
            quota_failure: QuotaFailurePolicy::FailOpen,
        }
    }
}

impl GenerationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        GenerationConfig {
            image_models: env_list("IMAGE_MODELS")
                .filter(|m| !m.is_empty())
                .unwrap_or(defaults.image_models),
            caption_models: env_list("CAPTION_MODELS")
                .filter(|m| !m.is_empty())
                .unwrap_or(defaults.caption_models),
            timeout: env_secs("GENERATION_TIMEOUT_SECS").unwrap_or(defaults.timeout),
            store_timeout: env_secs("STORE_TIMEOUT_SECS").unwrap_or(defaults.store_timeout),
            base64_min_length: env::var("BASE64_MIN_LENGTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.base64_min_length),
            require_owner: env_flag("REQUIRE_OWNER"),
            quota_failure: if env_flag("QUOTA_FAIL_CLOSED") {
                QuotaFailurePolicy::FailClosed
            } else {
                QuotaFailurePolicy::FailOpen
            },
        }
    }

    pub fn with_image_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image_models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_caption_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.caption_models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_base64_min_length(mut self, length: usize) -> Self {
        self.base64_min_length = length;
        self
    }

    pub fn with_require_owner(mut self, required: bool) -> Self {
        self.require_owner = required;
        self
    }

    pub fn with_quota_failure(mut self, policy: QuotaFailurePolicy) -> Self {
        self.quota_failure = policy;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuotaConfig {
    pub tiers: TierLimits,
    /// Lower-cased emails whose accounts bypass every limit.
    pub admin_emails: Vec<String>,
}

impl QuotaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Result<Self> {
        let tiers = match env::var("TIER_LIMITS") {
            Ok(spec) if !spec.trim().is_empty() => TierLimits::parse(&spec)?,
            _ => TierLimits::default(),
        };
        let admin_emails = env_list("ADMIN_EMAILS")
            .unwrap_or_default()
            .into_iter()
            .map(|email| email.to_ascii_lowercase())
            .collect();

        Ok(QuotaConfig {
            tiers,
            admin_emails,
        })
    }

    pub fn with_tiers(mut self, tiers: TierLimits) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn with_admin_email(mut self, email: impl Into<String>) -> Self {
        self.admin_emails.push(email.into().to_ascii_lowercase());
        self
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_ascii_lowercase();
        self.admin_emails.iter().any(|admin| *admin == email)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub port: Option<u16>,
    /// Largest accepted JSON body; uploads arrive inline as data URLs.
    pub max_body_bytes: Option<usize>,
    pub use_supabase: bool,
    pub use_psql: bool,
    pub gemini: GeminiConfig,
    pub supabase: Option<SupabaseConfig>,
    pub postgres: Option<PostgresConfig>,
    pub generation: GenerationConfig,
    pub quota: QuotaConfig,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT").ok().and_then(|port| port.parse().ok());
        let use_supabase = env_flag("USE_SUPABASE");
        let use_psql = env_flag("USE_PSQL");

        Ok(Config {
            port,
            max_body_bytes: env::var("MAX_BODY_BYTES").ok().and_then(|s| s.parse().ok()),
            use_supabase,
            use_psql,
            gemini: GeminiConfig::from_env(),
            supabase: use_supabase.then(SupabaseConfig::from_env),
            postgres: use_psql.then(PostgresConfig::from_env),
            generation: GenerationConfig::from_env(),
            quota: QuotaConfig::from_env()?,
        })
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_gemini(mut self, config: GeminiConfig) -> Self {
        self.gemini = config;
        self
    }

    pub fn with_supabase(mut self, config: SupabaseConfig) -> Self {
        self.supabase = Some(config);
        self.use_supabase = true;
        self
    }

    pub fn with_postgres(mut self, config: PostgresConfig) -> Self {
        self.postgres = Some(config);
        self.use_psql = true;
        self
    }

    pub fn with_generation(mut self, config: GenerationConfig) -> Self {
        self.generation = config;
        self
    }

    pub fn with_quota(mut self, config: QuotaConfig) -> Self {
        self.quota = config;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.generation.image_models.is_empty() {
            return Err(BanneriaError::ConfigError(
                "At least one image model is required".into(),
            ));
        }
        if self.use_supabase && self.use_psql {
            return Err(BanneriaError::ConfigError(
                "Enable only one of USE_SUPABASE and USE_PSQL".into(),
            ));
        }
        Ok(())
    }
}

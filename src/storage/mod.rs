pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod supabase;
pub mod traits;

use crate::{config::Config, error::Result};
use std::sync::Arc;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
pub use supabase::SupabaseStore;
pub use traits::{BannerStore, ProfileStore};

/// Profile and banner backends selected from configuration.
#[derive(Clone)]
pub struct StorageManager {
    profiles: Arc<dyn ProfileStore>,
    banners: Arc<dyn BannerStore>,
}

impl StorageManager {
    pub async fn new(config: &Config) -> Result<Self> {
        if config.use_supabase {
            let supabase_config = config.supabase.clone().ok_or_else(|| {
                crate::error::BanneriaError::ConfigError("Supabase config required".into())
            })?;
            let store = Arc::new(SupabaseStore::new(supabase_config).await?);
            log::info!("Using Supabase storage backend");
            return Ok(Self::from_shared(store));
        }

        if config.use_psql {
            #[cfg(feature = "postgres")]
            {
                let postgres_config = config.postgres.clone().ok_or_else(|| {
                    crate::error::BanneriaError::ConfigError("PostgreSQL config required".into())
                })?;
                let store = Arc::new(PostgresStore::new(postgres_config).await?);
                log::info!("Using PostgreSQL storage backend");
                return Ok(Self::from_shared(store));
            }
            #[cfg(not(feature = "postgres"))]
            {
                return Err(crate::error::BanneriaError::ConfigError(
                    "PostgreSQL feature not enabled".into(),
                ));
            }
        }

        log::warn!("No storage backend configured, banners and usage are kept in memory");
        Ok(Self::from_shared(Arc::new(MemoryStore::new())))
    }

    pub fn from_parts(profiles: Arc<dyn ProfileStore>, banners: Arc<dyn BannerStore>) -> Self {
        Self { profiles, banners }
    }

    /// One backend serving both profiles and banners.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: ProfileStore + BannerStore + 'static,
    {
        Self {
            profiles: store.clone(),
            banners: store,
        }
    }

    pub fn profiles(&self) -> &Arc<dyn ProfileStore> {
        &self.profiles
    }

    pub fn banners(&self) -> &Arc<dyn BannerStore> {
        &self.banners
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.banners.health_check().await
    }
}

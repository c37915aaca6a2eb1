use crate::{
    config::PostgresConfig,
    error::{BanneriaError, Result},
    models::{InsertResult, NewAnonymousBanner, NewBanner, Profile, Reservation},
    storage::traits::{BannerStore, ProfileStore},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, Object, Pool, Runtime};
use tokio_postgres::NoTls;
use uuid::Uuid;

/// Direct Postgres backend for self-hosted deployments.
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    pub async fn new(config: PostgresConfig) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.host = config.host;
        cfg.port = config.port;
        cfg.user = config.username;
        cfg.password = config.password;
        cfg.dbname = config.database;

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| BanneriaError::ConfigError(format!("Failed to create pool: {}", e)))?;

        let store = Self { pool };
        store.initialize_schema().await?;

        Ok(store)
    }

    async fn connection(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| BanneriaError::StorageError(format!("Failed to get connection: {}", e)))
    }

    async fn initialize_schema(&self) -> Result<()> {
        let client = self.connection().await?;

        client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS profiles (
                    id TEXT PRIMARY KEY,
                    subscription_tier TEXT DEFAULT 'free',
                    generations_count INTEGER NOT NULL DEFAULT 0
                );
                CREATE TABLE IF NOT EXISTS banners (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    image_url TEXT NOT NULL,
                    prompt TEXT NOT NULL,
                    size TEXT NOT NULL,
                    model TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );
                CREATE TABLE IF NOT EXISTS anonymous_banners (
                    id TEXT PRIMARY KEY,
                    session_token TEXT NOT NULL,
                    image_url TEXT NOT NULL,
                    prompt TEXT NOT NULL,
                    size TEXT NOT NULL,
                    model TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );
                CREATE INDEX IF NOT EXISTS idx_banners_user ON banners(user_id);
                CREATE INDEX IF NOT EXISTS idx_anonymous_banners_token ON anonymous_banners(session_token);",
            )
            .await
            .map_err(|e| BanneriaError::StorageError(format!("Failed to create tables: {}", e)))?;

        log::info!("PostgreSQL banner storage schema initialized");
        Ok(())
    }

    async fn insert(
        &self,
        sql: &str,
        owner: &str,
        image_url: &str,
        prompt: &str,
        size: &str,
        model: &str,
    ) -> Result<InsertResult> {
        let client = self.connection().await?;
        let id = Uuid::new_v4().to_string();

        let row = client
            .query_one(sql, &[&id, &owner, &image_url, &prompt, &size, &model])
            .await
            .map_err(|e| BanneriaError::StorageError(format!("Failed to insert banner: {}", e)))?;

        let created_at: DateTime<Utc> = row.get("created_at");
        Ok(InsertResult { id, created_at })
    }
}

fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

#[async_trait]
impl ProfileStore for PostgresStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let client = self.connection().await?;
        let row = client
            .query_opt(
                "SELECT id::text AS id, subscription_tier, generations_count
                 FROM profiles WHERE id::text = $1",
                &[&user_id],
            )
            .await
            .map_err(|e| BanneriaError::StorageError(format!("Failed to load profile: {}", e)))?;

        Ok(row.map(|row| Profile {
            id: row.get("id"),
            subscription_tier: row.get("subscription_tier"),
            generations_count: row.get::<_, Option<i32>>("generations_count").map(to_u32),
        }))
    }

    async fn reserve_generation(&self, user_id: &str, limit: Option<u32>) -> Result<Reservation> {
        let client = self.connection().await?;
        let limit = limit.map(|l| i32::try_from(l).unwrap_or(i32::MAX));

        let reserved = client
            .query_opt(
                "UPDATE profiles
                 SET generations_count = COALESCE(generations_count, 0) + 1
                 WHERE id::text = $1
                   AND ($2::int IS NULL OR COALESCE(generations_count, 0) < $2::int)
                 RETURNING generations_count",
                &[&user_id, &limit],
            )
            .await
            .map_err(|e| BanneriaError::StorageError(format!("Failed to reserve generation: {}", e)))?;

        if let Some(row) = reserved {
            return Ok(Reservation::Reserved {
                count: to_u32(row.get("generations_count")),
            });
        }

        let current = client
            .query_opt(
                "SELECT COALESCE(generations_count, 0) AS generations_count
                 FROM profiles WHERE id::text = $1",
                &[&user_id],
            )
            .await
            .map_err(|e| BanneriaError::StorageError(format!("Failed to load profile: {}", e)))?
            .ok_or_else(|| BanneriaError::StorageError(format!("profile {} not found", user_id)))?;

        Ok(Reservation::Exhausted {
            current: to_u32(current.get("generations_count")),
        })
    }

    async fn release_generation(&self, user_id: &str) -> Result<()> {
        let client = self.connection().await?;
        client
            .execute(
                "UPDATE profiles SET generations_count = generations_count - 1
                 WHERE id::text = $1 AND generations_count > 0",
                &[&user_id],
            )
            .await
            .map_err(|e| BanneriaError::StorageError(format!("Failed to release generation: {}", e)))?;
        Ok(())
    }

    async fn increment_generations(&self, user_id: &str) -> Result<u32> {
        let client = self.connection().await?;
        let row = client
            .query_opt(
                "UPDATE profiles SET generations_count = COALESCE(generations_count, 0) + 1
                 WHERE id::text = $1 RETURNING generations_count",
                &[&user_id],
            )
            .await
            .map_err(|e| BanneriaError::StorageError(format!("Failed to increment usage: {}", e)))?
            .ok_or_else(|| BanneriaError::StorageError(format!("profile {} not found", user_id)))?;
        Ok(to_u32(row.get("generations_count")))
    }
}

#[async_trait]
impl BannerStore for PostgresStore {
    async fn insert_banner(&self, banner: NewBanner) -> Result<InsertResult> {
        self.insert(
            "INSERT INTO banners (id, user_id, image_url, prompt, size, model)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING created_at",
            &banner.user_id,
            &banner.image_url,
            &banner.prompt,
            &banner.size,
            &banner.model,
        )
        .await
    }

    async fn insert_anonymous_banner(&self, banner: NewAnonymousBanner) -> Result<InsertResult> {
        self.insert(
            "INSERT INTO anonymous_banners (id, session_token, image_url, prompt, size, model)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING created_at",
            &banner.session_token,
            &banner.image_url,
            &banner.prompt,
            &banner.size,
            &banner.model,
        )
        .await
    }

    async fn health_check(&self) -> Result<bool> {
        let client = self.connection().await?;
        Ok(client.query_one("SELECT 1", &[]).await.is_ok())
    }
}

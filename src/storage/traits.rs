use crate::{
    error::Result,
    models::{InsertResult, NewAnonymousBanner, NewBanner, Profile, Reservation},
};
use async_trait::async_trait;

/// User profiles and their per-cycle generation counters.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>>;

    /// Increments the counter only while it is below `limit` (`None` = no limit),
    /// as one atomic step.
    async fn reserve_generation(&self, user_id: &str, limit: Option<u32>) -> Result<Reservation>;

    /// Gives back a reservation that produced no banner. Never goes below zero.
    async fn release_generation(&self, user_id: &str) -> Result<()>;

    /// Unconditional increment, returning the new count.
    async fn increment_generations(&self, user_id: &str) -> Result<u32>;
}

/// Gallery records for registered and anonymous callers.
#[async_trait]
pub trait BannerStore: Send + Sync {
    async fn insert_banner(&self, banner: NewBanner) -> Result<InsertResult>;

    async fn insert_anonymous_banner(&self, banner: NewAnonymousBanner) -> Result<InsertResult>;

    async fn health_check(&self) -> Result<bool>;
}

use crate::{
    error::{BanneriaError, Result},
    models::{InsertResult, NewAnonymousBanner, NewBanner, Profile, Reservation},
    storage::traits::{BannerStore, ProfileStore},
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    profiles: HashMap<String, Profile>,
    banners: Vec<NewBanner>,
    anonymous_banners: Vec<NewAnonymousBanner>,
}

/// Process-local store. Backs development runs without a database and the test suite.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    profiles_down: AtomicBool,
    banners_down: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_profile(&self, user_id: &str, tier: &str, generations: u32) {
        self.state.lock().await.profiles.insert(
            user_id.to_string(),
            Profile {
                id: user_id.to_string(),
                subscription_tier: Some(tier.to_string()),
                generations_count: Some(generations),
            },
        );
    }

    /// Makes every profile operation fail, as an unreachable database would.
    pub fn set_profiles_unavailable(&self, down: bool) {
        self.profiles_down.store(down, Ordering::SeqCst);
    }

    pub fn set_banners_unavailable(&self, down: bool) {
        self.banners_down.store(down, Ordering::SeqCst);
    }

    pub async fn usage(&self, user_id: &str) -> Option<u32> {
        self.state
            .lock()
            .await
            .profiles
            .get(user_id)
            .map(Profile::usage)
    }

    pub async fn banners(&self) -> Vec<NewBanner> {
        self.state.lock().await.banners.clone()
    }

    pub async fn anonymous_banners(&self) -> Vec<NewAnonymousBanner> {
        self.state.lock().await.anonymous_banners.clone()
    }

    fn check_profiles(&self) -> Result<()> {
        if self.profiles_down.load(Ordering::SeqCst) {
            return Err(BanneriaError::StorageError("profile store unavailable".into()));
        }
        Ok(())
    }

    fn check_banners(&self) -> Result<()> {
        if self.banners_down.load(Ordering::SeqCst) {
            return Err(BanneriaError::StorageError("banner store unavailable".into()));
        }
        Ok(())
    }

    fn inserted() -> InsertResult {
        InsertResult {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        }
    }
}

fn missing_profile(user_id: &str) -> BanneriaError {
    BanneriaError::StorageError(format!("profile {} not found", user_id))
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        self.check_profiles()?;
        Ok(self.state.lock().await.profiles.get(user_id).cloned())
    }

    async fn reserve_generation(&self, user_id: &str, limit: Option<u32>) -> Result<Reservation> {
        self.check_profiles()?;
        let mut state = self.state.lock().await;
        let profile = state
            .profiles
            .get_mut(user_id)
            .ok_or_else(|| missing_profile(user_id))?;

        let current = profile.usage();
        match limit {
            Some(limit) if current >= limit => Ok(Reservation::Exhausted { current }),
            _ => {
                profile.generations_count = Some(current + 1);
                Ok(Reservation::Reserved { count: current + 1 })
            }
        }
    }

    async fn release_generation(&self, user_id: &str) -> Result<()> {
        self.check_profiles()?;
        let mut state = self.state.lock().await;
        let profile = state
            .profiles
            .get_mut(user_id)
            .ok_or_else(|| missing_profile(user_id))?;
        profile.generations_count = Some(profile.usage().saturating_sub(1));
        Ok(())
    }

    async fn increment_generations(&self, user_id: &str) -> Result<u32> {
        self.check_profiles()?;
        let mut state = self.state.lock().await;
        let profile = state
            .profiles
            .get_mut(user_id)
            .ok_or_else(|| missing_profile(user_id))?;
        let count = profile.usage() + 1;
        profile.generations_count = Some(count);
        Ok(count)
    }
}

#[async_trait]
impl BannerStore for MemoryStore {
    async fn insert_banner(&self, banner: NewBanner) -> Result<InsertResult> {
        self.check_banners()?;
        self.state.lock().await.banners.push(banner);
        Ok(Self::inserted())
    }

    async fn insert_anonymous_banner(&self, banner: NewAnonymousBanner) -> Result<InsertResult> {
        self.check_banners()?;
        self.state.lock().await.anonymous_banners.push(banner);
        Ok(Self::inserted())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.banners_down.load(Ordering::SeqCst))
    }
}

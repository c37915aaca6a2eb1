use crate::error::{BanneriaError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_TIER: &str = "free";

/// Subscription tier name to generation limit; `None` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierLimits {
    limits: HashMap<String, Option<u32>>,
}

impl Default for TierLimits {
    fn default() -> Self {
        let mut limits = HashMap::new();
        limits.insert("free".to_string(), Some(5));
        limits.insert("pro".to_string(), Some(20));
        limits.insert("premium".to_string(), None);
        Self { limits }
    }
}

impl TierLimits {
    pub fn empty() -> Self {
        Self {
            limits: HashMap::new(),
        }
    }

    pub fn with_tier(mut self, tier: impl Into<String>, limit: Option<u32>) -> Self {
        self.limits.insert(tier.into().to_ascii_lowercase(), limit);
        self
    }

    /// Parses `free=5,pro=20,premium=unlimited`.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut tiers = Self::empty();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, value) = entry.split_once('=').ok_or_else(|| {
                BanneriaError::ConfigError(format!("Tier entry '{}' is missing '='", entry))
            })?;
            let value = value.trim();
            let limit = match value.to_ascii_lowercase().as_str() {
                "unlimited" | "none" | "null" | "" => None,
                _ => Some(value.parse::<u32>().map_err(|e| {
                    BanneriaError::ConfigError(format!("Invalid limit for tier '{}': {}", name, e))
                })?),
            };
            tiers = tiers.with_tier(name.trim(), limit);
        }
        Ok(tiers)
    }

    /// Unknown or missing tier names get the default tier's limit.
    pub fn limit_for(&self, tier: Option<&str>) -> Option<u32> {
        let tier = tier
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TIER.to_string());

        match self.limits.get(&tier) {
            Some(limit) => *limit,
            None => self.limits.get(DEFAULT_TIER).copied().flatten(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub subscription_tier: Option<String>,
    #[serde(default)]
    pub generations_count: Option<u32>,
}

impl Profile {
    pub fn usage(&self) -> u32 {
        self.generations_count.unwrap_or(0)
    }
}

/// Result of an atomic reserve-if-available on the usage counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Reserved { count: u32 },
    Exhausted { current: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBanner {
    pub user_id: String,
    pub image_url: String,
    pub prompt: String,
    pub size: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAnonymousBanner {
    pub session_token: String,
    pub image_url: String,
    pub prompt: String,
    pub size: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertResult {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_matches_plans() {
        let tiers = TierLimits::default();
        assert_eq!(tiers.limit_for(Some("free")), Some(5));
        assert_eq!(tiers.limit_for(Some("PRO")), Some(20));
        assert_eq!(tiers.limit_for(Some("premium")), None);
        assert_eq!(tiers.limit_for(None), Some(5));
        assert_eq!(tiers.limit_for(Some("legacy")), Some(5));
    }

    #[test]
    fn parses_tier_table() {
        let tiers = TierLimits::parse("free=3, business = unlimited").unwrap();
        assert_eq!(tiers.limit_for(Some("free")), Some(3));
        assert_eq!(tiers.limit_for(Some("business")), None);
        assert!(TierLimits::parse("free").is_err());
        assert!(TierLimits::parse("free=lots").is_err());
    }
}

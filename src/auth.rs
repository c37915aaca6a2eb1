use crate::{
    config::{SupabaseConfig, DEFAULT_STORE_TIMEOUT},
    error::{BanneriaError, Result},
    models::UserIdentity,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

/// Resolves a bearer access token to the account behind it.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, access_token: &str) -> Result<UserIdentity>;
}

/// Validates tokens against Supabase Auth (`GET /auth/v1/user`).
pub struct SupabaseAuth {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    email: Option<String>,
}

impl SupabaseAuth {
    pub fn new(config: &SupabaseConfig) -> Result<Self> {
        let base_url = config
            .url
            .clone()
            .ok_or_else(|| BanneriaError::ConfigError("SUPABASE_URL is required".into()))?;
        let api_key = config.service_role_key.clone().ok_or_else(|| {
            BanneriaError::ConfigError("SUPABASE_SERVICE_ROLE_KEY is required".into())
        })?;

        let client = Client::builder()
            .timeout(config.timeout.unwrap_or(DEFAULT_STORE_TIMEOUT))
            .build()
            .map_err(|e| BanneriaError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl Authenticator for SupabaseAuth {
    async fn authenticate(&self, access_token: &str) -> Result<UserIdentity> {
        let response = self
            .client
            .get(&format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| BanneriaError::RequestError(format!("Supabase auth request failed: {}", e)))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(BanneriaError::AuthError("Invalid or expired session".into()))
            }
            status => {
                return Err(BanneriaError::AuthError(format!(
                    "Supabase auth returned {}",
                    status
                )))
            }
        }

        let user: AuthUser = response
            .json()
            .await
            .map_err(|e| BanneriaError::ResponseError(e.to_string()))?;

        let identity = UserIdentity::new(user.id);
        Ok(match user.email {
            Some(email) => identity.with_email(email),
            None => identity,
        })
    }
}

/// Bearer value of an `Authorization` header, if it carries one.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

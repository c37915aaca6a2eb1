use crate::{
    config::{SupabaseConfig, DEFAULT_STORE_TIMEOUT},
    error::{BanneriaError, Result},
    models::{InsertResult, NewAnonymousBanner, NewBanner, Profile, Reservation},
    storage::traits::{BannerStore, ProfileStore},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

/// Supabase (PostgREST) backend. Counter updates go through the
/// `reserve_generation`, `release_generation` and `increment_generations`
/// functions in `sql/generation_quota.sql` so each one is a single statement.
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    headers: HeaderMap,
}

#[derive(Debug, Deserialize)]
struct ReserveRow {
    reserved: bool,
    generations_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct InsertedRow {
    id: Value,
    created_at: Option<DateTime<Utc>>,
}

impl SupabaseStore {
    pub async fn new(config: SupabaseConfig) -> Result<Self> {
        let base_url = config
            .url
            .ok_or_else(|| BanneriaError::ConfigError("SUPABASE_URL is required".into()))?;
        let key = config.service_role_key.ok_or_else(|| {
            BanneriaError::ConfigError("SUPABASE_SERVICE_ROLE_KEY is required".into())
        })?;

        let client = Client::builder()
            .timeout(config.timeout.unwrap_or(DEFAULT_STORE_TIMEOUT))
            .build()
            .map_err(|e| BanneriaError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        let store = Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers: build_headers(&key)?,
        };

        if !store.health_check().await? {
            log::warn!("Supabase health check failed, continuing anyway");
        }

        Ok(store)
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BanneriaError::StorageError(format!(
                "{} failed ({}): {}",
                what, status, body
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| BanneriaError::ResponseError(format!("{}: {}", what, e)))
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        let response = self
            .client
            .post(&self.rest_url(&format!("rpc/{}", function)))
            .headers(self.headers.clone())
            .json(&args)
            .send()
            .await
            .map_err(|e| BanneriaError::RequestError(format!("Supabase request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(BanneriaError::StorageError(format!(
                "{} failed ({}): {}",
                function, status, body
            )));
        }
        rpc_value(function, &body)
    }

    async fn insert_row<T: Serialize + Sync>(&self, table: &str, row: &T) -> Result<InsertResult> {
        let response = self
            .client
            .post(&self.rest_url(table))
            .headers(self.headers.clone())
            .header("Prefer", "return=representation")
            .query(&[("select", "id,created_at")])
            .json(row)
            .send()
            .await
            .map_err(|e| BanneriaError::RequestError(format!("Supabase request failed: {}", e)))?;

        let rows: Vec<InsertedRow> = Self::read_json(response, table).await?;
        let row = rows.into_iter().next().ok_or_else(|| {
            BanneriaError::StorageError(format!("Insert into {} returned no row", table))
        })?;

        Ok(InsertResult {
            id: match row.id {
                Value::String(id) => id,
                other => other.to_string(),
            },
            created_at: row.created_at.unwrap_or_else(Utc::now),
        })
    }
}

fn build_headers(key: &str) -> Result<HeaderMap> {
    let invalid = |e: reqwest::header::InvalidHeaderValue| {
        BanneriaError::ConfigError(format!("Invalid Supabase key: {}", e))
    };
    let mut headers = HeaderMap::new();
    headers.insert("apikey", HeaderValue::from_str(key).map_err(invalid)?);
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", key)).map_err(invalid)?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

/// `returns void` functions may answer 204 with no body.
fn rpc_value(function: &str, body: &str) -> Result<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| BanneriaError::ResponseError(format!("{}: {}", function, e)))
}

/// PostgREST returns a composite either as an object or a one-element array.
fn first_row<T: DeserializeOwned>(value: Value) -> Result<T> {
    let row = match value {
        Value::Array(mut rows) if !rows.is_empty() => rows.swap_remove(0),
        Value::Array(_) | Value::Null => {
            return Err(BanneriaError::StorageError("profile not found".into()))
        }
        other => other,
    };
    serde_json::from_value(row).map_err(|e| BanneriaError::SerializationError(e.to_string()))
}

fn reservation_from(value: Value) -> Result<Reservation> {
    let row: ReserveRow = first_row(value)?;
    let count = row.generations_count.unwrap_or(0);
    Ok(if row.reserved {
        Reservation::Reserved { count }
    } else {
        Reservation::Exhausted { current: count }
    })
}

#[async_trait]
impl ProfileStore for SupabaseStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let response = self
            .client
            .get(&self.rest_url("profiles"))
            .headers(self.headers.clone())
            .query(&[
                ("id", format!("eq.{}", user_id)),
                ("select", "id,subscription_tier,generations_count".to_string()),
            ])
            .send()
            .await
            .map_err(|e| BanneriaError::RequestError(format!("Supabase request failed: {}", e)))?;

        let profiles: Vec<Profile> = Self::read_json(response, "profiles lookup").await?;
        Ok(profiles.into_iter().next())
    }

    async fn reserve_generation(&self, user_id: &str, limit: Option<u32>) -> Result<Reservation> {
        let value = self
            .rpc(
                "reserve_generation",
                json!({ "p_user_id": user_id, "p_limit": limit }),
            )
            .await?;
        reservation_from(value)
    }

    async fn release_generation(&self, user_id: &str) -> Result<()> {
        self.rpc("release_generation", json!({ "p_user_id": user_id }))
            .await
            .map(|_| ())
    }

    async fn increment_generations(&self, user_id: &str) -> Result<u32> {
        let value = self
            .rpc("increment_generations", json!({ "p_user_id": user_id }))
            .await?;
        serde_json::from_value(value).map_err(|e| BanneriaError::SerializationError(e.to_string()))
    }
}

#[async_trait]
impl BannerStore for SupabaseStore {
    async fn insert_banner(&self, banner: NewBanner) -> Result<InsertResult> {
        self.insert_row("banners", &banner).await
    }

    async fn insert_anonymous_banner(&self, banner: NewAnonymousBanner) -> Result<InsertResult> {
        self.insert_row("anonymous_banners", &banner).await
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(&self.rest_url("profiles"))
            .headers(self.headers.clone())
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| BanneriaError::RequestError(format!("Supabase request failed: {}", e)))?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_reservation_object_or_array() {
        assert_eq!(
            reservation_from(json!({ "reserved": true, "generations_count": 3 })).unwrap(),
            Reservation::Reserved { count: 3 }
        );
        assert_eq!(
            reservation_from(json!([{ "reserved": false, "generations_count": 5 }])).unwrap(),
            Reservation::Exhausted { current: 5 }
        );
        assert!(reservation_from(json!([])).is_err());
        assert!(reservation_from(Value::Null).is_err());
    }

    #[test]
    fn empty_rpc_body_is_null() {
        assert_eq!(rpc_value("release_generation", "").unwrap(), Value::Null);
        assert_eq!(rpc_value("release_generation", " \n").unwrap(), Value::Null);
        assert_eq!(rpc_value("increment_generations", "6").unwrap(), json!(6));
        assert!(rpc_value("increment_generations", "<html>").is_err());
    }

    #[test]
    fn headers_carry_service_key() {
        let headers = build_headers("secret").unwrap();
        assert_eq!(headers["apikey"], "secret");
        assert_eq!(headers[AUTHORIZATION], "Bearer secret");
        assert!(build_headers("bad\nkey").is_err());
    }
}

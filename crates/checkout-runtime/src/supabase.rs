//! Supabase Backend
//!
//! Implementation of `CheckoutBackend` over PostgREST RPC calls
//! (`POST /rest/v1/rpc/<function>`).

use std::time::Duration;

use async_trait::async_trait;
use checkout_core::backend::CheckoutBackend;
use checkout_core::customer::CustomerUpsert;
use checkout_core::error::Result as CoreResult;
use checkout_core::model::{CheckoutData, CheckoutRecord};
use checkout_core::session::{CheckoutSession, SessionId};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, error, warn};

use crate::error::{Result, RuntimeError};

/// Supabase connection settings
#[derive(Clone, Debug)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,

    /// Public anon key, sent as `apikey` and bearer token
    pub anon_key: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            timeout_secs: 30,
        }
    }

    /// Read `SUPABASE_URL`, `SUPABASE_ANON_KEY` and `SUPABASE_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("SUPABASE_URL")
            .map_err(|_| RuntimeError::Config("SUPABASE_URL is not set".into()))?;
        let anon_key = std::env::var("SUPABASE_ANON_KEY")
            .map_err(|_| RuntimeError::Config("SUPABASE_ANON_KEY is not set".into()))?;
        let timeout_secs = std::env::var("SUPABASE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        Ok(Self {
            timeout_secs,
            ..Self::new(url, anon_key)
        })
    }
}

/// Checkout backend backed by Supabase RPC functions
pub struct SupabaseBackend {
    client: Client,
    config: SupabaseConfig,
}

impl SupabaseBackend {
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(SupabaseConfig::from_env()?)
    }

    /// Call an RPC function and return its raw JSON body
    async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        let url = format!("{}/rest/v1/rpc/{function}", self.config.url);
        debug!(function, "Calling backend RPC");

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&self.config.anon_key)
            .json(&args)
            .send()
            .await
            .map_err(|e| {
                warn!(function, error = %e, "Backend RPC transport failure");
                RuntimeError::Network(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(function, status = status.as_u16(), body = %body, "Backend RPC failed");
            return Err(RuntimeError::Status {
                call: function.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        // PostgREST answers 204 / empty body for void or null results
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Call an RPC that returns at most one record
    async fn rpc_one<T: DeserializeOwned>(&self, function: &str, args: Value) -> Result<Option<T>> {
        let value = match self.rpc(function, args).await? {
            Value::Array(rows) if rows.is_empty() => return Ok(None),
            Value::Array(mut rows) => rows.swap_remove(0),
            Value::Null => return Ok(None),
            other => other,
        };
        serde_json::from_value(value).map(Some).map_err(|e| RuntimeError::Decode {
            call: function.to_string(),
            message: e.to_string(),
        })
    }
}

/// Identifier returned by creation RPCs: bare string or `{ "id": … }`
#[derive(Deserialize)]
#[serde(untagged)]
enum CreatedId {
    Bare(String),
    Record {
        #[serde(alias = "session_id", alias = "customer_id")]
        id: String,
    },
}

impl CreatedId {
    fn into_inner(self) -> String {
        match self {
            CreatedId::Bare(id) | CreatedId::Record { id } => id,
        }
    }
}

#[async_trait]
impl CheckoutBackend for SupabaseBackend {
    async fn fetch_checkout_data(&self, link_id: &str) -> CoreResult<Option<CheckoutData>> {
        let record: Option<CheckoutRecord> = self
            .rpc_one("get_payment_link_checkout_data", json!({ "link_id": link_id }))
            .await?;
        Ok(record.map(CheckoutData::from))
    }

    async fn create_session_from_link(&self, link_id: &str, expiration_minutes: u32) -> CoreResult<SessionId> {
        const CALL: &str = "create_checkout_session_from_payment_link";
        let created: Option<CreatedId> = self
            .rpc_one(
                CALL,
                json!({ "payment_link_id": link_id, "expiration_minutes": expiration_minutes }),
            )
            .await?;

        let id = created.map(CreatedId::into_inner).ok_or_else(|| RuntimeError::Decode {
            call: CALL.into(),
            message: "no session id returned".into(),
        })?;
        Ok(SessionId::from_string(id))
    }

    async fn get_checkout_session(&self, session_id: &SessionId) -> CoreResult<CheckoutSession> {
        const CALL: &str = "get_checkout_session";
        let session: Option<CheckoutSession> = self
            .rpc_one(CALL, json!({ "session_id": session_id.as_str() }))
            .await?;

        session.ok_or_else(|| checkout_core::CheckoutError::NotFound(format!("checkout session {session_id}")))
    }

    async fn upsert_customer(&self, request: &CustomerUpsert) -> CoreResult<Option<String>> {
        let args = serde_json::to_value(request).map_err(RuntimeError::from)?;
        let created: Option<CreatedId> = self.rpc_one("upsert_customer", args).await?;
        Ok(created.map(CreatedId::into_inner).filter(|id| !id.trim().is_empty()))
    }

    async fn health_check(&self) -> CoreResult<bool> {
        let url = format!("{}/rest/v1/", self.config.url);
        match self
            .client
            .get(&url)
            .header("apikey", &self.config.anon_key)
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                warn!(error = %e, "Supabase health check failed");
                Ok(false)
            }
        }
    }
}

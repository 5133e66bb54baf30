//! Edge Function Gateway
//!
//! Reaches every payment provider through the backend's per-provider edge
//! functions:
//!
//! ```text
//! POST /functions/v1/<provider>-checkout          -> { checkout_url } | { transaction_id }
//! GET  /functions/v1/<provider>-status?transaction_id=…  -> { status, reason? }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use checkout_core::dispatch::DispatchOutcome;
use checkout_core::error::Result as CoreResult;
use checkout_core::provider::{DispatchParams, ProviderCode, ProviderGateway, ProviderResponse, TransactionStatus};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::error::{PaymentError, Result};
use crate::modal::{DEFAULT_MODAL_POLL_INTERVAL, ModalPayment};

/// Edge function connection settings
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Base URL of the edge functions, e.g. `https://xyz.supabase.co/functions/v1`
    pub functions_url: String,
    pub anon_key: String,
    pub timeout_secs: u64,
    /// Delay between modal status reads
    pub poll_interval: Duration,
}

impl GatewayConfig {
    pub fn new(functions_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            functions_url: functions_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            timeout_secs: 30,
            poll_interval: DEFAULT_MODAL_POLL_INTERVAL,
        }
    }

    /// Read `SUPABASE_URL`, `SUPABASE_ANON_KEY`, `PAYMENTS_TIMEOUT_SECS`, `PAYMENTS_POLL_INTERVAL_SECS`
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("SUPABASE_URL")
            .map_err(|_| PaymentError::Config("SUPABASE_URL not set".into()))?;
        let anon_key = std::env::var("SUPABASE_ANON_KEY")
            .map_err(|_| PaymentError::Config("SUPABASE_ANON_KEY not set".into()))?;

        let mut config = Self::new(format!("{}/functions/v1", url.trim_end_matches('/')), anon_key);
        if let Some(secs) = std::env::var("PAYMENTS_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()) {
            config.timeout_secs = secs;
        }
        if let Some(secs) = std::env::var("PAYMENTS_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|&secs| secs > 0)
        {
            config.poll_interval = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
struct InitiationBody {
    #[serde(default)]
    checkout_url: Option<String>,
    #[serde(default)]
    payment_url: Option<String>,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    payment_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

/// Provider gateway over backend edge functions
pub struct EdgeFunctionGateway {
    client: Client,
    config: GatewayConfig,
}

impl EdgeFunctionGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(GatewayConfig::from_env()?)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Payment modal for a dispatch outcome, polling at the configured interval
    pub fn open_modal(self: &Arc<Self>, outcome: &DispatchOutcome) -> Option<ModalPayment> {
        let gateway: Arc<dyn ProviderGateway> = self.clone();
        ModalPayment::for_outcome(gateway, outcome, self.config.poll_interval)
    }

    fn function_url(&self, provider: ProviderCode, action: &str) -> String {
        format!(
            "{}/{}-{action}",
            self.config.functions_url,
            provider.as_str().to_lowercase()
        )
    }

    async fn check(provider: ProviderCode, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!(provider = %provider, status = status.as_u16(), body = %body, "Edge function failed");
        Err(PaymentError::Status {
            provider,
            status: status.as_u16(),
            body,
        })
    }

    async fn start_checkout(&self, provider: ProviderCode, params: &DispatchParams) -> Result<ProviderResponse> {
        let response = self
            .client
            .post(self.function_url(provider, "checkout"))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&self.config.anon_key)
            .json(params)
            .send()
            .await?;
        let body: InitiationBody = Self::check(provider, response).await?.json().await?;

        if let Some(message) = body.error.filter(|m| !m.is_empty()) {
            return Err(PaymentError::Rejected { provider, message });
        }
        if let Some(checkout_url) = body.checkout_url.or(body.payment_url) {
            info!(provider = %provider, "Provider returned hosted checkout");
            return Ok(ProviderResponse::Redirect { checkout_url });
        }
        if let Some(transaction_id) = body.transaction_id.or(body.payment_id) {
            info!(provider = %provider, transaction_id = %transaction_id, "Provider opened transaction");
            return Ok(ProviderResponse::Transaction { transaction_id });
        }
        Err(PaymentError::Decode {
            provider,
            message: "neither checkout_url nor transaction_id present".into(),
        })
    }

    async fn read_status(&self, provider: ProviderCode, transaction_id: &str) -> Result<TransactionStatus> {
        let response = self
            .client
            .get(self.function_url(provider, "status"))
            .query(&[("transaction_id", transaction_id)])
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&self.config.anon_key)
            .send()
            .await?;
        let body: StatusBody = Self::check(provider, response).await?.json().await?;
        debug!(provider = %provider, transaction_id, status = %body.status, "Transaction status read");
        Ok(map_status(&body.status, body.reason))
    }
}

/// Normalize provider-specific status words
pub fn map_status(raw: &str, reason: Option<String>) -> TransactionStatus {
    match raw.trim().to_lowercase().as_str() {
        "succeeded" | "success" | "successful" | "completed" | "paid" | "finished" | "confirmed" => {
            TransactionStatus::Succeeded
        }
        "failed" | "expired" | "refunded" | "cancelled" | "canceled" | "declined" | "rejected" => {
            TransactionStatus::Failed {
                reason: reason.or_else(|| Some(raw.to_string())),
            }
        }
        _ => TransactionStatus::Pending,
    }
}

#[async_trait]
impl ProviderGateway for EdgeFunctionGateway {
    async fn initiate(&self, provider: ProviderCode, params: &DispatchParams) -> CoreResult<ProviderResponse> {
        Ok(self.start_checkout(provider, params).await?)
    }

    async fn transaction_status(&self, provider: ProviderCode, transaction_id: &str) -> CoreResult<TransactionStatus> {
        Ok(self.read_status(provider, transaction_id).await?)
    }
}

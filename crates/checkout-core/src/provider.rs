//! Payment Provider Strategy Pattern
//!
//! Defines the provider catalogue (which rails exist and how each one hands
//! control back to the page) and the `ProviderGateway` trait through which
//! every provider-specific checkout is initiated.
//!
//! ## Dispatch styles
//!
//! ```text
//! Redirect (mobile money)          Modal (card / crypto)
//! ┌──────────┐   checkout_url      ┌──────────┐  transaction_id
//! │ Checkout │ ──────────────▶     │ Checkout │ ─────────────▶ in-page modal
//! │   page   │   full navigation   │   page   │                polls status
//! └──────────┘                     └──────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};

/// Provider code as stored on payment links
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProviderCode {
    Orange,
    Wave,
    Mtn,
    Moov,
    Ecobank,
    #[serde(rename = "NOWPAYMENTS")]
    NowPayments,
}

impl ProviderCode {
    /// All known providers, in display order
    pub const ALL: [ProviderCode; 6] = [
        ProviderCode::Orange,
        ProviderCode::Wave,
        ProviderCode::Mtn,
        ProviderCode::Moov,
        ProviderCode::Ecobank,
        ProviderCode::NowPayments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderCode::Orange => "ORANGE",
            ProviderCode::Wave => "WAVE",
            ProviderCode::Mtn => "MTN",
            ProviderCode::Moov => "MOOV",
            ProviderCode::Ecobank => "ECOBANK",
            ProviderCode::NowPayments => "NOWPAYMENTS",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderCode::Orange => "Orange Money",
            ProviderCode::Wave => "Wave",
            ProviderCode::Mtn => "MTN Mobile Money",
            ProviderCode::Moov => "Moov Money",
            ProviderCode::Ecobank => "Card (Ecobank)",
            ProviderCode::NowPayments => "Crypto (NOWPayments)",
        }
    }

    /// How this provider hands control back to the checkout page
    pub fn dispatch_style(&self) -> DispatchStyle {
        match self {
            ProviderCode::Orange | ProviderCode::Wave | ProviderCode::Mtn | ProviderCode::Moov => {
                DispatchStyle::Redirect
            }
            ProviderCode::Ecobank => DispatchStyle::Modal(ModalRail::Card),
            ProviderCode::NowPayments => DispatchStyle::Modal(ModalRail::Crypto),
        }
    }
}

impl fmt::Display for ProviderCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderCode {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|code| code.as_str() == upper)
            .ok_or_else(|| CheckoutError::UnknownProvider(s.to_string()))
    }
}

/// Transport shape of a provider checkout
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStyle {
    /// Provider returns a hosted checkout URL; the page navigates away
    Redirect,
    /// Provider returns a transaction id tracked by an in-page modal
    Modal(ModalRail),
}

/// Rail behind a modal-style provider
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalRail {
    Card,
    Crypto,
}

/// Parameters sent to a provider's checkout initiation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatchParams {
    pub merchant_id: String,
    pub organization_id: String,
    pub customer_id: String,
    /// Sent as a JSON number, already rounded to the currency's minor units
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    /// Opaque pass-through metadata
    pub metadata: serde_json::Value,
}

/// What a provider returned from initiation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderResponse {
    /// Hosted checkout page to navigate to
    Redirect { checkout_url: String },
    /// Transaction to track in-page
    Transaction { transaction_id: String },
}

/// Status of a modal-tracked transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Succeeded,
    Failed { reason: Option<String> },
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// Strategy trait for provider checkout initiation
///
/// Implement this for each transport that can reach the providers (backend
/// edge functions, direct provider APIs, in-memory mocks).
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Start a checkout with the given provider
    async fn initiate(&self, provider: ProviderCode, params: &DispatchParams) -> Result<ProviderResponse>;

    /// Read the status of a modal-tracked transaction
    async fn transaction_status(&self, provider: ProviderCode, transaction_id: &str) -> Result<TransactionStatus>;
}

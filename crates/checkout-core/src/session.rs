//! Checkout Sessions
//!
//! Server-side sessions created from a payment link. The page only holds the
//! id and reads the status; expiry is terminal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status reported by the backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Completed,
    Expired,
}

/// A checkout session as read from the backend
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: SessionId,
    pub status: SessionStatus,
    /// Backend-computed expiry flag; may be set while `status` is still open
    #[serde(default)]
    pub is_expired: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub payment_link_id: Option<String>,
}

impl CheckoutSession {
    /// Open session expiring at the given instant
    pub fn open(id: SessionId, expires_at: DateTime<Utc>) -> Self {
        Self {
            id,
            status: SessionStatus::Open,
            is_expired: false,
            expires_at: Some(expires_at),
            organization_id: None,
            merchant_id: None,
            payment_link_id: None,
        }
    }

    pub fn has_expired(&self) -> bool {
        self.is_expired || self.status == SessionStatus::Expired
    }

    pub fn is_terminal(&self) -> bool {
        self.has_expired() || self.status == SessionStatus::Completed
    }
}

/// Shared "session is unavailable" flag
///
/// Set by the session monitor on expiry and read by the checkout page. Once
/// raised it never clears.
#[derive(Clone, Debug, Default)]
pub struct SessionFlag(Arc<AtomicBool>);

impl SessionFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

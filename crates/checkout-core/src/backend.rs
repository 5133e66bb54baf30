//! Remote backend collaborator
//!
//! Everything the checkout needs from the payment API: link data, session
//! creation and status, and customer upsert. Real computation (session
//! expiry, dedup, fee lookup) happens behind this trait.

use async_trait::async_trait;

use crate::customer::CustomerUpsert;
use crate::error::Result;
use crate::model::CheckoutData;
use crate::session::{CheckoutSession, SessionId};

/// Strategy trait for the payment API backend
#[async_trait]
pub trait CheckoutBackend: Send + Sync {
    /// Load the link and its checkout target; `None` when the link does not exist
    async fn fetch_checkout_data(&self, link_id: &str) -> Result<Option<CheckoutData>>;

    /// Create a checkout session for a link, expiring after the given minutes
    async fn create_session_from_link(&self, link_id: &str, expiration_minutes: u32) -> Result<SessionId>;

    /// Read the current status of a checkout session
    async fn get_checkout_session(&self, session_id: &SessionId) -> Result<CheckoutSession>;

    /// Create or update a customer; returns the customer id when the backend produced one
    async fn upsert_customer(&self, request: &CustomerUpsert) -> Result<Option<String>>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

//! # checkout-payments
//!
//! Provider checkout initiation and in-page transaction tracking.
//!
//! ## Dispatch styles
//!
//! ### 1. Redirect (mobile money: Orange, Wave, MTN, Moov)
//!
//! **Flow:** Checkout page → provider's hosted page → merchant success URL
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌─────────────┐
//! │  Checkout   │────▶│ Provider Hosted │────▶│  Merchant   │
//! │    page     │     │  Checkout Page  │     │  (success)  │
//! └─────────────┘     └─────────────────┘     └─────────────┘
//! ```
//!
//! Terminal on navigation; nothing is tracked afterwards.
//!
//! ### 2. Modal (card via Ecobank, crypto via NOWPayments)
//!
//! **Flow:** Payment modal embedded in the page, polled until done
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │             Checkout page              │
//! │  ┌────────────────────────────────┐    │
//! │  │   Payment modal                │    │
//! │  │   tx_…  status: pending ↻      │    │
//! │  └────────────────────────────────┘    │
//! └────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_payments::{EdgeFunctionGateway, ModalPayment};
//!
//! let gateway = Arc::new(EdgeFunctionGateway::from_env()?);
//! let outcome = page.select_provider(ProviderCode::NowPayments).await?;
//!
//! if let Some(modal) = gateway.open_modal(&outcome) {
//!     let (_close, rx) = tokio::sync::watch::channel(false);
//!     let result = modal.wait(rx).await;
//! }
//! ```

mod error;
mod gateway;
mod modal;

pub use error::{PaymentError, Result};
pub use gateway::{EdgeFunctionGateway, GatewayConfig, map_status};
pub use modal::{DEFAULT_MODAL_POLL_INTERVAL, ModalOutcome, ModalPayment};

//! # checkout-core
//!
//! Checkout orchestration for payment links: pricing, customer upsert,
//! provider dispatch and session lifecycle monitoring.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CheckoutPage                            │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │   Pricing   │  │  Dispatcher │──│  ProviderGateway    │  │
//! │  │  Resolver   │  │ (state mach)│  │   (Strategy)        │  │
//! │  └─────────────┘  └──────┬──────┘  └─────────────────────┘  │
//! │                          │                                   │
//! │  ┌─────────────┐  ┌──────┴──────┐                           │
//! │  │   Session   │──│  Checkout   │                           │
//! │  │   Monitor   │  │  Backend    │                           │
//! │  └─────────────┘  └─────────────┘                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! `CheckoutBackend` and `ProviderGateway` are the only seams to the outside
//! world; `mock` has in-memory versions of both.

pub mod backend;
pub mod country;
pub mod customer;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod mock;
pub mod model;
pub mod monitor;
pub mod page;
pub mod pricing;
pub mod provider;
pub mod session;

pub use backend::CheckoutBackend;
pub use customer::{CustomerDraft, RequiredField, ValidationError, upsert_customer};
pub use dispatch::{AttemptState, DispatchOutcome, Dispatched, Dispatcher};
pub use error::{CheckoutError, DispatchError, Result};
pub use model::{BillingFrequency, CheckoutData, CheckoutTarget, Fee, FeeSchedule, PaymentLink, Product, SubscriptionPlan};
pub use monitor::{MonitorExit, MonitorHandle, SessionMonitor};
pub use page::{CheckoutPage, Notice, PageView};
pub use pricing::{ComputedTotal, compute_total};
pub use provider::{DispatchParams, DispatchStyle, ModalRail, ProviderCode, ProviderGateway, ProviderResponse, TransactionStatus};
pub use session::{CheckoutSession, SessionFlag, SessionId, SessionStatus};

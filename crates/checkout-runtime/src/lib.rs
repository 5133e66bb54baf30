//! # checkout-runtime
//!
//! Remote collaborators for the checkout.
//!
//! ## Collaborators
//!
//! - **Supabase**: `CheckoutBackend` over PostgREST RPC functions
//! - **Geolocation**: cached best-effort country detection
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_runtime::SupabaseBackend;
//!
//! let backend = Arc::new(SupabaseBackend::from_env()?);
//! let page = CheckoutPage::new(link_id, backend, gateway, "https://example.com");
//! page.load().await?;
//! ```

pub mod error;
pub mod geo;
pub mod supabase;

pub use error::{Result, RuntimeError};
pub use geo::{CountryCache, CountryDetector, Detection, DetectionSource, FileCountryCache, GeoConfig, MemoryCountryCache};
pub use supabase::{SupabaseBackend, SupabaseConfig};

// Re-export core types for convenience
pub use checkout_core::{CheckoutBackend, CheckoutError, CheckoutPage, SessionId};

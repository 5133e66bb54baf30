//! Payment Error Types

use checkout_core::{CheckoutError, ProviderCode};
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Provider (through its edge function) refused the checkout
    #[error("{provider} rejected the checkout: {message}")]
    Rejected { provider: ProviderCode, message: String },

    /// Edge function answered with a non-success status
    #[error("{provider} edge function returned HTTP {status}: {body}")]
    Status {
        provider: ProviderCode,
        status: u16,
        body: String,
    },

    /// Response body did not match any known shape
    #[error("Unexpected {provider} response: {message}")]
    Decode { provider: ProviderCode, message: String },

    /// Transport failure
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::Http(_) => true,
            PaymentError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            PaymentError::Rejected { .. } => "The payment provider declined this payment.",
            PaymentError::Http(_) | PaymentError::Status { .. } => "Payment processing failed. Please try again.",
            PaymentError::Config(_) => "Service configuration error.",
            PaymentError::Decode { .. } => "An error occurred processing your request.",
        }
    }
}

impl From<PaymentError> for CheckoutError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Http(e) => CheckoutError::Network(e.to_string()),
            PaymentError::Config(msg) => CheckoutError::Config(msg),
            other => CheckoutError::Provider(other.to_string()),
        }
    }
}

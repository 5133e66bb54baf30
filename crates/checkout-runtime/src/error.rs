//! Error Types for remote collaborators

use checkout_core::CheckoutError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{call} returned HTTP {status}: {body}")]
    Status { call: String, status: u16, body: String },

    #[error("Unexpected response from {call}: {message}")]
    Decode { call: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<RuntimeError> for CheckoutError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Network(e) => CheckoutError::Network(e.to_string()),
            RuntimeError::Config(msg) => CheckoutError::Config(msg),
            RuntimeError::Serialization(e) => CheckoutError::Json(e),
            other @ (RuntimeError::Status { .. } | RuntimeError::Decode { .. }) => {
                CheckoutError::Backend(other.to_string())
            }
            RuntimeError::Cache(e) => CheckoutError::Other(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_maps_to_retryable_backend_error() {
        let err: CheckoutError = RuntimeError::Status {
            call: "get_checkout_session".into(),
            status: 503,
            body: "unavailable".into(),
        }
        .into();
        assert!(matches!(err, CheckoutError::Backend(ref m) if m.contains("503")));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_config_is_not_retryable() {
        let err: CheckoutError = RuntimeError::Config("SUPABASE_URL not set".into()).into();
        assert!(!err.is_retryable());
    }
}

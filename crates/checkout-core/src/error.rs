//! Error Types

use thiserror::Error;

use crate::customer::ValidationError;
use crate::provider::ProviderCode;

/// Result type alias for collaborator operations
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Failures raised by remote collaborators and model construction
#[derive(Error, Debug)]
pub enum CheckoutError {
    /// Backend RPC returned an error
    #[error("Backend error: {0}")]
    Backend(String),

    /// Payment provider (or its edge function) rejected the request
    #[error("Provider error: {0}")]
    Provider(String),

    /// Transport-level failure talking to a collaborator
    #[error("Network error: {0}")]
    Network(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Fee percentage outside [0, 100]
    #[error("Invalid fee '{name}': percentage {percentage} must be between 0 and 100")]
    InvalidFee {
        name: String,
        percentage: rust_decimal::Decimal,
    },

    /// Price or plan amount beyond what pricing supports
    #[error("Amount {0} exceeds the supported maximum")]
    InvalidAmount(rust_decimal::Decimal),

    /// Provider code not recognised
    #[error("Unknown provider code: {0}")]
    UnknownProvider(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl CheckoutError {
    /// Check if error is worth a manual retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckoutError::Network(_) | CheckoutError::Backend(_) | CheckoutError::Provider(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            CheckoutError::Network(_) => "We could not reach the payment service. Please try again.".into(),
            CheckoutError::Provider(_) => "The payment provider could not start your payment. Please try again.".into(),
            CheckoutError::NotFound(_) => "This payment link could not be found.".into(),
            CheckoutError::Config(_) => "Service configuration error.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

/// Failure of a single checkout attempt
///
/// Every variant is surfaced to the payer as a transient notice; none is
/// retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Payment link data has not been loaded (or does not exist)
    #[error("Checkout data is missing")]
    MissingCheckoutData,

    /// Link has no merchant or organization id attached
    #[error("Payment link is missing its merchant or organization id")]
    MissingMerchantOrOrgId,

    /// Required customer fields are incomplete
    #[error("Validation failed: {0}")]
    Validation(ValidationError),

    /// Provider is not enabled on this link
    #[error("Provider {0} is not enabled for this payment link")]
    ProviderNotAllowed(ProviderCode),

    /// Link expiry date has passed
    #[error("Payment link has expired")]
    LinkExpired,

    /// Checkout session reported expiry
    #[error("Checkout session is no longer available")]
    SessionUnavailable,

    /// Remote customer upsert returned no id
    #[error("Customer upsert failed")]
    CustomerUpsertFailed,

    /// Provider initiation failed upstream
    #[error("Provider initiation failed: {0}")]
    ProviderInitiationFailed(String),

    /// Modal transaction ended unsuccessfully after initiation
    #[error("Payment failed: {}", .0.as_deref().unwrap_or("no reason given"))]
    PaymentFailed(Option<String>),

    /// Another dispatch is still outstanding on this page
    #[error("A payment is already being processed")]
    AlreadyInFlight,
}

impl DispatchError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::MissingCheckoutData => "MISSING_CHECKOUT_DATA",
            DispatchError::MissingMerchantOrOrgId => "MISSING_MERCHANT_OR_ORG_ID",
            DispatchError::Validation(_) => "VALIDATION_ERROR",
            DispatchError::ProviderNotAllowed(_) => "PROVIDER_NOT_ALLOWED",
            DispatchError::LinkExpired => "LINK_EXPIRED",
            DispatchError::SessionUnavailable => "SESSION_UNAVAILABLE",
            DispatchError::CustomerUpsertFailed => "CUSTOMER_UPSERT_FAILED",
            DispatchError::ProviderInitiationFailed(_) => "PROVIDER_INITIATION_FAILED",
            DispatchError::PaymentFailed(_) => "PAYMENT_FAILED",
            DispatchError::AlreadyInFlight => "ALREADY_IN_FLIGHT",
        }
    }

    /// Whether the payer can fix this by repeating the action
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::Validation(_)
                | DispatchError::CustomerUpsertFailed
                | DispatchError::ProviderInitiationFailed(_)
                | DispatchError::PaymentFailed(_)
                | DispatchError::AlreadyInFlight
        )
    }

    /// Generic, actionable message for the payer
    pub fn user_message(&self) -> String {
        match self {
            DispatchError::MissingCheckoutData => "Payment details could not be loaded. Please refresh the page.".into(),
            DispatchError::MissingMerchantOrOrgId => "This payment link is not configured correctly. Please contact the merchant.".into(),
            DispatchError::Validation(err) => err.message(),
            DispatchError::ProviderNotAllowed(code) => format!("{} is not available for this payment.", code.display_name()),
            DispatchError::LinkExpired => "This payment link has expired.".into(),
            DispatchError::SessionUnavailable => "This payment is no longer available.".into(),
            DispatchError::CustomerUpsertFailed => "We could not save your details. Please check them and try again.".into(),
            DispatchError::ProviderInitiationFailed(_) => "We could not start your payment. Please try again.".into(),
            DispatchError::PaymentFailed(_) => "Your payment did not go through. Please try again or choose another method.".into(),
            DispatchError::AlreadyInFlight => "Your payment is being processed. Please wait.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customer::RequiredField;

    #[test]
    fn test_configuration_errors_are_not_retryable() {
        assert!(!DispatchError::MissingMerchantOrOrgId.is_retryable());
        assert!(DispatchError::CustomerUpsertFailed.is_retryable());
        assert!(DispatchError::ProviderInitiationFailed("boom".into()).is_retryable());
    }

    #[test]
    fn test_user_message_hides_upstream_detail() {
        let err = DispatchError::ProviderInitiationFailed("HTTP 500: stack trace".into());
        assert!(!err.user_message().contains("stack trace"));

        let err = CheckoutError::Provider("secret detail".into());
        assert!(!err.user_message().contains("secret detail"));
    }

    #[test]
    fn test_validation_error_code() {
        let err = DispatchError::Validation(ValidationError::new(RequiredField::FullName));
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}

//! Provider Dispatcher
//!
//! Runs one checkout attempt: required-field gate, customer upsert, then
//! provider initiation. Progress is tracked with an explicit state machine:
//!
//! ```text
//! Idle -> FieldsValidated -> CustomerUpserted -> ProviderInitiated
//!                                                   ├─> Redirected
//!                                                   └─> Polling -> Succeeded | Failed
//! ```
//!
//! Any non-terminal state may also move to `Failed`.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::backend::CheckoutBackend;
use crate::customer::{self, CustomerDraft};
use crate::error::DispatchError;
use crate::model::{CheckoutData, CheckoutTarget};
use crate::pricing::{compute_total, round_for_currency};
use crate::provider::{DispatchParams, DispatchStyle, ModalRail, ProviderCode, ProviderGateway, ProviderResponse};

/// State of a single checkout attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    FieldsValidated,
    CustomerUpserted { customer_id: String },
    ProviderInitiated { provider: ProviderCode, customer_id: String },
    Redirected { checkout_url: String },
    Polling { provider: ProviderCode, transaction_id: String },
    Succeeded,
    Failed(DispatchError),
}

/// Input to the attempt state machine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptEvent {
    FieldsValidated,
    CustomerUpserted(String),
    ProviderInitiated(ProviderCode),
    RedirectIssued(String),
    TransactionOpened(String),
    PaymentConfirmed,
    PaymentFailed(DispatchError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid transition from {from} on {event}")]
pub struct InvalidTransition {
    pub from: &'static str,
    pub event: &'static str,
}

impl AttemptState {
    pub fn name(&self) -> &'static str {
        match self {
            AttemptState::Idle => "idle",
            AttemptState::FieldsValidated => "fields_validated",
            AttemptState::CustomerUpserted { .. } => "customer_upserted",
            AttemptState::ProviderInitiated { .. } => "provider_initiated",
            AttemptState::Redirected { .. } => "redirected",
            AttemptState::Polling { .. } => "polling",
            AttemptState::Succeeded => "succeeded",
            AttemptState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptState::Redirected { .. } | AttemptState::Succeeded | AttemptState::Failed(_)
        )
    }

    /// Pure transition function
    pub fn transition(self, event: AttemptEvent) -> Result<AttemptState, InvalidTransition> {
        use AttemptEvent as E;
        use AttemptState as S;

        match (self, event) {
            (S::Idle, E::FieldsValidated) => Ok(S::FieldsValidated),
            (S::FieldsValidated, E::CustomerUpserted(customer_id)) => Ok(S::CustomerUpserted { customer_id }),
            (S::CustomerUpserted { customer_id }, E::ProviderInitiated(provider)) => {
                Ok(S::ProviderInitiated { provider, customer_id })
            }
            (S::ProviderInitiated { provider, .. }, E::RedirectIssued(checkout_url))
                if provider.dispatch_style() == DispatchStyle::Redirect =>
            {
                Ok(S::Redirected { checkout_url })
            }
            (S::ProviderInitiated { provider, .. }, E::TransactionOpened(transaction_id))
                if provider.dispatch_style() != DispatchStyle::Redirect =>
            {
                Ok(S::Polling { provider, transaction_id })
            }
            (S::Polling { .. }, E::PaymentConfirmed) => Ok(S::Succeeded),
            (state, E::PaymentFailed(err)) if !state.is_terminal() => Ok(S::Failed(err)),
            (state, event) => Err(InvalidTransition {
                from: state.name(),
                event: event.name(),
            }),
        }
    }
}

impl AttemptEvent {
    fn name(&self) -> &'static str {
        match self {
            AttemptEvent::FieldsValidated => "fields_validated",
            AttemptEvent::CustomerUpserted(_) => "customer_upserted",
            AttemptEvent::ProviderInitiated(_) => "provider_initiated",
            AttemptEvent::RedirectIssued(_) => "redirect_issued",
            AttemptEvent::TransactionOpened(_) => "transaction_opened",
            AttemptEvent::PaymentConfirmed => "payment_confirmed",
            AttemptEvent::PaymentFailed(_) => "payment_failed",
        }
    }
}

/// What the page should do after a successful dispatch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Full-page navigation; nothing is tracked afterwards
    Redirect { checkout_url: String },
    /// Open the in-page modal and poll this transaction
    Modal {
        provider: ProviderCode,
        rail: ModalRail,
        transaction_id: String,
    },
}

/// A dispatch that reached the provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dispatched {
    pub outcome: DispatchOutcome,
    pub customer_id: String,
    pub state: AttemptState,
}

/// Runs checkout attempts against the backend and provider gateway
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn CheckoutBackend>,
    gateway: Arc<dyn ProviderGateway>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn CheckoutBackend>, gateway: Arc<dyn ProviderGateway>) -> Self {
        Self { backend, gateway }
    }

    pub fn gateway(&self) -> &Arc<dyn ProviderGateway> {
        &self.gateway
    }

    /// Run one attempt for the selected provider
    pub async fn dispatch(
        &self,
        data: Option<&CheckoutData>,
        draft: &CustomerDraft,
        provider: ProviderCode,
    ) -> Result<Dispatched, DispatchError> {
        let data = data.ok_or(DispatchError::MissingCheckoutData)?;
        let link = &data.link;

        draft.validate_required().map_err(DispatchError::Validation)?;
        let state = step(AttemptState::Idle, AttemptEvent::FieldsValidated)?;

        if !link.accepts(provider) {
            return Err(DispatchError::ProviderNotAllowed(provider));
        }
        if link.is_expired_at(Utc::now()) {
            return Err(DispatchError::LinkExpired);
        }

        let Some((merchant_id, organization_id)) = link.owner_ids() else {
            error!(link_id = %link.id, "Payment link has no merchant/organization id");
            return Err(DispatchError::MissingMerchantOrOrgId);
        };

        let customer_id = customer::upsert_customer(
            self.backend.as_ref(),
            Some(merchant_id),
            Some(organization_id),
            draft,
        )
        .await
        .ok_or(DispatchError::CustomerUpsertFailed)?;
        let state = step(state, AttemptEvent::CustomerUpserted(customer_id.clone()))?;

        let total = compute_total(&data.target);
        let params = DispatchParams {
            merchant_id: merchant_id.to_string(),
            organization_id: organization_id.to_string(),
            customer_id: customer_id.clone(),
            amount: round_for_currency(total.total, &total.currency),
            currency: total.currency.clone(),
            success_url: link.success_url.clone(),
            cancel_url: link.cancel_url.clone(),
            product_id: data.target.product_id().map(str::to_string),
            subscription_id: data.target.subscription().map(|s| s.id.clone()),
            metadata: build_metadata(data, draft),
        };

        info!(
            link_id = %link.id,
            provider = %provider,
            amount = %params.amount,
            currency = %params.currency,
            "Initiating provider checkout"
        );

        let response = self.gateway.initiate(provider, &params).await.map_err(|e| {
            warn!(provider = %provider, error = %e, "Provider initiation failed");
            DispatchError::ProviderInitiationFailed(e.to_string())
        })?;
        let state = step(state, AttemptEvent::ProviderInitiated(provider))?;

        let (outcome, event) = match (provider.dispatch_style(), response) {
            (DispatchStyle::Redirect, ProviderResponse::Redirect { checkout_url }) => (
                DispatchOutcome::Redirect { checkout_url: checkout_url.clone() },
                AttemptEvent::RedirectIssued(checkout_url),
            ),
            (DispatchStyle::Modal(rail), ProviderResponse::Transaction { transaction_id }) => (
                DispatchOutcome::Modal {
                    provider,
                    rail,
                    transaction_id: transaction_id.clone(),
                },
                AttemptEvent::TransactionOpened(transaction_id),
            ),
            (style, response) => {
                warn!(provider = %provider, ?style, ?response, "Provider returned unexpected response shape");
                return Err(DispatchError::ProviderInitiationFailed(format!(
                    "unexpected response shape from {provider}"
                )));
            }
        };
        let state = step(state, event)?;

        Ok(Dispatched {
            outcome,
            customer_id,
            state,
        })
    }
}

fn step(state: AttemptState, event: AttemptEvent) -> Result<AttemptState, DispatchError> {
    let from = state.name();
    let next = state.transition(event).map_err(|e| {
        error!(error = %e, "Checkout attempt state machine rejected event");
        DispatchError::ProviderInitiationFailed(e.to_string())
    })?;
    debug!(from, to = next.name(), "Checkout attempt advanced");
    Ok(next)
}

/// Opaque metadata attached to every dispatch
pub fn build_metadata(data: &CheckoutData, draft: &CustomerDraft) -> serde_json::Value {
    let mut metadata = serde_json::json!({
        "payment_link_id": data.link.id,
        "customer_email": draft.email.trim(),
        "customer_phone": draft.resolved_phone(),
        "customer_name": draft.full_name(),
        "whatsapp_number": draft.resolved_whatsapp(),
    });

    if let CheckoutTarget::Subscription(plan) = &data.target {
        metadata["subscription_plan_id"] = serde_json::json!(plan.id);
        metadata["subscription_plan_name"] = serde_json::json!(plan.name);
        metadata["billing_frequency"] = serde_json::json!(plan.frequency.as_str());
    }

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockGateway, sample_product_data, sample_subscription_data};
    use rust_decimal_macros::dec;

    fn valid_draft() -> CustomerDraft {
        let mut draft = CustomerDraft::default();
        draft.set_full_name("John Doe");
        draft.email = "x@x.com".into();
        draft.phone_number = "123".into();
        draft
    }

    fn dispatcher(backend: &Arc<MockBackend>, gateway: &Arc<MockGateway>) -> Dispatcher {
        Dispatcher::new(backend.clone(), gateway.clone())
    }

    #[test]
    fn test_happy_path_transitions() {
        let state = AttemptState::Idle
            .transition(AttemptEvent::FieldsValidated)
            .and_then(|s| s.transition(AttemptEvent::CustomerUpserted("c1".into())))
            .and_then(|s| s.transition(AttemptEvent::ProviderInitiated(ProviderCode::NowPayments)))
            .and_then(|s| s.transition(AttemptEvent::TransactionOpened("tx".into())))
            .and_then(|s| s.transition(AttemptEvent::PaymentConfirmed))
            .unwrap();
        assert_eq!(state, AttemptState::Succeeded);
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        assert!(AttemptState::Idle
            .transition(AttemptEvent::CustomerUpserted("c1".into()))
            .is_err());

        let redirect_initiated = AttemptState::ProviderInitiated {
            provider: ProviderCode::Wave,
            customer_id: "c1".into(),
        };
        assert!(redirect_initiated
            .transition(AttemptEvent::TransactionOpened("tx".into()))
            .is_err());

        assert!(AttemptState::Succeeded
            .transition(AttemptEvent::PaymentFailed(DispatchError::CustomerUpsertFailed))
            .is_err());
    }

    #[tokio::test]
    async fn test_wave_dispatch_redirects_with_total() {
        let backend = Arc::new(MockBackend::new());
        let gateway = Arc::new(MockGateway::new());
        let data = sample_product_data(dec!(1000), dec!(3));

        let dispatched = dispatcher(&backend, &gateway)
            .dispatch(Some(&data), &valid_draft(), ProviderCode::Wave)
            .await
            .unwrap();

        assert!(matches!(dispatched.outcome, DispatchOutcome::Redirect { .. }));
        assert!(matches!(dispatched.state, AttemptState::Redirected { .. }));

        let (provider, params) = gateway.last_initiation().unwrap();
        assert_eq!(provider, ProviderCode::Wave);
        assert_eq!(params.amount, dec!(1030));
        assert_eq!(params.currency, "XOF");
        assert_eq!(params.customer_id, dispatched.customer_id);
        assert_eq!(params.product_id.as_deref(), Some("prod_1"));
    }

    #[tokio::test]
    async fn test_nowpayments_dispatch_opens_modal() {
        let backend = Arc::new(MockBackend::new());
        let gateway = Arc::new(MockGateway::new());
        let data = sample_product_data(dec!(1000), dec!(3));

        let dispatched = dispatcher(&backend, &gateway)
            .dispatch(Some(&data), &valid_draft(), ProviderCode::NowPayments)
            .await
            .unwrap();

        match dispatched.outcome {
            DispatchOutcome::Modal { rail, transaction_id, .. } => {
                assert_eq!(rail, ModalRail::Crypto);
                assert!(!transaction_id.is_empty());
            }
            other => panic!("expected modal outcome, got {other:?}"),
        }
        assert!(matches!(dispatched.state, AttemptState::Polling { .. }));
    }

    #[tokio::test]
    async fn test_validation_failure_makes_no_network_call() {
        let backend = Arc::new(MockBackend::new());
        let gateway = Arc::new(MockGateway::new());
        let data = sample_product_data(dec!(1000), dec!(3));
        let mut draft = valid_draft();
        draft.set_full_name("John");

        let err = dispatcher(&backend, &gateway)
            .dispatch(Some(&data), &draft, ProviderCode::Wave)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Validation(_)));
        assert_eq!(backend.upsert_calls(), 0);
        assert_eq!(gateway.initiate_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_org_id_stops_before_provider() {
        let backend = Arc::new(MockBackend::new());
        let gateway = Arc::new(MockGateway::new());
        let mut data = sample_product_data(dec!(1000), dec!(3));
        data.link.organization_id = None;

        let err = dispatcher(&backend, &gateway)
            .dispatch(Some(&data), &valid_draft(), ProviderCode::Wave)
            .await
            .unwrap_err();

        assert_eq!(err, DispatchError::MissingMerchantOrOrgId);
        assert_eq!(gateway.initiate_calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_link_stops_before_upsert() {
        let backend = Arc::new(MockBackend::new());
        let gateway = Arc::new(MockGateway::new());
        let mut data = sample_product_data(dec!(1000), dec!(3));
        data.link.expires_at = Some(Utc::now() - chrono::Duration::hours(1));

        let err = dispatcher(&backend, &gateway)
            .dispatch(Some(&data), &valid_draft(), ProviderCode::Wave)
            .await
            .unwrap_err();

        assert_eq!(err, DispatchError::LinkExpired);
        assert_eq!(backend.upsert_calls(), 0);
        assert_eq!(gateway.initiate_calls(), 0);
    }

    #[tokio::test]
    async fn test_upsert_failure_stops_before_provider() {
        let backend = Arc::new(MockBackend::new().failing_upsert());
        let gateway = Arc::new(MockGateway::new());
        let data = sample_product_data(dec!(1000), dec!(3));

        let err = dispatcher(&backend, &gateway)
            .dispatch(Some(&data), &valid_draft(), ProviderCode::Orange)
            .await
            .unwrap_err();

        assert_eq!(err, DispatchError::CustomerUpsertFailed);
        assert_eq!(gateway.initiate_calls(), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_maps_to_initiation_failed() {
        let backend = Arc::new(MockBackend::new());
        let gateway = Arc::new(MockGateway::new().failing_initiation());
        let data = sample_product_data(dec!(1000), dec!(3));

        let err = dispatcher(&backend, &gateway)
            .dispatch(Some(&data), &valid_draft(), ProviderCode::Mtn)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::ProviderInitiationFailed(_)));
    }

    #[tokio::test]
    async fn test_disallowed_provider_and_missing_data() {
        let backend = Arc::new(MockBackend::new());
        let gateway = Arc::new(MockGateway::new());
        let mut data = sample_product_data(dec!(1000), dec!(3));
        data.link.allowed_providers = vec![ProviderCode::Orange];

        let d = dispatcher(&backend, &gateway);
        let err = d.dispatch(Some(&data), &valid_draft(), ProviderCode::Wave).await.unwrap_err();
        assert_eq!(err, DispatchError::ProviderNotAllowed(ProviderCode::Wave));

        let err = d.dispatch(None, &valid_draft(), ProviderCode::Wave).await.unwrap_err();
        assert_eq!(err, DispatchError::MissingCheckoutData);
    }

    #[test]
    fn test_subscription_metadata() {
        let data = sample_subscription_data(dec!(5000));
        let metadata = build_metadata(&data, &valid_draft());

        assert_eq!(metadata["payment_link_id"], data.link.id.as_str());
        assert_eq!(metadata["customer_name"], "John Doe");
        assert_eq!(metadata["whatsapp_number"], "123");
        assert_eq!(metadata["subscription_plan_id"], "plan_1");
        assert_eq!(metadata["billing_frequency"], "monthly");
    }
}

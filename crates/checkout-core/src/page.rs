//! Checkout Page
//!
//! State for one open checkout page: the loaded link, the customer form, the
//! in-flight guard and the session flag shared with the monitor. Every
//! failure is turned into a [`Notice`]; nothing propagates past the page.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::backend::CheckoutBackend;
use crate::customer::{CustomerDraft, RequiredField};
use crate::dispatch::{AttemptEvent, AttemptState, DispatchOutcome, Dispatcher};
use crate::error::{DispatchError, Result};
use crate::format::format_money;
use crate::model::{CheckoutData, CheckoutTarget};
use crate::pricing::{ComputedTotal, compute_total};
use crate::provider::{ProviderCode, ProviderGateway, TransactionStatus};
use crate::session::{SessionFlag, SessionId};

/// Severity of a transient notification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Transient notification shown to the payer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub code: String,
    pub message: String,
    pub retryable: bool,
    /// Form field to focus, for validation failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<RequiredField>,
}

impl From<&DispatchError> for Notice {
    fn from(err: &DispatchError) -> Self {
        let level = match err {
            DispatchError::Validation(_) | DispatchError::AlreadyInFlight => NoticeLevel::Warning,
            _ => NoticeLevel::Error,
        };
        let focus = match err {
            DispatchError::Validation(v) => Some(v.field),
            _ => None,
        };
        Self {
            level,
            code: err.code().to_string(),
            message: err.user_message(),
            retryable: err.is_retryable(),
            focus,
        }
    }
}

/// Everything needed to render a loaded link
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyView {
    pub link_id: String,
    pub title: String,
    pub description: Option<String>,
    pub target: CheckoutTarget,
    pub total: ComputedTotal,
    pub formatted_total: String,
    pub providers: Vec<ProviderCode>,
}

/// What the page currently shows
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum PageView {
    Loading,
    NotFound,
    Ready(Box<ReadyView>),
    /// Terminal: the session expired; one way out
    Unavailable { return_url: String },
}

#[derive(Debug)]
enum LoadState {
    Loading,
    NotFound,
    Loaded(CheckoutData),
}

#[derive(Debug)]
struct PageState {
    load: LoadState,
    draft: CustomerDraft,
    customer_id: Option<String>,
    session_id: Option<SessionId>,
    attempt: AttemptState,
}

/// Clears the in-flight flag when dropped, whatever the dispatch outcome
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One checkout page instance
pub struct CheckoutPage {
    link_id: String,
    backend: Arc<dyn CheckoutBackend>,
    dispatcher: Dispatcher,
    state: Mutex<PageState>,
    in_flight: AtomicBool,
    session_flag: SessionFlag,
    default_return_url: String,
}

impl CheckoutPage {
    pub fn new(
        link_id: impl Into<String>,
        backend: Arc<dyn CheckoutBackend>,
        gateway: Arc<dyn ProviderGateway>,
        default_return_url: impl Into<String>,
    ) -> Self {
        Self {
            link_id: link_id.into(),
            dispatcher: Dispatcher::new(backend.clone(), gateway),
            backend,
            state: Mutex::new(PageState {
                load: LoadState::Loading,
                draft: CustomerDraft::default(),
                customer_id: None,
                session_id: None,
                attempt: AttemptState::Idle,
            }),
            in_flight: AtomicBool::new(false),
            session_flag: SessionFlag::new(),
            default_return_url: default_return_url.into(),
        }
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn link_id(&self) -> &str {
        &self.link_id
    }

    /// Fetch the link and its checkout target
    ///
    /// Returns `false` when the link does not exist.
    pub async fn load(&self) -> Result<bool> {
        let data = self.backend.fetch_checkout_data(&self.link_id).await.map_err(|e| {
            error!(link_id = %self.link_id, error = %e, "Failed to load checkout data");
            e
        })?;

        let found = data.is_some();
        self.state().load = match data {
            Some(data) => LoadState::Loaded(data),
            None => {
                warn!(link_id = %self.link_id, "Payment link not found");
                LoadState::NotFound
            }
        };
        Ok(found)
    }

    pub fn data(&self) -> Option<CheckoutData> {
        match &self.state().load {
            LoadState::Loaded(data) => Some(data.clone()),
            LoadState::Loading | LoadState::NotFound => None,
        }
    }

    /// Recomputed on every call
    pub fn total(&self) -> Option<ComputedTotal> {
        match &self.state().load {
            LoadState::Loaded(data) => Some(compute_total(&data.target)),
            LoadState::Loading | LoadState::NotFound => None,
        }
    }

    pub fn draft(&self) -> CustomerDraft {
        self.state().draft.clone()
    }

    pub fn update_draft(&self, f: impl FnOnce(&mut CustomerDraft)) {
        f(&mut self.state().draft);
    }

    pub fn customer_id(&self) -> Option<String> {
        self.state().customer_id.clone()
    }

    pub fn attempt(&self) -> AttemptState {
        self.state().attempt.clone()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.state().session_id.clone()
    }

    /// Flag shared with the session monitor
    pub fn session_flag(&self) -> SessionFlag {
        self.session_flag.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Create a server-side session for this link
    pub async fn create_session(&self, expiration_minutes: u32) -> Result<SessionId> {
        let session_id = self
            .backend
            .create_session_from_link(&self.link_id, expiration_minutes)
            .await?;
        info!(link_id = %self.link_id, session_id = %session_id, "Checkout session created");
        self.state().session_id = Some(session_id.clone());
        Ok(session_id)
    }

    /// Run a checkout attempt for the chosen provider
    ///
    /// Re-entrant calls are rejected while an attempt is outstanding.
    pub async fn select_provider(&self, provider: ProviderCode) -> std::result::Result<DispatchOutcome, Notice> {
        if self.session_flag.is_raised() {
            return Err(Notice::from(&DispatchError::SessionUnavailable));
        }

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            return Err(Notice::from(&DispatchError::AlreadyInFlight));
        };

        let (data, draft) = {
            let mut state = self.state();
            state.attempt = AttemptState::Idle;
            let data = match &state.load {
                LoadState::Loaded(data) => Some(data.clone()),
                LoadState::Loading | LoadState::NotFound => None,
            };
            (data, state.draft.clone())
        };

        match self.dispatcher.dispatch(data.as_ref(), &draft, provider).await {
            Ok(dispatched) => {
                let mut state = self.state();
                state.attempt = dispatched.state;
                state.customer_id = Some(dispatched.customer_id.clone());
                state.draft = CustomerDraft {
                    customer_id: Some(dispatched.customer_id),
                    ..CustomerDraft::default()
                };
                Ok(dispatched.outcome)
            }
            Err(err) => {
                warn!(link_id = %self.link_id, provider = %provider, code = err.code(), error = %err, "Checkout attempt failed");
                let notice = Notice::from(&err);
                self.state().attempt = AttemptState::Failed(err);
                Err(notice)
            }
        }
    }

    /// Record the final status reported by the payment modal
    pub fn complete_modal(&self, status: &TransactionStatus) -> AttemptState {
        let event = match status {
            TransactionStatus::Pending => return self.attempt(),
            TransactionStatus::Succeeded => AttemptEvent::PaymentConfirmed,
            TransactionStatus::Failed { reason } => {
                AttemptEvent::PaymentFailed(DispatchError::PaymentFailed(reason.clone()))
            }
        };

        let mut state = self.state();
        let current = std::mem::replace(&mut state.attempt, AttemptState::Idle);
        state.attempt = match current.clone().transition(event) {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, "Ignoring modal result");
                current
            }
        };
        state.attempt.clone()
    }

    /// Payer closed the modal without finishing
    pub fn close_modal(&self) {
        let mut state = self.state();
        if matches!(state.attempt, AttemptState::Polling { .. }) {
            state.attempt = AttemptState::Idle;
        }
    }

    /// Where the single recovery action of the unavailable view leads
    pub fn return_url(&self) -> String {
        match &self.state().load {
            LoadState::Loaded(data) => data
                .link
                .cancel_url
                .clone()
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| self.default_return_url.clone()),
            LoadState::Loading | LoadState::NotFound => self.default_return_url.clone(),
        }
    }

    pub fn view(&self) -> PageView {
        if self.session_flag.is_raised() {
            return PageView::Unavailable {
                return_url: self.return_url(),
            };
        }

        let state = self.state();
        match &state.load {
            LoadState::Loading => PageView::Loading,
            LoadState::NotFound => PageView::NotFound,
            LoadState::Loaded(data) => {
                let total = compute_total(&data.target);
                let providers = ProviderCode::ALL
                    .into_iter()
                    .filter(|p| data.link.accepts(*p))
                    .collect();
                PageView::Ready(Box::new(ReadyView {
                    link_id: data.link.id.clone(),
                    title: data.link.title.clone(),
                    description: data.link.description.clone(),
                    target: data.target.clone(),
                    formatted_total: format_money(total.total, &total.currency),
                    total,
                    providers,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CheckoutError;
    use crate::mock::{MockBackend, MockGateway, sample_product_data};
    use crate::provider::{DispatchParams, ProviderResponse};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use tokio::sync::Notify;

    const DEFAULT_RETURN: &str = "https://example.com";

    fn fill(draft: &mut CustomerDraft) {
        draft.set_full_name("John Doe");
        draft.email = "x@x.com".into();
        draft.phone_number = "123".into();
    }

    async fn loaded_page(gateway: Arc<dyn ProviderGateway>) -> (CheckoutPage, String) {
        let data = sample_product_data(dec!(1000), dec!(3));
        let link_id = data.link.id.clone();
        let backend = Arc::new(MockBackend::new().with_link(data));
        let page = CheckoutPage::new(link_id.clone(), backend, gateway, DEFAULT_RETURN);
        assert!(page.load().await.unwrap());
        (page, link_id)
    }

    struct BlockingGateway {
        release: Notify,
    }

    #[async_trait]
    impl ProviderGateway for BlockingGateway {
        async fn initiate(&self, _provider: ProviderCode, _params: &DispatchParams) -> crate::error::Result<ProviderResponse> {
            self.release.notified().await;
            Err(CheckoutError::Provider("declined".into()))
        }

        async fn transaction_status(&self, _provider: ProviderCode, _id: &str) -> crate::error::Result<TransactionStatus> {
            Ok(TransactionStatus::Pending)
        }
    }

    #[tokio::test]
    async fn test_unknown_link_shows_not_found() {
        let page = CheckoutPage::new("missing", Arc::new(MockBackend::new()), Arc::new(MockGateway::new()), DEFAULT_RETURN);
        assert_eq!(page.view(), PageView::Loading);
        assert!(!page.load().await.unwrap());
        assert_eq!(page.view(), PageView::NotFound);
        assert!(page.total().is_none());
    }

    #[tokio::test]
    async fn test_ready_view_shows_total() {
        let (page, link_id) = loaded_page(Arc::new(MockGateway::new())).await;
        match page.view() {
            PageView::Ready(view) => {
                assert_eq!(view.link_id, link_id);
                assert_eq!(view.total.total, dec!(1030));
                assert_eq!(view.formatted_total, "1 030 XOF");
                assert_eq!(view.providers.len(), ProviderCode::ALL.len());
            }
            other => panic!("expected ready view, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_successful_redirect_discards_draft_keeps_customer() {
        let (page, _) = loaded_page(Arc::new(MockGateway::new())).await;
        page.update_draft(|d| {
            fill(d);
            d.city = Some("Abidjan".into());
        });

        let outcome = page.select_provider(ProviderCode::Wave).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Redirect { .. }));

        let customer_id = page.customer_id().unwrap();
        let draft = page.draft();
        assert_eq!(draft.customer_id.as_deref(), Some(customer_id.as_str()));
        assert!(draft.city.is_none());
        assert!(draft.email.is_empty());
        assert!(!page.is_in_flight());
    }

    #[tokio::test]
    async fn test_validation_notice_focuses_name() {
        let (page, _) = loaded_page(Arc::new(MockGateway::new())).await;
        page.update_draft(|d| d.set_full_name("John"));

        let notice = page.select_provider(ProviderCode::Wave).await.unwrap_err();
        assert_eq!(notice.code, "VALIDATION_ERROR");
        assert_eq!(notice.focus, Some(RequiredField::FullName));
        assert!(notice.retryable);
        assert!(matches!(page.attempt(), AttemptState::Failed(_)));
    }

    #[tokio::test]
    async fn test_in_flight_guard_rejects_reentry_and_always_clears() {
        let gateway = Arc::new(BlockingGateway { release: Notify::new() });
        let (page, _) = loaded_page(gateway.clone()).await;
        page.update_draft(fill);
        let page = Arc::new(page);

        let first = tokio::spawn({
            let page = page.clone();
            async move { page.select_provider(ProviderCode::Orange).await }
        });
        while !page.is_in_flight() {
            tokio::task::yield_now().await;
        }

        let second = page.select_provider(ProviderCode::Orange).await.unwrap_err();
        assert_eq!(second.code, "ALREADY_IN_FLIGHT");

        gateway.release.notify_one();
        let first = first.await.unwrap().unwrap_err();
        assert_eq!(first.code, "PROVIDER_INITIATION_FAILED");
        assert!(!page.is_in_flight());
    }

    #[tokio::test]
    async fn test_modal_result_moves_attempt_to_terminal() {
        let (page, _) = loaded_page(Arc::new(MockGateway::new())).await;
        page.update_draft(fill);

        let outcome = page.select_provider(ProviderCode::NowPayments).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Modal { .. }));
        assert!(matches!(page.attempt(), AttemptState::Polling { .. }));

        assert!(matches!(page.complete_modal(&TransactionStatus::Pending), AttemptState::Polling { .. }));
        assert_eq!(page.complete_modal(&TransactionStatus::Succeeded), AttemptState::Succeeded);
    }

    #[tokio::test]
    async fn test_failed_modal_payment_is_not_an_initiation_failure() {
        let (page, _) = loaded_page(Arc::new(MockGateway::new())).await;
        page.update_draft(fill);
        page.select_provider(ProviderCode::Ecobank).await.unwrap();

        let state = page.complete_modal(&TransactionStatus::Failed {
            reason: Some("card declined".into()),
        });

        let AttemptState::Failed(err) = state else {
            panic!("expected a failed attempt, got {state:?}");
        };
        assert_eq!(err, DispatchError::PaymentFailed(Some("card declined".into())));
        assert_eq!(err.code(), "PAYMENT_FAILED");
        assert_eq!(Notice::from(&err).code, "PAYMENT_FAILED");
    }

    #[tokio::test]
    async fn test_closing_modal_returns_to_idle() {
        let (page, _) = loaded_page(Arc::new(MockGateway::new())).await;
        page.update_draft(fill);
        page.select_provider(ProviderCode::Ecobank).await.unwrap();

        page.close_modal();
        assert_eq!(page.attempt(), AttemptState::Idle);
    }

    #[tokio::test]
    async fn test_expired_session_blocks_page() {
        let (page, _) = loaded_page(Arc::new(MockGateway::new())).await;
        page.update_draft(fill);
        page.session_flag().raise();

        assert_eq!(
            page.view(),
            PageView::Unavailable {
                return_url: "https://merchant.example.com/cancel".into()
            }
        );
        let notice = page.select_provider(ProviderCode::Wave).await.unwrap_err();
        assert_eq!(notice.code, "SESSION_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_create_session_records_id() {
        let (page, _) = loaded_page(Arc::new(MockGateway::new())).await;
        let id = page.create_session(30).await.unwrap();
        assert_eq!(page.session_id(), Some(id));
    }
}

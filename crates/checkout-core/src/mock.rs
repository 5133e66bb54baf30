//! Mock Collaborators
//!
//! In-memory backend and provider gateway for testing and demo mode. Ships a
//! demo payment link so the server works without any remote configuration.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::backend::CheckoutBackend;
use crate::customer::CustomerUpsert;
use crate::error::{CheckoutError, Result};
use crate::model::{
    BillingFrequency, CheckoutData, CheckoutTarget, Fee, FeeSchedule, PaymentLink, Product, SubscriptionPlan,
};
use crate::provider::{DispatchParams, DispatchStyle, ProviderCode, ProviderGateway, ProviderResponse, TransactionStatus};
use crate::session::{CheckoutSession, SessionId, SessionStatus};

/// Link id served by the demo backend
pub const DEMO_LINK_ID: &str = "demo";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted answer to a session poll
#[derive(Clone, Debug)]
pub enum SessionPoll {
    Status(SessionStatus),
    /// Backend flag set while status still reads open
    ExpiredFlag,
    Error(String),
}

/// In-memory checkout backend
pub struct MockBackend {
    links: Mutex<HashMap<String, CheckoutData>>,
    sessions: Mutex<HashMap<SessionId, CheckoutSession>>,
    poll_script: Mutex<VecDeque<SessionPoll>>,
    fail_upsert: bool,
    upsert_calls: AtomicUsize,
    session_polls: AtomicUsize,
    last_upsert: Mutex<Option<CustomerUpsert>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            links: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            poll_script: Mutex::new(VecDeque::new()),
            fail_upsert: false,
            upsert_calls: AtomicUsize::new(0),
            session_polls: AtomicUsize::new(0),
            last_upsert: Mutex::new(None),
        }
    }

    /// Backend preloaded with the demo product link
    pub fn demo() -> Self {
        let mut data = sample_product_data(dec!(15000), dec!(3));
        data.link.id = DEMO_LINK_ID.into();
        data.link.title = "Demo order".into();
        Self::new().with_link(data)
    }

    pub fn with_link(self, data: CheckoutData) -> Self {
        lock(&self.links).insert(data.link.id.clone(), data);
        self
    }

    /// Make every customer upsert fail
    pub fn failing_upsert(mut self) -> Self {
        self.fail_upsert = true;
        self
    }

    /// Queue answers for upcoming session polls; once drained, stored sessions are returned
    pub fn with_poll_script(self, script: impl IntoIterator<Item = SessionPoll>) -> Self {
        lock(&self.poll_script).extend(script);
        self
    }

    pub fn insert_session(&self, session: CheckoutSession) {
        lock(&self.sessions).insert(session.id.clone(), session);
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn session_polls(&self) -> usize {
        self.session_polls.load(Ordering::SeqCst)
    }

    pub fn last_upsert(&self) -> Option<CustomerUpsert> {
        lock(&self.last_upsert).clone()
    }
}

#[async_trait]
impl CheckoutBackend for MockBackend {
    async fn fetch_checkout_data(&self, link_id: &str) -> Result<Option<CheckoutData>> {
        Ok(lock(&self.links).get(link_id).cloned())
    }

    async fn create_session_from_link(&self, link_id: &str, expiration_minutes: u32) -> Result<SessionId> {
        if !lock(&self.links).contains_key(link_id) {
            return Err(CheckoutError::NotFound(format!("payment link {link_id}")));
        }
        let id = SessionId::new();
        let mut session = CheckoutSession::open(id.clone(), Utc::now() + Duration::minutes(i64::from(expiration_minutes)));
        session.payment_link_id = Some(link_id.to_string());
        self.insert_session(session);
        Ok(id)
    }

    async fn get_checkout_session(&self, session_id: &SessionId) -> Result<CheckoutSession> {
        self.session_polls.fetch_add(1, Ordering::SeqCst);

        let scripted = lock(&self.poll_script).pop_front();
        let mut session = lock(&self.sessions)
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| CheckoutSession::open(session_id.clone(), Utc::now() + Duration::minutes(30)));

        match scripted {
            Some(SessionPoll::Status(status)) => session.status = status,
            Some(SessionPoll::ExpiredFlag) => session.is_expired = true,
            Some(SessionPoll::Error(message)) => return Err(CheckoutError::Network(message)),
            None => {}
        }
        Ok(session)
    }

    async fn upsert_customer(&self, request: &CustomerUpsert) -> Result<Option<String>> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_upsert) = Some(request.clone());

        if self.fail_upsert {
            return Err(CheckoutError::Backend("upsert_customer failed".into()));
        }
        Ok(Some(format!("cus_{}", uuid::Uuid::new_v4().simple())))
    }
}

/// In-memory provider gateway
///
/// Redirect-style providers get a fake hosted URL; modal providers get a
/// transaction id whose status follows the configured script.
pub struct MockGateway {
    fail_initiation: bool,
    statuses: Mutex<VecDeque<TransactionStatus>>,
    initiations: Mutex<Vec<(ProviderCode, DispatchParams)>>,
    status_calls: AtomicUsize,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            fail_initiation: false,
            statuses: Mutex::new(VecDeque::new()),
            initiations: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_initiation(mut self) -> Self {
        self.fail_initiation = true;
        self
    }

    /// Statuses returned by successive polls; the last one repeats. Defaults to succeeded.
    pub fn with_statuses(self, statuses: impl IntoIterator<Item = TransactionStatus>) -> Self {
        lock(&self.statuses).extend(statuses);
        self
    }

    pub fn initiate_calls(&self) -> usize {
        lock(&self.initiations).len()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn last_initiation(&self) -> Option<(ProviderCode, DispatchParams)> {
        lock(&self.initiations).last().cloned()
    }
}

#[async_trait]
impl ProviderGateway for MockGateway {
    async fn initiate(&self, provider: ProviderCode, params: &DispatchParams) -> Result<ProviderResponse> {
        lock(&self.initiations).push((provider, params.clone()));

        if self.fail_initiation {
            return Err(CheckoutError::Provider(format!("{provider} checkout unavailable")));
        }

        let reference = uuid::Uuid::new_v4().simple().to_string();
        Ok(match provider.dispatch_style() {
            DispatchStyle::Redirect => ProviderResponse::Redirect {
                checkout_url: format!("https://pay.example.com/{}/{reference}", provider.as_str().to_lowercase()),
            },
            DispatchStyle::Modal(_) => ProviderResponse::Transaction {
                transaction_id: format!("tx_{reference}"),
            },
        })
    }

    async fn transaction_status(&self, _provider: ProviderCode, _transaction_id: &str) -> Result<TransactionStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let mut statuses = lock(&self.statuses);
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        Ok(status.unwrap_or(TransactionStatus::Succeeded))
    }
}

fn sample_link(currency: &str) -> PaymentLink {
    PaymentLink {
        id: format!("lnk_{}", uuid::Uuid::new_v4().simple()),
        title: "Sample link".into(),
        description: None,
        currency: currency.into(),
        allowed_providers: Vec::new(),
        expires_at: None,
        success_url: Some("https://merchant.example.com/success".into()),
        cancel_url: Some("https://merchant.example.com/cancel".into()),
        merchant_id: Some("mer_1".into()),
        organization_id: Some("org_1".into()),
    }
}

/// XOF product link with a single enabled fee
pub fn sample_product_data(price: Decimal, fee_percentage: Decimal) -> CheckoutData {
    let fees = FeeSchedule::new(vec![Fee::new("fee_service", "Service fee", fee_percentage)])
        .unwrap_or_default();
    CheckoutData {
        link: sample_link("XOF"),
        target: CheckoutTarget::Product(Product {
            id: "prod_1".into(),
            name: "Sample product".into(),
            price,
            currency: "XOF".into(),
            fees,
            image_url: None,
            description: None,
        }),
    }
}

/// XOF monthly subscription link
pub fn sample_subscription_data(amount: Decimal) -> CheckoutData {
    CheckoutData {
        link: sample_link("XOF"),
        target: CheckoutTarget::Subscription(SubscriptionPlan {
            id: "plan_1".into(),
            name: "Monthly plan".into(),
            amount,
            currency: "XOF".into(),
            frequency: BillingFrequency::Monthly,
            description: None,
        }),
    }
}

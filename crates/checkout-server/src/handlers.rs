//! HTTP/WebSocket Handlers

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State, WebSocketUpgrade, ws::{Message, WebSocket}},
    http::StatusCode,
    response::Response,
};
use checkout_core::format::{format_amount, format_money};
use checkout_core::monitor::{MonitorExit, SessionMonitor};
use checkout_core::page::{Notice, PageView, ReadyView};
use checkout_core::{
    CheckoutError, CheckoutPage, CheckoutTarget, CustomerDraft, DispatchError, DispatchOutcome, ProviderCode, RequiredField,
    SessionFlag, SessionId, TransactionStatus,
};
use checkout_runtime::Detection;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backend_connected: bool,
    pub demo_mode: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<RequiredField>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>, retryable: bool) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
            retryable,
            focus: None,
        }),
    )
}

fn notice_error(notice: Notice) -> ApiError {
    let status = match notice.code.as_str() {
        "VALIDATION_ERROR" => StatusCode::UNPROCESSABLE_ENTITY,
        "PROVIDER_NOT_ALLOWED" => StatusCode::BAD_REQUEST,
        "ALREADY_IN_FLIGHT" | "MISSING_MERCHANT_OR_ORG_ID" => StatusCode::CONFLICT,
        "LINK_EXPIRED" | "SESSION_UNAVAILABLE" => StatusCode::GONE,
        "MISSING_CHECKOUT_DATA" => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(ErrorResponse {
            error: notice.message,
            code: notice.code,
            retryable: notice.retryable,
            focus: notice.focus,
        }),
    )
}

fn upstream_error(err: &CheckoutError) -> ApiError {
    tracing::error!("Upstream error: {}", err);
    api_error(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", err.user_message(), err.is_retryable())
}

fn parse_provider(raw: &str) -> Result<ProviderCode, ApiError> {
    raw.parse().map_err(|_| {
        api_error(
            StatusCode::BAD_REQUEST,
            "UNKNOWN_PROVIDER",
            format!("Unknown payment provider: {raw}"),
            false,
        )
    })
}

#[derive(Debug, Serialize)]
pub struct FormattedFee {
    pub name: String,
    pub percentage: String,
    pub amount: String,
}

#[derive(Debug, Serialize)]
pub struct LinkSummary {
    #[serde(flatten)]
    pub view: ReadyView,
    pub formatted_subtotal: String,
    pub formatted_fees: Vec<FormattedFee>,
    /// Recurring price suffix, for subscriptions
    pub billing_label: Option<&'static str>,
}

impl From<ReadyView> for LinkSummary {
    fn from(view: ReadyView) -> Self {
        let currency = view.total.currency.clone();
        let formatted_fees = view
            .total
            .fees
            .iter()
            .map(|fee| FormattedFee {
                name: fee.name.clone(),
                percentage: format_amount(fee.percentage),
                amount: format_money(fee.amount, &currency),
            })
            .collect();
        let billing_label = match &view.target {
            CheckoutTarget::Subscription(plan) => Some(plan.frequency.label()),
            CheckoutTarget::Product(_) | CheckoutTarget::AdHoc { .. } => None,
        };
        Self {
            formatted_subtotal: format_money(view.total.subtotal, &currency),
            formatted_fees,
            billing_label,
            view,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: SessionId,
    pub expiration_minutes: u32,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub provider: String,
    #[serde(default)]
    pub customer: CustomerDraft,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    #[serde(flatten)]
    pub outcome: DispatchOutcome,
    pub customer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransactionStatusResponse {
    pub transaction_id: String,
    #[serde(flatten)]
    pub status: TransactionStatus,
}

// ============================================================================
// Helpers
// ============================================================================

async fn load_page(page: &CheckoutPage) -> Result<(), ApiError> {
    match page.load().await {
        Ok(true) => Ok(()),
        Ok(false) => Err(api_error(
            StatusCode::NOT_FOUND,
            "LINK_NOT_FOUND",
            "This payment link could not be found.",
            false,
        )),
        Err(e) => Err(upstream_error(&e)),
    }
}

/// Page registered for the session, or a freshly loaded one when no session is given
///
/// A session that is unknown, expired or bound to another link is unavailable.
async fn resolve_page(state: &AppState, link_id: &str, session_id: Option<String>) -> Result<Arc<CheckoutPage>, ApiError> {
    let Some(session_id) = session_id.map(SessionId::from_string) else {
        let page = Arc::new(state.new_page(link_id));
        load_page(&page).await?;
        return Ok(page);
    };

    match state.page(&session_id).await {
        Some(page) if page.link_id() == link_id => Ok(page),
        Some(_) => {
            tracing::warn!("Session {} belongs to another link", session_id);
            Err(notice_error(Notice::from(&DispatchError::SessionUnavailable)))
        }
        None => {
            tracing::debug!("No open page for session {}", session_id);
            Err(notice_error(Notice::from(&DispatchError::SessionUnavailable)))
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let backend_connected = state.backend.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        backend_connected,
        demo_mode: state.demo_mode,
    })
}

/// Link summary with computed totals
pub async fn get_link(
    State(state): State<AppState>,
    Path(link_id): Path<String>,
) -> Result<Json<LinkSummary>, ApiError> {
    let page = state.new_page(&link_id);
    load_page(&page).await?;

    match page.view() {
        PageView::Ready(view) => Ok(Json(LinkSummary::from(*view))),
        other => {
            tracing::error!("Loaded page for {} is not ready: {:?}", link_id, other);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "PAGE_NOT_READY",
                "An unexpected error occurred.",
                true,
            ))
        }
    }
}

/// Create a checkout session for a link
pub async fn create_session(
    State(state): State<AppState>,
    Path(link_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let page = Arc::new(state.new_page(&link_id));
    load_page(&page).await?;

    let expiration_minutes = state.config.session_expiration_minutes;
    let session_id = page
        .create_session(expiration_minutes)
        .await
        .map_err(|e| upstream_error(&e))?;

    state.register_page(session_id.clone(), page).await;

    Ok(Json(SessionResponse {
        session_id,
        expiration_minutes,
    }))
}

/// Run a checkout attempt for the chosen provider
pub async fn checkout(
    State(state): State<AppState>,
    Path(link_id): Path<String>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let provider = parse_provider(&payload.provider)?;
    let page = resolve_page(&state, &link_id, payload.session_id).await?;

    let customer = payload.customer;
    page.update_draft(move |draft| {
        let known_id = draft.customer_id.take();
        *draft = customer;
        if draft.customer_id.is_none() {
            draft.customer_id = known_id;
        }
    });

    let outcome = page.select_provider(provider).await.map_err(notice_error)?;

    Ok(Json(CheckoutResponse {
        outcome,
        customer_id: page.customer_id(),
    }))
}

/// One status read for an open payment modal
pub async fn transaction_status(
    State(state): State<AppState>,
    Path((provider, transaction_id)): Path<(String, String)>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<TransactionStatusResponse>, ApiError> {
    let provider = parse_provider(&provider)?;

    let status = state
        .gateway
        .transaction_status(provider, &transaction_id)
        .await
        .map_err(|e| upstream_error(&e))?;

    let page = match query.session_id {
        Some(id) if status.is_terminal() => state.page(&SessionId::from_string(id)).await,
        _ => None,
    };
    if let Some(page) = page {
        page.complete_modal(&status);
    }

    Ok(Json(TransactionStatusResponse { transaction_id, status }))
}

/// Detected country for the phone dial code
pub async fn detect_country(State(state): State<AppState>) -> Json<Detection> {
    Json(state.geo.detect().await)
}

/// WebSocket session watch
///
/// Runs a session monitor for as long as the socket is open and reports
/// expiry or completion. Closing the socket stops the monitor.
pub async fn watch_session(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_watch(socket, state, SessionId::from_string(session_id)))
}

async fn handle_watch(socket: WebSocket, state: AppState, session_id: SessionId) {
    let (mut sender, mut receiver) = socket.split();

    let page = state.page(&session_id).await;
    let flag = page.as_ref().map_or_else(SessionFlag::new, |p| p.session_flag());
    let monitor = SessionMonitor::new(state.backend.clone(), flag)
        .with_interval(state.config.session_poll_interval);
    let mut handle = monitor.spawn(session_id.clone());

    let started = json!({ "type": "watching", "session_id": session_id });
    if sender.send(Message::Text(started.to_string().into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            exit = handle.join() => {
                let event = match exit {
                    Some(MonitorExit::Expired) => {
                        let return_url = page
                            .as_ref()
                            .map_or_else(|| state.config.default_return_url.clone(), |p| p.return_url());
                        state.release_page(&session_id).await;
                        json!({ "type": "expired", "return_url": return_url })
                    }
                    Some(MonitorExit::Completed) => {
                        state.release_page(&session_id).await;
                        json!({ "type": "completed" })
                    }
                    Some(MonitorExit::Cancelled) | None => break,
                };
                let _ = sender.send(Message::Text(event.to_string().into())).await;
                break;
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::warn!("WebSocket error: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

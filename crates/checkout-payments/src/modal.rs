//! Modal Payment Polling
//!
//! Card and crypto rails keep the payer on the page. The modal polls the
//! transaction until it succeeds or fails, or until the payer closes it.
//! The result is returned as a value.

use std::sync::Arc;
use std::time::Duration;

use checkout_core::dispatch::DispatchOutcome;
use checkout_core::provider::{ProviderCode, ProviderGateway, TransactionStatus};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Default delay between transaction status reads
pub const DEFAULT_MODAL_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How a modal payment ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ModalOutcome {
    Succeeded,
    Failed { reason: Option<String> },
    /// Payer closed the modal; nothing to clean up
    Cancelled,
}

impl ModalOutcome {
    /// Terminal transaction status for the page's attempt state
    pub fn as_status(&self) -> Option<TransactionStatus> {
        match self {
            ModalOutcome::Succeeded => Some(TransactionStatus::Succeeded),
            ModalOutcome::Failed { reason } => Some(TransactionStatus::Failed { reason: reason.clone() }),
            ModalOutcome::Cancelled => None,
        }
    }
}

/// One open payment modal
pub struct ModalPayment {
    gateway: Arc<dyn ProviderGateway>,
    provider: ProviderCode,
    transaction_id: String,
    interval: Duration,
}

impl ModalPayment {
    pub fn new(gateway: Arc<dyn ProviderGateway>, provider: ProviderCode, transaction_id: impl Into<String>) -> Self {
        Self {
            gateway,
            provider,
            transaction_id: transaction_id.into(),
            interval: DEFAULT_MODAL_POLL_INTERVAL,
        }
    }

    /// Modal for a dispatch outcome, polling every `interval`; `None` for redirects
    pub fn for_outcome(
        gateway: Arc<dyn ProviderGateway>,
        outcome: &DispatchOutcome,
        interval: Duration,
    ) -> Option<Self> {
        match outcome {
            DispatchOutcome::Modal {
                provider,
                transaction_id,
                ..
            } => Some(Self::new(gateway, *provider, transaction_id.clone()).with_interval(interval)),
            DispatchOutcome::Redirect { .. } => None,
        }
    }

    /// Override the poll period; a zero period is ignored
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            warn!(transaction_id = %self.transaction_id, "Ignoring zero modal poll interval");
        } else {
            self.interval = interval;
        }
        self
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll until a terminal status, or until `close` flips to true
    ///
    /// Read errors are logged and polling continues.
    pub async fn wait(&self, mut close: watch::Receiver<bool>) -> ModalOutcome {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *close.borrow() {
                return self.closed();
            }

            tokio::select! {
                biased;
                changed = close.changed() => {
                    if changed.is_err() || *close.borrow() {
                        return self.closed();
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            match self.gateway.transaction_status(self.provider, &self.transaction_id).await {
                Ok(TransactionStatus::Succeeded) => {
                    info!(provider = %self.provider, transaction_id = %self.transaction_id, "Modal payment succeeded");
                    return ModalOutcome::Succeeded;
                }
                Ok(TransactionStatus::Failed { reason }) => {
                    warn!(provider = %self.provider, transaction_id = %self.transaction_id, ?reason, "Modal payment failed");
                    return ModalOutcome::Failed { reason };
                }
                Ok(TransactionStatus::Pending) => {
                    debug!(transaction_id = %self.transaction_id, "Modal payment pending");
                }
                Err(e) => {
                    warn!(transaction_id = %self.transaction_id, error = %e, "Transaction status check failed");
                }
            }
        }
    }

    fn closed(&self) -> ModalOutcome {
        debug!(transaction_id = %self.transaction_id, "Payment modal closed");
        ModalOutcome::Cancelled
    }
}

//! Session Lifecycle Monitor
//!
//! Polls a checkout session while the page is open. Expiry raises the shared
//! [`SessionFlag`] and stops polling for good; completion also stops it.
//! Transient read failures are logged and never surfaced to the payer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::backend::CheckoutBackend;
use crate::session::{SessionFlag, SessionId, SessionStatus};

/// Default delay between session reads
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Consecutive read failures before the monitor escalates its logging
pub const FAILURE_ESCALATION_THRESHOLD: u32 = 3;

/// Why a monitor stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorExit {
    Expired,
    Completed,
    Cancelled,
}

/// Background poller for one checkout session
#[derive(Clone)]
pub struct SessionMonitor {
    backend: Arc<dyn CheckoutBackend>,
    flag: SessionFlag,
    interval: Duration,
}

impl SessionMonitor {
    pub fn new(backend: Arc<dyn CheckoutBackend>, flag: SessionFlag) -> Self {
        Self {
            backend,
            flag,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the poll period; a zero period is ignored
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            warn!("Ignoring zero session poll interval");
        } else {
            self.interval = interval;
        }
        self
    }

    pub fn flag(&self) -> &SessionFlag {
        &self.flag
    }

    /// Poll until the session expires, completes, or `cancel` flips to true
    ///
    /// The first read happens immediately. Dropping the sender also cancels.
    pub async fn run(&self, session_id: SessionId, mut cancel: watch::Receiver<bool>) -> MonitorExit {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures: u32 = 0;

        info!(session_id = %session_id, interval_secs = self.interval.as_secs(), "Session monitor started");

        loop {
            if *cancel.borrow() {
                return self.cancelled(&session_id);
            }

            tokio::select! {
                biased;
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        return self.cancelled(&session_id);
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let result = self.backend.get_checkout_session(&session_id).await;

            if *cancel.borrow() {
                return self.cancelled(&session_id);
            }

            match result {
                Ok(session) if session.has_expired() => {
                    self.flag.raise();
                    info!(session_id = %session_id, "Checkout session expired");
                    return MonitorExit::Expired;
                }
                Ok(session) if session.status == SessionStatus::Completed => {
                    info!(session_id = %session_id, "Checkout session completed");
                    return MonitorExit::Completed;
                }
                Ok(_) => {
                    failures = 0;
                    debug!(session_id = %session_id, "Checkout session still open");
                }
                Err(e) => {
                    failures += 1;
                    if failures >= FAILURE_ESCALATION_THRESHOLD {
                        error!(session_id = %session_id, failures, error = %e, "Session status unavailable");
                    } else {
                        warn!(session_id = %session_id, failures, error = %e, "Session status check failed");
                    }
                }
            }
        }
    }

    /// Run on a background task; the returned handle cancels on drop
    pub fn spawn(self, session_id: SessionId) -> MonitorHandle {
        let (cancel, rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(session_id, rx).await });
        MonitorHandle {
            cancel,
            task: Some(task),
        }
    }

    fn cancelled(&self, session_id: &SessionId) -> MonitorExit {
        debug!(session_id = %session_id, "Session monitor cancelled");
        MonitorExit::Cancelled
    }
}

/// Owner of a spawned monitor
pub struct MonitorHandle {
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<MonitorExit>>,
}

impl MonitorHandle {
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the monitor to stop; `None` if the task panicked or was already joined
    ///
    /// Cancel-safe: dropping the future leaves the task joinable.
    pub async fn join(&mut self) -> Option<MonitorExit> {
        let task = self.task.as_mut()?;
        let result = task.await;
        self.task = None;
        match result {
            Ok(exit) => Some(exit),
            Err(e) => {
                error!(error = %e, "Session monitor task failed");
                None
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

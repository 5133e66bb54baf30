//! Application State

use std::collections::HashMap;
use std::sync::Arc;

use checkout_core::{CheckoutBackend, CheckoutPage, ProviderGateway, SessionId};
use checkout_runtime::CountryDetector;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::config::ServerConfig;

/// A page kept alive for its checkout session
struct OpenPage {
    page: Arc<CheckoutPage>,
    expires_at: Instant,
}

impl OpenPage {
    fn is_stale(&self, now: Instant) -> bool {
        now >= self.expires_at || self.page.session_flag().is_raised()
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Payment API backend (Supabase, or in-memory in demo mode)
    pub backend: Arc<dyn CheckoutBackend>,

    /// Provider checkout initiation
    pub gateway: Arc<dyn ProviderGateway>,

    /// Country detection for the phone dial code
    pub geo: Arc<CountryDetector>,

    pub config: Arc<ServerConfig>,

    /// Open pages keyed by checkout session; expired entries are swept on insert
    pages: Arc<RwLock<HashMap<SessionId, OpenPage>>>,

    /// Running against mock collaborators
    pub demo_mode: bool,
}

impl AppState {
    pub fn new(
        backend: Arc<dyn CheckoutBackend>,
        gateway: Arc<dyn ProviderGateway>,
        geo: Arc<CountryDetector>,
        config: ServerConfig,
        demo_mode: bool,
    ) -> Self {
        Self {
            backend,
            gateway,
            geo,
            config: Arc::new(config),
            pages: Arc::new(RwLock::new(HashMap::new())),
            demo_mode,
        }
    }

    /// Fresh, unloaded page for a link
    pub fn new_page(&self, link_id: &str) -> CheckoutPage {
        CheckoutPage::new(
            link_id,
            self.backend.clone(),
            self.gateway.clone(),
            self.config.default_return_url.clone(),
        )
    }

    /// Registered page for a session, unless its lifetime has run out
    pub async fn page(&self, session_id: &SessionId) -> Option<Arc<CheckoutPage>> {
        let pages = self.pages.read().await;
        let open = pages.get(session_id)?;
        (Instant::now() < open.expires_at).then(|| open.page.clone())
    }

    pub async fn register_page(&self, session_id: SessionId, page: Arc<CheckoutPage>) {
        let now = Instant::now();
        let mut pages = self.pages.write().await;

        let before = pages.len();
        pages.retain(|_, open| !open.is_stale(now));
        let swept = before - pages.len();
        if swept > 0 {
            tracing::debug!("Evicted {} stale checkout pages", swept);
        }

        let expires_at = now + self.config.session_lifetime();
        pages.insert(session_id, OpenPage { page, expires_at });
    }

    pub async fn release_page(&self, session_id: &SessionId) {
        self.pages.write().await.remove(session_id);
    }

    pub async fn open_pages(&self) -> usize {
        self.pages.read().await.len()
    }
}

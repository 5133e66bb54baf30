//! checkout-server
//!
//! Axum-based server exposing payment-link checkout over REST and a
//! WebSocket session watch.
//!
//! Without Supabase credentials it runs in demo mode against in-memory
//! collaborators, serving the `demo` link.

mod app;
mod config;
mod handlers;
mod state;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkout_core::mock::{DEMO_LINK_ID, MockBackend, MockGateway};
use checkout_core::{CheckoutBackend, ProviderGateway};
use checkout_payments::EdgeFunctionGateway;
use checkout_runtime::{CountryDetector, SupabaseBackend};

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = ServerConfig::from_env();

    // Payment API backend and provider gateway
    let (backend, gateway, demo_mode): (Arc<dyn CheckoutBackend>, Arc<dyn ProviderGateway>, bool) =
        match (SupabaseBackend::from_env(), EdgeFunctionGateway::from_env()) {
            (Ok(backend), Ok(gateway)) => (Arc::new(backend), Arc::new(gateway), false),
            (backend, gateway) => {
                if let Err(e) = backend {
                    tracing::warn!("⚠ Supabase backend not configured: {}", e);
                }
                if let Err(e) = gateway {
                    tracing::warn!("⚠ Provider gateway not configured: {}", e);
                }
                tracing::warn!("  Set SUPABASE_URL and SUPABASE_ANON_KEY in .env");
                tracing::warn!("  Running in demo mode with link '{}'", DEMO_LINK_ID);
                (Arc::new(MockBackend::demo()), Arc::new(MockGateway::new()), true)
            }
        };

    if !demo_mode {
        match backend.health_check().await {
            Ok(true) => tracing::info!("✓ Connected to Supabase"),
            Ok(false) | Err(_) => tracing::warn!("⚠ Supabase not reachable - checkouts will fail"),
        }
    }

    let geo = Arc::new(CountryDetector::from_env()?);

    let addr = config.bind_addr.clone();
    let state = AppState::new(backend, gateway, geo, config, demo_mode);
    let app = app::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 checkout-server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                              - Health check");
    tracing::info!("  GET  /api/geo/country                     - Detected country");
    tracing::info!("  GET  /api/links/{{id}}                      - Link summary");
    tracing::info!("  POST /api/links/{{id}}/sessions             - Open checkout session");
    tracing::info!("  POST /api/links/{{id}}/checkout             - Pay with a provider");
    tracing::info!("  GET  /api/transactions/{{provider}}/{{tx}}    - Modal transaction status");
    tracing::info!("  GET  /api/sessions/{{id}}/watch             - WebSocket session watch");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}

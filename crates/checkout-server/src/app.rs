//! Router

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    checkout, create_session, detect_country, get_link, health_check, transaction_status, watch_session,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/api/geo/country", get(detect_country))

        // Checkout
        .route("/api/links/{link_id}", get(get_link))
        .route("/api/links/{link_id}/sessions", post(create_session))
        .route("/api/links/{link_id}/checkout", post(checkout))
        .route("/api/transactions/{provider}/{transaction_id}", get(transaction_status))

        // Session lifecycle
        .route("/api/sessions/{session_id}/watch", get(watch_session))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use checkout_core::SessionId;
    use checkout_core::mock::{MockBackend, MockGateway};
    use checkout_runtime::{CountryDetector, GeoConfig, MemoryCountryCache};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::config::ServerConfig;

    fn test_state() -> AppState {
        let geo = GeoConfig {
            lookup_url: "http://127.0.0.1:9/json/".into(),
            cache_path: None,
            timeout: Duration::from_millis(200),
            default_country: "CI".into(),
        };
        let detector = CountryDetector::new(geo, Arc::new(MemoryCountryCache::new())).unwrap();

        AppState::new(
            Arc::new(MockBackend::demo()),
            Arc::new(MockGateway::new()),
            Arc::new(detector),
            ServerConfig::default(),
            true,
        )
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn customer() -> Value {
        json!({
            "first_name": "Awa",
            "last_name": "Kone",
            "email": "awa@example.com",
            "phone_number": "0701020304",
            "country_code": "+225"
        })
    }

    #[tokio::test]
    async fn test_health_reports_demo_mode() {
        let (status, body) = send(&test_state(), get_req("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["demo_mode"], true);
        assert_eq!(body["backend_connected"], true);
    }

    #[tokio::test]
    async fn test_link_summary_includes_fees() {
        let (status, body) = send(&test_state(), get_req("/api/links/demo")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["link_id"], "demo");
        assert_eq!(body["formatted_total"], "15 450 XOF");
        assert_eq!(body["formatted_subtotal"], "15 000 XOF");
        assert_eq!(body["formatted_fees"][0]["amount"], "450 XOF");
        assert!(body["billing_label"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_link_is_404() {
        let (status, body) = send(&test_state(), get_req("/api/links/nope")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "LINK_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_checkout_redirect() {
        let request = post_json("/api/links/demo/checkout", &json!({ "provider": "WAVE", "customer": customer() }));
        let (status, body) = send(&test_state(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "redirect");
        assert!(body["checkout_url"].as_str().unwrap().starts_with("https://pay.example.com/wave/"));
        assert!(body["customer_id"].is_string());
    }

    #[tokio::test]
    async fn test_checkout_modal_provider() {
        let request = post_json(
            "/api/links/demo/checkout",
            &json!({ "provider": "NOWPAYMENTS", "customer": customer() }),
        );
        let (status, body) = send(&test_state(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "modal");
        assert!(body["transaction_id"].as_str().unwrap().starts_with("tx_"));
    }

    #[tokio::test]
    async fn test_checkout_validation_focuses_field() {
        let mut payload = customer();
        payload["email"] = json!("not-an-email");
        let request = post_json("/api/links/demo/checkout", &json!({ "provider": "WAVE", "customer": payload }));
        let (status, body) = send(&test_state(), request).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["focus"], "email");
    }

    #[tokio::test]
    async fn test_checkout_unknown_provider() {
        let request = post_json("/api/links/demo/checkout", &json!({ "provider": "PAYPAL", "customer": customer() }));
        let (status, body) = send(&test_state(), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "UNKNOWN_PROVIDER");
    }

    #[tokio::test]
    async fn test_expired_session_blocks_checkout() {
        let state = test_state();
        let (status, body) = send(&state, post_json("/api/links/demo/sessions", &json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["expiration_minutes"], 30);

        let session_id = body["session_id"].as_str().unwrap().to_string();
        let page = state.page(&SessionId::from_string(&session_id)).await.unwrap();
        page.session_flag().raise();

        let request = post_json(
            "/api/links/demo/checkout",
            &json!({ "provider": "WAVE", "customer": customer(), "session_id": session_id }),
        );
        let (status, body) = send(&state, request).await;

        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body["code"], "SESSION_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_transaction_status() {
        let (status, body) = send(&test_state(), get_req("/api/transactions/NOWPAYMENTS/tx_1")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transaction_id"], "tx_1");
        assert_eq!(body["status"], "succeeded");
    }

    #[tokio::test]
    async fn test_geo_falls_back_to_default() {
        let (status, body) = send(&test_state(), get_req("/api/geo/country")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["country"]["code"], "CI");
        assert_eq!(body["source"], "fallback");
    }

    async fn open_session(state: &AppState) -> String {
        let (status, body) = send(state, post_json("/api/links/demo/sessions", &json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        body["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_expired_pages_are_evicted() {
        let state = test_state();
        let mut ids = Vec::new();
        for _ in 0..20 {
            ids.push(open_session(&state).await);
        }
        assert_eq!(state.open_pages().await, 20);

        for id in &ids {
            state.page(&SessionId::from_string(id)).await.unwrap().session_flag().raise();
        }
        open_session(&state).await;

        assert_eq!(state.open_pages().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pages_expire_with_their_session() {
        let state = test_state();
        let first = open_session(&state).await;
        open_session(&state).await;

        tokio::time::advance(Duration::from_secs(31 * 60)).await;
        assert!(state.page(&SessionId::from_string(&first)).await.is_none());

        open_session(&state).await;
        assert_eq!(state.open_pages().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_session_is_unavailable() {
        let request = post_json(
            "/api/links/demo/checkout",
            &json!({ "provider": "WAVE", "customer": customer(), "session_id": "cs_missing" }),
        );
        let (status, body) = send(&test_state(), request).await;

        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body["code"], "SESSION_UNAVAILABLE");
    }
}

//! Integration tests for country detection against a mock lookup service

use std::sync::Arc;
use std::time::Duration;

use checkout_runtime::{CountryCache, CountryDetector, DetectionSource, FileCountryCache, GeoConfig, MemoryCountryCache};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> GeoConfig {
    GeoConfig {
        lookup_url: format!("{}/json/", server.uri()),
        ..GeoConfig::default()
    }
}

fn temp_cache_path() -> std::path::PathBuf {
    std::env::temp_dir()
        .join(format!("checkout-geo-{}", uuid::Uuid::new_v4()))
        .join("country.json")
}

#[tokio::test]
async fn test_lookup_result_is_validated_and_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ip": "41.202.0.1",
            "country": "SN",
            "country_code": "SN",
            "country_name": "Senegal"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let path = temp_cache_path();
    let cache = Arc::new(FileCountryCache::new(&path));
    let detector = CountryDetector::new(config(&server), cache.clone()).unwrap();

    let first = detector.detect().await;
    assert_eq!(first.source, DetectionSource::Lookup);
    assert_eq!(first.country.code, "SN");
    assert_eq!(cache.load().await.as_deref(), Some("SN"));

    // Served from the file cache; the mock expects exactly one request
    let second = detector.detect().await;
    assert_eq!(second.source, DetectionSource::Cache);

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[tokio::test]
async fn test_unsupported_country_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "country_code": "AQ" })))
        .mount(&server)
        .await;

    let cache = Arc::new(MemoryCountryCache::new());
    let detection = CountryDetector::new(config(&server), cache.clone()).unwrap().detect().await;

    assert_eq!(detection.source, DetectionSource::Fallback);
    assert_eq!(detection.country.code, "CI");
    assert!(cache.load().await.is_none());
}

#[tokio::test]
async fn test_slow_lookup_times_out_to_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "country_code": "SN" }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.timeout = Duration::from_millis(200);
    config.default_country = "BJ".into();

    let detection = CountryDetector::new(config, Arc::new(MemoryCountryCache::new()))
        .unwrap()
        .detect()
        .await;
    assert_eq!(detection.source, DetectionSource::Fallback);
    assert_eq!(detection.country.code, "BJ");
}

#[tokio::test]
async fn test_rate_limited_lookup_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let detection = CountryDetector::new(config(&server), Arc::new(MemoryCountryCache::new()))
        .unwrap()
        .detect()
        .await;
    assert_eq!(detection.source, DetectionSource::Fallback);
}

//! Country detection
//!
//! Best-effort IP geolocation used to prefill the phone dial code. A cached
//! value wins; otherwise one lookup with a short timeout, validated against
//! the supported countries. Any failure falls back to a fixed default.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use checkout_core::country::{self, Country, DEFAULT_COUNTRY};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Result, RuntimeError};

/// Country detection settings
#[derive(Clone, Debug)]
pub struct GeoConfig {
    pub lookup_url: String,
    /// Where the detected country is persisted; in-memory only when unset
    pub cache_path: Option<PathBuf>,
    pub timeout: Duration,
    pub default_country: String,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            lookup_url: "https://ipapi.co/json/".into(),
            cache_path: None,
            timeout: Duration::from_secs(2),
            default_country: DEFAULT_COUNTRY.code.into(),
        }
    }
}

impl GeoConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            lookup_url: std::env::var("GEO_LOOKUP_URL").unwrap_or(defaults.lookup_url),
            cache_path: std::env::var("GEO_CACHE_PATH").ok().map(PathBuf::from),
            default_country: std::env::var("GEO_DEFAULT_COUNTRY").unwrap_or(defaults.default_country),
            ..defaults
        }
    }
}

/// Storage for the last detected country
#[async_trait]
pub trait CountryCache: Send + Sync {
    async fn load(&self) -> Option<String>;

    async fn store(&self, code: &str) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedCountry {
    country_code: String,
    detected_at: DateTime<Utc>,
}

/// JSON file cache
pub struct FileCountryCache {
    path: PathBuf,
}

impl FileCountryCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CountryCache for FileCountryCache {
    async fn load(&self) -> Option<String> {
        let bytes = tokio::fs::read(&self.path).await.ok()?;
        match serde_json::from_slice::<CachedCountry>(&bytes) {
            Ok(cached) => Some(cached.country_code),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Ignoring unreadable country cache");
                None
            }
        }
    }

    async fn store(&self, code: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let cached = CachedCountry {
            country_code: code.to_string(),
            detected_at: Utc::now(),
        };
        tokio::fs::write(&self.path, serde_json::to_vec(&cached)?).await?;
        Ok(())
    }
}

/// Process-local cache
#[derive(Default)]
pub struct MemoryCountryCache {
    code: RwLock<Option<String>>,
}

impl MemoryCountryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CountryCache for MemoryCountryCache {
    async fn load(&self) -> Option<String> {
        self.code.read().await.clone()
    }

    async fn store(&self, code: &str) -> Result<()> {
        *self.code.write().await = Some(code.to_string());
        Ok(())
    }
}

/// Where a detected country came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    Cache,
    Lookup,
    Fallback,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub country: Country,
    pub source: DetectionSource,
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

/// Cached, best-effort country detector
pub struct CountryDetector {
    client: Client,
    config: GeoConfig,
    cache: Arc<dyn CountryCache>,
}

impl CountryDetector {
    pub fn new(config: GeoConfig, cache: Arc<dyn CountryCache>) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config, cache })
    }

    /// File cache when `GEO_CACHE_PATH` is set, memory otherwise
    pub fn from_env() -> Result<Self> {
        let config = GeoConfig::from_env();
        let cache: Arc<dyn CountryCache> = match &config.cache_path {
            Some(path) => Arc::new(FileCountryCache::new(path.clone())),
            None => Arc::new(MemoryCountryCache::new()),
        };
        Self::new(config, cache)
    }

    pub async fn detect(&self) -> Detection {
        if let Some(cached) = self.cache.load().await.as_deref().and_then(country::find) {
            return Detection {
                country: *cached,
                source: DetectionSource::Cache,
            };
        }

        match self.lookup().await {
            Ok(found) => {
                if let Err(e) = self.cache.store(found.code).await {
                    warn!(error = %e, "Failed to persist detected country");
                }
                info!(country = found.code, "Country detected");
                Detection {
                    country: found,
                    source: DetectionSource::Lookup,
                }
            }
            Err(e) => {
                warn!(error = %e, "Country detection failed, using default");
                Detection {
                    country: self.fallback(),
                    source: DetectionSource::Fallback,
                }
            }
        }
    }

    fn fallback(&self) -> Country {
        country::find(&self.config.default_country)
            .copied()
            .unwrap_or(DEFAULT_COUNTRY)
    }

    async fn lookup(&self) -> Result<Country> {
        let call = "geolocation lookup";
        let response: GeoResponse = self
            .client
            .get(&self.config.lookup_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let code = response
            .country_code
            .or(response.country)
            .ok_or_else(|| RuntimeError::Decode {
                call: call.into(),
                message: "no country code in response".into(),
            })?;

        country::find(&code).copied().ok_or_else(|| RuntimeError::Decode {
            call: call.into(),
            message: format!("unsupported country {code}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_round_trip() {
        let cache = MemoryCountryCache::new();
        assert!(cache.load().await.is_none());
        cache.store("SN").await.unwrap();
        assert_eq!(cache.load().await.as_deref(), Some("SN"));
    }

    #[tokio::test]
    async fn test_cached_country_skips_lookup() {
        let cache = Arc::new(MemoryCountryCache::new());
        cache.store("SN").await.unwrap();
        let config = GeoConfig {
            // Unroutable: any request would fail
            lookup_url: "http://127.0.0.1:9/json".into(),
            ..GeoConfig::default()
        };

        let detection = CountryDetector::new(config, cache).unwrap().detect().await;
        assert_eq!(detection.source, DetectionSource::Cache);
        assert_eq!(detection.country.code, "SN");
    }

    #[tokio::test]
    async fn test_invalid_default_falls_back_to_builtin() {
        let config = GeoConfig {
            lookup_url: "http://127.0.0.1:9/json".into(),
            default_country: "ZZ".into(),
            ..GeoConfig::default()
        };
        let detection = CountryDetector::new(config, Arc::new(MemoryCountryCache::new()))
            .unwrap()
            .detect()
            .await;
        assert_eq!(detection.source, DetectionSource::Fallback);
        assert_eq!(detection.country, DEFAULT_COUNTRY);
    }
}

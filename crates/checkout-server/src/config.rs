//! Server configuration

use std::time::Duration;

use checkout_core::monitor::DEFAULT_POLL_INTERVAL;

/// Settings read from the environment at startup
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Recovery target when a link has no cancel URL
    pub default_return_url: String,
    pub session_poll_interval: Duration,
    pub session_expiration_minutes: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            default_return_url: "https://example.com".into(),
            session_poll_interval: DEFAULT_POLL_INTERVAL,
            session_expiration_minutes: 30,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            default_return_url: std::env::var("DEFAULT_RETURN_URL").unwrap_or(defaults.default_return_url),
            session_poll_interval: positive(std::env::var("SESSION_POLL_SECS").ok())
                .map_or(defaults.session_poll_interval, Duration::from_secs),
            session_expiration_minutes: positive(std::env::var("SESSION_EXPIRATION_MINUTES").ok())
                .and_then(|m| u32::try_from(m).ok())
                .unwrap_or(defaults.session_expiration_minutes),
        }
    }

    /// How long a registered page outlives its creation
    pub fn session_lifetime(&self) -> Duration {
        Duration::from_secs(u64::from(self.session_expiration_minutes) * 60)
    }
}

/// Parsed value when set and greater than zero
fn positive(raw: Option<String>) -> Option<u64> {
    match raw?.trim().parse::<u64>() {
        Ok(0) => {
            tracing::warn!("Ignoring zero-valued setting, using default");
            None
        }
        Ok(value) => Some(value),
        Err(_) => None,
    }
}

use std::env;

use tracing::warn;

use crate::adapters::{DEFAULT_BACKEND_URL, DEFAULT_HEALTH_TIMEOUT_MS};
use crate::http_client::DEFAULT_TIMEOUT_MS;
use crate::synthetic::FallbackConfig;

/// Runtime configuration for the data-access layer.
///
/// # Environment Variables
///
/// | Setting | Primary Env Var | Fallback Env Var |
/// |---------|-----------------|------------------|
/// | Backend URL | `TICKDESK_BACKEND_URL` | `BACKEND_URL` |
/// | Request timeout (ms) | `TICKDESK_REQUEST_TIMEOUT_MS` | - |
/// | Health probe timeout (ms) | `TICKDESK_HEALTH_TIMEOUT_MS` | - |
/// | Backend bearer token | `TICKDESK_BACKEND_TOKEN` | - |
/// | Yahoo session cookie | `YAHOO_COOKIE` | - |
#[derive(Debug, Clone, PartialEq)]
pub struct MarketDataConfig {
    pub backend_url: String,
    pub request_timeout_ms: u64,
    pub health_timeout_ms: u64,
    pub backend_token: Option<String>,
    pub yahoo_cookie: Option<String>,
    pub fallback: FallbackConfig,
    /// Seed for synthetic data; unseeded when `None`.
    pub seed: Option<u64>,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            backend_url: String::from(DEFAULT_BACKEND_URL),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            health_timeout_ms: DEFAULT_HEALTH_TIMEOUT_MS,
            backend_token: None,
            yahoo_cookie: None,
            fallback: FallbackConfig::default(),
            seed: None,
        }
    }
}

impl MarketDataConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Unset or blank keys
    /// keep their defaults; unparseable timeouts are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = read("TICKDESK_BACKEND_URL").or_else(|| read("BACKEND_URL")) {
            config.backend_url = url.trim().to_owned();
        }
        if let Some(timeout) = read_millis(&read, "TICKDESK_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = timeout;
        }
        if let Some(timeout) = read_millis(&read, "TICKDESK_HEALTH_TIMEOUT_MS") {
            config.health_timeout_ms = timeout;
        }
        config.backend_token = read("TICKDESK_BACKEND_TOKEN");
        config.yahoo_cookie = read("YAHOO_COOKIE");
        config
    }
}

fn read_millis(read: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = read(key)?;
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            warn!(key, value = %raw, "ignoring invalid timeout");
            None
        }
    }
}

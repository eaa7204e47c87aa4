use crate::strategy::{RetryExhaustion, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Configuration for the engine and process runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub max_concurrent_items: usize,
    pub event_buffer_size: usize,
    /// Per-attempt deadline; `None` leaves handlers unbounded
    pub attempt_timeout_ms: Option<u64>,
    pub retry: RetryPolicy,
    pub on_retry_exhausted: RetryExhaustion,
}

impl RuntimeConfig {
    /// Defaults overlaid with `WORK_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_var("WORK_MAX_CONCURRENT_ITEMS") {
            config.max_concurrent_items = v;
        }
        if let Some(v) = env_var("WORK_EVENT_BUFFER_SIZE") {
            config.event_buffer_size = v;
        }
        if let Some(v) = env_var("WORK_ATTEMPT_TIMEOUT_MS") {
            config.attempt_timeout_ms = Some(v);
        }
        if let Some(v) = env_var("WORK_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = v;
        }
        if let Some(v) = env_var("WORK_RETRY_DELAY_MS") {
            config.retry.delay_ms = v;
        }
        config
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_items: 64,
            event_buffer_size: 1000,
            attempt_timeout_ms: None,
            retry: RetryPolicy::default(),
            on_retry_exhausted: RetryExhaustion::default(),
        }
    }
}

fn env_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring {}: cannot parse '{}'", name, raw);
            None
        }
    }
}

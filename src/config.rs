//! Server configuration
//!
//! Values come from defaults, then environment variables, then the
//! `initializationOptions` the editor sends with `initialize`.

use std::env;
use std::fmt;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::cache::{RETRY_MINUTES, STALENESS_HOURS};

pub const DEFAULT_RAW_CONTENT_URL: &str = "https://raw.githubusercontent.com";

/// Runtime configuration for caches and downloads.
#[derive(Clone, PartialEq)]
pub struct Config {
    /// How long cached metadata is served before it is refreshed
    pub cache_ttl: Duration,
    /// How long to wait after a failed refresh before trying again
    pub retry_after: Duration,
    /// Base URL for raw repository content
    pub raw_content_url: String,
    /// Token sent as bearer auth to raise GitHub rate limits
    pub github_token: Option<String>,
    /// Per-request HTTP timeout
    pub request_timeout: StdDuration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::hours(STALENESS_HOURS),
            retry_after: Duration::minutes(RETRY_MINUTES),
            raw_content_url: DEFAULT_RAW_CONTENT_URL.to_string(),
            github_token: None,
            request_timeout: StdDuration::from_secs(5),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("cache_ttl", &self.cache_ttl)
            .field("retry_after", &self.retry_after)
            .field("raw_content_url", &self.raw_content_url)
            .field("github_token", &self.github_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `GITHUB_WORKFLOW_LS_CACHE_TTL_HOURS` - metadata cache lifetime (default: 24)
    /// - `GITHUB_WORKFLOW_LS_RETRY_MINUTES` - retry window after a failed fetch (default: 10)
    /// - `GITHUB_WORKFLOW_LS_RAW_URL` - raw content base URL
    /// - `GITHUB_WORKFLOW_LS_TIMEOUT_SECS` - HTTP timeout (default: 5)
    /// - `GITHUB_TOKEN` - optional GitHub token
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |name: &str| lookup(name).and_then(|v| v.trim().parse::<i64>().ok());

        Self {
            cache_ttl: number("GITHUB_WORKFLOW_LS_CACHE_TTL_HOURS")
                .and_then(|hours| positive("GITHUB_WORKFLOW_LS_CACHE_TTL_HOURS", hours, Duration::try_hours))
                .unwrap_or(defaults.cache_ttl),
            retry_after: number("GITHUB_WORKFLOW_LS_RETRY_MINUTES")
                .and_then(|minutes| positive("GITHUB_WORKFLOW_LS_RETRY_MINUTES", minutes, Duration::try_minutes))
                .unwrap_or(defaults.retry_after),
            raw_content_url: lookup("GITHUB_WORKFLOW_LS_RAW_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.raw_content_url),
            github_token: lookup("GITHUB_TOKEN").filter(|v| !v.trim().is_empty()),
            request_timeout: number("GITHUB_WORKFLOW_LS_TIMEOUT_SECS")
                .and_then(|secs| u64::try_from(secs).ok())
                .map(StdDuration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }

    /// Merge `initializationOptions` sent by the editor.
    ///
    /// Recognised keys: `cacheTtlHours`, `retryMinutes`, `rawContentUrl`,
    /// `githubToken`, `timeoutSecs`. Unknown keys are ignored.
    pub fn apply_initialization_options(&mut self, options: &JsonValue) {
        let Some(options) = options.as_object() else {
            return;
        };

        if let Some(ttl) = options
            .get("cacheTtlHours")
            .and_then(JsonValue::as_i64)
            .and_then(|hours| positive("cacheTtlHours", hours, Duration::try_hours))
        {
            self.cache_ttl = ttl;
        }
        if let Some(retry) = options
            .get("retryMinutes")
            .and_then(JsonValue::as_i64)
            .and_then(|minutes| positive("retryMinutes", minutes, Duration::try_minutes))
        {
            self.retry_after = retry;
        }
        if let Some(url) = options.get("rawContentUrl").and_then(JsonValue::as_str) {
            self.raw_content_url = url.to_string();
        }
        if let Some(token) = options.get("githubToken").and_then(JsonValue::as_str) {
            self.github_token = Some(token.to_string()).filter(|t| !t.is_empty());
        }
        if let Some(secs) = options.get("timeoutSecs").and_then(JsonValue::as_u64) {
            self.request_timeout = StdDuration::from_secs(secs);
        }
        debug!("Configuration after initialization options: {:?}", self);
    }
}

/// `value` converted to a duration, or `None` when it is not positive or out of range
fn positive(name: &str, value: i64, to_duration: fn(i64) -> Option<Duration>) -> Option<Duration> {
    let duration = to_duration(value).filter(|d| *d > Duration::zero());
    if duration.is_none() {
        warn!("Ignoring {} = {}, keeping the default", name, value);
    }
    duration
}

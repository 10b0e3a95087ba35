//! Time-bounded, lazily refreshed metadata cache
//!
//! A [`TimedCache`] holds one value produced by a [`Refresh`] source. Reads
//! return the cached value until it is older than the staleness threshold;
//! the first read after that refreshes it. Refreshes are single-flight and a
//! failed refresh never fails the read.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::suggestion::{Suggestion, SuggestionKind};

/// Hours after which cached data is considered outdated
pub const STALENESS_HOURS: i64 = 24;

/// Minutes to wait after a failed refresh before trying again
pub const RETRY_MINUTES: i64 = 10;

/// Produces a fresh cache value.
#[tower_lsp::async_trait]
pub trait Refresh: Send + Sync {
    type Value: Default + Send + Sync + 'static;

    async fn refresh(&self) -> Result<Self::Value>;

    /// Name used in log lines
    fn describe(&self) -> String {
        "cache".to_string()
    }
}

/// The value currently held by a cache and when it was produced.
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub value: Arc<T>,
    pub last_refreshed_at: DateTime<Utc>,
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            last_refreshed_at: self.last_refreshed_at,
        }
    }
}

struct CacheState<T> {
    entry: Option<CacheEntry<T>>,
    failed_at: Option<DateTime<Utc>>,
}

/// Single-value cache with a staleness threshold.
pub struct TimedCache<R: Refresh> {
    source: R,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    retry_after: Duration,
    state: RwLock<CacheState<R::Value>>,
    /// Serializes refreshes so concurrent stale reads share one
    refresh_lock: Mutex<()>,
}

impl<R: Refresh> TimedCache<R> {
    pub fn new(source: R, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl,
            retry_after: Duration::minutes(RETRY_MINUTES),
            state: RwLock::new(CacheState {
                entry: None,
                failed_at: None,
            }),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn source(&self) -> &R {
        &self.source
    }

    /// Timestamp of the most recent successful refresh
    pub fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().entry.as_ref().map(|e| e.last_refreshed_at)
    }

    /// Whether this cache has nothing worth keeping.
    ///
    /// True once the value is older than the TTL, or once a refresh that
    /// never succeeded has passed its retry window. A cache that has not
    /// been read yet, or that is serving its last value after a recent
    /// failure, is kept.
    pub fn is_expired(&self) -> bool {
        let now = self.clock.now();
        let state = self.state.read();

        let stale = match &state.entry {
            Some(entry) => now - entry.last_refreshed_at > self.ttl,
            None => state.failed_at.is_some(),
        };
        let retrying = state
            .failed_at
            .map_or(false, |failed_at| now - failed_at < self.retry_after);
        stale && !retrying
    }

    /// The cached entry without triggering a refresh
    pub fn peek(&self) -> Option<CacheEntry<R::Value>> {
        self.state.read().entry.clone()
    }

    /// Return the cached value, refreshing it first if absent or stale.
    pub async fn get(&self) -> Arc<R::Value> {
        if let Some(value) = self.current() {
            return value;
        }

        let _guard = self.refresh_lock.lock().await;
        // Another reader may have refreshed while this one waited
        if let Some(value) = self.current() {
            return value;
        }

        self.refresh().await
    }

    fn current(&self) -> Option<Arc<R::Value>> {
        let now = self.clock.now();
        let state = self.state.read();

        if let Some(entry) = &state.entry {
            if now - entry.last_refreshed_at <= self.ttl {
                return Some(Arc::clone(&entry.value));
            }
        }

        match state.failed_at {
            Some(failed_at) if now - failed_at < self.retry_after => Some(
                state
                    .entry
                    .as_ref()
                    .map(|entry| Arc::clone(&entry.value))
                    .unwrap_or_default(),
            ),
            _ => None,
        }
    }

    async fn refresh(&self) -> Arc<R::Value> {
        debug!("Refreshing {}", self.source.describe());

        match self.source.refresh().await {
            Ok(value) => {
                let value = Arc::new(value);
                let now = self.clock.now();
                let mut state = self.state.write();
                // The wall clock may have stepped back while the refresh ran
                let last_refreshed_at = match &state.entry {
                    Some(previous) if previous.last_refreshed_at > now => previous.last_refreshed_at,
                    _ => now,
                };
                state.entry = Some(CacheEntry {
                    value: Arc::clone(&value),
                    last_refreshed_at,
                });
                state.failed_at = None;
                value
            }
            Err(e) => {
                warn!(
                    "Refreshing {} failed, serving last known value: {}",
                    self.source.describe(),
                    e
                );
                let mut state = self.state.write();
                state.failed_at = Some(self.clock.now());
                state
                    .entry
                    .as_ref()
                    .map(|entry| Arc::clone(&entry.value))
                    .unwrap_or_default()
            }
        }
    }
}

impl<R: Refresh<Value = Vec<Suggestion>>> TimedCache<R> {
    /// Current suggestion sequence, in the order the last refresh produced it
    pub async fn get_suggestions(&self) -> Arc<Vec<Suggestion>> {
        self.get().await
    }
}

/// Top-level workflow keywords
pub struct KeywordSource;

const KEYWORDS: &[(&str, &str)] = &[
    ("on", "The events that trigger the workflow."),
    ("jobs", "A workflow run is made up of one or more jobs, which run in parallel by default."),
    ("steps", "A job contains a sequence of tasks called steps."),
];

#[tower_lsp::async_trait]
impl Refresh for KeywordSource {
    type Value = Vec<Suggestion>;

    async fn refresh(&self) -> Result<Vec<Suggestion>> {
        Ok(Suggestion::from_table(KEYWORDS, SuggestionKind::Keyword))
    }

    fn describe(&self) -> String {
        "workflow keywords".to_string()
    }
}

pub type KeywordCache = TimedCache<KeywordSource>;

static KEYWORD_CACHE: Lazy<Arc<KeywordCache>> = Lazy::new(|| {
    Arc::new(TimedCache::new(
        KeywordSource,
        Arc::new(SystemClock),
        Duration::hours(STALENESS_HOURS),
    ))
});

/// The process-wide keyword cache, created on first access.
pub fn keywords() -> Arc<KeywordCache> {
    Arc::clone(&KEYWORD_CACHE)
}

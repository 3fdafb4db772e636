//! TTL + LRU response cache keyed by request fingerprint.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use lru::LruCache;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::constants;
use crate::providers::{GenerateRequest, GenerateResponse};

/// Prompt fragments that suggest the answer goes stale quickly
const TIME_SENSITIVE_KEYWORDS: [&str; 10] = [
    "today", "now", "current", "latest", "recent", "news", "breaking", "this week", "price", "weather",
];

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_size: usize,
    pub default_ttl: Duration,
    /// TTL for prompts matching a time-sensitive keyword
    pub time_sensitive_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: constants::CACHE_MAX_SIZE,
            default_ttl: constants::CACHE_DEFAULT_TTL,
            time_sensitive_ttl: constants::CACHE_TIME_SENSITIVE_TTL,
            sweep_interval: constants::CACHE_SWEEP_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: GenerateResponse,
    created_at: Instant,
    ttl: Duration,
    hits: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

/// Counters describing cache behavior since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped to make room for new ones
    pub evictions: u64,
    /// Entries dropped because their TTL ran out
    pub expirations: u64,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 { 0.0 } else { self.hits as f64 / lookups as f64 }
    }
}

struct CacheInner {
    entries: LruCache<String, CacheEntry>,
    stats: CacheStats,
}

pub struct ResponseCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up `key`, refreshing its recency. Expired entries are removed and reported as a miss.
    pub async fn get(&self, key: &str) -> Option<GenerateResponse> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let now = Instant::now();

        let expired = match inner.entries.get_mut(key) {
            None => {
                inner.stats.misses += 1;
                return None;
            }
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => {
                entry.hits += 1;
                let response = entry.response.clone();
                inner.stats.hits += 1;
                return Some(response);
            }
        };

        if expired {
            inner.entries.pop(key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
        }
        None
    }

    /// Insert or replace `key`, evicting the least recently used entry when full
    pub async fn set(&self, key: impl Into<String>, response: GenerateResponse, ttl: Duration) {
        let key = key.into();
        let mut inner = self.inner.lock().await;
        let entry = CacheEntry { response, created_at: Instant::now(), ttl, hits: 0 };

        if let Some((evicted, _)) = inner.entries.push(key.clone(), entry) {
            if evicted != key {
                inner.stats.evictions += 1;
                debug!("Cache evicted least recently used entry {}", evicted);
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.inner.lock().await.entries.pop(key).is_some()
    }

    pub async fn clear(&self) {
        self.inner.lock().await.entries.clear();
    }

    /// Hit count of a live entry, without touching recency
    pub async fn entry_hits(&self, key: &str) -> Option<u64> {
        let inner = self.inner.lock().await;
        inner.entries.peek(key).filter(|e| !e.is_expired(Instant::now())).map(|e| e.hits)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every expired entry, returning how many were dropped
    pub async fn sweep_expired(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.entries.pop(key);
        }
        inner.stats.expirations += expired.len() as u64;
        expired.len()
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        CacheStats { size: inner.entries.len(), ..inner.stats }
    }

    /// TTL to use for a response to `request`
    pub fn ttl_for(&self, request: &GenerateRequest) -> Duration {
        if is_time_sensitive(&request.prompt) {
            self.config.time_sensitive_ttl
        } else {
            self.config.default_ttl
        }
    }
}

/// Deterministic cache key for `request`.
///
/// Only model, prompt, max tokens and temperature take part; other
/// sampling parameters and metadata do not change the key.
pub fn fingerprint(request: &GenerateRequest) -> String {
    let temperature = request
        .temperature
        .map(|t| format!("{:.4}", t))
        .unwrap_or_else(|| "none".to_string());

    let mut hasher = Sha256::new();
    hasher.update(request.model.as_bytes());
    hasher.update([0u8]);
    hasher.update(request.prompt.as_bytes());
    hasher.update([0u8]);
    hasher.update(request.max_tokens.to_le_bytes());
    hasher.update([0u8]);
    hasher.update(temperature.as_bytes());

    hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn is_time_sensitive(prompt: &str) -> bool {
    let prompt = prompt.to_lowercase();
    TIME_SENSITIVE_KEYWORDS.iter().any(|k| {
        prompt
            .match_indices(k)
            .any(|(i, _)| word_boundary(&prompt, i, k.len()))
    })
}

fn word_boundary(text: &str, start: usize, len: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[start + len..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

/// Periodically drop expired entries until `shutdown` fires
pub fn spawn_cache_sweeper(cache: Arc<ResponseCache>, shutdown: CancellationToken) -> JoinHandle<()> {
    let interval = cache.config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = cache.sweep_expired().await;
                    if removed > 0 {
                        debug!("Cache sweep removed {} expired entries", removed);
                    }
                }
            }
        }
    })
}

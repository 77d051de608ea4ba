/*!
 * Translation caching functionality.
 *
 * Entries are keyed by the normalized source text, the language pair and the
 * engine identifier, and are never overwritten once stored. Concurrent
 * requests for the same key share one in-flight computation.
 */

use log::debug;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::OnceCell;

use crate::errors::TranslationError;

type InFlight = Arc<OnceCell<Result<String, TranslationError>>>;

enum Slot {
    Ready(String),
    Pending(InFlight),
}

/// Trim and collapse internal whitespace
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cache key combining normalized text, language pair and engine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Normalized source text
    pub source_text: String,

    /// Source language code
    pub source_language: String,

    /// Target language code
    pub target_language: String,

    /// Engine identifier
    pub engine: String,
}

impl CacheKey {
    /// Create a new cache key from raw text
    pub fn new(source_text: &str, source_language: &str, target_language: &str, engine: &str) -> Self {
        Self {
            source_text: normalize_text(source_text),
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            engine: engine.to_string(),
        }
    }
}

/// In-memory translation cache shared by all callers of a run
#[derive(Debug, Default)]
pub struct TranslationCache {
    /// Completed translations
    cache: RwLock<HashMap<CacheKey, String>>,

    /// Requests currently being computed
    in_flight: Mutex<HashMap<CacheKey, InFlight>>,

    /// Cache hit counter
    hits: AtomicUsize,

    /// Cache miss counter
    misses: AtomicUsize,
}

impl TranslationCache {
    /// Create a new translation cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a translation from the cache
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let cache = self.cache.read();

        match cache.get(key) {
            Some(translation) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Cache hit for '{}' ({} -> {})",
                    truncate_text(&key.source_text, 30),
                    key.source_language,
                    key.target_language
                );
                Some(translation.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Cache miss for '{}' ({} -> {})",
                    truncate_text(&key.source_text, 30),
                    key.source_language,
                    key.target_language
                );
                None
            }
        }
    }

    /// Store a translation; the first value stored for a key wins
    pub fn store(&self, key: &CacheKey, translation: &str) {
        let mut cache = self.cache.write();
        cache
            .entry(key.clone())
            .or_insert_with(|| translation.to_string());
    }

    /// Join or open the in-flight slot of `key`
    ///
    /// Leaders store their result before releasing the slot, so a key
    /// completed since the caller's first lookup is found here.
    fn claim(&self, key: &CacheKey, read_cache: bool) -> Slot {
        let mut in_flight = self.in_flight.lock();
        if read_cache {
            if let Some(hit) = self.cache.read().get(key) {
                return Slot::Ready(hit.clone());
            }
        }
        Slot::Pending(
            in_flight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone(),
        )
    }

    /// Return the cached value, or compute it once for all concurrent callers
    ///
    /// With `read_cache` false the stored value is ignored, but concurrent
    /// callers still share one computation and a success is still stored.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &CacheKey,
        read_cache: bool,
        compute: F,
    ) -> Result<String, TranslationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, TranslationError>>,
    {
        if read_cache {
            if let Some(hit) = self.get(key) {
                return Ok(hit);
            }
        }

        let cell = match self.claim(key, read_cache) {
            Slot::Ready(hit) => return Ok(hit),
            Slot::Pending(cell) => cell,
        };

        let leader = AtomicBool::new(false);
        let result = cell
            .get_or_init(|| {
                leader.store(true, Ordering::Relaxed);
                compute()
            })
            .await
            .clone();

        if let Ok(translation) = &result {
            self.store(key, translation);
        }

        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.get(key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
                in_flight.remove(key);
            }
        }

        if leader.load(Ordering::Relaxed) {
            result
        } else {
            debug!("Joined in-flight request for '{}'", truncate_text(&key.source_text, 30));
            result.map_err(|e| TranslationError::Shared(e.to_string()))
        }
    }

    /// Get cache statistics as (hits, misses, hit rate)
    pub fn stats(&self) -> (usize, usize, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        (hits, misses, hit_rate)
    }

    /// Get the number of entries in the cache
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

/// Truncate text to a maximum number of characters with ellipsis
pub(crate) fn truncate_text(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_length).collect();
        format!("{}...", head)
    }
}

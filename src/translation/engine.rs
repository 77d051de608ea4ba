/*!
 * Cached, throttled and retried access to a translation backend.
 *
 * Lookup order for a span: in-memory cache, persistent cache, then one
 * upstream call per key. Every attempt takes a limiter token and is bounded
 * by the request timeout; failures are retried with capped exponential
 * backoff plus jitter.
 */

use log::{debug, warn};
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::cache::{CacheKey, TranslationCache, truncate_text};
use super::rate_limiter::RateLimiter;
use crate::app_config::Config;
use crate::database::{CacheRecord, Repository};
use crate::errors::TranslationError;
use crate::providers::Translator;

/// Whether a text contains anything worth sending to a backend
pub fn is_translatable(text: &str) -> bool {
    text.chars().any(char::is_alphabetic)
}

/// Retry settings of upstream calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first one included
    pub max_attempts: u32,
    /// Delay after the first failure, doubled after each further one
    pub base_delay: Duration,
    /// Upper bound of a single delay, jitter excluded
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, `attempt` being 1-based
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter_ms = (self.base_delay.as_millis() as u64 / 10).max(1);
        let jitter = rand::rng().random_range(0..=jitter_ms);
        delay + Duration::from_millis(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(8000),
        }
    }
}

/// Options of a translation engine
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub source_language: String,
    pub target_language: String,
    /// Skip cache reads; results are still written
    pub ignore_cache: bool,
    pub retry: RetryPolicy,
    /// Bound of each upstream call
    pub timeout: Duration,
}

impl EngineOptions {
    /// Create options for a language pair with default retry settings
    pub fn new(source_language: &str, target_language: &str) -> Self {
        Self {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            ignore_cache: false,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Build options from the run configuration
    pub fn from_config(config: &Config) -> Self {
        let translation = &config.translation;
        Self {
            source_language: config.source_language.clone(),
            target_language: config.target_language.clone(),
            ignore_cache: translation.ignore_cache,
            retry: RetryPolicy {
                max_attempts: translation.retry_count.max(1),
                base_delay: Duration::from_millis(translation.retry_backoff_ms),
                max_delay: Duration::from_millis(
                    translation.max_backoff_ms.max(translation.retry_backoff_ms),
                ),
            },
            timeout: Duration::from_secs(translation.timeout_secs.max(1)),
        }
    }
}

/// Translation entry point shared by all spans of a run
#[derive(Debug)]
pub struct TranslationEngine {
    translator: Arc<dyn Translator>,
    cache: Arc<TranslationCache>,
    limiter: Arc<RateLimiter>,
    repository: Option<Repository>,
    options: EngineOptions,
    engine_id: String,
    upstream_calls: AtomicUsize,
}

impl TranslationEngine {
    /// Create an engine over explicitly constructed shared components
    pub fn new(
        translator: Arc<dyn Translator>,
        cache: Arc<TranslationCache>,
        limiter: Arc<RateLimiter>,
        options: EngineOptions,
    ) -> Self {
        let engine_id = translator.engine_id();
        Self {
            translator,
            cache,
            limiter,
            repository: None,
            options,
            engine_id,
            upstream_calls: AtomicUsize::new(0),
        }
    }

    /// Attach a persistent cache
    pub fn with_repository(mut self, repository: Repository) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    /// Number of upstream attempts made so far
    pub fn upstream_calls(&self) -> usize {
        self.upstream_calls.load(Ordering::SeqCst)
    }

    /// Translate one text
    pub async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        if !is_translatable(text) {
            return Ok(text.to_string());
        }

        let key = CacheKey::new(
            text,
            &self.options.source_language,
            &self.options.target_language,
            &self.engine_id,
        );
        let read_cache = !self.options.ignore_cache;

        self.cache
            .get_or_compute(&key, read_cache, || self.resolve_miss(&key, read_cache))
            .await
    }

    async fn resolve_miss(&self, key: &CacheKey, read_cache: bool) -> Result<String, TranslationError> {
        if read_cache {
            if let Some(repository) = &self.repository {
                match repository
                    .get_cached_translation(
                        &key.source_text,
                        &key.source_language,
                        &key.target_language,
                        &key.engine,
                    )
                    .await
                {
                    Ok(Some(translation)) => return Ok(translation),
                    Ok(None) => {}
                    Err(e) => warn!("Persistent cache lookup failed: {}", e),
                }
            }
        }

        let translation = self.call_with_retry(&key.source_text).await?;

        if let Some(repository) = &self.repository {
            let record = CacheRecord::new(
                key.source_text.clone(),
                key.source_language.clone(),
                key.target_language.clone(),
                key.engine.clone(),
                translation.clone(),
            );
            if let Err(e) = repository.cache_translation(&record).await {
                warn!("Failed to store translation in persistent cache: {}", e);
            }
        }

        Ok(translation)
    }

    async fn call_with_retry(&self, text: &str) -> Result<String, TranslationError> {
        let retry = &self.options.retry;
        let mut last_error = String::new();

        for attempt in 1..=retry.max_attempts {
            self.limiter.acquire().await;
            self.upstream_calls.fetch_add(1, Ordering::SeqCst);

            let call = self.translator.translate(
                text,
                &self.options.source_language,
                &self.options.target_language,
            );
            match tokio::time::timeout(self.options.timeout, call).await {
                Ok(Ok(translation)) => {
                    debug!(
                        "Translated '{}' on attempt {}",
                        truncate_text(text, 30),
                        attempt
                    );
                    return Ok(translation);
                }
                Ok(Err(e)) if !e.is_retryable() => {
                    return Err(TranslationError::Provider(e));
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                }
                Err(_) => {
                    last_error =
                        TranslationError::Timeout(self.options.timeout.as_millis() as u64).to_string();
                }
            }

            warn!(
                "Translation attempt {}/{} failed: {}",
                attempt, retry.max_attempts, last_error
            );

            if attempt < retry.max_attempts {
                tokio::time::sleep(retry.backoff(attempt)).await;
            }
        }

        Err(TranslationError::RetriesExhausted {
            attempts: retry.max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_shouldDoubleAndCap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
        };
        let first = policy.backoff(1);
        let second = policy.backoff(2);
        let third = policy.backoff(3);

        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(110));
        assert!(second >= Duration::from_millis(200) && second <= Duration::from_millis(210));
        assert!(third >= Duration::from_millis(250) && third <= Duration::from_millis(260));
    }

    #[test]
    fn test_isTranslatable_withDigitsOnly_shouldBeFalse() {
        assert!(!is_translatable("12.5 %"));
        assert!(!is_translatable("  "));
        assert!(is_translatable("Figure 3"));
        assert!(is_translatable("图"));
    }
}

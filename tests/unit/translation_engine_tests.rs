/*!
 * Tests for the cached, throttled translation engine
 */

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use pdfbabel::database::Repository;
use pdfbabel::errors::TranslationError;
use pdfbabel::providers::{MockProvider, Translator};
use pdfbabel::translation::{RateLimiter, TranslationCache, TranslationEngine};

use crate::common::{engine, engine_options, init_logging};

#[tokio::test]
async fn test_translate_calledTwice_shouldHitCacheOnSecondCall() {
    init_logging();
    let provider = Arc::new(MockProvider::working());
    let engine = engine(provider.clone(), engine_options(3));

    let first = engine.translate("Hello world").await.unwrap();
    let second = engine.translate("Hello   world").await.unwrap();

    assert_eq!(first, "[fr] Hello world");
    assert_eq!(second, first);
    assert_eq!(provider.request_count(), 1);
    assert_eq!(engine.upstream_calls(), 1);
}

#[tokio::test]
async fn test_translate_withConcurrentIdenticalRequests_shouldCallUpstreamOnce() {
    let provider = Arc::new(MockProvider::slow(50));
    let engine = engine(provider.clone(), engine_options(3));

    let results = join_all((0..8).map(|_| engine.translate("Shared sentence"))).await;

    assert!(results
        .iter()
        .all(|r| matches!(r, Ok(text) if text == "[fr] Shared sentence")));
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn test_translate_withIgnoreCache_shouldCallUpstreamAgain() {
    let provider = Arc::new(MockProvider::working());
    let mut options = engine_options(3);
    options.ignore_cache = true;
    let engine = engine(provider.clone(), options);

    engine.translate("Hello").await.unwrap();
    engine.translate("Hello").await.unwrap();

    assert_eq!(provider.request_count(), 2);
    // Results are still written
    assert_eq!(engine.cache().len(), 1);
}

#[tokio::test]
async fn test_translate_withTransientFailures_shouldRetryAndSucceed() {
    let provider = Arc::new(MockProvider::fail_first(2));
    let engine = engine(provider.clone(), engine_options(3));

    let result = engine.translate("Retry me").await;

    assert_eq!(result.unwrap(), "[fr] Retry me");
    assert_eq!(provider.request_count(), 3);
}

#[tokio::test]
async fn test_translate_withFailingBackend_shouldStopAtRetryCeiling() {
    let provider = Arc::new(MockProvider::failing());
    let engine = engine(provider.clone(), engine_options(3));

    let result = engine.translate("Never translated").await;

    assert!(matches!(
        result,
        Err(TranslationError::RetriesExhausted { attempts: 3, .. })
    ));
    assert_eq!(provider.request_count(), 3);
    assert!(engine.cache().is_empty());
}

#[tokio::test]
async fn test_translate_withUntranslatableText_shouldSkipBackend() {
    let provider = Arc::new(MockProvider::working());
    let engine = engine(provider.clone(), engine_options(3));

    assert_eq!(engine.translate("42 + 17").await.unwrap(), "42 + 17");
    assert_eq!(provider.request_count(), 0);
}

#[tokio::test]
async fn test_translate_withPersistentCache_shouldServeNewEngine() {
    let repository = Repository::new_in_memory().unwrap();

    let provider = Arc::new(MockProvider::working());
    let first = TranslationEngine::new(
        provider.clone() as Arc<dyn Translator>,
        Arc::new(TranslationCache::new()),
        Arc::new(RateLimiter::new(100.0)),
        engine_options(1),
    )
    .with_repository(repository.clone());
    first.translate("Persisted sentence").await.unwrap();

    let second = TranslationEngine::new(
        provider.clone() as Arc<dyn Translator>,
        Arc::new(TranslationCache::new()),
        Arc::new(RateLimiter::new(100.0)),
        engine_options(1),
    )
    .with_repository(repository);
    let translation = second.translate("Persisted sentence").await.unwrap();

    assert_eq!(translation, "[fr] Persisted sentence");
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn test_translate_withSlowBackend_shouldTimeOutEachAttempt() {
    let provider = Arc::new(MockProvider::slow(200));
    let mut options = engine_options(2);
    options.timeout = Duration::from_millis(20);
    let engine = engine(provider.clone(), options);

    let result = engine.translate("Too slow").await;

    match result {
        Err(TranslationError::RetriesExhausted {
            attempts,
            last_error,
        }) => {
            assert_eq!(attempts, 2);
            assert!(last_error.contains("timed out after 20 ms"));
        }
        other => panic!("expected exhausted retries, got {:?}", other),
    }
    assert_eq!(provider.request_count(), 2);
    assert!(engine.cache().is_empty());
}

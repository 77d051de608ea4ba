/*!
 * Span translation: caching, throttling, retries and page-level fan-out.
 *
 * - `cache`: content-addressed in-memory cache with in-flight deduplication
 * - `rate_limiter`: token bucket shared by every caller of a run
 * - `engine`: cache -> persistent cache -> limiter -> backend, with retries
 * - `scheduler`: bounded fan-out over the spans of a page, order preserving
 */

pub mod cache;
pub mod engine;
pub mod rate_limiter;
pub mod scheduler;

pub use self::cache::{CacheKey, TranslationCache, normalize_text};
pub use self::engine::{EngineOptions, RetryPolicy, TranslationEngine, is_translatable};
pub use self::rate_limiter::RateLimiter;
pub use self::scheduler::TranslationScheduler;

/*!
 * Translation backends.
 *
 * - `openai`: OpenAI-compatible chat completions API (OpenAI, LM Studio)
 * - `mock`: scripted backends for tests and benchmarks
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::ProviderError;

/// Common trait for all translation backends
///
/// Implementations translate one text at a time; caching, throttling and
/// retries are layered on top by `translation::TranslationEngine`.
#[async_trait]
pub trait Translator: Send + Sync + Debug {
    /// Stable identifier of the engine and model, part of every cache key
    fn engine_id(&self) -> String;

    /// Translate a single text
    ///
    /// # Arguments
    /// * `text` - Source text, possibly containing `{vN}` placeholders
    /// * `source_language` - Source language code
    /// * `target_language` - Target language code
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, ProviderError>;

    /// Test the connection to the backend
    async fn test_connection(&self) -> Result<(), ProviderError>;
}

pub mod mock;
pub mod openai;

pub use self::mock::{MockBehavior, MockProvider};
pub use self::openai::OpenAI;

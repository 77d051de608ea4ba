/*!
 * Database record types.
 */

use serde::{Deserialize, Serialize};

/// Row of the persistent translation cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Database ID
    pub id: i64,
    /// SHA256 hash of the normalized source text
    pub source_text_hash: String,
    /// Normalized source text
    pub source_text: String,
    /// Source language code
    pub source_language: String,
    /// Target language code
    pub target_language: String,
    /// Engine identifier, e.g. `openai:gpt-4o-mini`
    pub engine: String,
    /// Translated text
    pub translated_text: String,
    /// Creation timestamp
    pub created_at: String,
    /// Number of cache hits
    pub hit_count: i64,
}

impl CacheRecord {
    /// Create a new cache record
    pub fn new(
        source_text: String,
        source_language: String,
        target_language: String,
        engine: String,
        translated_text: String,
    ) -> Self {
        Self {
            id: 0, // assigned by the database
            source_text_hash: super::Repository::hash_text(&source_text),
            source_text,
            source_language,
            target_language,
            engine,
            translated_text,
            created_at: chrono::Utc::now().to_rfc3339(),
            hit_count: 0,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Total number of cache entries
    pub total_entries: i64,
    /// Total number of cache hits
    pub total_hits: i64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache entries: {}, Hits: {}",
            self.total_entries, self.total_hits
        )
    }
}

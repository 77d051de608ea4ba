/*!
 * Repository layer for the persistent translation cache.
 */

use anyhow::Result;
use log::debug;
use rusqlite::{OptionalExtension, params};
use sha2::{Digest, Sha256};

use super::connection::DatabaseConnection;
use super::models::{CacheRecord, CacheStats};

/// Repository for database operations
#[derive(Clone, Debug)]
pub struct Repository {
    /// Database connection
    db: DatabaseConnection,
}

impl Repository {
    /// Create a new repository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository with the default database location
    pub fn new_default() -> Result<Self> {
        let db = DatabaseConnection::new_default()?;
        Ok(Self::new(db))
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = DatabaseConnection::new_in_memory()?;
        Ok(Self::new(db))
    }

    /// Compute SHA256 hash of text
    pub fn hash_text(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Get a cached translation
    pub async fn get_cached_translation(
        &self,
        source_text: &str,
        source_language: &str,
        target_language: &str,
        engine: &str,
    ) -> Result<Option<String>> {
        let source_text_hash = Self::hash_text(source_text);
        let source_language = source_language.to_string();
        let target_language = target_language.to_string();
        let engine = engine.to_string();

        self.db
            .execute_async(move |conn| {
                let result: Option<(i64, String)> = conn
                    .query_row(
                        r#"
                        SELECT id, translated_text
                        FROM translation_cache
                        WHERE source_text_hash = ?1
                          AND source_language = ?2
                          AND target_language = ?3
                          AND engine = ?4
                        "#,
                        params![source_text_hash, source_language, target_language, engine],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                if let Some((id, translated_text)) = result {
                    conn.execute(
                        "UPDATE translation_cache SET hit_count = hit_count + 1 WHERE id = ?1",
                        [id],
                    )?;
                    debug!("Persistent cache hit");
                    Ok(Some(translated_text))
                } else {
                    Ok(None)
                }
            })
            .await
    }

    /// Store a translation in the cache; an existing entry is left untouched
    pub async fn cache_translation(&self, record: &CacheRecord) -> Result<()> {
        let record = record.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO translation_cache (
                        source_text_hash, source_text, source_language, target_language,
                        engine, translated_text, created_at, hit_count
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(source_text_hash, source_language, target_language, engine)
                    DO NOTHING
                    "#,
                    params![
                        record.source_text_hash,
                        record.source_text,
                        record.source_language,
                        record.target_language,
                        record.engine,
                        record.translated_text,
                        record.created_at,
                        record.hit_count,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Get cache statistics
    pub async fn get_cache_stats(&self) -> Result<CacheStats> {
        self.db
            .execute_async(|conn| {
                let total_entries: i64 = conn
                    .query_row("SELECT COUNT(*) FROM translation_cache", [], |row| row.get(0))
                    .unwrap_or(0);

                let total_hits: i64 = conn
                    .query_row(
                        "SELECT COALESCE(SUM(hit_count), 0) FROM translation_cache",
                        [],
                        |row| row.get(0),
                    )
                    .unwrap_or(0);

                Ok(CacheStats {
                    total_entries,
                    total_hits,
                })
            })
            .await
    }

    /// Clear the translation cache
    pub async fn clear_cache(&self) -> Result<i64> {
        self.db
            .execute_async(|conn| {
                let deleted = conn.execute("DELETE FROM translation_cache", [])?;
                Ok(deleted as i64)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_repo() -> Repository {
        Repository::new_in_memory().expect("Failed to create test repository")
    }

    fn record(text: &str, translated: &str) -> CacheRecord {
        CacheRecord::new(
            text.to_string(),
            "en".to_string(),
            "fr".to_string(),
            "mock".to_string(),
            translated.to_string(),
        )
    }

    #[tokio::test]
    async fn test_cacheTranslation_shouldStoreAndRetrieve() {
        let repo = create_test_repo();

        repo.cache_translation(&record("Hello", "Bonjour"))
            .await
            .expect("Failed to cache");

        let cached = repo
            .get_cached_translation("Hello", "en", "fr", "mock")
            .await
            .expect("Failed to get cached");
        assert_eq!(cached.as_deref(), Some("Bonjour"));

        let other_engine = repo
            .get_cached_translation("Hello", "en", "fr", "openai:gpt-4o-mini")
            .await
            .unwrap();
        assert!(other_engine.is_none());
    }

    #[tokio::test]
    async fn test_cacheTranslation_withExistingKey_shouldKeepFirstValue() {
        let repo = create_test_repo();

        repo.cache_translation(&record("Test", "Essai")).await.unwrap();
        repo.cache_translation(&record("Test", "Autre")).await.unwrap();

        let cached = repo
            .get_cached_translation("Test", "en", "fr", "mock")
            .await
            .unwrap();
        assert_eq!(cached.as_deref(), Some("Essai"));

        let stats = repo.get_cache_stats().await.unwrap();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.total_hits, 1);
    }

    #[tokio::test]
    async fn test_clearCache_shouldRemoveEntries() {
        let repo = create_test_repo();
        repo.cache_translation(&record("One", "Un")).await.unwrap();
        repo.cache_translation(&record("Two", "Deux")).await.unwrap();

        assert_eq!(repo.clear_cache().await.unwrap(), 2);
        assert_eq!(repo.get_cache_stats().await.unwrap().total_entries, 0);
    }

    #[test]
    fn test_hashText_shouldProduceConsistentHash() {
        let hash1 = Repository::hash_text("Hello, World!");
        let hash2 = Repository::hash_text("Hello, World!");
        let hash3 = Repository::hash_text("Different text");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64);
    }
}

/*!
 * Schema of the persistent translation cache.
 *
 * The version lives in SQLite's `user_version` header field. A file written
 * by a newer release is refused rather than downgraded.
 */

use anyhow::{Context, Result, bail};
use log::{debug, info};
use rusqlite::Connection;

/// Version written by this release
pub const CACHE_SCHEMA_VERSION: i32 = 1;

const CACHE_TABLES: &str = r#"
    CREATE TABLE IF NOT EXISTS translation_cache (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_text_hash TEXT NOT NULL,
        source_text TEXT NOT NULL,
        source_language TEXT NOT NULL,
        target_language TEXT NOT NULL,
        engine TEXT NOT NULL,
        translated_text TEXT NOT NULL,
        created_at TEXT NOT NULL,
        hit_count INTEGER DEFAULT 0,
        UNIQUE(source_text_hash, source_language, target_language, engine)
    );

    CREATE INDEX IF NOT EXISTS idx_cache_key
        ON translation_cache(source_text_hash, source_language, target_language, engine);
"#;

/// Prepare a freshly opened cache file
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    // Several runs may share one cache file
    conn.execute_batch("PRAGMA journal_mode=WAL;")
        .context("Failed to enable WAL journal")?;

    match stored_version(conn)? {
        0 => {
            conn.execute_batch(CACHE_TABLES)
                .context("Failed to create translation cache tables")?;
            conn.pragma_update(None, "user_version", CACHE_SCHEMA_VERSION)?;
            info!("Created translation cache schema v{}", CACHE_SCHEMA_VERSION);
        }
        CACHE_SCHEMA_VERSION => debug!("Translation cache schema v{}", CACHE_SCHEMA_VERSION),
        other => bail!(
            "Translation cache schema v{} is newer than supported v{}; remove the cache file to rebuild it",
            other,
            CACHE_SCHEMA_VERSION
        ),
    }
    Ok(())
}

fn stored_version(conn: &Connection) -> Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("Failed to read cache schema version")
}

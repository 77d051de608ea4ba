/*!
 * SQLite connection of the persistent translation cache.
 *
 * One connection is shared by every clone behind a mutex. Async callers go
 * through `execute_async`, which moves the query to the blocking pool.
 */

use anyhow::{Context, Result};
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::schema;
use crate::file_utils::FileManager;

/// Handle on the cache database
#[derive(Clone)]
pub struct DatabaseConnection {
    location: PathBuf,
    connection: Arc<Mutex<Connection>>,
}

impl fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DatabaseConnection").field(&self.location).finish()
    }
}

impl DatabaseConnection {
    fn wrap(location: PathBuf, conn: Connection) -> Result<Self> {
        schema::initialize_schema(&conn)
            .with_context(|| format!("Unusable translation cache {:?}", location))?;
        Ok(Self {
            location,
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open the cache in the user cache directory
    pub fn new_default() -> Result<Self> {
        Self::new(FileManager::default_cache_path()?)
    }

    /// Open or create the cache file at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let location = path.as_ref().to_path_buf();
        if let Some(parent) = location.parent() {
            FileManager::ensure_dir(parent)
                .with_context(|| format!("Cannot create cache directory {:?}", parent))?;
        }

        let conn = Connection::open(&location)
            .with_context(|| format!("Cannot open translation cache {:?}", location))?;
        info!("Using translation cache {:?}", location);
        Self::wrap(location, conn)
    }

    /// Throwaway cache, used by tests
    pub fn new_in_memory() -> Result<Self> {
        debug!("Opening in-memory translation cache");
        let conn = Connection::open_in_memory().context("Cannot open in-memory cache")?;
        Self::wrap(PathBuf::from(":memory:"), conn)
    }

    pub fn path(&self) -> &Path {
        &self.location
    }

    /// Run `f` on the blocking pool with exclusive access to the connection
    pub async fn execute_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let conn = connection.lock();
            f(&conn)
        })
        .await
        .context("Cache query task failed")?
    }
}

//! SQLite cache of folder bookkeeping, messages and MIME parts.
//!
//! This module is split into:
//! - `mod.rs` - Cache struct, connection pool, [`LocalStorage`] implementation
//! - `schema.rs` - Database schema initialization
//! - `folder.rs` - Per-folder handle implementing [`LocalFolder`]
//! - `message.rs` - Message and part row operations

mod folder;
mod message;
mod schema;

pub use folder::{CacheFolder, FolderState};
pub use message::{StoredMessage, StoredPart};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{CACHE_BUSY_TIMEOUT_SECS, CACHE_POOL_SIZE};
use crate::local::{LocalFolder, LocalStorage};

pub struct Cache {
    pool: SqlitePool,
    /// Visible limit given to folders created by this cache.
    default_visible_limit: i32,
}

impl Cache {
    /// Get a reference to the connection pool (for tests and advanced usage).
    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl Cache {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", path.display());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(CACHE_BUSY_TIMEOUT_SECS))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(CACHE_POOL_SIZE)
            .connect_with(options)
            .await
            .context("Failed to create connection pool")?;

        schema::init_schema(&pool).await?;
        tracing::debug!("Opened message cache at {}", path.display());

        Ok(Self {
            pool,
            default_visible_limit: -1,
        })
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to create in-memory connection pool")?;

        schema::init_schema(&pool).await?;

        Ok(Self {
            pool,
            default_visible_limit: -1,
        })
    }

    /// Folders created from now on start with this visible limit. Negative
    /// leaves the choice to the sync configuration.
    pub fn with_default_visible_limit(mut self, limit: i32) -> Self {
        self.default_visible_limit = limit;
        self
    }

    /// Get a folder handle, creating its bookkeeping row on first use.
    pub async fn open_folder(&self, server_id: &str) -> Result<CacheFolder> {
        sqlx::query("INSERT OR IGNORE INTO folders (server_id, name, visible_limit) VALUES (?, ?, ?)")
            .bind(server_id)
            .bind(server_id)
            .bind(self.default_visible_limit)
            .execute(&self.pool)
            .await?;

        Ok(CacheFolder::new(self.pool.clone(), server_id))
    }

    /// Server ids of every folder known to the cache.
    pub async fn folders(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT server_id FROM folders ORDER BY server_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}

#[async_trait]
impl LocalStorage for Cache {
    async fn folder(&self, server_id: &str) -> Result<Box<dyn LocalFolder>> {
        Ok(Box::new(self.open_folder(server_id).await?))
    }
}

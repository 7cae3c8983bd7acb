//! SqliteKeyValueStore - ICursorStore implementation backed by SQLite
//!
//! Writes are staged in memory and applied in a single transaction on
//! [`ICursorStore::commit`]. Reads consult the staged writes first so the
//! engine observes its own uncommitted cursor.

use std::collections::BTreeMap;

use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::debug;

use onemirror_core::ports::ICursorStore;

use crate::CacheError;

/// A staged write: `Some(value)` replaces, `None` deletes
type Staged = BTreeMap<String, Option<String>>;

/// Durable string map over the `map` table
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
    staged: Mutex<Staged>,
}

impl SqliteKeyValueStore {
    /// Creates a store over an already-migrated pool
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            staged: Mutex::new(Staged::new()),
        }
    }

    /// Number of writes waiting for commit
    pub async fn pending(&self) -> usize {
        self.staged.lock().await.len()
    }

    /// Drops all staged writes without applying them
    pub async fn discard(&self) {
        self.staged.lock().await.clear();
    }

    /// Lists committed keys, sorted
    pub async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let keys = sqlx::query_scalar::<_, String>("SELECT key FROM map ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(keys)
    }

    async fn read_committed(&self, key: &str) -> Result<Option<String>, CacheError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM map WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn apply(&self, staged: &Staged) -> Result<(), CacheError> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in staged {
            match value {
                Some(value) => {
                    sqlx::query("REPLACE INTO map (key, value) VALUES (?, ?)")
                        .bind(key)
                        .bind(value)
                        .execute(&mut *tx)
                        .await?;
                }
                None => {
                    sqlx::query("DELETE FROM map WHERE key = ?")
                        .bind(key)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ICursorStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        if let Some(staged) = self.staged.lock().await.get(key) {
            return Ok(staged.clone());
        }
        Ok(self.read_committed(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.staged
            .lock()
            .await
            .insert(key.to_string(), Some(value.to_string()));
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.staged.lock().await.insert(key.to_string(), None);
        Ok(())
    }

    async fn commit(&self) -> anyhow::Result<()> {
        let mut staged = self.staged.lock().await;
        if staged.is_empty() {
            return Ok(());
        }
        self.apply(&staged).await?;
        debug!(writes = staged.len(), "Committed state");
        staged.clear();
        Ok(())
    }
}

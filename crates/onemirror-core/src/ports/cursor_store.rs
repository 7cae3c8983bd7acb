//! Cursor/credential store port (driven/secondary port)
//!
//! A durable mapping from string key to string value. Writes are staged
//! and only become durable on [`ICursorStore::commit`], so a caller can
//! group a cursor update with other writes.
//!
//! Uses `anyhow::Result` because storage errors are adapter-specific and
//! are never classified by the engine; they always abort the pass.

/// Port trait for the key/value store holding the feed cursor and tokens
#[async_trait::async_trait]
pub trait ICursorStore: Send + Sync {
    /// Read a value, seeing staged writes that are not yet committed
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Stage a value for `key`
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Stage the removal of `key`
    async fn remove(&self, key: &str) -> anyhow::Result<()>;

    /// Durably apply all staged writes
    async fn commit(&self) -> anyhow::Result<()>;
}

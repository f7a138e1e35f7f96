//! Key-value store trait and the in-memory implementation.
//!
//! All service state (blacklist, API keys, operation logs) lives in a
//! single durable key-value namespace behind this trait. The SQLite
//! implementation is in [`super::sqlite`]; `MemoryKv` backs tests and
//! local development.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::{Result, StoreError};

/// Async key-value namespace.
///
/// `get` returns `Ok(None)` for an absent key; `NotFound` is reserved for
/// adapters layered on top that promise a record exists.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: String) -> Result<()>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List all keys with the given prefix, ascending.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Cheap connectivity probe.
    async fn ping(&self) -> Result<()> {
        self.get("__ping__").await.map(|_| ())
    }
}

/// In-memory store for tests and development.
pub struct MemoryKv {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, String>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, String>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        self.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.write().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

/// Wraps a store and bounds every call with a timeout.
///
/// An elapsed timer surfaces as `StoreError::Unavailable`, matching the
/// taxonomy callers already handle for a down backend.
pub struct TimedKv<S> {
    inner: S,
    timeout: Duration,
}

impl<S: KvStore> TimedKv<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Default request-level timeout for store calls.
    pub fn with_default_timeout(inner: S) -> Self {
        Self::new(inner, Duration::from_secs(5))
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StoreError::Unavailable("store call timed out".to_string()))?
    }
}

#[async_trait]
impl<S: KvStore> KvStore for TimedKv<S> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.bounded(self.inner.get(key)).await
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        self.bounded(self.inner.put(key, value)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.bounded(self.inner.delete(key)).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.bounded(self.inner.list(prefix)).await
    }

    async fn ping(&self) -> Result<()> {
        self.bounded(self.inner.ping()).await
    }
}

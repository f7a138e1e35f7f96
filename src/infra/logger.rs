//! Operation logger.
//!
//! Persists [`LogEntry`] records to the key-value store. Logging is a
//! side channel: `record` never returns an error to the caller, and the
//! fire-and-forget variant detaches the write from the request entirely.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::{timestamp_from_key, LogDraft, LogEntry, OperationType, LOG_PREFIX};

use super::{KvStore, Result};

/// Structured, append-only operation log over the KV store.
#[derive(Clone)]
pub struct OperationLogger {
    store: Arc<dyn KvStore>,
}

impl OperationLogger {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Build and persist a log entry. Failures are swallowed: the log
    /// must never block or fail the request it is attached to.
    pub async fn record(&self, draft: LogDraft) {
        let entry = draft.build_at(Utc::now());

        match serde_json::to_string(&entry) {
            Ok(json) => {
                if let Err(err) = self.store.put(&entry.id, json).await {
                    tracing::warn!(id = %entry.id, error = %err, "failed to persist log entry");
                } else {
                    self.mirror(&entry);
                }
            }
            Err(err) => {
                tracing::warn!(id = %entry.id, error = %err, "failed to serialize log entry");
            }
        }
    }

    /// Persist an entry on a detached task, decoupled from the
    /// request/response lifecycle.
    pub fn record_detached(&self, draft: LogDraft) {
        let logger = self.clone();
        tokio::spawn(async move {
            logger.record(draft).await;
        });
    }

    /// Convenience: record a successful operation with details.
    pub async fn success(&self, operation: OperationType, details: serde_json::Value) {
        self.record(LogDraft::new(operation).details(details)).await;
    }

    /// Convenience: record a failed operation with details.
    pub async fn failure(
        &self,
        operation: OperationType,
        error: &str,
        details: serde_json::Value,
    ) {
        self.record(LogDraft::new(operation).details(details).failed(error))
            .await;
    }

    /// Read every stored entry, skipping records that no longer parse.
    pub async fn read_all(&self) -> Result<Vec<LogEntry>> {
        let keys = self.store.list(LOG_PREFIX).await?;
        let mut entries = Vec::with_capacity(keys.len());

        for key in keys {
            match self.store.get(&key).await? {
                Some(json) => match serde_json::from_str::<LogEntry>(&json) {
                    Ok(entry) => entries.push(entry),
                    Err(err) => {
                        tracing::warn!(key = %key, error = %err, "skipping unparseable log entry");
                    }
                },
                None => {} // deleted between list and get
            }
        }

        Ok(entries)
    }

    /// Delete every entry older than `retention_days`. Returns the number
    /// of deleted entries. The timestamp is read from the key, so the
    /// sweep never needs to parse entry bodies.
    pub async fn sweep(&self, retention_days: i64) -> Result<u64> {
        let cutoff = Utc::now().timestamp_millis() - retention_days * 24 * 60 * 60 * 1000;
        let keys = self.store.list(LOG_PREFIX).await?;

        let mut deleted = 0u64;
        for key in keys {
            let Some(ts) = timestamp_from_key(&key) else {
                continue;
            };
            if ts < cutoff {
                self.store.delete(&key).await?;
                deleted += 1;
            }
        }

        if deleted > 0 {
            tracing::info!(deleted, retention_days, "swept expired log entries");
        }

        Ok(deleted)
    }

    /// Delete every entry unconditionally. Returns the number deleted.
    pub async fn clear_all(&self) -> Result<u64> {
        let keys = self.store.list(LOG_PREFIX).await?;

        let mut deleted = 0u64;
        for key in keys {
            self.store.delete(&key).await?;
            deleted += 1;
        }

        Ok(deleted)
    }

    fn mirror(&self, entry: &LogEntry) {
        match entry.status {
            crate::domain::OperationStatus::Failed => {
                tracing::warn!(
                    operation = %entry.operation,
                    operator = %entry.operator,
                    error = ?entry.error.as_ref().map(|e| &e.message),
                    "operation log entry (failed)"
                );
            }
            _ => {
                tracing::debug!(
                    operation = %entry.operation,
                    operator = %entry.operator,
                    "operation log entry"
                );
            }
        }
    }
}

//! API key records and the KV-backed key store adapter.
//!
//! Keys live under the `apikey:` prefix; a separate index record
//! (`apikey:list`) enumerates all known key strings so listing never
//! needs a full scan. Index maintenance is best-effort: a failed index
//! write is logged but never fails the primary operation.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::infra::{KvStore, Result, StoreError};

use super::Permissions;

/// Store key prefix for API key records.
pub const API_KEY_PREFIX: &str = "apikey:";

/// Store key for the index listing all key strings.
pub const API_KEY_INDEX: &str = "apikey:list";

/// Prefix on generated key strings.
pub const GENERATED_KEY_PREFIX: &str = "bg_";

/// A stored API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRecord {
    /// The opaque key string (caller-supplied or generated).
    pub key: String,

    /// Human note describing the key's purpose.
    #[serde(default)]
    pub note: String,

    /// Granted permission flags. A record with no permissions object is
    /// never authorized for any scoped operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,

    pub created_at: DateTime<Utc>,

    /// Optional expiry; an expired key is rejected regardless of flags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,

    /// Operator that issued the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl ApiKeyRecord {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            note: String::new(),
            permissions: None,
            created_at: Utc::now(),
            expiry_date: None,
            created_by: None,
        }
    }

    /// True when `expiry_date` is set and in the past.
    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiry_date, Some(expiry) if expiry <= now)
    }
}

/// Generate a fresh opaque key string.
pub fn generate_key() -> String {
    let random_bytes: [u8; 24] = rand::thread_rng().gen();
    format!(
        "{}{}",
        GENERATED_KEY_PREFIX,
        URL_SAFE_NO_PAD.encode(random_bytes)
    )
}

/// Shortened key form safe to put in logs.
pub fn key_preview(key: &str) -> String {
    if key.len() > 4 {
        format!("{}...", &key[..4])
    } else {
        key.to_string()
    }
}

/// KV-backed record store for API keys.
#[derive(Clone)]
pub struct ApiKeyStore {
    kv: Arc<dyn KvStore>,
}

impl ApiKeyStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn record_key(key: &str) -> String {
        format!("{API_KEY_PREFIX}{key}")
    }

    /// Fetch a single record by exact key string.
    pub async fn get(&self, key: &str) -> Result<ApiKeyRecord> {
        let stored = self.kv.get(&Self::record_key(key)).await?;
        let json = stored.ok_or_else(|| StoreError::NotFound(key_preview(key)))?;
        serde_json::from_str(&json).map_err(|err| StoreError::Corrupt {
            key: Self::record_key(key),
            reason: err.to_string(),
        })
    }

    /// Upsert a record and keep the index in sync (best-effort).
    pub async fn put(&self, record: &ApiKeyRecord) -> Result<()> {
        let json = serde_json::to_string(record).map_err(|err| StoreError::Corrupt {
            key: Self::record_key(&record.key),
            reason: err.to_string(),
        })?;
        self.kv.put(&Self::record_key(&record.key), json).await?;

        if let Err(err) = self.index_add(&record.key).await {
            tracing::warn!(key = %key_preview(&record.key), error = %err, "API key index update failed");
        }
        Ok(())
    }

    /// Delete a record and remove it from the index (best-effort).
    /// Fails with `NotFound` when the record does not exist.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let record_key = Self::record_key(key);
        if self.kv.get(&record_key).await?.is_none() {
            return Err(StoreError::NotFound(key_preview(key)));
        }
        self.kv.delete(&record_key).await?;

        if let Err(err) = self.index_remove(key).await {
            tracing::warn!(key = %key_preview(key), error = %err, "API key index removal failed");
        }
        Ok(())
    }

    /// List every record via the index, skipping dangling index entries
    /// whose primary record is gone.
    pub async fn list(&self) -> Result<Vec<ApiKeyRecord>> {
        let keys = self.read_index().await?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            match self.get(&key).await {
                Ok(record) => records.push(record),
                Err(StoreError::NotFound(_)) => {}
                Err(StoreError::Corrupt { key, reason }) => {
                    tracing::warn!(%key, %reason, "skipping corrupt API key record");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(records)
    }

    async fn read_index(&self) -> Result<Vec<String>> {
        match self.kv.get(API_KEY_INDEX).await? {
            Some(json) => serde_json::from_str(&json).map_err(|err| StoreError::Corrupt {
                key: API_KEY_INDEX.to_string(),
                reason: err.to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }

    async fn write_index(&self, keys: &[String]) -> Result<()> {
        let json = serde_json::to_string(keys).map_err(|err| StoreError::Corrupt {
            key: API_KEY_INDEX.to_string(),
            reason: err.to_string(),
        })?;
        self.kv.put(API_KEY_INDEX, json).await
    }

    async fn index_add(&self, key: &str) -> Result<()> {
        let mut keys = self.read_index().await?;
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
            self.write_index(&keys).await?;
        }
        Ok(())
    }

    async fn index_remove(&self, key: &str) -> Result<()> {
        let mut keys = self.read_index().await?;
        let before = keys.len();
        keys.retain(|k| k != key);
        if keys.len() != before {
            self.write_index(&keys).await?;
        }
        Ok(())
    }
}

//! Shared request and response types for the REST handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Permissions;
use crate::domain::LogEntry;

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<VerifiedUser>,
}

#[derive(Debug, Serialize)]
pub struct VerifiedUser {
    pub username: String,
    pub role: String,
}

// ============================================================================
// API keys
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKeyRequest {
    /// Caller-supplied key string; generated when absent.
    #[serde(default, alias = "name")]
    pub key: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub permissions: Option<Permissions>,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateApiKeyRequest {
    pub key: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub permissions: Option<Permissions>,
    /// `Some(None)` clears the expiry; absent leaves it unchanged.
    #[serde(default, with = "double_option")]
    pub expiry_date: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteApiKeyRequest {
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyMutationResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListApiKeysResponse {
    pub success: bool,
    pub keys: Vec<crate::auth::ApiKeyRecord>,
}

// ============================================================================
// Blacklist
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct IpRequest {
    pub ip: String,
}

#[derive(Debug, Serialize)]
pub struct BlacklistMutationResponse {
    pub success: bool,
    pub message: String,
    pub count: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckQuery {
    #[serde(default)]
    pub ip: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub ip: String,
    pub blocked: bool,
    pub message: String,
}

// ============================================================================
// Logs
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogListQuery {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
    /// Unix milliseconds.
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub operation_type: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    // advanced-only filters
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
    /// Shorthand window: `1h`, `6h`, `12h`, `24h`, `3d`, `7d`, `30d`.
    #[serde(default)]
    pub time_range: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogListResponse {
    pub success: bool,
    pub data: LogPage,
}

#[derive(Debug, Serialize)]
pub struct LogPage {
    pub logs: Vec<LogEntry>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub has_more: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupQuery {
    #[serde(default)]
    pub retention_days: Option<i64>,
    #[serde(default)]
    pub clear_all: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub success: bool,
    pub message: String,
    pub deleted_count: u64,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub connected: bool,
    pub message: String,
}

/// Distinguishes "field absent" from "field set to null" for updates.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

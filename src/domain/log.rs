//! Operation log entries.
//!
//! Every authorization decision and mutating operation produces one
//! immutable entry, keyed in the store by a time-derived id so that a
//! prefix scan yields entries in rough chronological order.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Store key prefix for log entries.
pub const LOG_PREFIX: &str = "log:";

/// Operation types recorded in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    // Blacklist
    BlacklistAdd,
    BlacklistRemove,
    BlacklistCheck,
    BlacklistGet,

    // API keys
    ApikeyCreate,
    ApikeyDelete,
    ApikeyUpdate,
    ApikeyList,
    ApiKeyVerification,

    // Auth
    Authentication,
    AuthLogin,
    AuthTokenVerify,
    PermissionCheck,

    // Logs
    LogsView,
    LogsCleanup,
    LogsClearAll,

    // System
    SystemError,

    #[serde(untagged)]
    Custom(String),
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::BlacklistAdd => write!(f, "blacklist_add"),
            OperationType::BlacklistRemove => write!(f, "blacklist_remove"),
            OperationType::BlacklistCheck => write!(f, "blacklist_check"),
            OperationType::BlacklistGet => write!(f, "blacklist_get"),
            OperationType::ApikeyCreate => write!(f, "apikey_create"),
            OperationType::ApikeyDelete => write!(f, "apikey_delete"),
            OperationType::ApikeyUpdate => write!(f, "apikey_update"),
            OperationType::ApikeyList => write!(f, "apikey_list"),
            OperationType::ApiKeyVerification => write!(f, "api_key_verification"),
            OperationType::Authentication => write!(f, "authentication"),
            OperationType::AuthLogin => write!(f, "auth_login"),
            OperationType::AuthTokenVerify => write!(f, "auth_token_verify"),
            OperationType::PermissionCheck => write!(f, "permission_check"),
            OperationType::LogsView => write!(f, "logs_view"),
            OperationType::LogsCleanup => write!(f, "logs_cleanup"),
            OperationType::LogsClearAll => write!(f, "logs_clear_all"),
            OperationType::SystemError => write!(f, "system_error"),
            OperationType::Custom(s) => write!(f, "{}", s),
        }
    }
}

/// Outcome recorded for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    Failed,
    Pending,
    Cancelled,
    Timeout,
}

/// Error details attached to a failed entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogErrorInfo {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Request metadata captured alongside an entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMeta {
    pub method: String,
    pub path: String,
    pub ip: String,
    pub user_agent: String,
}

/// A complete, immutable log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Store key, `log:<millis>_<suffix>`.
    pub id: String,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub operation: OperationType,
    /// Identity that performed the operation; `"system"` when unauthenticated.
    pub operator: String,
    pub status: OperationStatus,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<LogErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestMeta>,
    pub formatted_time: String,
}

/// Partial entry assembled by callers; the logger fills in id and times.
#[derive(Debug, Clone)]
pub struct LogDraft {
    pub operation: OperationType,
    pub operator: String,
    pub status: OperationStatus,
    pub message: Option<String>,
    pub details: serde_json::Value,
    pub error: Option<LogErrorInfo>,
    pub request: Option<RequestMeta>,
}

impl LogDraft {
    pub fn new(operation: OperationType) -> Self {
        Self {
            operation,
            operator: "system".to_string(),
            status: OperationStatus::Success,
            message: None,
            details: serde_json::Value::Null,
            error: None,
            request: None,
        }
    }

    pub fn operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = operator.into();
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn request(mut self, meta: RequestMeta) -> Self {
        self.request = Some(meta);
        self
    }

    /// Mark the draft failed with an error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.status = OperationStatus::Failed;
        self.error = Some(LogErrorInfo {
            message: error.into(),
            code: None,
        });
        self
    }

    /// Finalize into a full entry stamped with the given time.
    pub fn build_at(self, now: DateTime<Utc>) -> LogEntry {
        let timestamp = now.timestamp_millis();
        LogEntry {
            id: log_id(timestamp),
            timestamp,
            message: self
                .message
                .unwrap_or_else(|| format!("operation: {}", self.operation)),
            operation: self.operation,
            operator: self.operator,
            status: self.status,
            details: self.details,
            error: self.error,
            request: self.request,
            formatted_time: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Build a unique log id: timestamp plus a short random suffix to avoid
/// collisions between entries written in the same millisecond.
fn log_id(timestamp_millis: i64) -> String {
    const CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("{}{}_{}", LOG_PREFIX, timestamp_millis, suffix)
}

/// Parse the millisecond timestamp out of a log key.
pub fn timestamp_from_key(key: &str) -> Option<i64> {
    let rest = key.strip_prefix(LOG_PREFIX)?;
    let millis = rest.split('_').next()?;
    millis.parse().ok()
}

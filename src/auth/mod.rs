//! Authentication and authorization.
//!
//! Two credential types guard the HTTP surface:
//!
//! - **Bearer tokens**: HMAC-SHA256 signed session tokens issued at admin
//!   login, validated statelessly (no server-side revocation).
//! - **API keys**: opaque strings stored in the KV namespace, each scoped
//!   to a set of named permission flags and an optional expiry.
//!
//! The [`gate`] middleware classifies every inbound path, runs the
//! matching credential flow, records the decision in the operation log,
//! and attaches the resulting [`Identity`] to the request.

mod api_key;
mod gate;
mod policy;
mod token;

pub use api_key::*;
pub use gate::*;
pub use policy::*;
pub use token::*;

use serde::{Deserialize, Serialize};

/// A named capability attached to an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    List,
    Add,
    Delete,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::Read => write!(f, "read"),
            Permission::List => write!(f, "list"),
            Permission::Add => write!(f, "add"),
            Permission::Delete => write!(f, "delete"),
        }
    }
}

/// Permission flags granted to an API key.
///
/// Deserialization is deliberately lenient: a flag counts as granted only
/// when it is exactly boolean `true` in the stored JSON; anything else
/// (absent, `false`, a string, a number) reads as not granted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Permissions {
    pub read: bool,
    pub list: bool,
    pub add: bool,
    pub delete: bool,
}

impl Permissions {
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    pub fn full() -> Self {
        Self {
            read: true,
            list: true,
            add: true,
            delete: true,
        }
    }

    pub fn allows(&self, permission: Permission) -> bool {
        match permission {
            Permission::Read => self.read,
            Permission::List => self.list,
            Permission::Add => self.add,
            Permission::Delete => self.delete,
        }
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let map = serde_json::Map::deserialize(deserializer)?;
        let granted = |name: &str| map.get(name) == Some(&serde_json::Value::Bool(true));
        Ok(Self {
            read: granted("read"),
            list: granted("list"),
            add: granted("add"),
            delete: granted("delete"),
        })
    }
}

/// Identity attached to a request after the gate admits it.
#[derive(Debug, Clone)]
pub enum Identity {
    /// Admin session authenticated with a bearer token.
    Admin { username: String, role: String },
    /// Machine caller authenticated with an API key.
    ApiKey { key: String, record: ApiKeyRecord },
}

impl Identity {
    /// Operator string recorded in the log for this identity.
    pub fn operator(&self) -> String {
        match self {
            Identity::Admin { username, .. } => username.clone(),
            Identity::ApiKey { key, .. } => api_key::key_preview(key),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Identity::Admin { role, .. } if role == "admin")
    }
}

/// Request extension wrapper for [`Identity`].
#[derive(Debug, Clone)]
pub struct AuthIdentity(pub Identity);

/// Authentication/authorization failure.
///
/// The display string doubles as the client-facing message, so token
/// errors stay generic: decode failures all read "invalid token".
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("API key missing")]
    MissingApiKey,

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("API key expired")]
    ApiKeyExpired,

    #[error("missing required permission: {0}")]
    InsufficientPermissions(Permission),

    #[error("authentication token missing")]
    MissingToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("storage unavailable")]
    StoreUnavailable,
}

//! blackgate
//!
//! Edge-hosted IP blacklist administration service.
//!
//! ## Modules
//!
//! - [`domain`] - Core types (blacklist, operation log entries)
//! - [`infra`] - Key-value store implementations and the operation logger
//! - [`auth`] - Token codec, API keys, route policy, and the request gate
//! - [`api`] - REST routes, handlers, and structured errors
//! - [`server`] - Configuration and HTTP server bootstrap

pub mod api;
pub mod auth;
pub mod domain;
pub mod infra;
pub mod server;

// Re-export commonly used types
pub use auth::{
    ApiKeyRecord, ApiKeyStore, AuthIdentity, Claims, GateConfig, GateDefault, GateState, Identity,
    Permission, Permissions, RoutePolicy,
};
pub use domain::{Blacklist, LogDraft, LogEntry, OperationStatus, OperationType};
pub use infra::{KvStore, MemoryKv, OperationLogger, SqliteKv, StoreError, TimedKv};

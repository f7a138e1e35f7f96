//! HTTP server bootstrap.
//!
//! Wires together configuration, the durable key-value store, the auth
//! gate, and the Axum router.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use crate::auth::{auth_gate, ApiKeyStore, GateConfig, GateDefault, GateState};
use crate::infra::{KvStore, OperationLogger, SqliteKv, TimedKv};

/// Fallback signing secret, kept for compatibility with the original
/// deployment. Production must set JWT_SECRET.
const DEFAULT_JWT_SECRET: &str = "your-secret-key";

/// Default admin session lifetime: 24 hours.
const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path.
    pub database_path: String,
    /// Server listen address.
    pub listen_addr: SocketAddr,
    /// Log entries older than this many days are swept.
    pub log_retention_days: i64,
    /// Whether unclassified paths are forwarded without auth.
    pub gate_default: GateDefault,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let database_path =
            std::env::var("BLACKGATE_DB").unwrap_or_else(|_| "blackgate.db".to_string());

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .expect("Invalid listen address");

        let log_retention_days = std::env::var("LOG_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let gate_default = match std::env::var("GATE_DEFAULT_ALLOW").as_deref() {
            Ok("0") | Ok("false") | Ok("off") => GateDefault::Deny,
            _ => GateDefault::Allow,
        };

        Self {
            database_path,
            listen_addr,
            log_retention_days,
            gate_default,
        }
    }
}

/// Credentials and token parameters.
#[derive(Clone)]
pub struct AuthSettings {
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub token_secret: Vec<u8>,
    pub token_ttl_secs: i64,
}

impl AuthSettings {
    /// Load from environment variables, falling back to the historical
    /// insecure default secret (logged loudly).
    pub fn from_env() -> Self {
        let token_secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret.into_bytes(),
            _ => {
                warn!("JWT_SECRET is not set; using the insecure built-in default");
                DEFAULT_JWT_SECRET.as_bytes().to_vec()
            }
        };

        Self {
            admin_username: std::env::var("ADMIN_USERNAME").ok().filter(|v| !v.is_empty()),
            admin_password: std::env::var("ADMIN_PASSWORD").ok().filter(|v| !v.is_empty()),
            token_secret,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        }
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub kv: Arc<dyn KvStore>,
    pub keys: ApiKeyStore,
    pub logger: OperationLogger,
    pub auth: Arc<AuthSettings>,
    pub log_retention_days: i64,
}

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting blackgate v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    info!("  Listen address: {}", config.listen_addr);
    info!("  Database: {}", config.database_path);
    info!("  Log retention: {} days", config.log_retention_days);
    if config.gate_default == GateDefault::Allow {
        warn!("Unclassified paths are forwarded without auth (set GATE_DEFAULT_ALLOW=0 to deny)");
    }

    let auth = Arc::new(AuthSettings::from_env());
    if auth.admin_username.is_none() || auth.admin_password.is_none() {
        warn!("ADMIN_USERNAME / ADMIN_PASSWORD not set; admin login is disabled");
    }

    let kv: Arc<dyn KvStore> = Arc::new(TimedKv::with_default_timeout(
        SqliteKv::open(&config.database_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to open store: {e}"))?,
    ));
    info!("KV store ready");

    let keys = ApiKeyStore::new(kv.clone());
    let logger = OperationLogger::new(kv.clone());

    let gate_state = GateState {
        config: Arc::new(GateConfig::standard().with_default(config.gate_default)),
        keys: keys.clone(),
        token_secret: Arc::new(auth.token_secret.clone()),
        logger: logger.clone(),
    };

    let state = AppState {
        kv,
        keys,
        logger,
        auth,
        log_retention_days: config.log_retention_days,
    };

    let app = build_router(state, gate_state);

    info!("Listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}

/// Assemble the router: handlers behind the auth gate, with panic
/// containment, request tracing, and permissive CORS on every response.
pub fn build_router(state: AppState, gate_state: GateState) -> Router {
    let api = crate::api::router().layer(CatchPanicLayer::custom(handle_panic));

    Router::new()
        .nest("/api", api)
        .layer(axum::middleware::from_fn_with_state(gate_state, auth_gate))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ])
}

/// Convert a handler panic into the generic 500 body; the panic payload
/// stays out of the response.
fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> axum::response::Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(serde_json::json!({
            "success": false,
            "message": "internal server error",
        })),
    )
        .into_response()
}

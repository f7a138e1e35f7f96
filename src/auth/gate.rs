//! Request gate middleware.
//!
//! Every inbound request is classified into exactly one bucket — API-key
//! scoped, public, or token-required — and the matching credential flow
//! runs before the route handler. Each denial or grant of API-key/token
//! access writes one operation-log entry; CORS preflights and
//! default-forwarded requests write none.
//!
//! Classification precedence: API-key routes win over public routes,
//! which win over token routes. Paths matching none of the three sets
//! follow the configured default policy (allow preserves the historical
//! fail-open behavior; deny is the hardened posture).

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Query, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;

use crate::domain::{LogDraft, OperationType, RequestMeta};
use crate::infra::{OperationLogger, StoreError};

use super::{
    decode, key_preview, ApiKeyRecord, ApiKeyStore, AuthError, AuthIdentity, Claims, Denial,
    Identity, Permission, RoutePolicy,
};

/// Largest request body the gate will buffer while looking for credentials.
const MAX_BUFFERED_BODY: usize = 256 * 1024;

/// What happens to paths that match none of the classification sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDefault {
    /// Forward without authentication (historical behavior).
    Allow,
    /// Reject with 401.
    Deny,
}

/// Immutable gate configuration: the classification sets and the route
/// policy, passed in at construction rather than baked into the module.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub policy: RoutePolicy,
    pub public_paths: Vec<String>,
    pub token_paths: Vec<String>,
    pub default: GateDefault,
}

impl GateConfig {
    /// The production route sets.
    pub fn standard() -> Self {
        Self {
            policy: RoutePolicy::new(vec![
                ("/api/blacklist/check-api".to_string(), Permission::Read),
                ("/api/blacklist/check-external".to_string(), Permission::Read),
                ("/api/blacklist/get-api".to_string(), Permission::List),
                ("/api/blacklist/add-api".to_string(), Permission::Add),
                ("/api/blacklist/remove-api".to_string(), Permission::Delete),
            ]),
            public_paths: vec![
                // login issues tokens; verify reports token state in its
                // own response shape, so both validate inside the handler
                "/api/auth/login".to_string(),
                "/api/auth/verify".to_string(),
                "/api/blacklist/check".to_string(),
                "/api/health".to_string(),
            ],
            token_paths: vec![
                "/api/apikey/create".to_string(),
                "/api/apikey/list".to_string(),
                "/api/apikey/update".to_string(),
                "/api/apikey/delete".to_string(),
                "/api/blacklist/add".to_string(),
                "/api/blacklist/remove".to_string(),
                "/api/blacklist/get".to_string(),
                "/api/logs/list".to_string(),
                "/api/logs/advanced".to_string(),
                "/api/logs/cleanup".to_string(),
            ],
            default: GateDefault::Allow,
        }
    }

    pub fn with_default(mut self, default: GateDefault) -> Self {
        self.default = default;
        self
    }

    fn classify(&self, path: &str) -> RouteClass {
        if self.policy.is_scoped(path) {
            RouteClass::ApiKey
        } else if self.public_paths.iter().any(|p| p == path) {
            RouteClass::Public
        } else if self.token_paths.iter().any(|p| p == path) {
            RouteClass::Token
        } else {
            RouteClass::Unclassified
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteClass {
    ApiKey,
    Public,
    Token,
    Unclassified,
}

/// Shared state handed to the gate middleware.
#[derive(Clone)]
pub struct GateState {
    pub config: Arc<GateConfig>,
    pub keys: ApiKeyStore,
    pub token_secret: Arc<Vec<u8>>,
    pub logger: OperationLogger,
}

/// The gate middleware.
pub async fn auth_gate(State(state): State<GateState>, request: Request, next: Next) -> Response {
    // Preflights terminate in the CORS layer; anything that still gets
    // here is passed through untouched and unlogged.
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();

    let response = match state.config.classify(&path) {
        RouteClass::Public => next.run(request).await,
        RouteClass::Unclassified => match state.config.default {
            GateDefault::Allow => next.run(request).await,
            GateDefault::Deny => {
                let meta = request_meta(request.headers(), request.method(), &path);
                state.logger.record_detached(
                    LogDraft::new(OperationType::Authentication)
                        .request(meta)
                        .failed("path requires authentication"),
                );
                rejection(StatusCode::UNAUTHORIZED, "authentication required")
            }
        },
        RouteClass::ApiKey => api_key_flow(&state, request, next, &path).await,
        RouteClass::Token => token_flow(&state, request, next, &path).await,
    };

    // Error boundary: anything that bubbled up as a 500 (including a
    // caught handler panic) is recorded as a system error.
    if response.status() == StatusCode::INTERNAL_SERVER_ERROR {
        state.logger.record_detached(
            LogDraft::new(OperationType::SystemError)
                .message(format!("internal error on {path}"))
                .failed("internal server error"),
        );
    }

    response
}

async fn api_key_flow(state: &GateState, request: Request, next: Next, path: &str) -> Response {
    let meta = request_meta(request.headers(), request.method(), path);

    let (parts, body) = match buffer_request(request).await {
        Ok(buffered) => buffered,
        Err(response) => return response,
    };

    let key = credential_from_body(&body, "key").or_else(|| key_from_query(&parts));

    let record = match verify_api_key(state, key.as_deref(), path).await {
        Ok(record) => record,
        Err(error) => {
            let operator = key.as_deref().map(key_preview);
            return deny(state, meta, operator, error);
        }
    };

    // grants are logged too
    let key = key.unwrap_or_default();
    state.logger.record_detached(
        LogDraft::new(OperationType::ApiKeyVerification)
            .operator(key_preview(&key))
            .request(meta)
            .details(serde_json::json!({"apiKey": key_preview(&key)})),
    );

    let mut request = Request::from_parts(parts, Body::from(body));
    request
        .extensions_mut()
        .insert(AuthIdentity(Identity::ApiKey { key, record }));
    next.run(request).await
}

/// Look up and authorize an API key for a scoped route.
async fn verify_api_key(
    state: &GateState,
    key: Option<&str>,
    path: &str,
) -> Result<ApiKeyRecord, AuthError> {
    let key = key.ok_or(AuthError::MissingApiKey)?;

    let record = state.keys.get(key).await.map_err(|err| match err {
        StoreError::Unavailable(_) => AuthError::StoreUnavailable,
        StoreError::NotFound(_) | StoreError::Corrupt { .. } => AuthError::InvalidApiKey,
    })?;

    state
        .config
        .policy
        .authorize(&record, path)
        .map_err(|denial| match denial {
            Denial::Expired => AuthError::ApiKeyExpired,
            Denial::MissingPermission(permission) => {
                AuthError::InsufficientPermissions(permission)
            }
            // classification guarantees the route is in the policy table
            Denial::UnknownRoute => AuthError::InvalidApiKey,
        })?;

    Ok(record)
}

async fn token_flow(state: &GateState, request: Request, next: Next, path: &str) -> Response {
    let meta = request_meta(request.headers(), request.method(), path);

    let (parts, body) = match buffer_request(request).await {
        Ok(buffered) => buffered,
        Err(response) => return response,
    };

    let token = credential_from_body(&body, "token").or_else(|| bearer_token(&parts.headers));

    let claims = match verify_token(state, token.as_deref()) {
        Ok(claims) => claims,
        Err(error) => return deny(state, meta, None, error),
    };

    state.logger.record_detached(
        LogDraft::new(OperationType::Authentication)
            .operator(&claims.sub)
            .request(meta),
    );

    let mut request = Request::from_parts(parts, Body::from(body));
    request.extensions_mut().insert(AuthIdentity(Identity::Admin {
        username: claims.sub,
        role: claims.role,
    }));
    next.run(request).await
}

/// Decode and expiry-check a bearer token.
///
/// Every decode failure collapses to `InvalidToken`: which check failed
/// is not leaked to the caller.
fn verify_token(state: &GateState, token: Option<&str>) -> Result<Claims, AuthError> {
    let token = token.ok_or(AuthError::MissingToken)?;

    let claims: Claims =
        decode(token, &state.token_secret).map_err(|_| AuthError::InvalidToken)?;

    if claims.expired_at(Utc::now().timestamp()) {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims)
}

/// Log a denial and convert it to its HTTP response. Store outages skip
/// the log write (the log lives in the same store).
fn deny(state: &GateState, meta: RequestMeta, operator: Option<String>, error: AuthError) -> Response {
    let (status, operation) = match &error {
        AuthError::MissingApiKey | AuthError::InvalidApiKey | AuthError::ApiKeyExpired => {
            (StatusCode::UNAUTHORIZED, OperationType::ApiKeyVerification)
        }
        AuthError::InsufficientPermissions(_) => {
            (StatusCode::FORBIDDEN, OperationType::PermissionCheck)
        }
        AuthError::MissingToken | AuthError::InvalidToken | AuthError::TokenExpired => {
            (StatusCode::UNAUTHORIZED, OperationType::Authentication)
        }
        AuthError::StoreUnavailable => {
            return rejection(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string());
        }
    };

    let message = error.to_string();
    let mut draft = LogDraft::new(operation).request(meta).failed(&message);
    if let Some(operator) = operator {
        draft = draft.operator(operator);
    }
    state.logger.record_detached(draft);

    rejection(status, &message)
}

/// Buffer the request body so the gate can inspect JSON credentials and
/// still hand the handler an intact request.
async fn buffer_request(request: Request) -> Result<(Parts, Bytes), Response> {
    let (parts, body) = request.into_parts();
    match axum::body::to_bytes(body, MAX_BUFFERED_BODY).await {
        Ok(bytes) => Ok((parts, bytes)),
        Err(_) => Err(rejection(
            StatusCode::BAD_REQUEST,
            "request body unreadable or too large",
        )),
    }
}

/// Pull a string field out of a JSON request body, if the body is JSON.
fn credential_from_body(body: &Bytes, field: &str) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Deserialize)]
struct CredentialQuery {
    key: Option<String>,
}

fn key_from_query(parts: &Parts) -> Option<String> {
    Query::<CredentialQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|q| q.0.key)
        .filter(|s| !s.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn request_meta(headers: &HeaderMap, method: &Method, path: &str) -> RequestMeta {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let ip = header_str("x-forwarded-for")
        .map(|v| v.split(',').next().unwrap_or("").trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| header_str("x-real-ip"))
        .unwrap_or_else(|| "unknown".to_string());

    RequestMeta {
        method: method.to_string(),
        path: path.to_string(),
        ip,
        user_agent: header_str("user-agent").unwrap_or_else(|| "unknown".to_string()),
    }
}

fn rejection(status: StatusCode, message: &str) -> Response {
    (
        status,
        axum::Json(serde_json::json!({
            "success": false,
            "message": message,
        })),
    )
        .into_response()
}

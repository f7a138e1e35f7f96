//! Blacklist handlers: token-authenticated admin mutations plus the
//! API-key-scoped machine endpoints.
//!
//! Both families share the same load-modify-save sequence over the single
//! serialized blacklist record; only the identity source differs.

use axum::extract::{Extension, Query, State};
use axum::http::HeaderMap;
use axum::Json;

use crate::api::error::{ApiError, ErrorCode};
use crate::api::types::{BlacklistMutationResponse, CheckQuery, CheckResponse, IpRequest};
use crate::auth::AuthIdentity;
use crate::domain::{is_valid_ipv4, Blacklist, LogDraft, OperationType, BLACKLIST_KEY};
use crate::infra::KvStore;
use crate::server::AppState;

async fn load(kv: &dyn KvStore) -> Result<Blacklist, ApiError> {
    match kv.get(BLACKLIST_KEY).await? {
        Some(json) => Blacklist::from_json(&json).map_err(|err| {
            tracing::error!(error = %err, "blacklist record is corrupt");
            ApiError::new(ErrorCode::SystemError, "internal error")
        }),
        None => Ok(Blacklist::new()),
    }
}

async fn save(kv: &dyn KvStore, list: &Blacklist) -> Result<(), ApiError> {
    kv.put(BLACKLIST_KEY, list.to_json()).await?;
    Ok(())
}

fn operator(identity: &Option<Extension<AuthIdentity>>) -> String {
    identity
        .as_ref()
        .map(|Extension(AuthIdentity(id))| id.operator())
        .unwrap_or_else(|| "system".to_string())
}

/// Append `ip`, persist, and log. Shared by the token and API-key routes.
async fn add_ip(
    state: &AppState,
    ip: &str,
    operator: String,
) -> Result<Json<BlacklistMutationResponse>, ApiError> {
    let mut list = load(state.kv.as_ref()).await?;
    let count = match list.add(ip) {
        Ok(count) => count,
        Err(err) => {
            state.logger.record_detached(
                LogDraft::new(OperationType::BlacklistAdd)
                    .operator(operator)
                    .details(serde_json::json!({"ip": ip}))
                    .failed(err.to_string()),
            );
            return Err(err.into());
        }
    };
    save(state.kv.as_ref(), &list).await?;

    state.logger.record_detached(
        LogDraft::new(OperationType::BlacklistAdd)
            .operator(operator)
            .details(serde_json::json!({"ip": ip, "count": count})),
    );

    Ok(Json(BlacklistMutationResponse {
        success: true,
        message: format!("IP {ip} added to the blacklist"),
        count,
    }))
}

/// Remove `ip`, persist, and log. Shared by the token and API-key routes.
async fn remove_ip(
    state: &AppState,
    ip: &str,
    operator: String,
) -> Result<Json<BlacklistMutationResponse>, ApiError> {
    let mut list = load(state.kv.as_ref()).await?;
    let count = match list.remove(ip) {
        Ok(count) => count,
        Err(err) => {
            state.logger.record_detached(
                LogDraft::new(OperationType::BlacklistRemove)
                    .operator(operator)
                    .details(serde_json::json!({"ip": ip}))
                    .failed(err.to_string()),
            );
            return Err(err.into());
        }
    };
    save(state.kv.as_ref(), &list).await?;

    state.logger.record_detached(
        LogDraft::new(OperationType::BlacklistRemove)
            .operator(operator)
            .details(serde_json::json!({"ip": ip, "count": count})),
    );

    Ok(Json(BlacklistMutationResponse {
        success: true,
        message: format!("IP {ip} removed from the blacklist"),
        count,
    }))
}

/// POST /api/blacklist/add (token)
pub async fn add(
    State(state): State<AppState>,
    identity: Option<Extension<AuthIdentity>>,
    Json(request): Json<IpRequest>,
) -> Result<Json<BlacklistMutationResponse>, ApiError> {
    add_ip(&state, &request.ip, operator(&identity)).await
}

/// POST /api/blacklist/remove (token)
pub async fn remove(
    State(state): State<AppState>,
    identity: Option<Extension<AuthIdentity>>,
    Json(request): Json<IpRequest>,
) -> Result<Json<BlacklistMutationResponse>, ApiError> {
    remove_ip(&state, &request.ip, operator(&identity)).await
}

/// GET/POST /api/blacklist/get (token) — the raw address array.
pub async fn get(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let list = load(state.kv.as_ref()).await?;
    Ok(Json(list.entries().to_vec()))
}

/// POST /api/blacklist/add-api (API key, `add` permission)
pub async fn add_api(
    State(state): State<AppState>,
    identity: Option<Extension<AuthIdentity>>,
    Json(request): Json<IpRequest>,
) -> Result<Json<BlacklistMutationResponse>, ApiError> {
    add_ip(&state, &request.ip, operator(&identity)).await
}

/// POST /api/blacklist/remove-api (API key, `delete` permission)
pub async fn remove_api(
    State(state): State<AppState>,
    identity: Option<Extension<AuthIdentity>>,
    Json(request): Json<IpRequest>,
) -> Result<Json<BlacklistMutationResponse>, ApiError> {
    remove_ip(&state, &request.ip, operator(&identity)).await
}

/// GET/POST /api/blacklist/get-api (API key, `list` permission)
pub async fn get_api(
    State(state): State<AppState>,
    identity: Option<Extension<AuthIdentity>>,
) -> Result<Json<Vec<String>>, ApiError> {
    let list = load(state.kv.as_ref()).await?;

    state.logger.record_detached(
        LogDraft::new(OperationType::BlacklistGet)
            .operator(operator(&identity))
            .details(serde_json::json!({"count": list.len()})),
    );

    Ok(Json(list.entries().to_vec()))
}

/// GET/POST /api/blacklist/check-api (API key, `read` permission)
///
/// The target IP comes from the JSON body, else the `ip` query parameter,
/// else the caller's own forwarded address.
pub async fn check_api(
    State(state): State<AppState>,
    identity: Option<Extension<AuthIdentity>>,
    Query(query): Query<CheckQuery>,
    headers: HeaderMap,
    body: Option<Json<CheckQuery>>,
) -> Result<Json<CheckResponse>, ApiError> {
    let ip = body
        .and_then(|Json(b)| b.ip)
        .or(query.ip)
        .or_else(|| forwarded_ip(&headers))
        .ok_or_else(|| ApiError::malformed("missing ip parameter"))?;

    if !is_valid_ipv4(&ip) {
        state.logger.record_detached(
            LogDraft::new(OperationType::BlacklistCheck)
                .operator(operator(&identity))
                .details(serde_json::json!({"ip": ip}))
                .failed("invalid IPv4 address"),
        );
        return Err(ApiError::malformed(format!("invalid IPv4 address: {ip}")));
    }

    let list = load(state.kv.as_ref()).await?;
    let blocked = list.contains(&ip);

    state.logger.record_detached(
        LogDraft::new(OperationType::BlacklistCheck)
            .operator(operator(&identity))
            .details(serde_json::json!({"ip": ip, "blocked": blocked})),
    );

    Ok(Json(CheckResponse {
        message: if blocked {
            format!("IP {ip} is blacklisted")
        } else {
            format!("IP {ip} is not blacklisted")
        },
        ip,
        blocked,
    }))
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

//! End-to-end tests for the request gate and the REST surface.
//!
//! Each test builds the full router over an in-memory store and drives it
//! with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use blackgate::auth::{
    ApiKeyRecord, ApiKeyStore, Claims, GateConfig, GateDefault, GateState, Permission, Permissions,
    RoutePolicy,
};
use blackgate::domain::BLACKLIST_KEY;
use blackgate::infra::{KvStore, MemoryKv, OperationLogger, StoreError};
use blackgate::server::{build_router, AppState, AuthSettings};

const SECRET: &[u8] = b"integration-test-secret";

// ============================================================================
// Test Helpers
// ============================================================================

fn auth_settings() -> AuthSettings {
    AuthSettings {
        admin_username: Some("admin".to_string()),
        admin_password: Some("hunter2".to_string()),
        token_secret: SECRET.to_vec(),
        token_ttl_secs: 3600,
    }
}

fn build_app_with(kv: Arc<dyn KvStore>, config: GateConfig) -> axum::Router {
    let keys = ApiKeyStore::new(kv.clone());
    let logger = OperationLogger::new(kv.clone());

    let gate_state = GateState {
        config: Arc::new(config),
        keys: keys.clone(),
        token_secret: Arc::new(SECRET.to_vec()),
        logger: logger.clone(),
    };

    let state = AppState {
        kv,
        keys,
        logger,
        auth: Arc::new(auth_settings()),
        log_retention_days: 30,
    };

    build_router(state, gate_state)
}

fn build_app(kv: Arc<dyn KvStore>) -> axum::Router {
    build_app_with(kv, GateConfig::standard())
}

fn mint_token(exp_offset_secs: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: "admin".to_string(),
        role: "admin".to_string(),
        exp: Some(now + exp_offset_secs),
        iat: Some(now),
    };
    blackgate::auth::encode(&claims, SECRET).unwrap()
}

async fn seed_key(kv: &Arc<dyn KvStore>, key: &str, permissions: Permissions) {
    seed_key_with_expiry(kv, key, permissions, None).await;
}

async fn seed_key_with_expiry(
    kv: &Arc<dyn KvStore>,
    key: &str,
    permissions: Permissions,
    expiry: Option<chrono::DateTime<chrono::Utc>>,
) {
    let store = ApiKeyStore::new(kv.clone());
    let mut record = ApiKeyRecord::new(key);
    record.permissions = Some(permissions);
    record.expiry_date = expiry;
    store.put(&record).await.unwrap();
}

fn request(method: Method, uri: &str, body: Option<Value>, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Store whose every call fails, simulating a missing/unreachable binding.
struct UnavailableKv;

#[async_trait::async_trait]
impl KvStore for UnavailableKv {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("binding missing".to_string()))
    }
    async fn put(&self, _key: &str, _value: String) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("binding missing".to_string()))
    }
    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("binding missing".to_string()))
    }
    async fn list(&self, _prefix: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Unavailable("binding missing".to_string()))
    }
}

// ============================================================================
// API-key flow
// ============================================================================

#[tokio::test]
async fn add_api_scenario_succeeds_then_conflicts() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    seed_key(&kv, "bg_valid", Permissions::full()).await;
    let app = build_app(kv);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/blacklist/add-api?key=bg_valid",
            Some(json!({"ip": "10.0.0.5"})),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 1);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/blacklist/add-api?key=bg_valid",
            Some(json!({"ip": "10.0.0.5"})),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("already"));
}

#[tokio::test]
async fn api_key_in_body_is_preferred_over_query() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    seed_key(&kv, "bg_valid", Permissions::full()).await;
    let app = build_app(kv);

    // body carries the valid key; the query carries garbage
    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/api/blacklist/add-api?key=bg_bogus",
            Some(json!({"ip": "10.0.0.6", "key": "bg_valid"})),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_api_key_is_unauthorized() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let app = build_app(kv);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/blacklist/add-api",
            Some(json!({"ip": "10.0.0.5"})),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn unknown_api_key_is_unauthorized() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let app = build_app(kv);

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/api/blacklist/add-api?key=bg_nope",
            Some(json!({"ip": "10.0.0.5"})),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn read_only_key_is_forbidden_on_add_route() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    seed_key(&kv, "bg_reader", Permissions::read_only()).await;
    let app = build_app(kv.clone());

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/blacklist/add-api?key=bg_reader",
            Some(json!({"ip": "10.0.0.5"})),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["message"].as_str().unwrap().contains("add"));

    // same key is fine on the read route
    let (status, body) = send(
        &app,
        request(
            Method::GET,
            "/api/blacklist/check-api?key=bg_reader&ip=10.0.0.5",
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["blocked"], false);
}

#[tokio::test]
async fn expired_api_key_is_rejected_despite_full_permissions() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    seed_key_with_expiry(
        &kv,
        "bg_stale",
        Permissions::full(),
        Some(chrono::Utc::now() - chrono::Duration::days(1)),
    )
    .await;
    let app = build_app(kv);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/blacklist/add-api?key=bg_stale",
            Some(json!({"ip": "10.0.0.5"})),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].as_str().unwrap().contains("expired"));
}

#[tokio::test]
async fn get_api_returns_bare_address_array() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    kv.put(BLACKLIST_KEY, json!(["1.2.3.4", "5.6.7.8"]).to_string())
        .await
        .unwrap();
    seed_key(&kv, "bg_lister", Permissions { list: true, ..Permissions::default() }).await;
    let app = build_app(kv);

    let (status, body) = send(
        &app,
        request(Method::GET, "/api/blacklist/get-api?key=bg_lister", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["1.2.3.4", "5.6.7.8"]));
}

// ============================================================================
// Token flow
// ============================================================================

#[tokio::test]
async fn token_path_without_token_is_unauthorized() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let app = build_app(kv);

    let (status, _) = send(&app, request(Method::GET, "/api/blacklist/get", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_rejected_by_the_gate() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let app = build_app(kv);

    // decode alone would succeed; the gate enforces expiry
    let token = mint_token(-1);
    let (status, body) = send(
        &app,
        request(Method::GET, "/api/blacklist/get", None, Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].as_str().unwrap().contains("expired"));
}

#[tokio::test]
async fn garbage_token_gets_the_generic_invalid_message() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let app = build_app(kv);

    let (status, body) = send(
        &app,
        request(Method::GET, "/api/blacklist/get", None, Some("aa.bb.cc")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid token");
}

#[tokio::test]
async fn valid_token_flows_through_blacklist_crud() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let app = build_app(kv);
    let token = mint_token(3600);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/blacklist/add",
            Some(json!({"ip": "192.0.2.1"})),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, body) = send(
        &app,
        request(Method::GET, "/api/blacklist/get", None, Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["192.0.2.1"]));

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/blacklist/remove",
            Some(json!({"ip": "192.0.2.1"})),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn remove_unknown_ip_is_not_found_and_list_unchanged() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    kv.put(BLACKLIST_KEY, json!(["1.1.1.1"]).to_string())
        .await
        .unwrap();
    let app = build_app(kv.clone());
    let token = mint_token(3600);

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/api/blacklist/remove",
            Some(json!({"ip": "9.9.9.9"})),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let stored = kv.get(BLACKLIST_KEY).await.unwrap().unwrap();
    assert_eq!(stored, json!(["1.1.1.1"]).to_string());
}

#[tokio::test]
async fn malformed_ip_is_bad_request() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let app = build_app(kv);
    let token = mint_token(3600);

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/api/blacklist/add",
            Some(json!({"ip": "999.1.1.1"})),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Login and verify
// ============================================================================

#[tokio::test]
async fn login_issues_a_working_token() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let app = build_app(kv);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/auth/login",
            Some(json!({"username": "admin", "password": "hunter2"})),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        request(Method::GET, "/api/blacklist/get", None, Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let app = build_app(kv);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/auth/login",
            Some(json!({"username": "admin", "password": "wrong"})),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn verify_reports_expired_token_with_valid_false() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let app = build_app(kv);

    let token = mint_token(-120);
    let (status, body) = send(
        &app,
        request(Method::GET, "/api/auth/verify", None, Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["valid"], false);
    assert!(body["message"].as_str().unwrap().contains("expired"));
}

#[tokio::test]
async fn verify_accepts_token_from_body() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let app = build_app(kv);

    let token = mint_token(3600);
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/auth/verify",
            Some(json!({"token": token})),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["user"]["username"], "admin");
    assert_eq!(body["user"]["role"], "admin");
}

// ============================================================================
// Classification
// ============================================================================

#[tokio::test]
async fn api_key_classification_wins_over_public() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());

    // the same path appears in both the API-key set and the public set
    let shared = "/api/blacklist/check-api".to_string();
    let config = GateConfig {
        policy: RoutePolicy::new(vec![(shared.clone(), Permission::Read)]),
        public_paths: vec![shared],
        token_paths: vec![],
        default: GateDefault::Allow,
    };
    let app = build_app_with(kv, config);

    // no key supplied: the API-key flow must reject, proving precedence
    let (status, _) = send(
        &app,
        request(Method::GET, "/api/blacklist/check-api?ip=1.2.3.4", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unclassified_path_follows_the_default_policy() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());

    // fail-open: the request reaches routing (404: no such route)
    let app = build_app_with(kv.clone(), GateConfig::standard());
    let (status, _) = send(&app, request(Method::GET, "/api/unrouted", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // fail-closed: the gate rejects before routing
    let app = build_app_with(
        kv,
        GateConfig::standard().with_default(GateDefault::Deny),
    );
    let (status, _) = send(&app, request(Method::GET, "/api/unrouted", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn public_paths_need_no_credentials() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let app = build_app(kv);

    let (status, body) = send(&app, request(Method::GET, "/api/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], true);
}

// ============================================================================
// Store failures
// ============================================================================

#[tokio::test]
async fn api_key_path_with_unavailable_store_is_a_fixed_500() {
    let kv: Arc<dyn KvStore> = Arc::new(UnavailableKv);
    let app = build_app(kv);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/blacklist/add-api?key=bg_any",
            Some(json!({"ip": "10.0.0.5"})),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "storage unavailable");
}

#[tokio::test]
async fn handler_store_failure_does_not_leak_detail() {
    let kv: Arc<dyn KvStore> = Arc::new(UnavailableKv);
    let app = build_app(kv);
    let token = mint_token(3600);

    let (status, body) = send(
        &app,
        request(Method::GET, "/api/blacklist/get", None, Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body["message"].as_str().unwrap().contains("binding missing"));
}

// ============================================================================
// API key management endpoints
// ============================================================================

#[tokio::test]
async fn apikey_lifecycle_over_http() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let app = build_app(kv);
    let token = mint_token(3600);

    // create with a generated key string
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/apikey/create",
            Some(json!({"note": "ci", "permissions": {"read": true}})),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let key = body["key"].as_str().unwrap().to_string();
    assert!(key.starts_with("bg_"));

    // list includes it
    let (status, body) = send(
        &app,
        request(Method::GET, "/api/apikey/list", None, Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["keys"].as_array().unwrap().len(), 1);
    assert_eq!(body["keys"][0]["note"], "ci");

    // update the note
    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/api/apikey/update",
            Some(json!({"key": key, "note": "ci-renamed"})),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // delete, then the list is empty
    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/api/apikey/delete",
            Some(json!({"key": key})),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(
        &app,
        request(Method::GET, "/api/apikey/list", None, Some(&token)),
    )
    .await;
    assert!(body["keys"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn apikey_update_unknown_key_is_not_found() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let app = build_app(kv);
    let token = mint_token(3600);

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/api/apikey/update",
            Some(json!({"key": "bg_ghost", "note": "x"})),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Logs over HTTP
// ============================================================================

#[tokio::test]
async fn cleanup_requires_admin_and_reports_deleted_count() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());

    // seed one stale and one fresh entry directly
    let stale_ts = (chrono::Utc::now() - chrono::Duration::days(40)).timestamp_millis();
    let fresh_ts = (chrono::Utc::now() - chrono::Duration::days(1)).timestamp_millis();
    for (ts, tag) in [(stale_ts, "stale"), (fresh_ts, "fresh")] {
        let key = format!("log:{ts}_{tag}seed00");
        kv.put(
            &key,
            json!({
                "id": key,
                "timestamp": ts,
                "operation": "blacklist_add",
                "operator": "system",
                "status": "success",
                "message": "seeded",
                "details": {},
                "formatted_time": "",
            })
            .to_string(),
        )
        .await
        .unwrap();
    }

    let app = build_app(kv.clone());
    let token = mint_token(3600);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/logs/cleanup?retentionDays=30",
            None,
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deletedCount"], 1);

    // the fresh entry survived
    let remaining = kv.list("log:").await.unwrap();
    assert!(remaining.iter().any(|k| k.contains("fresh")));
    assert!(!remaining.iter().any(|k| k.contains("stale")));
}

#[tokio::test]
async fn logs_list_paginates_newest_first() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let logger = OperationLogger::new(kv.clone());
    logger
        .record(blackgate::domain::LogDraft::new(
            blackgate::domain::OperationType::BlacklistAdd,
        ))
        .await;

    let app = build_app(kv);
    let token = mint_token(3600);

    // filter by operation so the gate's own (detached) auth entries
    // cannot race into the assertion
    let (status, body) = send(
        &app,
        request(
            Method::GET,
            "/api/logs/list?page=1&pageSize=10&operationType=blacklist_add",
            None,
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["pagination"]["total"], 1);
    assert_eq!(body["data"]["logs"][0]["operation"], "blacklist_add");
}

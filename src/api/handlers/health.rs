//! KV connectivity probe.

use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::api::types::HealthResponse;
use crate::server::AppState;

/// GET /api/health (also mounted at /api/blacklist/check)
///
/// Performs a put/get/delete round-trip against the store and reports
/// whether the value read back.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let test_key = format!("connection_test_{}", Utc::now().timestamp_millis());

    let connected = async {
        state.kv.put(&test_key, "test".to_string()).await?;
        let value = state.kv.get(&test_key).await?;
        state.kv.delete(&test_key).await?;
        Ok::<_, crate::infra::StoreError>(value.as_deref() == Some("test"))
    }
    .await
    .unwrap_or(false);

    Json(HealthResponse {
        connected,
        message: if connected {
            "KV store reachable".to_string()
        } else {
            "KV store read/write test failed".to_string()
        },
    })
}

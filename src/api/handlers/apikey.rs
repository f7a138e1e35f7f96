//! API key management handlers (token-authenticated).

use axum::extract::{Extension, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{
    ApiKeyMutationResponse, CreateApiKeyRequest, DeleteApiKeyRequest, ListApiKeysResponse,
    UpdateApiKeyRequest,
};
use crate::auth::{generate_key, key_preview, ApiKeyRecord, AuthIdentity};
use crate::domain::{LogDraft, OperationType};
use crate::server::AppState;

fn operator(identity: &Option<Extension<AuthIdentity>>) -> String {
    identity
        .as_ref()
        .map(|Extension(AuthIdentity(id))| id.operator())
        .unwrap_or_else(|| "system".to_string())
}

/// POST /api/apikey/create
pub async fn create_api_key(
    State(state): State<AppState>,
    identity: Option<Extension<AuthIdentity>>,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<Json<ApiKeyMutationResponse>, ApiError> {
    let key = request
        .key
        .filter(|k| !k.is_empty())
        .unwrap_or_else(generate_key);

    let record = ApiKeyRecord {
        key: key.clone(),
        note: request.note.unwrap_or_default(),
        permissions: request.permissions,
        created_at: chrono::Utc::now(),
        expiry_date: request.expiry_date,
        created_by: Some(operator(&identity)),
    };

    state.keys.put(&record).await?;

    state.logger.record_detached(
        LogDraft::new(OperationType::ApikeyCreate)
            .operator(operator(&identity))
            .details(serde_json::json!({
                "key": key_preview(&key),
                "note": record.note,
            })),
    );

    Ok(Json(ApiKeyMutationResponse {
        success: true,
        message: "API key created".to_string(),
        key: Some(key),
    }))
}

/// GET /api/apikey/list
pub async fn list_api_keys(
    State(state): State<AppState>,
) -> Result<Json<ListApiKeysResponse>, ApiError> {
    let keys = state.keys.list().await?;
    Ok(Json(ListApiKeysResponse {
        success: true,
        keys,
    }))
}

/// POST /api/apikey/update
pub async fn update_api_key(
    State(state): State<AppState>,
    identity: Option<Extension<AuthIdentity>>,
    Json(request): Json<UpdateApiKeyRequest>,
) -> Result<Json<ApiKeyMutationResponse>, ApiError> {
    let mut record = state.keys.get(&request.key).await?;

    if let Some(note) = request.note {
        record.note = note;
    }
    if let Some(permissions) = request.permissions {
        record.permissions = Some(permissions);
    }
    if let Some(expiry) = request.expiry_date {
        record.expiry_date = expiry;
    }

    state.keys.put(&record).await?;

    state.logger.record_detached(
        LogDraft::new(OperationType::ApikeyUpdate)
            .operator(operator(&identity))
            .details(serde_json::json!({"key": key_preview(&request.key)})),
    );

    Ok(Json(ApiKeyMutationResponse {
        success: true,
        message: "API key updated".to_string(),
        key: None,
    }))
}

/// POST /api/apikey/delete
pub async fn delete_api_key(
    State(state): State<AppState>,
    identity: Option<Extension<AuthIdentity>>,
    Json(request): Json<DeleteApiKeyRequest>,
) -> Result<Json<ApiKeyMutationResponse>, ApiError> {
    state.keys.delete(&request.key).await?;

    state.logger.record_detached(
        LogDraft::new(OperationType::ApikeyDelete)
            .operator(operator(&identity))
            .details(serde_json::json!({"key": key_preview(&request.key)})),
    );

    Ok(Json(ApiKeyMutationResponse {
        success: true,
        message: "API key deleted".to_string(),
        key: None,
    }))
}

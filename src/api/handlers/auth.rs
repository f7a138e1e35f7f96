//! Admin session handlers: login and token verification.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;

use crate::api::error::{ApiError, ErrorCode};
use crate::api::types::{LoginRequest, LoginResponse, VerifiedUser, VerifyRequest, VerifyResponse};
use crate::auth::{decode, encode, Claims};
use crate::domain::{LogDraft, OperationType};
use crate::server::AppState;

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let auth = &state.auth;

    let (Some(username), Some(password)) = (&auth.admin_username, &auth.admin_password) else {
        tracing::error!("ADMIN_USERNAME / ADMIN_PASSWORD are not configured");
        return Err(ApiError::new(
            ErrorCode::SystemError,
            "admin credentials not configured",
        ));
    };

    if request.username != *username || request.password != *password {
        state.logger.record_detached(
            LogDraft::new(OperationType::AuthLogin)
                .operator(&request.username)
                .failed("invalid username or password"),
        );
        return Err(ApiError::unauthorized("invalid username or password"));
    }

    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: request.username.clone(),
        role: "admin".to_string(),
        exp: Some(now + auth.token_ttl_secs),
        iat: Some(now),
    };

    let token = encode(&claims, &auth.token_secret)
        .map_err(|_| ApiError::new(ErrorCode::SystemError, "failed to issue token"))?;

    state.logger.record_detached(
        LogDraft::new(OperationType::AuthLogin).operator(&request.username),
    );

    Ok(Json(LoginResponse {
        success: true,
        message: "login successful".to_string(),
        token: Some(token),
    }))
}

/// GET/POST /api/auth/verify
///
/// Token from the JSON body when present, else the `Authorization: Bearer`
/// header. Validates inside the handler (not the gate) so the response
/// carries the `{valid, user}` shape in every case.
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<VerifyRequest>>,
) -> (StatusCode, Json<VerifyResponse>) {
    let token = body
        .and_then(|Json(request)| request.token)
        .filter(|t| !t.is_empty())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_string)
        });

    let Some(token) = token else {
        return invalid("authentication token missing");
    };

    let claims: Claims = match decode(&token, &state.auth.token_secret) {
        Ok(claims) => claims,
        Err(_) => {
            state.logger.record_detached(
                LogDraft::new(OperationType::AuthTokenVerify).failed("invalid token"),
            );
            return invalid("invalid authentication token");
        }
    };

    if claims.expired_at(Utc::now().timestamp()) {
        state.logger.record_detached(
            LogDraft::new(OperationType::AuthTokenVerify)
                .operator(&claims.sub)
                .failed("token expired"),
        );
        return invalid("authentication token expired");
    }

    state.logger.record_detached(
        LogDraft::new(OperationType::AuthTokenVerify).operator(&claims.sub),
    );

    (
        StatusCode::OK,
        Json(VerifyResponse {
            valid: true,
            message: "authentication token valid".to_string(),
            user: Some(VerifiedUser {
                username: claims.sub,
                role: claims.role,
            }),
        }),
    )
}

fn invalid(message: &str) -> (StatusCode, Json<VerifyResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(VerifyResponse {
            valid: false,
            message: message.to_string(),
            user: None,
        }),
    )
}

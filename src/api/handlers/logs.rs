//! Operation log handlers: listing with filters, and retention cleanup.

use axum::extract::{Extension, Query, State};
use axum::Json;
use chrono::Utc;

use crate::api::error::ApiError;
use crate::api::types::{
    CleanupQuery, CleanupResponse, LogListQuery, LogListResponse, LogPage, Pagination,
};
use crate::auth::AuthIdentity;
use crate::domain::{LogDraft, LogEntry, OperationType};
use crate::server::AppState;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 200;

/// GET /api/logs/list — basic filters and pagination.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<LogListQuery>,
) -> Result<Json<LogListResponse>, ApiError> {
    let entries = state.logger.read_all().await?;
    Ok(Json(paginate(filter(entries, &query, false), &query)))
}

/// GET /api/logs/advanced — adds status, keyword, and time-window filters.
pub async fn advanced(
    State(state): State<AppState>,
    Query(query): Query<LogListQuery>,
) -> Result<Json<LogListResponse>, ApiError> {
    let entries = state.logger.read_all().await?;
    Ok(Json(paginate(filter(entries, &query, true), &query)))
}

/// POST /api/logs/cleanup — retention sweep or clear-all. Admin only.
pub async fn cleanup(
    State(state): State<AppState>,
    identity: Option<Extension<AuthIdentity>>,
    Query(query): Query<CleanupQuery>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let operator = match identity {
        Some(Extension(AuthIdentity(id))) if id.is_admin() => id.operator(),
        _ => return Err(ApiError::forbidden("admin permission required")),
    };

    if query.clear_all.unwrap_or(false) {
        let deleted = state.logger.clear_all().await?;
        // the clear-all record is written after the sweep, so it is the
        // first entry of the fresh log
        state
            .logger
            .record(
                LogDraft::new(OperationType::LogsClearAll)
                    .operator(operator)
                    .details(serde_json::json!({"clearedCount": deleted})),
            )
            .await;

        return Ok(Json(CleanupResponse {
            success: true,
            message: "all log entries cleared".to_string(),
            deleted_count: deleted,
        }));
    }

    let retention_days = query
        .retention_days
        .unwrap_or(state.log_retention_days)
        .max(0);
    let deleted = state.logger.sweep(retention_days).await?;

    state
        .logger
        .record(
            LogDraft::new(OperationType::LogsCleanup)
                .operator(operator)
                .details(serde_json::json!({
                    "retentionDays": retention_days,
                    "deletedCount": deleted,
                })),
        )
        .await;

    Ok(Json(CleanupResponse {
        success: true,
        message: "log cleanup complete".to_string(),
        deleted_count: deleted,
    }))
}

fn filter(entries: Vec<LogEntry>, query: &LogListQuery, advanced: bool) -> Vec<LogEntry> {
    let (mut start, mut end) = (query.start_time, query.end_time);

    if advanced {
        if let Some(window) = query.time_range.as_deref().and_then(window_millis) {
            let now = Utc::now().timestamp_millis();
            start = Some(now - window);
            end = Some(now);
        }
    }

    entries
        .into_iter()
        .filter(|entry| {
            if matches!(start, Some(s) if entry.timestamp < s) {
                return false;
            }
            if matches!(end, Some(e) if entry.timestamp > e) {
                return false;
            }
            if let Some(op) = &query.operation_type {
                if entry.operation.to_string() != *op {
                    return false;
                }
            }
            if let Some(operator) = &query.operator {
                let matches = if advanced {
                    entry
                        .operator
                        .to_lowercase()
                        .contains(&operator.to_lowercase())
                } else {
                    entry.operator == *operator
                };
                if !matches {
                    return false;
                }
            }
            if advanced {
                if let Some(status) = &query.status {
                    let entry_status = serde_json::to_value(entry.status)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default();
                    if entry_status != *status {
                        return false;
                    }
                }
                if let Some(keyword) = &query.keyword {
                    if !keyword_matches(entry, keyword) {
                        return false;
                    }
                }
            }
            true
        })
        .collect()
}

/// Case-insensitive search over message, details, error, and path.
fn keyword_matches(entry: &LogEntry, keyword: &str) -> bool {
    let keyword = keyword.to_lowercase();
    let haystack = format!(
        "{} {} {} {}",
        entry.message,
        entry.details,
        entry
            .error
            .as_ref()
            .map(|e| e.message.as_str())
            .unwrap_or(""),
        entry
            .request
            .as_ref()
            .map(|r| r.path.as_str())
            .unwrap_or(""),
    );
    haystack.to_lowercase().contains(&keyword)
}

fn window_millis(range: &str) -> Option<i64> {
    let hours = match range {
        "1h" => 1,
        "6h" => 6,
        "12h" => 12,
        "24h" => 24,
        "3d" => 3 * 24,
        "7d" => 7 * 24,
        "30d" => 30 * 24,
        _ => return None,
    };
    Some(hours * 60 * 60 * 1000)
}

fn paginate(mut entries: Vec<LogEntry>, query: &LogListQuery) -> LogListResponse {
    // newest first for display
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let total = entries.len();
    let start = (page - 1).saturating_mul(page_size).min(total);
    let end = start.saturating_add(page_size).min(total);
    let has_more = end < total;

    LogListResponse {
        success: true,
        data: LogPage {
            logs: entries[start..end].to_vec(),
            pagination: Pagination {
                page,
                page_size,
                total,
                has_more,
            },
        },
    }
}

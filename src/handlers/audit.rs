//! 审计日志的 HTTP 处理器

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::{error::AppError, middleware::AppState, models::audit::*};

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub user_id: Option<uuid::Uuid>,
    pub episode_id: Option<uuid::Uuid>,
    pub event_type: Option<AuditEventType>,
    pub was_successful: Option<bool>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// 查询审计日志
pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditLogQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.clamp(1, 500);
    let offset = query.offset.max(0);

    let filters = AuditLogFilters {
        user_id: query.user_id,
        episode_id: query.episode_id,
        event_type: query.event_type,
        was_successful: query.was_successful,
        start_time: query.start_time,
        end_time: query.end_time,
    };

    let entries = state
        .audit_service
        .query_entries(&filters, limit, offset)
        .await?;
    let total = state.audit_service.count_entries(&filters).await?;

    Ok(Json(json!({
        "entries": entries,
        "total": total,
        "limit": limit,
        "offset": offset,
    })))
}

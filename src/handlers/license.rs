//! License API handlers
//! 许可证签发、校验、吊销端点

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, Result},
    middleware::{extract_client_info, AppState},
    models::audit::AuditEventType,
    models::license::*,
    services::audit_service::AuditEventParams,
    services::license_service::IssueLicenseParams,
};

/// 签发或续期许可证
pub async fn issue_license(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<IssueLicenseRequest>,
) -> Result<impl IntoResponse> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let client = extract_client_info(&headers, state.config.server.trust_proxy);

    let license = state
        .license_service
        .issue(
            IssueLicenseParams {
                user_id: request.user_id,
                episode_id: request.episode_id,
                license_type: request.license_type,
                device_id: request.device_id.as_deref(),
                ttl_secs: request.ttl_secs,
            },
            &client,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(license)))
}

/// 校验许可状态
///
/// 这里是独立的终局判定（不是准入的前置门禁），Valid 结果
/// 写一条 playback_validated 审计。
pub async fn validate_license(
    State(state): State<Arc<AppState>>,
    Path((user_id, episode_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let client = extract_client_info(&headers, state.config.server.trust_proxy);

    let status = state
        .license_service
        .validate(user_id, episode_id, &client)
        .await?;

    if status == LicenseStatus::Valid {
        state
            .audit_service
            .record_or_warn(AuditEventParams {
                event_type: AuditEventType::PlaybackValidated,
                user_id: Some(user_id),
                episode_id: Some(episode_id),
                device_id: None,
                ip_address: client.ip_address.as_deref(),
                user_agent: client.user_agent.as_deref(),
                metadata: None,
                reason: None,
                was_successful: true,
            })
            .await;
    }

    let expires_at = match status {
        LicenseStatus::NotFound => None,
        _ => {
            let repo = crate::repository::LicenseRepository::new(state.db.clone());
            repo.find_by_pair(user_id, episode_id)
                .await?
                .and_then(|l| l.expires_at)
        }
    };

    Ok(Json(LicenseStatusResponse {
        user_id,
        episode_id,
        status,
        expires_at,
    }))
}

/// 吊销许可证
pub async fn revoke_license(
    State(state): State<Arc<AppState>>,
    Path((user_id, episode_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
    Json(request): Json<RevokeLicenseRequest>,
) -> Result<impl IntoResponse> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let client = extract_client_info(&headers, state.config.server.trust_proxy);

    state
        .license_service
        .revoke(user_id, episode_id, &request.reason, &client)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

//! Download API handlers
//! 下载授权与完成记录端点

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::{AppError, Result},
    middleware::{extract_client_info, AppState},
    models::license::DownloadRequest,
};

/// 下载授权
///
/// 许可必须存在、有效、且类型为 download。签名 URL 的生成
/// 由下游交付服务负责，这里只做授权判定并留下审计。
pub async fn authorize_download(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<DownloadRequest>,
) -> Result<impl IntoResponse> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let client = extract_client_info(&headers, state.config.server.trust_proxy);

    let license = state
        .license_service
        .authorize_download(request.user_id, request.episode_id, &client)
        .await?;

    Ok(Json(serde_json::json!({
        "authorized": true,
        "license_id": license.id,
        "expires_at": license.expires_at,
    })))
}

/// 记录下载完成
pub async fn complete_download(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<DownloadRequest>,
) -> Result<impl IntoResponse> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let client = extract_client_info(&headers, state.config.server.trust_proxy);

    state
        .license_service
        .complete_download(request.user_id, request.episode_id, &client)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

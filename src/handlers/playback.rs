//! Playback API handlers
//! 播放准入、心跳、结束与会话列表端点

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::{AppError, Result},
    middleware::{extract_client_info, AppState},
    models::stream::*,
    services::session_service::AdmitParams,
};

/// 开始播放（准入判定）
///
/// 并发上限来自配置（套餐配置的替身），按请求传入准入算法。
pub async fn start_playback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<StartPlaybackRequest>,
) -> Result<impl IntoResponse> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let client = extract_client_info(&headers, state.config.server.trust_proxy);

    let device = DeviceMeta {
        device_id: request.device_id,
        device_name: request.device_name,
        device_platform: request.device_platform,
    };

    let stream = state
        .session_service
        .admit(
            AdmitParams {
                user_id: request.user_id,
                episode_id: request.episode_id,
                device: &device,
                max_concurrent_streams: state.config.playback.max_concurrent_streams,
            },
            &client,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(StartPlaybackResponse {
            session_token: stream.session_token,
            episode_id: stream.episode_id,
            device_id: stream.device_id,
            started_at: stream.started_at,
            heartbeat_interval_secs: state.config.playback.heartbeat_interval_secs,
        }),
    ))
}

/// 会话心跳
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<HeartbeatRequest>,
) -> Result<impl IntoResponse> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    state
        .session_service
        .heartbeat(&request.session_token)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// 结束播放
pub async fn end_playback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<EndPlaybackRequest>,
) -> Result<impl IntoResponse> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let client = extract_client_info(&headers, state.config.server.trust_proxy);
    let reason = request.reason.as_deref().unwrap_or("ended by client");

    state
        .session_service
        .end(&request.session_token, reason, &client)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// 列出用户的存活会话
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionListQuery>,
) -> Result<impl IntoResponse> {
    let sessions = state.session_service.list_sessions(query.user_id).await?;

    let summaries: Vec<SessionSummary> = sessions.into_iter().map(|s| s.into()).collect();

    Ok(Json(serde_json::json!({
        "sessions": summaries,
        "count": summaries.len(),
    })))
}

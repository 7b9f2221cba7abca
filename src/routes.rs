//! 路由注册
//! 组装服务、创建所有 API 路由并应用中间件

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::{
    concurrency::UserLockRegistry,
    config::AppConfig,
    handlers,
    middleware::AppState,
    services::{AuditService, EntitlementService, LicenseService, SessionService},
};

/// 组装全部服务并构建应用状态
///
/// 许可服务与会话服务互相依赖（准入要校验许可，吊销要驱逐会话），
/// 先建许可服务，会话服务建好后回接。
pub fn build_state(config: AppConfig, db: sqlx::PgPool) -> Arc<AppState> {
    let audit_service = Arc::new(AuditService::new(db.clone()));
    let entitlement_service = Arc::new(EntitlementService::new(db.clone()));

    let license_service = Arc::new(LicenseService::new(
        db.clone(),
        audit_service.clone(),
        entitlement_service,
        config.playback.clone(),
    ));

    let session_service = Arc::new(SessionService::new(
        db.clone(),
        audit_service.clone(),
        license_service.clone(),
        Arc::new(UserLockRegistry::new()),
        config.playback.clone(),
    ));

    license_service.attach_sessions(session_service.clone());

    Arc::new(AppState {
        config,
        db,
        license_service,
        session_service,
        audit_service,
    })
}

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    // 公开端点（健康检查）
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check));

    // 引擎操作端点
    let api_routes = Router::new()
        // 许可证
        .route("/api/v1/licenses", post(handlers::license::issue_license))
        .route(
            "/api/v1/licenses/{user_id}/{episode_id}",
            get(handlers::license::validate_license),
        )
        .route(
            "/api/v1/licenses/{user_id}/{episode_id}/revoke",
            post(handlers::license::revoke_license),
        )

        // 下载授权
        .route("/api/v1/downloads/authorize", post(handlers::download::authorize_download))
        .route("/api/v1/downloads/complete", post(handlers::download::complete_download))

        // 播放会话
        .route("/api/v1/playback/start", post(handlers::playback::start_playback))
        .route("/api/v1/playback/heartbeat", post(handlers::playback::heartbeat))
        .route("/api/v1/playback/end", post(handlers::playback::end_playback))
        .route("/api/v1/playback/sessions", get(handlers::playback::list_sessions))

        // 审计日志
        .route("/api/v1/audit/logs", get(handlers::audit::list_audit_logs));

    // 指标端点
    let metrics_routes = Router::new().route("/metrics", get(handlers::metrics::metrics_export));

    // 组合所有路由
    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(metrics_routes)
        .layer(axum::middleware::from_fn(crate::middleware::request_tracking_middleware))
        .with_state(state)
}

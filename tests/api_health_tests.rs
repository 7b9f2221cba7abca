//! 健康检查 API 集成测试

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serial_test::serial;
use tower::ServiceExt;

mod common;
use common::{create_test_app_state, create_test_config, setup_test_db};

#[tokio::test]
#[serial]
async fn test_health_endpoint() {
    // 设置测试环境
    let config = create_test_config();
    let pool = setup_test_db(&config).await;
    let state = create_test_app_state(config, pool);

    // 创建应用
    let app = drm_system::routes::create_router(state);

    // 发送请求
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // 验证响应
    assert_eq!(response.status(), StatusCode::OK);

    // 读取响应体
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert!(json["uptime_secs"].is_number());
}

#[tokio::test]
#[serial]
async fn test_readiness_endpoint() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;
    let state = create_test_app_state(config, pool);

    let app = drm_system::routes::create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/ready")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(json["ready"], true);
    assert_eq!(json["checks"][0]["name"], "database");
    assert_eq!(json["checks"][0]["status"], "healthy");
}

#[tokio::test]
#[serial]
async fn test_request_tracking_headers() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;
    let state = create_test_app_state(config, pool);

    let app = drm_system::routes::create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-trace-id", "trace-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // 追踪头回写到响应
    assert_eq!(
        response.headers().get("x-trace-id").unwrap().to_str().unwrap(),
        "trace-abc"
    );
    assert!(response.headers().contains_key("x-request-id"));
}

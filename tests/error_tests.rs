//! 错误处理单元测试
//!
//! 测试应用错误类型的各种行为

use axum::http::StatusCode;
use drm_system::error::AppError;

// ==================== 错误状态码测试 ====================

#[test]
fn test_error_status_codes() {
    assert_eq!(AppError::LicenseNotFound.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(AppError::LicenseExpired.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(AppError::LicenseRevoked.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(
        AppError::LicenseDenied("no plan".to_string()).status_code(),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        AppError::ConcurrencyLimitExceeded { limit: 2 }.status_code(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(AppError::SessionNotFound.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(
        AppError::Validation("error".to_string()).status_code(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        AppError::NotFound("resource".to_string()).status_code(),
        StatusCode::NOT_FOUND
    );
}

#[test]
fn test_infrastructure_errors_are_5xx() {
    let db_error = sqlx::Error::RowNotFound;
    assert_eq!(
        AppError::Database(db_error).status_code(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(
        AppError::AuditWriteFailed("disk full".to_string()).status_code(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(
        AppError::Config("bad".to_string()).status_code(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

// ==================== 错误消息测试 ====================

#[test]
fn test_user_messages() {
    assert_eq!(AppError::LicenseExpired.user_message(), "License expired");
    assert_eq!(
        AppError::ConcurrencyLimitExceeded { limit: 4 }.user_message(),
        "Concurrent stream limit reached: 4"
    );
    assert_eq!(
        AppError::LicenseDenied("User is not entitled to this episode".to_string()).user_message(),
        "User is not entitled to this episode"
    );
}

#[test]
fn test_database_message_hides_detail() {
    let error = AppError::Database(sqlx::Error::PoolTimedOut);
    assert_eq!(error.user_message(), "Database error occurred");
}

#[test]
fn test_audit_failure_message_hides_detail() {
    // 审计失败的内部细节不该出现在响应里
    let error = AppError::AuditWriteFailed("constraint violated on audit_logs".to_string());
    assert_eq!(error.user_message(), "Audit write failed");
    assert!(!error.user_message().contains("audit_logs"));
}

// ==================== 便捷构造器测试 ====================

#[test]
fn test_convenience_constructors() {
    assert!(matches!(AppError::not_found("x"), AppError::NotFound(_)));
    assert!(matches!(AppError::validation("x"), AppError::Validation(_)));
    assert!(matches!(AppError::denied("x"), AppError::LicenseDenied(_)));
    assert!(matches!(AppError::internal_error("x"), AppError::Internal(_)));
}

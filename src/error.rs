//! 统一错误模型
//! 定义所有错误类型和错误响应格式

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;

/// 应用错误类型
///
/// 许可/会话的拒绝结果（Expired/Revoked/Denied/ConcurrencyLimitExceeded）
/// 是高频、用户可见的业务结果，映射为 4xx；Database 是基础设施故障，
/// 映射为 5xx，由调用方重试。
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("License not found")]
    LicenseNotFound,

    #[error("License expired")]
    LicenseExpired,

    #[error("License revoked")]
    LicenseRevoked,

    #[error("License denied: {0}")]
    LicenseDenied(String),

    #[error("Concurrent stream limit reached: {limit}")]
    ConcurrencyLimitExceeded { limit: i64 },

    #[error("Session not found")]
    SessionNotFound,

    #[error("Audit write failed: {0}")]
    AuditWriteFailed(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::LicenseNotFound => StatusCode::NOT_FOUND,
            AppError::LicenseExpired => StatusCode::FORBIDDEN,
            AppError::LicenseRevoked => StatusCode::FORBIDDEN,
            AppError::LicenseDenied(_) => StatusCode::FORBIDDEN,
            AppError::ConcurrencyLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::SessionNotFound => StatusCode::NOT_FOUND,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_)
            | AppError::Config(_)
            | AppError::AuditWriteFailed(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 获取用户友好的错误消息（不包含敏感信息）
    pub fn user_message(&self) -> String {
        match self {
            AppError::LicenseNotFound => "License not found".to_string(),
            AppError::LicenseExpired => "License expired".to_string(),
            AppError::LicenseRevoked => "License revoked".to_string(),
            AppError::LicenseDenied(msg) => msg.clone(),
            AppError::ConcurrencyLimitExceeded { limit } => {
                format!("Concurrent stream limit reached: {}", limit)
            }
            AppError::SessionNotFound => "Session not found".to_string(),
            AppError::NotFound(msg) => format!("Resource not found: {}", msg),
            AppError::Validation(msg) => msg.clone(),
            AppError::AuditWriteFailed(_) => "Audit write failed".to_string(),
            AppError::Database(_) => "Database error occurred".to_string(),
            AppError::Config(_) => "Configuration error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> u16 {
        self.status_code().as_u16()
    }

    // 便捷方法
    pub fn not_found(msg: &str) -> Self {
        AppError::NotFound(msg.to_string())
    }

    pub fn validation(msg: &str) -> Self {
        AppError::Validation(msg.to_string())
    }

    pub fn denied(msg: &str) -> Self {
        AppError::LicenseDenied(msg.to_string())
    }

    pub fn internal_error(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}

/// 错误响应 DTO
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub message: String,
    pub request_id: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = uuid::Uuid::new_v4().to_string();

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                message: self.user_message(),
                request_id,
            },
        };

        // 业务拒绝记 info，基础设施错误记 error
        if status.is_server_error() {
            tracing::error!(
                code = self.code(),
                message = %self,
                request_id = %error_response.error.request_id,
                "Application error"
            );
        } else {
            tracing::info!(
                code = self.code(),
                message = %self,
                request_id = %error_response.error.request_id,
                "Request rejected"
            );
        }

        (status, Json(error_response)).into_response()
    }
}

/// 从 String 转换为 AppError::Config
impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Config(s)
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::LicenseNotFound.code(), 404);
        assert_eq!(AppError::LicenseExpired.code(), 403);
        assert_eq!(AppError::LicenseRevoked.code(), 403);
        assert_eq!(AppError::LicenseDenied("no entitlement".to_string()).code(), 403);
        assert_eq!(AppError::ConcurrencyLimitExceeded { limit: 2 }.code(), 429);
        assert_eq!(AppError::SessionNotFound.code(), 404);
        assert_eq!(AppError::Validation("test".to_string()).code(), 400);
    }

    #[test]
    fn test_rejections_distinguishable_from_storage_faults() {
        // 并发超限是业务结果，存储故障是基础设施故障
        assert!(AppError::ConcurrencyLimitExceeded { limit: 1 }
            .status_code()
            .is_client_error());
        assert!(AppError::Database(sqlx::Error::PoolTimedOut)
            .status_code()
            .is_server_error());
    }

    #[test]
    fn test_user_message_no_sensitive_info() {
        let error = AppError::Database(sqlx::Error::RowNotFound);
        let message = error.user_message();
        assert_eq!(message, "Database error occurred");
        assert!(!message.contains("sqlx"));
    }
}

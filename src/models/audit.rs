//! Audit domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 审计事件类型
///
/// url_signed 由外部的 URL 签名协作方写入同一事件词汇表，
/// 引擎本身不产生该事件，但审计查询接口接受它作为过滤条件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "audit_event_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    UrlSigned,
    PlaybackStarted,
    PlaybackEnded,
    PlaybackValidated,
    PlaybackRejected,
    LicenseGranted,
    LicenseRevoked,
    ConcurrentStreamBlocked,
    DownloadAuthorized,
    DownloadCompleted,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::UrlSigned => "url_signed",
            AuditEventType::PlaybackStarted => "playback_started",
            AuditEventType::PlaybackEnded => "playback_ended",
            AuditEventType::PlaybackValidated => "playback_validated",
            AuditEventType::PlaybackRejected => "playback_rejected",
            AuditEventType::LicenseGranted => "license_granted",
            AuditEventType::LicenseRevoked => "license_revoked",
            AuditEventType::ConcurrentStreamBlocked => "concurrent_stream_blocked",
            AuditEventType::DownloadAuthorized => "download_authorized",
            AuditEventType::DownloadCompleted => "download_completed",
        }
    }
}

/// 审计日志条目（只追加，创建后不再变更）
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLogEntry {
    pub id: Uuid,
    /// 主体未知时为空（例如令牌无法解析的请求）
    pub user_id: Option<Uuid>,
    pub episode_id: Option<Uuid>,
    pub device_id: Option<String>,
    pub event_type: AuditEventType,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// 结构化附加信息，引擎不解释其内容
    pub metadata: Option<serde_json::Value>,
    pub reason: Option<String>,
    pub was_successful: bool,
    pub created_at: DateTime<Utc>,
}

/// 审计日志查询过滤器
#[derive(Debug, Default, Deserialize)]
pub struct AuditLogFilters {
    pub user_id: Option<Uuid>,
    pub episode_id: Option<Uuid>,
    pub event_type: Option<AuditEventType>,
    pub was_successful: Option<bool>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_coverage() {
        // 确保事件词汇表与持久化枚举一一对应
        let events = [
            AuditEventType::UrlSigned,
            AuditEventType::PlaybackStarted,
            AuditEventType::PlaybackEnded,
            AuditEventType::PlaybackValidated,
            AuditEventType::PlaybackRejected,
            AuditEventType::LicenseGranted,
            AuditEventType::LicenseRevoked,
            AuditEventType::ConcurrentStreamBlocked,
            AuditEventType::DownloadAuthorized,
            AuditEventType::DownloadCompleted,
        ];

        for event in events {
            assert!(!event.as_str().is_empty());
            assert_eq!(event.as_str(), event.as_str().to_lowercase());
        }
    }

    #[test]
    fn test_event_type_serde_round_trip() {
        let json = serde_json::to_string(&AuditEventType::ConcurrentStreamBlocked).unwrap();
        assert_eq!(json, "\"concurrent_stream_blocked\"");

        let parsed: AuditEventType = serde_json::from_str("\"url_signed\"").unwrap();
        assert_eq!(parsed, AuditEventType::UrlSigned);
    }
}

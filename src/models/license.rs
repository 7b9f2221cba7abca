//! License domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 许可类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "license_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LicenseType {
    /// 在线播放
    Stream,
    /// 离线下载
    Download,
}

/// 许可证 - 一个 (用户, 剧集) 的播放授权
///
/// 每对 (user_id, episode_id) 至多一行，由唯一约束保证；
/// 重新签发是对现有行的更新，不会产生重复行。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct License {
    pub id: Uuid,
    pub user_id: Uuid,
    pub episode_id: Uuid,
    /// 可选的设备绑定（仅记录，播放并发由会话准入按设备控制）
    pub device_id: Option<String>,
    pub license_type: LicenseType,
    pub is_valid: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revocation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 许可校验结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    Valid,
    Expired,
    Revoked,
    NotFound,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Valid => "valid",
            LicenseStatus::Expired => "expired",
            LicenseStatus::Revoked => "revoked",
            LicenseStatus::NotFound => "not_found",
        }
    }
}

impl License {
    /// 计算许可在给定时刻的状态
    ///
    /// Valid 当且仅当 is_valid 为真、未被吊销、且未到期（或无期限）。
    pub fn status_at(&self, now: DateTime<Utc>) -> LicenseStatus {
        if self.revoked_at.is_some() || !self.is_valid {
            return LicenseStatus::Revoked;
        }
        match self.expires_at {
            Some(expires_at) if expires_at <= now => LicenseStatus::Expired,
            _ => LicenseStatus::Valid,
        }
    }
}

/// 签发许可请求
#[derive(Debug, Deserialize, validator::Validate)]
pub struct IssueLicenseRequest {
    pub user_id: Uuid,
    pub episode_id: Uuid,
    pub license_type: LicenseType,
    /// 可选设备绑定
    #[validate(length(min = 1, max = 128))]
    pub device_id: Option<String>,
    /// 有效期（秒），缺省时使用配置的默认值
    #[validate(range(min = 1))]
    pub ttl_secs: Option<i64>,
}

/// 吊销许可请求
#[derive(Debug, Deserialize, validator::Validate)]
pub struct RevokeLicenseRequest {
    #[validate(length(min = 1, max = 512))]
    pub reason: String,
}

/// 许可校验响应
#[derive(Debug, Serialize)]
pub struct LicenseStatusResponse {
    pub user_id: Uuid,
    pub episode_id: Uuid,
    pub status: LicenseStatus,
    pub expires_at: Option<DateTime<Utc>>,
}

/// 下载授权请求
#[derive(Debug, Deserialize, validator::Validate)]
pub struct DownloadRequest {
    pub user_id: Uuid,
    pub episode_id: Uuid,
}

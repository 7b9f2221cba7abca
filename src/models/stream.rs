//! Active stream domain models
//! 活跃播放会话：一个 (用户, 设备) 绑定一行，由心跳维持存活

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 活跃播放会话
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActiveStream {
    pub id: Uuid,
    pub user_id: Uuid,
    pub episode_id: Uuid,
    pub device_id: String,
    pub device_name: Option<String>,
    pub device_platform: Option<String>,
    pub ip_address: Option<String>,
    /// 不透明会话令牌，全局唯一，每次准入/替换重新生成
    pub session_token: String,
    pub last_heartbeat: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
}

/// 设备元信息（准入时由客户端上报）
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceMeta {
    pub device_id: String,
    pub device_name: Option<String>,
    pub device_platform: Option<String>,
}

/// 开始播放（准入）请求
#[derive(Debug, Deserialize, validator::Validate)]
pub struct StartPlaybackRequest {
    pub user_id: Uuid,
    pub episode_id: Uuid,
    #[validate(length(min = 1, max = 128))]
    pub device_id: String,
    #[validate(length(max = 256))]
    pub device_name: Option<String>,
    #[validate(length(max = 64))]
    pub device_platform: Option<String>,
}

/// 准入成功响应
#[derive(Debug, Serialize)]
pub struct StartPlaybackResponse {
    pub session_token: String,
    pub episode_id: Uuid,
    pub device_id: String,
    pub started_at: DateTime<Utc>,
    /// 客户端应当按此间隔上报心跳
    pub heartbeat_interval_secs: i64,
}

/// 心跳请求
#[derive(Debug, Deserialize, validator::Validate)]
pub struct HeartbeatRequest {
    #[validate(length(min = 1, max = 128))]
    pub session_token: String,
}

/// 结束播放请求
#[derive(Debug, Deserialize, validator::Validate)]
pub struct EndPlaybackRequest {
    #[validate(length(min = 1, max = 128))]
    pub session_token: String,
    #[validate(length(max = 512))]
    pub reason: Option<String>,
}

/// 会话列表查询
#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    pub user_id: Uuid,
}

/// 会话列表响应条目（不回传会话令牌）
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub episode_id: Uuid,
    pub device_id: String,
    pub device_name: Option<String>,
    pub device_platform: Option<String>,
    pub last_heartbeat: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
}

impl From<ActiveStream> for SessionSummary {
    fn from(s: ActiveStream) -> Self {
        SessionSummary {
            id: s.id,
            episode_id: s.episode_id,
            device_id: s.device_id,
            device_name: s.device_name,
            device_platform: s.device_platform,
            last_heartbeat: s.last_heartbeat,
            started_at: s.started_at,
        }
    }
}

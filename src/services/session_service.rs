//! 会话准入控制服务
//! 按用户并发上限决定是否允许新的活跃播放流，心跳续活，显式结束

use rand::RngCore;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::concurrency::UserLockRegistry;
use crate::config::PlaybackConfig;
use crate::error::{AppError, Result};
use crate::middleware::ClientInfo;
use crate::models::audit::AuditEventType;
use crate::models::license::LicenseStatus;
use crate::models::stream::{ActiveStream, DeviceMeta};
use crate::repository::stream_repo::StreamRepository;
use crate::services::audit_service::{AuditEventParams, AuditService};
use crate::services::license_service::LicenseService;

/// 准入参数
///
/// max_concurrent_streams 是外部套餐/租户配置，按请求线程化传入，
/// 引擎不把它写死。
#[derive(Debug, Clone)]
pub struct AdmitParams<'a> {
    pub user_id: Uuid,
    pub episode_id: Uuid,
    pub device: &'a DeviceMeta,
    pub max_concurrent_streams: i64,
}

/// 会话准入控制服务
pub struct SessionService {
    db: PgPool,
    audit_service: Arc<AuditService>,
    license_service: Arc<LicenseService>,
    locks: Arc<UserLockRegistry>,
    playback: PlaybackConfig,
}

impl SessionService {
    pub fn new(
        db: PgPool,
        audit_service: Arc<AuditService>,
        license_service: Arc<LicenseService>,
        locks: Arc<UserLockRegistry>,
        playback: PlaybackConfig,
    ) -> Self {
        Self {
            db,
            audit_service,
            license_service,
            locks,
            playback,
        }
    }

    /// 准入一个新的活跃播放流
    ///
    /// 1. 许可必须 Valid（validate 的拒绝路径自带审计）；
    /// 2. 统计该用户跨设备的存活会话数，已达上限且不是同设备重开时
    ///    拒绝——拒绝是立即且最终的，不排队；
    /// 3. 同设备已有会话则原地替换（新令牌、重置 started_at）；
    /// 4. 否则插入新行。
    ///
    /// 第 2-4 步持有该用户的准入锁串行执行，防止两个并发请求
    /// 同时观察到"未超限"。
    #[instrument(skip(self, params, client), fields(user_id = %params.user_id, device_id = %params.device.device_id))]
    pub async fn admit(
        &self,
        params: AdmitParams<'_>,
        client: &ClientInfo,
    ) -> Result<ActiveStream> {
        let status = self
            .license_service
            .validate(params.user_id, params.episode_id, client)
            .await?;
        if status != LicenseStatus::Valid {
            metrics::counter!("playback_admissions_total", "outcome" => "license_invalid")
                .increment(1);
            return Err(LicenseService::status_error(status));
        }

        let _guard = self.locks.lock_user(params.user_id).await;

        let repo = StreamRepository::new(self.db.clone());
        let existing = repo
            .find_by_device(params.user_id, &params.device.device_id)
            .await?;

        if existing.is_none() {
            let live = repo
                .count_live_streams(params.user_id, self.playback.heartbeat_stale_secs)
                .await?;

            if live >= params.max_concurrent_streams {
                self.audit_service
                    .record_or_warn(AuditEventParams {
                        event_type: AuditEventType::ConcurrentStreamBlocked,
                        user_id: Some(params.user_id),
                        episode_id: Some(params.episode_id),
                        device_id: Some(&params.device.device_id),
                        ip_address: client.ip_address.as_deref(),
                        user_agent: client.user_agent.as_deref(),
                        metadata: Some(serde_json::json!({
                            "live_streams": live,
                            "limit": params.max_concurrent_streams,
                        })),
                        reason: Some("concurrent stream limit reached"),
                        was_successful: false,
                    })
                    .await;

                metrics::counter!("playback_admissions_total", "outcome" => "blocked")
                    .increment(1);

                return Err(AppError::ConcurrencyLimitExceeded {
                    limit: params.max_concurrent_streams,
                });
            }
        }

        let replaced = existing.is_some();
        let now = chrono::Utc::now();
        let stream = ActiveStream {
            id: Uuid::new_v4(),
            user_id: params.user_id,
            episode_id: params.episode_id,
            device_id: params.device.device_id.clone(),
            device_name: params.device.device_name.clone(),
            device_platform: params.device.device_platform.clone(),
            ip_address: client.ip_address.clone(),
            session_token: generate_session_token(),
            last_heartbeat: now,
            started_at: now,
        };

        let stream = repo.upsert_stream(&stream).await?;

        self.audit_service
            .record_or_warn(AuditEventParams {
                event_type: AuditEventType::PlaybackStarted,
                user_id: Some(params.user_id),
                episode_id: Some(params.episode_id),
                device_id: Some(&stream.device_id),
                ip_address: client.ip_address.as_deref(),
                user_agent: client.user_agent.as_deref(),
                metadata: Some(serde_json::json!({ "replaced": replaced })),
                reason: None,
                was_successful: true,
            })
            .await;

        let outcome = if replaced { "replaced" } else { "admitted" };
        metrics::counter!("playback_admissions_total", "outcome" => outcome).increment(1);

        info!(
            stream_id = %stream.id,
            user_id = %stream.user_id,
            episode_id = %stream.episode_id,
            replaced = replaced,
            "Playback admitted"
        );

        Ok(stream)
    }

    /// 刷新会话心跳
    ///
    /// 令牌未知或已被清扫时返回 SessionNotFound，客户端需要重新准入。
    /// 不产生审计事件。
    pub async fn heartbeat(&self, session_token: &str) -> Result<()> {
        let repo = StreamRepository::new(self.db.clone());
        let touched = repo.touch_heartbeat(session_token).await?;

        if !touched {
            return Err(AppError::SessionNotFound);
        }

        Ok(())
    }

    /// 显式结束播放
    ///
    /// 幂等：令牌已不存在视为已结束，成功返回且不发事件。
    #[instrument(skip(self, session_token, client))]
    pub async fn end(
        &self,
        session_token: &str,
        reason: &str,
        client: &ClientInfo,
    ) -> Result<()> {
        let repo = StreamRepository::new(self.db.clone());

        match repo.delete_by_token(session_token).await? {
            Some(stream) => {
                self.audit_service
                    .record_or_warn(AuditEventParams {
                        event_type: AuditEventType::PlaybackEnded,
                        user_id: Some(stream.user_id),
                        episode_id: Some(stream.episode_id),
                        device_id: Some(&stream.device_id),
                        ip_address: client.ip_address.as_deref(),
                        user_agent: client.user_agent.as_deref(),
                        metadata: None,
                        reason: Some(reason),
                        was_successful: true,
                    })
                    .await;

                info!(
                    stream_id = %stream.id,
                    user_id = %stream.user_id,
                    reason = reason,
                    "Playback ended"
                );
            }
            None => {
                debug!("Playback already ended, nothing to do");
            }
        }

        Ok(())
    }

    /// 驱逐 (用户, 剧集) 的全部活跃会话（许可吊销级联）
    pub async fn evict_all_for_license(&self, user_id: Uuid, episode_id: Uuid) -> Result<u64> {
        let repo = StreamRepository::new(self.db.clone());
        let evicted = repo.delete_for_license(user_id, episode_id).await?;

        for stream in &evicted {
            self.audit_service
                .record_or_warn(AuditEventParams {
                    event_type: AuditEventType::PlaybackRejected,
                    user_id: Some(stream.user_id),
                    episode_id: Some(stream.episode_id),
                    device_id: Some(&stream.device_id),
                    ip_address: stream.ip_address.as_deref(),
                    user_agent: None,
                    metadata: None,
                    reason: Some("license revoked"),
                    was_successful: false,
                })
                .await;
        }

        if !evicted.is_empty() {
            info!(
                user_id = %user_id,
                episode_id = %episode_id,
                evicted = evicted.len(),
                "Active streams evicted after license revocation"
            );
        }

        Ok(evicted.len() as u64)
    }

    /// 列出用户的存活会话
    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<ActiveStream>> {
        let repo = StreamRepository::new(self.db.clone());
        repo.list_live_streams(user_id, self.playback.heartbeat_stale_secs)
            .await
    }
}

/// 生成不透明会话令牌：32 字节随机数的十六进制编码
fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

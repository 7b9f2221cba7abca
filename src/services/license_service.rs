//! 许可证注册服务
//! 签发、校验、吊销，以及下载授权

use once_cell::sync::OnceCell;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::PlaybackConfig;
use crate::error::{AppError, Result};
use crate::middleware::ClientInfo;
use crate::models::audit::AuditEventType;
use crate::models::license::*;
use crate::repository::license_repo::LicenseRepository;
use crate::services::audit_service::{AuditEventParams, AuditService};
use crate::services::entitlement_service::EntitlementService;
use crate::services::session_service::SessionService;

/// 签发许可参数
#[derive(Debug, Clone)]
pub struct IssueLicenseParams<'a> {
    pub user_id: Uuid,
    pub episode_id: Uuid,
    pub license_type: LicenseType,
    pub device_id: Option<&'a str>,
    /// 有效期（秒），None 时使用配置默认值
    pub ttl_secs: Option<i64>,
}

/// 许可证注册服务
///
/// 吊销需要同步驱逐同一 (用户, 剧集) 的活跃会话，而会话准入又依赖
/// 许可校验，两个服务互相引用。构造时先建许可服务，
/// 会话服务建好后通过 attach_sessions 回接。
pub struct LicenseService {
    db: PgPool,
    audit_service: Arc<AuditService>,
    entitlement_service: Arc<EntitlementService>,
    playback: PlaybackConfig,
    session_service: OnceCell<Arc<SessionService>>,
}

impl LicenseService {
    pub fn new(
        db: PgPool,
        audit_service: Arc<AuditService>,
        entitlement_service: Arc<EntitlementService>,
        playback: PlaybackConfig,
    ) -> Self {
        Self {
            db,
            audit_service,
            entitlement_service,
            playback,
            session_service: OnceCell::new(),
        }
    }

    /// 回接会话服务（吊销级联驱逐用）
    pub fn attach_sessions(&self, sessions: Arc<SessionService>) {
        if self.session_service.set(sessions).is_err() {
            warn!("Session service already attached");
        }
    }

    /// 签发或续期许可证
    ///
    /// 同一 (用户, 剧集) 已有许可时续期而不是新建：清除吊销状态、
    /// 重算到期时间。资格检查不通过返回 LicenseDenied。
    #[instrument(skip(self, client))]
    pub async fn issue(
        &self,
        params: IssueLicenseParams<'_>,
        client: &ClientInfo,
    ) -> Result<License> {
        if let Err(e) = self
            .entitlement_service
            .require_entitlement(params.user_id, params.episode_id)
            .await
        {
            // 只有真正的资格拒绝留痕，存储故障原样上抛。
            // 主体没有通过目录解析，user_id/episode_id 列留空，
            // 请求声称的标识放进 metadata。
            if matches!(e, AppError::LicenseDenied(_)) {
                self.audit_service
                    .record_or_warn(AuditEventParams {
                        event_type: AuditEventType::PlaybackRejected,
                        user_id: None,
                        episode_id: None,
                        device_id: params.device_id,
                        ip_address: client.ip_address.as_deref(),
                        user_agent: client.user_agent.as_deref(),
                        metadata: Some(serde_json::json!({
                            "claimed_user_id": params.user_id,
                            "claimed_episode_id": params.episode_id,
                        })),
                        reason: Some("entitlement check failed"),
                        was_successful: false,
                    })
                    .await;
            }
            return Err(e);
        }

        let ttl_secs = params.ttl_secs.or(match self.playback.default_license_ttl_secs {
            0 => None,
            secs => Some(secs),
        });
        let expires_at = ttl_secs.map(|secs| chrono::Utc::now() + chrono::Duration::seconds(secs));

        let repo = LicenseRepository::new(self.db.clone());
        let license = repo
            .upsert_license(
                params.user_id,
                params.episode_id,
                params.license_type,
                params.device_id,
                expires_at,
            )
            .await?;

        metrics::counter!("licenses_issued_total").increment(1);

        self.audit_service
            .record_or_warn(AuditEventParams {
                event_type: AuditEventType::LicenseGranted,
                user_id: Some(params.user_id),
                episode_id: Some(params.episode_id),
                device_id: params.device_id,
                ip_address: client.ip_address.as_deref(),
                user_agent: client.user_agent.as_deref(),
                metadata: Some(serde_json::json!({
                    "license_type": params.license_type,
                    "expires_at": expires_at,
                })),
                reason: None,
                was_successful: true,
            })
            .await;

        info!(
            license_id = %license.id,
            user_id = %params.user_id,
            episode_id = %params.episode_id,
            "License granted"
        );

        Ok(license)
    }

    /// 校验 (用户, 剧集) 的许可状态
    ///
    /// 读路径，不改状态。非 Valid 结果写入 playback_rejected 审计；
    /// Valid 作为准入门禁使用时不单独发事件，由调用方在完整决策
    /// 落定后发更高层的事件。
    #[instrument(skip(self, client))]
    pub async fn validate(
        &self,
        user_id: Uuid,
        episode_id: Uuid,
        client: &ClientInfo,
    ) -> Result<LicenseStatus> {
        let (license, status) = self.load_status(user_id, episode_id).await?;

        if status != LicenseStatus::Valid {
            let reason = Self::status_reason(status);

            self.audit_service
                .record_or_warn(AuditEventParams {
                    event_type: AuditEventType::PlaybackRejected,
                    user_id: Some(user_id),
                    episode_id: Some(episode_id),
                    device_id: license.as_ref().and_then(|l| l.device_id.as_deref()),
                    ip_address: client.ip_address.as_deref(),
                    user_agent: client.user_agent.as_deref(),
                    metadata: None,
                    reason: Some(reason),
                    was_successful: false,
                })
                .await;
        }

        Ok(status)
    }

    /// 吊销许可证
    ///
    /// 幂等：许可不存在或已吊销时成功返回且不发事件。实际发生
    /// 状态变迁时写 license_revoked，并同步驱逐该 (用户, 剧集) 的
    /// 活跃会话——级联是显式的服务间调用，审计链能看到因果。
    #[instrument(skip(self, client))]
    pub async fn revoke(
        &self,
        user_id: Uuid,
        episode_id: Uuid,
        reason: &str,
        client: &ClientInfo,
    ) -> Result<()> {
        let repo = LicenseRepository::new(self.db.clone());
        let revoked = repo.revoke(user_id, episode_id, reason).await?;

        if let Some(license) = &revoked {
            metrics::counter!("licenses_revoked_total").increment(1);

            self.audit_service
                .record_or_warn(AuditEventParams {
                    event_type: AuditEventType::LicenseRevoked,
                    user_id: Some(user_id),
                    episode_id: Some(episode_id),
                    device_id: license.device_id.as_deref(),
                    ip_address: client.ip_address.as_deref(),
                    user_agent: client.user_agent.as_deref(),
                    metadata: None,
                    reason: Some(reason),
                    was_successful: true,
                })
                .await;

            info!(
                license_id = %license.id,
                user_id = %user_id,
                episode_id = %episode_id,
                reason = reason,
                "License revoked"
            );
        }

        // 重复吊销也要驱逐：上一次调用若在驱逐前失败，重试必须能补上
        match self.session_service.get() {
            Some(sessions) => {
                sessions.evict_all_for_license(user_id, episode_id).await?;
            }
            None => warn!("Session service not attached, skipping stream eviction"),
        }

        Ok(())
    }

    /// 下载授权
    ///
    /// 许可必须存在、Valid、且类型为 download。
    #[instrument(skip(self, client))]
    pub async fn authorize_download(
        &self,
        user_id: Uuid,
        episode_id: Uuid,
        client: &ClientInfo,
    ) -> Result<License> {
        let (license, status) = self.load_status(user_id, episode_id).await?;

        if status != LicenseStatus::Valid {
            self.reject_download(user_id, episode_id, Self::status_reason(status), client).await;
            return Err(Self::status_error(status));
        }

        // load_status 返回 Valid 时必然有行
        let license = license.ok_or(AppError::LicenseNotFound)?;

        if license.license_type != LicenseType::Download {
            self.reject_download(user_id, episode_id, "license does not permit download", client)
                .await;
            return Err(AppError::denied("License does not permit download"));
        }

        self.audit_service
            .record_or_warn(AuditEventParams {
                event_type: AuditEventType::DownloadAuthorized,
                user_id: Some(user_id),
                episode_id: Some(episode_id),
                device_id: license.device_id.as_deref(),
                ip_address: client.ip_address.as_deref(),
                user_agent: client.user_agent.as_deref(),
                metadata: None,
                reason: None,
                was_successful: true,
            })
            .await;

        info!(user_id = %user_id, episode_id = %episode_id, "Download authorized");

        Ok(license)
    }

    /// 记录下载完成
    #[instrument(skip(self, client))]
    pub async fn complete_download(
        &self,
        user_id: Uuid,
        episode_id: Uuid,
        client: &ClientInfo,
    ) -> Result<()> {
        let repo = LicenseRepository::new(self.db.clone());
        let license = repo.find_by_pair(user_id, episode_id).await?;

        let Some(license) = license else {
            self.reject_download(user_id, episode_id, "license not found", client).await;
            return Err(AppError::LicenseNotFound);
        };

        self.audit_service
            .record_or_warn(AuditEventParams {
                event_type: AuditEventType::DownloadCompleted,
                user_id: Some(user_id),
                episode_id: Some(episode_id),
                device_id: license.device_id.as_deref(),
                ip_address: client.ip_address.as_deref(),
                user_agent: client.user_agent.as_deref(),
                metadata: None,
                reason: None,
                was_successful: true,
            })
            .await;

        Ok(())
    }

    /// 查找许可并计算当前状态
    async fn load_status(
        &self,
        user_id: Uuid,
        episode_id: Uuid,
    ) -> Result<(Option<License>, LicenseStatus)> {
        let repo = LicenseRepository::new(self.db.clone());
        let license = repo.find_by_pair(user_id, episode_id).await?;

        let status = match &license {
            Some(license) => license.status_at(chrono::Utc::now()),
            None => LicenseStatus::NotFound,
        };

        Ok((license, status))
    }

    async fn reject_download(
        &self,
        user_id: Uuid,
        episode_id: Uuid,
        reason: &str,
        client: &ClientInfo,
    ) {
        self.audit_service
            .record_or_warn(AuditEventParams {
                event_type: AuditEventType::PlaybackRejected,
                user_id: Some(user_id),
                episode_id: Some(episode_id),
                device_id: None,
                ip_address: client.ip_address.as_deref(),
                user_agent: client.user_agent.as_deref(),
                metadata: None,
                reason: Some(reason),
                was_successful: false,
            })
            .await;
    }

    /// 非 Valid 状态的审计 reason 文本
    fn status_reason(status: LicenseStatus) -> &'static str {
        match status {
            LicenseStatus::Expired => "license expired",
            LicenseStatus::Revoked => "license revoked",
            LicenseStatus::NotFound => "license not found",
            LicenseStatus::Valid => "valid",
        }
    }

    /// 把非 Valid 状态映射为对应的错误
    pub fn status_error(status: LicenseStatus) -> AppError {
        match status {
            LicenseStatus::Expired => AppError::LicenseExpired,
            LicenseStatus::Revoked => AppError::LicenseRevoked,
            LicenseStatus::NotFound => AppError::LicenseNotFound,
            LicenseStatus::Valid => AppError::internal_error("valid license is not an error"),
        }
    }
}

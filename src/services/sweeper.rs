//! 心跳监控
//! 后台周期清扫心跳过期的会话，释放并发名额
//!
//! 清扫是会话死亡的唯一裁决者。客户端断开不会发任何信号，
//! 心跳缺失就是全部的存活信号，过期窗口因此也是系统事实上的
//! 超时/取消机制。准入计数使用同一个过期谓词（见 StreamRepository），
//! 所以等待清扫的死会话不会挡住新的准入。

use sqlx::PgPool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::PlaybackConfig;
use crate::error::Result;
use crate::models::audit::AuditEventType;
use crate::repository::stream_repo::StreamRepository;
use crate::services::audit_service::{AuditEventParams, AuditService};

pub struct HeartbeatMonitor {
    db: PgPool,
    audit_service: Arc<AuditService>,
    playback: PlaybackConfig,
}

impl HeartbeatMonitor {
    pub fn new(db: PgPool, audit_service: Arc<AuditService>, playback: PlaybackConfig) -> Self {
        Self {
            db,
            audit_service,
            playback,
        }
    }

    /// 启动后台清扫任务
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let period = std::time::Duration::from_secs(self.playback.sweep_interval_secs);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            info!(
                sweep_interval_secs = self.playback.sweep_interval_secs,
                stale_secs = self.playback.heartbeat_stale_secs,
                "Heartbeat monitor started"
            );

            loop {
                interval.tick().await;

                match self.sweep_once().await {
                    Ok(0) => {}
                    Ok(reaped) => {
                        info!(reaped = reaped, "Stale sessions reaped");
                    }
                    Err(e) => {
                        error!(error = %e, "Heartbeat sweep failed");
                    }
                }
            }
        })
    }

    /// 执行一轮清扫，返回回收的会话数
    ///
    /// 每个被回收的会话写一条 playback_ended（reason "heartbeat timeout"）。
    /// 测试直接调用这里，不依赖定时器。
    pub async fn sweep_once(&self) -> Result<u64> {
        let repo = StreamRepository::new(self.db.clone());
        let reaped = repo
            .delete_stale_streams(self.playback.heartbeat_stale_secs)
            .await?;

        for stream in &reaped {
            metrics::counter!("sessions_reaped_total").increment(1);

            self.audit_service
                .record_or_warn(AuditEventParams {
                    event_type: AuditEventType::PlaybackEnded,
                    user_id: Some(stream.user_id),
                    episode_id: Some(stream.episode_id),
                    device_id: Some(&stream.device_id),
                    ip_address: stream.ip_address.as_deref(),
                    user_agent: None,
                    metadata: None,
                    reason: Some("heartbeat timeout"),
                    was_successful: true,
                })
                .await;
        }

        Ok(reaped.len() as u64)
    }
}

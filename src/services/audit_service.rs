//! 审计日志服务
//!
//! 每次许可/会话状态变迁同步写入一条审计记录。写入失败的处理策略：
//! 业务操作不回滚，但失败必须通过 error 日志和
//! audit_write_failures_total 指标显式暴露，绝不静默丢弃——
//! 运维据此发现审计链缺口。

use crate::{error::AppError, models::audit::*, repository::audit_repo::AuditRepository};
use sqlx::PgPool;
use uuid::Uuid;

/// 审计事件参数结构体
#[derive(Debug, Clone)]
pub struct AuditEventParams<'a> {
    pub event_type: AuditEventType,
    pub user_id: Option<Uuid>,
    pub episode_id: Option<Uuid>,
    pub device_id: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub metadata: Option<serde_json::Value>,
    pub reason: Option<&'a str>,
    pub was_successful: bool,
}

pub struct AuditService {
    db: PgPool,
}

impl AuditService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 记录一条审计日志
    pub async fn record(&self, params: AuditEventParams<'_>) -> Result<(), AppError> {
        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            user_id: params.user_id,
            episode_id: params.episode_id,
            device_id: params.device_id.map(|s| s.to_string()),
            event_type: params.event_type,
            ip_address: params.ip_address.map(|s| s.to_string()),
            user_agent: params.user_agent.map(|s| s.to_string()),
            metadata: params.metadata,
            reason: params.reason.map(|s| s.to_string()),
            was_successful: params.was_successful,
            created_at: chrono::Utc::now(),
        };

        let repo = AuditRepository::new(self.db.clone());
        repo.insert_entry(&entry)
            .await
            .map_err(|e| AppError::AuditWriteFailed(e.to_string()))?;

        Ok(())
    }

    /// 记录审计日志，失败时只告警不中断业务
    ///
    /// 策略（显式声明）：审计写入失败不回滚已完成的许可/会话变更，
    /// 失败通过 error 日志与 audit_write_failures_total 指标上报。
    pub async fn record_or_warn(&self, params: AuditEventParams<'_>) {
        let event_type = params.event_type;
        if let Err(e) = self.record(params).await {
            metrics::counter!("audit_write_failures_total").increment(1);
            tracing::error!(
                event_type = event_type.as_str(),
                error = %e,
                "Audit entry failed to persist, business operation already committed"
            );
        }
    }

    /// 查询审计日志
    pub async fn query_entries(
        &self,
        filters: &AuditLogFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLogEntry>, AppError> {
        let repo = AuditRepository::new(self.db.clone());
        repo.query_entries(filters, limit, offset).await
    }

    /// 查询审计日志数量
    pub async fn count_entries(&self, filters: &AuditLogFilters) -> Result<i64, AppError> {
        let repo = AuditRepository::new(self.db.clone());
        repo.count_entries(filters).await
    }
}

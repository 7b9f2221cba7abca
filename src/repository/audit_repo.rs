//! Audit repository (审计数据访问)
//!
//! 只有 INSERT 与 SELECT：审计日志是只追加的，引擎不修改、不删除已有行。

use crate::{error::AppError, models::audit::*};
use sqlx::{PgPool, Row};

pub struct AuditRepository {
    db: PgPool,
}

impl AuditRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 插入审计日志
    pub async fn insert_entry(&self, entry: &AuditLogEntry) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, user_id, episode_id, device_id, event_type,
                ip_address, user_agent, metadata, reason, was_successful, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.episode_id)
        .bind(&entry.device_id)
        .bind(entry.event_type)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(&entry.metadata)
        .bind(&entry.reason)
        .bind(entry.was_successful)
        .bind(entry.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// 查询审计日志
    pub async fn query_entries(
        &self,
        filters: &AuditLogFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLogEntry>, AppError> {
        let mut query = String::from("SELECT * FROM audit_logs WHERE 1=1");
        let mut index = 0;

        if filters.user_id.is_some() {
            index += 1;
            query.push_str(&format!(" AND user_id = ${}", index));
        }
        if filters.episode_id.is_some() {
            index += 1;
            query.push_str(&format!(" AND episode_id = ${}", index));
        }
        if filters.event_type.is_some() {
            index += 1;
            query.push_str(&format!(" AND event_type = ${}", index));
        }
        if filters.was_successful.is_some() {
            index += 1;
            query.push_str(&format!(" AND was_successful = ${}", index));
        }
        if filters.start_time.is_some() {
            index += 1;
            query.push_str(&format!(" AND created_at >= ${}", index));
        }
        if filters.end_time.is_some() {
            index += 1;
            query.push_str(&format!(" AND created_at <= ${}", index));
        }

        query.push_str(&format!(
            " ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            index + 1,
            index + 2
        ));

        let mut query_builder = sqlx::query_as::<_, AuditLogEntry>(&query);

        if let Some(user_id) = filters.user_id {
            query_builder = query_builder.bind(user_id);
        }
        if let Some(episode_id) = filters.episode_id {
            query_builder = query_builder.bind(episode_id);
        }
        if let Some(event_type) = filters.event_type {
            query_builder = query_builder.bind(event_type);
        }
        if let Some(was_successful) = filters.was_successful {
            query_builder = query_builder.bind(was_successful);
        }
        if let Some(start_time) = filters.start_time {
            query_builder = query_builder.bind(start_time);
        }
        if let Some(end_time) = filters.end_time {
            query_builder = query_builder.bind(end_time);
        }

        let entries = query_builder
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;

        Ok(entries)
    }

    /// 统计审计日志数量
    pub async fn count_entries(&self, filters: &AuditLogFilters) -> Result<i64, AppError> {
        let mut query = String::from("SELECT COUNT(*) FROM audit_logs WHERE 1=1");
        let mut index = 0;

        if filters.user_id.is_some() {
            index += 1;
            query.push_str(&format!(" AND user_id = ${}", index));
        }
        if filters.episode_id.is_some() {
            index += 1;
            query.push_str(&format!(" AND episode_id = ${}", index));
        }
        if filters.event_type.is_some() {
            index += 1;
            query.push_str(&format!(" AND event_type = ${}", index));
        }
        if filters.was_successful.is_some() {
            index += 1;
            query.push_str(&format!(" AND was_successful = ${}", index));
        }
        if filters.start_time.is_some() {
            index += 1;
            query.push_str(&format!(" AND created_at >= ${}", index));
        }
        if filters.end_time.is_some() {
            index += 1;
            query.push_str(&format!(" AND created_at <= ${}", index));
        }

        let mut query_builder = sqlx::query(&query);

        if let Some(user_id) = filters.user_id {
            query_builder = query_builder.bind(user_id);
        }
        if let Some(episode_id) = filters.episode_id {
            query_builder = query_builder.bind(episode_id);
        }
        if let Some(event_type) = filters.event_type {
            query_builder = query_builder.bind(event_type);
        }
        if let Some(was_successful) = filters.was_successful {
            query_builder = query_builder.bind(was_successful);
        }
        if let Some(start_time) = filters.start_time {
            query_builder = query_builder.bind(start_time);
        }
        if let Some(end_time) = filters.end_time {
            query_builder = query_builder.bind(end_time);
        }

        let count: i64 = query_builder.fetch_one(&self.db).await?.get(0);
        Ok(count)
    }
}

//! Active stream repository (活跃会话数据访问)
//!
//! 存活判定只有一个定义：last_heartbeat 落在过期窗口之内。
//! 准入计数与后台清扫都从这里取同一个谓词，二者永远一致——
//! 即将被下一轮清扫回收的会话不会再占用并发名额。

use crate::{error::AppError, models::stream::ActiveStream};
use sqlx::PgPool;
use uuid::Uuid;

pub struct StreamRepository {
    db: PgPool,
}

impl StreamRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 写入或替换 (用户, 设备) 的会话
    ///
    /// 以 (user_id, device_id) 唯一索引为键做原子 upsert：同设备重开播放
    /// 替换原行（新令牌、重置 started_at、刷新心跳），竞态下的重复插入
    /// 会落到 DO UPDATE 分支而不是报错。
    pub async fn upsert_stream(&self, stream: &ActiveStream) -> Result<ActiveStream, AppError> {
        let row = sqlx::query_as::<_, ActiveStream>(
            r#"
            INSERT INTO active_streams (
                id, user_id, episode_id, device_id, device_name,
                device_platform, ip_address, session_token, last_heartbeat, started_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
            ON CONFLICT (user_id, device_id) DO UPDATE SET
                episode_id = EXCLUDED.episode_id,
                device_name = EXCLUDED.device_name,
                device_platform = EXCLUDED.device_platform,
                ip_address = EXCLUDED.ip_address,
                session_token = EXCLUDED.session_token,
                last_heartbeat = NOW(),
                started_at = NOW()
            RETURNING *
            "#,
        )
        .bind(stream.id)
        .bind(stream.user_id)
        .bind(stream.episode_id)
        .bind(&stream.device_id)
        .bind(&stream.device_name)
        .bind(&stream.device_platform)
        .bind(&stream.ip_address)
        .bind(&stream.session_token)
        .fetch_one(&self.db)
        .await?;

        Ok(row)
    }

    /// 统计用户的存活会话数（跨设备）
    pub async fn count_live_streams(
        &self,
        user_id: Uuid,
        stale_secs: i64,
    ) -> Result<i64, AppError> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM active_streams
            WHERE user_id = $1
              AND last_heartbeat > NOW() - ($2::bigint * INTERVAL '1 second')
            "#,
        )
        .bind(user_id)
        .bind(stale_secs)
        .fetch_one(&self.db)
        .await?;

        Ok(count.0)
    }

    /// 查找 (用户, 设备) 的现有会话
    pub async fn find_by_device(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> Result<Option<ActiveStream>, AppError> {
        let stream = sqlx::query_as::<_, ActiveStream>(
            "SELECT * FROM active_streams WHERE user_id = $1 AND device_id = $2",
        )
        .bind(user_id)
        .bind(device_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(stream)
    }

    /// 按令牌刷新心跳，返回是否命中
    pub async fn touch_heartbeat(&self, session_token: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE active_streams SET last_heartbeat = NOW() WHERE session_token = $1",
        )
        .bind(session_token)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 按令牌删除会话，返回被删除的行
    pub async fn delete_by_token(
        &self,
        session_token: &str,
    ) -> Result<Option<ActiveStream>, AppError> {
        let stream = sqlx::query_as::<_, ActiveStream>(
            "DELETE FROM active_streams WHERE session_token = $1 RETURNING *",
        )
        .bind(session_token)
        .fetch_optional(&self.db)
        .await?;

        Ok(stream)
    }

    /// 删除 (用户, 剧集) 的全部会话，返回被删除的行（吊销级联用）
    pub async fn delete_for_license(
        &self,
        user_id: Uuid,
        episode_id: Uuid,
    ) -> Result<Vec<ActiveStream>, AppError> {
        let streams = sqlx::query_as::<_, ActiveStream>(
            "DELETE FROM active_streams WHERE user_id = $1 AND episode_id = $2 RETURNING *",
        )
        .bind(user_id)
        .bind(episode_id)
        .fetch_all(&self.db)
        .await?;

        Ok(streams)
    }

    /// 删除心跳过期的会话，返回被删除的行（后台清扫用）
    pub async fn delete_stale_streams(&self, stale_secs: i64) -> Result<Vec<ActiveStream>, AppError> {
        let streams = sqlx::query_as::<_, ActiveStream>(
            r#"
            DELETE FROM active_streams
            WHERE last_heartbeat <= NOW() - ($1::bigint * INTERVAL '1 second')
            RETURNING *
            "#,
        )
        .bind(stale_secs)
        .fetch_all(&self.db)
        .await?;

        Ok(streams)
    }

    /// 列出用户的存活会话
    pub async fn list_live_streams(
        &self,
        user_id: Uuid,
        stale_secs: i64,
    ) -> Result<Vec<ActiveStream>, AppError> {
        let streams = sqlx::query_as::<_, ActiveStream>(
            r#"
            SELECT * FROM active_streams
            WHERE user_id = $1
              AND last_heartbeat > NOW() - ($2::bigint * INTERVAL '1 second')
            ORDER BY started_at
            "#,
        )
        .bind(user_id)
        .bind(stale_secs)
        .fetch_all(&self.db)
        .await?;

        Ok(streams)
    }
}

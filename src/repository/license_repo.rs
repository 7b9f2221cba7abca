//! License repository (许可证数据访问)

use crate::{error::AppError, models::license::*};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct LicenseRepository {
    db: PgPool,
}

impl LicenseRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 签发或续期许可证
    ///
    /// 以 (user_id, episode_id) 唯一索引为键做原子 upsert：已有行被续期
    /// （清除吊销状态、重算到期时间），绝不会插入第二行。
    pub async fn upsert_license(
        &self,
        user_id: Uuid,
        episode_id: Uuid,
        license_type: LicenseType,
        device_id: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<License, AppError> {
        let license = sqlx::query_as::<_, License>(
            r#"
            INSERT INTO licenses (
                id, user_id, episode_id, device_id, license_type,
                is_valid, expires_at, revoked_at, revocation_reason
            )
            VALUES ($1, $2, $3, $4, $5, TRUE, $6, NULL, NULL)
            ON CONFLICT (user_id, episode_id) DO UPDATE SET
                device_id = EXCLUDED.device_id,
                license_type = EXCLUDED.license_type,
                is_valid = TRUE,
                expires_at = EXCLUDED.expires_at,
                revoked_at = NULL,
                revocation_reason = NULL,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(episode_id)
        .bind(device_id)
        .bind(license_type)
        .bind(expires_at)
        .fetch_one(&self.db)
        .await?;

        Ok(license)
    }

    /// 查找 (用户, 剧集) 的许可证
    pub async fn find_by_pair(
        &self,
        user_id: Uuid,
        episode_id: Uuid,
    ) -> Result<Option<License>, AppError> {
        let license = sqlx::query_as::<_, License>(
            "SELECT * FROM licenses WHERE user_id = $1 AND episode_id = $2",
        )
        .bind(user_id)
        .bind(episode_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(license)
    }

    /// 吊销许可证，返回被吊销的行
    ///
    /// 只对未吊销的行生效；许可不存在或已吊销时返回 None（幂等）。
    pub async fn revoke(
        &self,
        user_id: Uuid,
        episode_id: Uuid,
        reason: &str,
    ) -> Result<Option<License>, AppError> {
        let license = sqlx::query_as::<_, License>(
            r#"
            UPDATE licenses
            SET revoked_at = NOW(),
                is_valid = FALSE,
                revocation_reason = $3,
                updated_at = NOW()
            WHERE user_id = $1 AND episode_id = $2 AND revoked_at IS NULL
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(episode_id)
        .bind(reason)
        .fetch_optional(&self.db)
        .await?;

        Ok(license)
    }

    /// 统计 (用户, 剧集) 的许可证行数（测试不变量用）
    pub async fn count_for_pair(&self, user_id: Uuid, episode_id: Uuid) -> Result<i64, AppError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM licenses WHERE user_id = $1 AND episode_id = $2",
        )
        .bind(user_id)
        .bind(episode_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count.0)
    }
}

//! 授权资格检查服务
//!
//! 外部身份/目录协作方的本地替身：签发许可前确认用户与剧集存在。
//! 生产系统在这里换成真实的套餐/订阅检查调用。

use crate::error::AppError;
use sqlx::PgPool;
use uuid::Uuid;

pub struct EntitlementService {
    db: PgPool,
}

impl EntitlementService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 检查用户是否有资格获得该剧集的许可
    pub async fn require_entitlement(
        &self,
        user_id: Uuid,
        episode_id: Uuid,
    ) -> Result<(), AppError> {
        let user_exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&self.db)
                .await?;

        if !user_exists.0 {
            return Err(AppError::denied("User is not entitled to this episode"));
        }

        let episode_exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM episodes WHERE id = $1)")
                .bind(episode_id)
                .fetch_one(&self.db)
                .await?;

        if !episode_exists.0 {
            return Err(AppError::denied("Episode is not available"));
        }

        Ok(())
    }
}

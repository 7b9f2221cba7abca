//! 并发控制模块
//! 提供按用户维度的互斥锁，串行化同一用户的准入判定
//!
//! admit 的"数活跃流再写入"是典型的 check-then-act 序列，两个并发请求
//! 可能同时观察到"未超限"。按用户加锁后，同一用户的准入判定互相串行，
//! 不同用户之间完全并行；(user_id, device_id) 与 session_token 上的
//! 唯一约束是竞态下的最后防线。

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

/// 按用户维度的锁注册表
#[derive(Default)]
pub struct UserLockRegistry {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl UserLockRegistry {
    /// 创建新的锁注册表
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// 获取某用户的准入锁，持有返回的 guard 期间该用户的其他准入请求等待
    pub async fn lock_user(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        debug!(user_id = %user_id, "Acquiring per-user admission lock");
        lock.lock_owned().await
    }

    /// 当前登记的用户数（监控用）
    pub async fn tracked_users(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// 清理当前无人持有的锁条目
    ///
    /// 注册表按用户增长，长时间运行的进程定期调用一次即可
    pub async fn prune(&self) -> usize {
        let mut locks = self.locks.lock().await;
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_same_user_is_serialized() {
        let registry = Arc::new(UserLockRegistry::new());
        let user_id = Uuid::new_v4();
        let in_critical = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let in_critical = in_critical.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.lock_user(user_id).await;
                let now = in_critical.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                in_critical.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // 同一用户的临界区永远只有一个任务
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_users_run_in_parallel() {
        let registry = UserLockRegistry::new();

        let guard_a = registry.lock_user(Uuid::new_v4()).await;
        // 另一个用户的锁不会被 guard_a 阻塞
        let guard_b = registry.lock_user(Uuid::new_v4()).await;

        drop(guard_a);
        drop(guard_b);
        assert_eq!(registry.tracked_users().await, 2);
    }

    #[tokio::test]
    async fn test_prune_removes_idle_entries() {
        let registry = UserLockRegistry::new();
        let user_id = Uuid::new_v4();

        let guard = registry.lock_user(user_id).await;
        assert_eq!(registry.prune().await, 0);

        drop(guard);
        assert_eq!(registry.prune().await, 1);
        assert_eq!(registry.tracked_users().await, 0);
    }
}

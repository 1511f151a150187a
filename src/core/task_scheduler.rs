//! 任务级执行锁：同一任务的 Step 串行，不同任务互不阻塞
//!
//! 每个 task_id 对应一把 tokio Mutex；编排器在进入 PROMPTING 前获取，DONE 后释放。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

/// 按任务划分的单写者锁表
#[derive(Clone, Default)]
pub struct TaskLocks {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl TaskLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取任务的执行许可；同一任务的其它 Step 会在此等待
    pub async fn acquire(&self, task_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(task_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// 任务结束后移除锁；仍有持有者或等待者时保留
    pub fn forget(&self, task_id: &str) -> bool {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = locks
            .get(task_id)
            .map(|lock| Arc::strong_count(lock) == 1)
            .unwrap_or(false);
        if idle {
            locks.remove(task_id);
        }
        idle
    }

    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

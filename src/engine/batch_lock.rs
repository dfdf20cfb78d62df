// ==========================================
// 排班表导入暂存系统 - 批次锁
// ==========================================
// 职责: 同一批次上的草稿执行与回滚互斥
// 说明:
// - try_acquire 非阻塞，拿不到锁立即返回 None（由调用方转为 LOCK_CONTENTION）
// - 锁随 BatchLockGuard 析构自动释放
// ==========================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 锁持有目的
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockPurpose {
    Draft,
    Rollback,
}

impl LockPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockPurpose::Draft => "draft",
            LockPurpose::Rollback => "rollback",
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchLockRegistry {
    held: Mutex<HashMap<String, LockPurpose>>,
}

impl BatchLockRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 尝试获取批次锁
    ///
    /// # 返回
    /// - Ok(guard): 获取成功
    /// - Err(holder): 锁已被持有（返回持有目的）
    pub fn try_acquire(
        self: &Arc<Self>,
        batch_id: &str,
        purpose: LockPurpose,
    ) -> Result<BatchLockGuard, LockPurpose> {
        let mut held = self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(holder) = held.get(batch_id) {
            return Err(*holder);
        }
        held.insert(batch_id.to_string(), purpose);
        tracing::debug!(batch_id = %batch_id, purpose = purpose.as_str(), "获取批次锁");

        Ok(BatchLockGuard {
            registry: Arc::clone(self),
            batch_id: batch_id.to_string(),
        })
    }

    /// 当前持有者（调试/测试用）
    pub fn holder(&self, batch_id: &str) -> Option<LockPurpose> {
        let held = self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        held.get(batch_id).copied()
    }

    fn release(&self, batch_id: &str) {
        let mut held = self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        held.remove(batch_id);
        tracing::debug!(batch_id = %batch_id, "释放批次锁");
    }
}

#[derive(Debug)]
pub struct BatchLockGuard {
    registry: Arc<BatchLockRegistry>,
    batch_id: String,
}

impl Drop for BatchLockGuard {
    fn drop(&mut self) {
        self.registry.release(&self.batch_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive_per_batch() {
        let registry = BatchLockRegistry::new();

        let guard = registry.try_acquire("B1", LockPurpose::Rollback).unwrap();
        assert_eq!(
            registry.try_acquire("B1", LockPurpose::Draft).unwrap_err(),
            LockPurpose::Rollback
        );

        // 其他批次不受影响
        let _other = registry.try_acquire("B2", LockPurpose::Draft).unwrap();

        drop(guard);
        assert!(registry.holder("B1").is_none());
        assert!(registry.try_acquire("B1", LockPurpose::Draft).is_ok());
    }
}

// ==========================================
// 排班表导入暂存系统 - 整批回滚
// ==========================================
// 职责: 逆序重放批次所有 AppliedChange，恢复写入前的实时值
// 红线:
// - 仅 applied 状态可回滚；rolled_back 为终态
// - 全有或全无: 任一时段被独立修改过 -> RollbackConflict，零副作用
// - 回滚期间持有批次锁，阻止同批次新草稿
// ==========================================

use crate::domain::action_log::{ImportActionLog, ImportActionType};
use crate::domain::draft::AppliedChange;
use crate::domain::types::BatchStatus;
use crate::engine::batch_lock::{BatchLockRegistry, LockPurpose};
use crate::repository::action_log_repo::ImportActionLogRepository;
use crate::repository::draft_repo::DraftRepository;
use crate::repository::error::RepositoryError;
use crate::repository::import_batch_repo::ImportBatchRepository;
use crate::repository::schedule_repo::{slot_label, ScheduleRepository};
use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// "批次未写入" 的固定提示
pub const BATCH_NOT_APPLIED_MESSAGE: &str = "batch not applied";

/// 单个时段冲突
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotConflict {
    pub staged_id: String,
    pub slot: String,
    pub expected_version: Option<i64>, // None = 预期时段不存在
    pub actual_version: Option<i64>,   // None = 时段当前不存在
    pub actual_value: Option<String>,
}

#[derive(Error, Debug)]
pub enum RollbackError {
    #[error("批次不存在: {0}")]
    BatchNotFound(String),

    #[error("{}", BATCH_NOT_APPLIED_MESSAGE)]
    NotApplied { batch_id: String, status: BatchStatus },

    #[error("批次 {0} 已回滚，不能再次回滚")]
    AlreadyRolledBack(String),

    #[error("批次 {batch_id} 正在执行 {holder}，请稍后重试")]
    LockContention { batch_id: String, holder: String },

    #[error("回滚冲突: {} 个时段已被独立修改", .conflicts.len())]
    Conflict {
        batch_id: String,
        conflicts: Vec<SlotConflict>,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<rusqlite::Error> for RollbackError {
    fn from(err: rusqlite::Error) -> Self {
        RollbackError::Repository(RepositoryError::from(err))
    }
}

/// 回滚结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOutcome {
    pub batch_id: String,
    pub restored_slots: usize,
    pub drafts_reverted: usize,
}

pub struct RollbackManager {
    conn: Arc<Mutex<Connection>>,
    locks: Arc<BatchLockRegistry>,
}

impl RollbackManager {
    pub fn new(conn: Arc<Mutex<Connection>>, locks: Arc<BatchLockRegistry>) -> Self {
        Self { conn, locks }
    }

    pub fn rollback(
        &self,
        batch_id: &str,
        operator: &str,
    ) -> Result<RollbackOutcome, RollbackError> {
        let _guard = self
            .locks
            .try_acquire(batch_id, LockPurpose::Rollback)
            .map_err(|holder| RollbackError::LockContention {
                batch_id: batch_id.to_string(),
                holder: holder.as_str().to_string(),
            })?;

        let mut conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let batch = ImportBatchRepository::find_by_id_tx(&tx, batch_id)?
            .ok_or_else(|| RollbackError::BatchNotFound(batch_id.to_string()))?;
        match batch.status {
            BatchStatus::Applied => {}
            BatchStatus::RolledBack => {
                return Err(RollbackError::AlreadyRolledBack(batch_id.to_string()))
            }
            status => {
                return Err(RollbackError::NotApplied {
                    batch_id: batch_id.to_string(),
                    status,
                })
            }
        }

        let changes = DraftRepository::list_applied_reverse_tx(&tx, batch_id)?;

        let conflicts = detect_conflicts(&tx, &changes)?;
        if !conflicts.is_empty() {
            tracing::warn!(
                batch_id = %batch_id,
                conflicts = conflicts.len(),
                "回滚冲突，放弃回滚"
            );
            // tx 析构即回滚
            return Err(RollbackError::Conflict {
                batch_id: batch_id.to_string(),
                conflicts,
            });
        }

        for change in &changes {
            restore(&tx, change, operator)?;
        }

        let drafts_reverted = changes
            .iter()
            .map(|c| c.draft_id.as_str())
            .collect::<HashSet<_>>()
            .len();

        DraftRepository::delete_applied_by_batch_tx(&tx, batch_id)?;
        ImportBatchRepository::mark_rolled_back_tx(&tx, batch_id, Utc::now())?;

        let outcome = RollbackOutcome {
            batch_id: batch_id.to_string(),
            restored_slots: changes.len(),
            drafts_reverted,
        };
        let log = ImportActionLog::new(
            batch_id,
            ImportActionType::Rollback,
            operator,
            Some(json!({
                "restoredSlots": outcome.restored_slots,
                "draftsReverted": outcome.drafts_reverted,
            })),
            None,
        );
        ImportActionLogRepository::insert_tx(&tx, &log)?;

        tx.commit()?;

        tracing::info!(
            batch_id = %batch_id,
            restored_slots = outcome.restored_slots,
            drafts_reverted = outcome.drafts_reverted,
            "批次回滚完成"
        );
        Ok(outcome)
    }
}

/// 冲突检测: 写入过的时段必须仍是写入时的版本与值；删除过的时段必须仍不存在
fn detect_conflicts(
    conn: &Connection,
    changes: &[AppliedChange],
) -> Result<Vec<SlotConflict>, RepositoryError> {
    let mut conflicts = Vec::new();
    for change in changes {
        let key = change.slot_key();
        let current = ScheduleRepository::find_slot_tx(conn, &key)?;

        let intact = match (&change.applied_version, &current) {
            (Some(expected), Some(slot)) => {
                slot.version == *expected
                    && change.applied_value.as_deref() == Some(slot.activity_code.as_str())
            }
            (None, None) => true,
            _ => false,
        };
        if !intact {
            conflicts.push(SlotConflict {
                staged_id: change.staged_id.clone(),
                slot: slot_label(&key),
                expected_version: change.applied_version,
                actual_version: current.as_ref().map(|s| s.version),
                actual_value: current.map(|s| s.activity_code),
            });
        }
    }
    Ok(conflicts)
}

/// 恢复单个时段到写入前的值（版本号继续递增）
fn restore(
    conn: &Connection,
    change: &AppliedChange,
    operator: &str,
) -> Result<(), RepositoryError> {
    let key = change.slot_key();
    match (&change.prior_value, change.applied_version) {
        // 写入前有值，写入后仍有值: 条件更新回原值
        (Some(prior), Some(applied_version)) => {
            ScheduleRepository::update_slot_if_version_tx(
                conn,
                &key,
                prior,
                applied_version,
                operator,
            )?;
        }
        // 写入前有值，本次为删除: 重新插入
        (Some(prior), None) => {
            ScheduleRepository::insert_slot_if_absent_tx(conn, &key, prior, operator)?;
        }
        // 写入前无值: 删除本次新增
        (None, Some(applied_version)) => {
            ScheduleRepository::delete_slot_if_version_tx(conn, &key, applied_version)?;
        }
        (None, None) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_shared_connection;

    #[test]
    fn test_not_applied_message_is_fixed() {
        let err = RollbackError::NotApplied {
            batch_id: "B1".to_string(),
            status: BatchStatus::Staged,
        };

        assert_eq!(err.to_string(), "batch not applied");
    }

    #[test]
    fn test_missing_batch() {
        let conn = open_shared_connection(":memory:").unwrap();
        let manager = RollbackManager::new(conn, BatchLockRegistry::new());

        let err = manager.rollback("NOPE", "tester").unwrap_err();

        assert!(matches!(err, RollbackError::BatchNotFound(id) if id == "NOPE"));
    }

    #[test]
    fn test_rollback_blocked_while_draft_runs() {
        let conn = open_shared_connection(":memory:").unwrap();
        let locks = BatchLockRegistry::new();
        let manager = RollbackManager::new(conn, Arc::clone(&locks));
        let _draft = locks.try_acquire("B1", LockPurpose::Draft).unwrap();

        let err = manager.rollback("B1", "tester").unwrap_err();

        assert!(matches!(err, RollbackError::LockContention { .. }));
    }
}

// ==========================================
// 排班表导入暂存系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，将各层错误转换为带显式原因的用户可读错误
// 约定: error_code() 为传输层提供稳定的错误代码
// ==========================================

use crate::engine::draft_builder::DraftCreationError;
use crate::engine::rollback::{RollbackError, SlotConflict};
use crate::importer::error::{ParseError, StageError};
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 请求错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("请求超时: {0}")]
    Timeout(String),

    // ==========================================
    // 导入流程错误
    // ==========================================
    /// 整文件级解析失败（未落库）
    #[error("文件解析失败: {0}")]
    ParseError(#[from] ParseError),

    /// 草稿批次级拒绝（零副作用）
    #[error("草稿创建失败: {0}")]
    DraftCreation(#[from] DraftCreationError),

    /// 固定文案 "batch not applied"
    #[error("{0}")]
    BatchNotApplied(String),

    #[error("批次已回滚: {0}")]
    BatchAlreadyRolledBack(String),

    /// 回滚冲突（零副作用）
    #[error("回滚冲突: batch_id={batch_id}, 冲突时段 {} 个", .conflicts.len())]
    RollbackConflict {
        batch_id: String,
        conflicts: Vec<SlotConflict>,
    },

    #[error("批次正忙: {0}")]
    LockContention(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("乐观锁冲突: {0}")]
    OptimisticLockFailure(String),

    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl ApiError {
    /// 稳定错误代码
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Timeout(_) => "TIMEOUT",
            ApiError::ParseError(_) => "PARSE_ERROR",
            ApiError::DraftCreation(e) => e.error_code.as_str(),
            ApiError::BatchNotApplied(_) => "BATCH_NOT_APPLIED",
            ApiError::BatchAlreadyRolledBack(_) => "BATCH_ALREADY_ROLLED_BACK",
            ApiError::RollbackConflict { .. } => "ROLLBACK_CONFLICT",
            ApiError::LockContention(_) => "LOCK_CONTENTION",
            ApiError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            ApiError::OptimisticLockFailure(_) => "VERSION_CONFLICT",
            ApiError::DatabaseError(_) | ApiError::DatabaseConnectionError(_) => "DATABASE_ERROR",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::SlotVersionConflict {
                slot,
                expected,
                actual,
            } => ApiError::OptimisticLockFailure(format!(
                "时段{}已被其他写入方修改（期望version={:?}，实际version={:?}）",
                slot, expected, actual
            )),

            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::DatabaseError(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::DatabaseError(format!("外键约束违反: {}", msg))
            }

            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }

            RepositoryError::SerializationError(msg) => ApiError::InternalError(msg),
        }
    }
}

// ==========================================
// 从 StageError 转换
// ==========================================
impl From<StageError> for ApiError {
    fn from(err: StageError) -> Self {
        match err {
            StageError::Parse(e) => ApiError::ParseError(e),
            StageError::InvalidRequest(msg) => ApiError::InvalidInput(msg),
            StageError::Cancelled => ApiError::Timeout("暂存未完成，未落库任何数据".to_string()),
            StageError::Repository(e) => ApiError::from(e),
        }
    }
}

// ==========================================
// 从 RollbackError 转换
// ==========================================
impl From<RollbackError> for ApiError {
    fn from(err: RollbackError) -> Self {
        match err {
            RollbackError::BatchNotFound(id) => {
                ApiError::NotFound(format!("ImportBatch(id={})不存在", id))
            }
            e @ RollbackError::NotApplied { .. } => ApiError::BatchNotApplied(e.to_string()),
            RollbackError::AlreadyRolledBack(id) => ApiError::BatchAlreadyRolledBack(id),
            e @ RollbackError::LockContention { .. } => ApiError::LockContention(e.to_string()),
            RollbackError::Conflict {
                batch_id,
                conflicts,
            } => ApiError::RollbackConflict {
                batch_id,
                conflicts,
            },
            RollbackError::Repository(e) => ApiError::from(e),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::BatchStatus;

    #[test]
    fn test_not_applied_keeps_fixed_message() {
        let err = ApiError::from(RollbackError::NotApplied {
            batch_id: "B1".to_string(),
            status: BatchStatus::Drafted,
        });

        assert_eq!(err.to_string(), "batch not applied");
        assert_eq!(err.error_code(), "BATCH_NOT_APPLIED");
    }

    #[test]
    fn test_stage_errors_map_to_api_errors() {
        let parse = ApiError::from(StageError::Parse(ParseError::EmptyFile));
        assert_eq!(parse.error_code(), "PARSE_ERROR");

        let invalid = ApiError::from(StageError::InvalidRequest("range".to_string()));
        assert!(matches!(invalid, ApiError::InvalidInput(_)));

        let cancelled = ApiError::from(StageError::Cancelled);
        assert_eq!(cancelled.error_code(), "TIMEOUT");
    }

    #[test]
    fn test_slot_conflict_maps_to_optimistic_lock_failure() {
        let err = ApiError::from(RepositoryError::SlotVersionConflict {
            slot: "R001@2026-07-01/AM".to_string(),
            expected: Some(1),
            actual: Some(2),
        });

        assert!(matches!(err, ApiError::OptimisticLockFailure(_)));
        assert!(err.to_string().contains("R001@2026-07-01/AM"));
    }

    #[test]
    fn test_repository_errors_map_to_database_or_internal() {
        let serialization = ApiError::from(RepositoryError::SerializationError("bad".to_string()));
        assert_eq!(serialization.error_code(), "INTERNAL_ERROR");

        let lock = ApiError::from(RepositoryError::LockError("poisoned".to_string()));
        assert_eq!(lock.error_code(), "DATABASE_ERROR");
    }
}

// ==========================================
// 排班表导入暂存系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体与类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod draft;
pub mod import_batch;
pub mod schedule;
pub mod staged_diff;
pub mod types;

// 重导出核心类型
pub use action_log::{ImportActionLog, ImportActionType};
pub use draft::{failure_codes, AppliedChange, DraftChangeset, RowApplyFailure};
pub use import_batch::{issue_codes, ImportBatch, RowIssue, StageWarning, StagedRow};
pub use schedule::{Activity, LiveSlot, Person, SlotKey};
pub use staged_diff::StagedSlotDiff;
pub use types::{BatchStatus, DiffType, TimeOfDay};

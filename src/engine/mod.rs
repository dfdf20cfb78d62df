// ==========================================
// 排班表导入暂存系统 - 引擎层
// ==========================================
// 职责: 差异计算 / 预览 / 选择性写入 / 整批回滚
// 红线: Engine 不拼 SQL，数据访问全部经由 Repository 的 *_tx 函数
// ==========================================

pub mod batch_lock;
pub mod cancel;
pub mod diff_engine;
pub mod draft_builder;
pub mod preview_index;
pub mod rollback;

// 重导出核心引擎
pub use batch_lock::{BatchLockGuard, BatchLockRegistry, LockPurpose};
pub use cancel::CancelFlag;
pub use diff_engine::{DiffEngine, ReferenceData};
pub use draft_builder::{DraftBuilder, DraftCreationError, DraftErrorCode, DraftRequest};
pub use preview_index::{
    is_well_formed_person_id, PreviewFilters, PreviewIndex, PreviewMetrics, PreviewPage,
};
pub use rollback::{
    RollbackError, RollbackManager, RollbackOutcome, SlotConflict, BATCH_NOT_APPLIED_MESSAGE,
};

// ==========================================
// 排班表导入暂存系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约定: `*_tx` 关联函数只接收连接/事务，由引擎层组合进同一事务
// ==========================================

pub mod action_log_repo;
pub mod draft_repo;
pub mod error;
pub mod import_batch_repo;
pub mod schedule_repo;
pub mod staged_diff_repo;

mod row_mapping;

// 重导出核心仓储
pub use action_log_repo::ImportActionLogRepository;
pub use draft_repo::DraftRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use import_batch_repo::ImportBatchRepository;
pub use schedule_repo::ScheduleRepository;
pub use staged_diff_repo::StagedDiffRepository;

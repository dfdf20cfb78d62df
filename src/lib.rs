// ==========================================
// 排班表导入暂存系统 - 核心库
// ==========================================
// 流程: 暂存 -> 差异 -> 预览 -> 选择性草稿 -> 整批回滚
// 技术栈: Rust + SQLite
// 系统定位: 人工审阅后再写入实时排班（人工最终控制权）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 差异/预览/草稿/回滚
pub mod engine;

// 导入层 - 文件解析与暂存
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 状态组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{BatchStatus, DiffType, TimeOfDay};

// 领域实体
pub use domain::{
    AppliedChange, DraftChangeset, ImportBatch, LiveSlot, RowApplyFailure, RowIssue,
    SlotKey, StagedRow, StagedSlotDiff,
};

// 引擎
pub use engine::{
    DiffEngine, DraftBuilder, DraftCreationError, PreviewFilters, PreviewIndex, RollbackError,
    RollbackManager,
};

// 导入
pub use importer::{ParseError, StageRequest};

// API
pub use api::{ApiError, ImportApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "排班表导入暂存系统";

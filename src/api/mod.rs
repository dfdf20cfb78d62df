// ==========================================
// 排班表导入暂存系统 - API 层
// ==========================================
// 职责: 对外暴露导入流水线的四个逻辑操作与只读查询
// ==========================================

pub mod dto;
pub mod error;
pub mod import_api;

pub use dto::{
    CreateDraftRequest, CreateDraftResponse, PreviewResponse, RollbackResponse, StageResponse,
};
pub use error::{ApiError, ApiResult};
pub use import_api::ImportApi;

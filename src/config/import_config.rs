// ==========================================
// 排班表导入暂存系统 - 导入配置项
// ==========================================

use serde::{Deserialize, Serialize};

/// 配置键（config_kv.key）
pub mod config_keys {
    pub const PREVIEW_DEFAULT_PAGE_SIZE: &str = "preview_default_page_size";
    pub const PREVIEW_MAX_PAGE_SIZE: &str = "preview_max_page_size";
    pub const SLOT_HOURS: &str = "slot_hours";
    pub const REQUEST_TIMEOUT_MS: &str = "request_timeout_ms";
    pub const MAX_STAGE_ROWS: &str = "max_stage_rows";
}

/// 导入流水线运行参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    pub preview_default_page_size: usize,
    pub preview_max_page_size: usize,
    /// 每个时段折算工时（manualHours 指标）
    pub slot_hours: f64,
    /// 请求边界超时（暂存/草稿）
    pub request_timeout_ms: u64,
    /// 单个文件允许的最大数据行数
    pub max_stage_rows: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            preview_default_page_size: 50,
            preview_max_page_size: 500,
            slot_hours: 4.0,
            request_timeout_ms: 30_000,
            max_stage_rows: 20_000,
        }
    }
}

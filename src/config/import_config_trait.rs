// ==========================================
// 排班表导入暂存系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入流水线所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::import_config::ImportConfig;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 预览默认每页条数（默认 50）
    async fn get_preview_default_page_size(&self) -> RepositoryResult<usize>;

    /// 预览每页条数上限（默认 500）
    async fn get_preview_max_page_size(&self) -> RepositoryResult<usize>;

    /// 每个时段折算工时（默认 4.0）
    async fn get_slot_hours(&self) -> RepositoryResult<f64>;

    /// 请求超时毫秒数（默认 30000）
    async fn get_request_timeout_ms(&self) -> RepositoryResult<u64>;

    /// 单文件最大数据行数（默认 20000）
    async fn get_max_stage_rows(&self) -> RepositoryResult<usize>;

    /// 一次性加载全部导入配置
    async fn load_import_config(&self) -> RepositoryResult<ImportConfig> {
        Ok(ImportConfig {
            preview_default_page_size: self.get_preview_default_page_size().await?,
            preview_max_page_size: self.get_preview_max_page_size().await?,
            slot_hours: self.get_slot_hours().await?,
            request_timeout_ms: self.get_request_timeout_ms().await?,
            max_stage_rows: self.get_max_stage_rows().await?,
        })
    }
}

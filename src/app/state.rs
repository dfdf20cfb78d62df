// ==========================================
// 排班表导入暂存系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享连接和API实例
// ==========================================

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::api::{ApiError, ApiResult, ImportApi};
use crate::db::{open_shared_connection, read_schema_version};

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "SCHEDULE_IMPORT_DB_PATH";

/// 应用状态
///
/// 所有仓储共享同一个 Arc<Mutex<Connection>>
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 共享连接
    pub conn: Arc<Mutex<Connection>>,

    /// 导入流水线API
    pub import_api: Arc<ImportApi>,
}

impl AppState {
    /// 打开数据库、建表、加载配置
    pub async fn new(db_path: String) -> ApiResult<Self> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_shared_connection(&db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(format!("{}: {}", db_path, e)))?;

        let import_api = Arc::new(ImportApi::from_connection(conn.clone()).await?);

        Ok(Self {
            db_path,
            conn,
            import_api,
        })
    }

    /// 当前 schema 版本
    pub fn schema_version(&self) -> ApiResult<Option<i64>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", e)))?;
        read_schema_version(&conn).map_err(|e| ApiError::DatabaseError(e.to_string()))
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 SCHEDULE_IMPORT_DB_PATH > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./schedule_import.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录，避免污染生产数据
        #[cfg(debug_assertions)]
        let dir = data_dir.join("schedule-import-dev");

        #[cfg(not(debug_assertions))]
        let dir = data_dir.join("schedule-import");

        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("schedule_import.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_app_state_bootstraps_schema_and_config() {
        let temp = NamedTempFile::new().unwrap();
        let db_path = temp.path().to_string_lossy().to_string();

        let state = AppState::new(db_path.clone()).await.unwrap();

        assert_eq!(state.db_path, db_path);
        assert_eq!(state.schema_version().unwrap(), Some(crate::db::CURRENT_SCHEMA_VERSION));
        assert_eq!(state.import_api.config().preview_default_page_size, 50);
    }
}

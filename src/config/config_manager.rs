// ==========================================
// 排班表导入暂存系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config::{config_keys, ImportConfig};
use crate::config::import_config_trait::ImportConfigReader;
use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
            ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取并解析配置；缺失或格式错误时返回默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> RepositoryResult<T>
    where
        T: FromStr + Copy + std::fmt::Display,
    {
        let raw = match self.get_global_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };

        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    default = %default,
                    "配置值格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let config_map = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(json!(config_map).to_string())
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_preview_default_page_size(&self) -> RepositoryResult<usize> {
        let v = self.get_parsed_or_default(
            config_keys::PREVIEW_DEFAULT_PAGE_SIZE,
            ImportConfig::default().preview_default_page_size,
        )?;
        Ok(v.max(1))
    }

    async fn get_preview_max_page_size(&self) -> RepositoryResult<usize> {
        let v = self.get_parsed_or_default(
            config_keys::PREVIEW_MAX_PAGE_SIZE,
            ImportConfig::default().preview_max_page_size,
        )?;
        Ok(v.max(1))
    }

    async fn get_slot_hours(&self) -> RepositoryResult<f64> {
        let default = ImportConfig::default().slot_hours;
        let v = self.get_parsed_or_default(config_keys::SLOT_HOURS, default)?;
        Ok(if v.is_finite() && v >= 0.0 { v } else { default })
    }

    async fn get_request_timeout_ms(&self) -> RepositoryResult<u64> {
        let v = self.get_parsed_or_default(
            config_keys::REQUEST_TIMEOUT_MS,
            ImportConfig::default().request_timeout_ms,
        )?;
        Ok(v.max(1))
    }

    async fn get_max_stage_rows(&self) -> RepositoryResult<usize> {
        let v = self.get_parsed_or_default(
            config_keys::MAX_STAGE_ROWS,
            ImportConfig::default().max_stage_rows,
        )?;
        Ok(v.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};

    fn setup() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_missing() {
        let config = setup().load_import_config().await.unwrap();
        assert_eq!(config, ImportConfig::default());
    }

    #[tokio::test]
    async fn test_override_and_bad_value_fallback() {
        let manager = setup();
        manager
            .set_global_config_value(config_keys::PREVIEW_MAX_PAGE_SIZE, "200")
            .unwrap();
        manager
            .set_global_config_value(config_keys::SLOT_HOURS, "not-a-number")
            .unwrap();

        let config = manager.load_import_config().await.unwrap();
        assert_eq!(config.preview_max_page_size, 200);
        assert_eq!(config.slot_hours, ImportConfig::default().slot_hours);
    }

    #[test]
    fn test_snapshot_contains_keys() {
        let manager = setup();
        manager
            .set_global_config_value(config_keys::MAX_STAGE_ROWS, "100")
            .unwrap();
        let snapshot = manager.get_config_snapshot().unwrap();
        assert!(snapshot.contains("max_stage_rows"));
    }
}

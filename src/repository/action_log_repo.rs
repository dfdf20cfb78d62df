// ==========================================
// 排班表导入暂存系统 - 操作日志数据仓储
// ==========================================
// 红线: 暂存 / 草稿 / 回滚 都必须记录
// ==========================================

use crate::domain::action_log::ImportActionLog;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S";

// ==========================================
// ImportActionLogRepository - 操作日志仓储
// ==========================================
pub struct ImportActionLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ImportActionLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入操作日志
    pub fn insert(&self, log: &ImportActionLog) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::insert_tx(&conn, log)
    }

    /// 在事务中插入操作日志（与业务写入同提交）
    pub(crate) fn insert_tx(conn: &Connection, log: &ImportActionLog) -> RepositoryResult<String> {
        conn.execute(
            r#"
            INSERT INTO import_action_log (
                action_id, batch_id, action_type, action_ts, actor, payload_json, detail
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                log.action_id,
                log.batch_id,
                log.action_type,
                log.action_ts.format(TS_FMT).to_string(),
                log.actor,
                log.payload_json.as_ref().map(|v| v.to_string()),
                log.detail,
            ],
        )?;
        Ok(log.action_id.clone())
    }

    /// 查询批次的操作日志（按时间正序）
    pub fn list_by_batch(&self, batch_id: &str) -> RepositoryResult<Vec<ImportActionLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT action_id, batch_id, action_type, action_ts, actor, payload_json, detail
            FROM import_action_log
            WHERE batch_id = ?1
            ORDER BY action_ts, rowid
            "#,
        )?;
        let logs = stmt
            .query_map(params![batch_id], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }
}

fn map_row(row: &Row) -> rusqlite::Result<ImportActionLog> {
    let action_ts: String = row.get(3)?;
    let payload: Option<String> = row.get(5)?;

    Ok(ImportActionLog {
        action_id: row.get(0)?,
        batch_id: row.get(1)?,
        action_type: row.get(2)?,
        action_ts: NaiveDateTime::parse_from_str(&action_ts, TS_FMT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        actor: row.get(4)?,
        payload_json: payload.and_then(|s| serde_json::from_str(&s).ok()),
        detail: row.get(6)?,
    })
}

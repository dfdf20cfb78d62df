// ==========================================
// 排班表导入暂存系统 - 差异仓储
// ==========================================
// 职责: import_staged_diff 的数据访问
// 说明: 差异以 stagedId 为稳定键，按 seq 固定顺序读取，
//       保证分页/过滤多次调用结果一致
// ==========================================

use crate::domain::import_batch::RowIssue;
use crate::domain::staged_diff::StagedSlotDiff;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_mapping::{
    fmt_date, parse_date, parse_diff_type, parse_json, parse_time_of_day,
};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

const DIFF_COLUMNS: &str = r#"staged_id, batch_id, row_number, person_id, person_name, slot_date,
       time_of_day, diff_type, excel_value, current_value, live_version,
       errors_json, warnings_json"#;

pub struct StagedDiffRepository {
    conn: Arc<Mutex<Connection>>,
}

impl StagedDiffRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取批次全部差异（按 seq 排序）
    pub fn list_by_batch(&self, batch_id: &str) -> RepositoryResult<Vec<StagedSlotDiff>> {
        let conn = self.get_conn()?;
        Self::list_by_batch_tx(&conn, batch_id)
    }

    pub(crate) fn list_by_batch_tx(
        conn: &Connection,
        batch_id: &str,
    ) -> RepositoryResult<Vec<StagedSlotDiff>> {
        let sql = format!(
            "SELECT {} FROM import_staged_diff WHERE batch_id = ?1 ORDER BY seq",
            DIFF_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let diffs = stmt
            .query_map(params![batch_id], map_diff_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(diffs)
    }

    /// 批量写入差异（事务内），seq 取传入顺序
    pub(crate) fn insert_diffs_tx(
        conn: &Connection,
        diffs: &[StagedSlotDiff],
    ) -> RepositoryResult<usize> {
        let mut stmt = conn.prepare(
            r#"
            INSERT INTO import_staged_diff (
                staged_id, batch_id, seq, row_number, person_id, person_name, slot_date,
                time_of_day, diff_type, excel_value, current_value, live_version,
                errors_json, warnings_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )?;

        let mut count = 0;
        for (seq, diff) in diffs.iter().enumerate() {
            stmt.execute(params![
                diff.staged_id,
                diff.batch_id,
                seq as i64,
                diff.row_number.map(|n| n as i64),
                diff.person_id,
                diff.person_name,
                fmt_date(diff.assignment_date),
                diff.time_of_day.to_db_str(),
                diff.diff_type.to_db_str(),
                diff.excel_value,
                diff.current_value,
                diff.live_version,
                serde_json::to_string(&diff.errors)?,
                serde_json::to_string(&diff.warnings)?,
            ])?;
            count += 1;
        }
        Ok(count)
    }
}

fn map_diff_row(row: &Row) -> rusqlite::Result<StagedSlotDiff> {
    let slot_date: String = row.get(5)?;
    let time_of_day: String = row.get(6)?;
    let diff_type: String = row.get(7)?;
    let errors: String = row.get(11)?;
    let warnings: String = row.get(12)?;

    Ok(StagedSlotDiff {
        staged_id: row.get(0)?,
        batch_id: row.get(1)?,
        row_number: row.get::<_, Option<i64>>(2)?.map(|n| n as usize),
        person_id: row.get(3)?,
        person_name: row.get(4)?,
        assignment_date: parse_date(5, &slot_date)?,
        time_of_day: parse_time_of_day(6, &time_of_day)?,
        diff_type: parse_diff_type(7, &diff_type)?,
        excel_value: row.get(8)?,
        current_value: row.get(9)?,
        live_version: row.get(10)?,
        errors: parse_json::<Vec<RowIssue>>(11, &errors)?,
        warnings: parse_json::<Vec<RowIssue>>(12, &warnings)?,
    })
}

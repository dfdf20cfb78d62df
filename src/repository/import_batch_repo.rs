// ==========================================
// 排班表导入暂存系统 - 导入批次仓储
// ==========================================
// 职责: import_batch / import_staged_row 的数据访问
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::import_batch::{ImportBatch, StagedRow};
use crate::domain::types::BatchStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_mapping::{fmt_date, parse_batch_status, parse_date, parse_utc};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const BATCH_COLUMNS: &str = r#"batch_id, status, file_name, uploaded_at, block_number, academic_year,
       notes, range_start, range_end, row_count, created_by, rolled_back_at"#;

// ==========================================
// ImportBatchRepository
// ==========================================
pub struct ImportBatchRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ImportBatchRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ===== 查询 =====

    pub fn find_by_id(&self, batch_id: &str) -> RepositoryResult<Option<ImportBatch>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, batch_id)
    }

    /// 查询最近的导入批次
    pub fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<ImportBatch>> {
        let conn = self.get_conn()?;
        let limit = if limit == 0 { 50 } else { limit.min(500) };

        let sql = format!(
            "SELECT {} FROM import_batch ORDER BY uploaded_at DESC, batch_id LIMIT ?1",
            BATCH_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let batches = stmt
            .query_map(params![limit as i64], map_batch_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(batches)
    }

    pub(crate) fn find_by_id_tx(
        conn: &Connection,
        batch_id: &str,
    ) -> RepositoryResult<Option<ImportBatch>> {
        let sql = format!("SELECT {} FROM import_batch WHERE batch_id = ?1", BATCH_COLUMNS);
        let batch = conn
            .query_row(&sql, params![batch_id], map_batch_row)
            .optional()?;
        Ok(batch)
    }

    // ===== 写入（事务内）=====

    pub(crate) fn insert_batch_tx(conn: &Connection, batch: &ImportBatch) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO import_batch (
                batch_id, status, file_name, uploaded_at, block_number, academic_year,
                notes, range_start, range_end, row_count, created_by, rolled_back_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                batch.batch_id,
                batch.status.to_db_str(),
                batch.file_name,
                batch.uploaded_at.to_rfc3339(),
                batch.block_number,
                batch.academic_year,
                batch.notes,
                fmt_date(batch.range_start),
                fmt_date(batch.range_end),
                batch.row_count,
                batch.created_by,
                batch.rolled_back_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub(crate) fn insert_rows_tx(conn: &Connection, rows: &[StagedRow]) -> RepositoryResult<usize> {
        let mut stmt = conn.prepare(
            r#"
            INSERT INTO import_staged_row (
                row_id, batch_id, row_number, person_id, person_name,
                slot_date, time_of_day, activity_code, raw_cells_json, warnings_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )?;

        let mut count = 0;
        for row in rows {
            stmt.execute(params![
                row.row_id,
                row.batch_id,
                row.row_number as i64,
                row.person_id,
                row.person_name,
                fmt_date(row.assignment_date),
                row.time_of_day.to_db_str(),
                row.activity_code,
                row.raw_cells.to_string(),
                serde_json::to_string(&row.warnings)?,
            ])?;
            count += 1;
        }
        Ok(count)
    }

    /// 推进批次状态
    ///
    /// 说明: 只允许单调前进；rolled_back 为终态
    pub(crate) fn advance_status_tx(
        conn: &Connection,
        batch_id: &str,
        next: BatchStatus,
    ) -> RepositoryResult<BatchStatus> {
        let current = Self::find_by_id_tx(conn, batch_id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "ImportBatch".to_string(),
                id: batch_id.to_string(),
            })?
            .status;

        if current == BatchStatus::RolledBack {
            return Err(RepositoryError::InvalidStateTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }

        let advanced = current.advance_to(next);
        if advanced != current {
            conn.execute(
                "UPDATE import_batch SET status = ?1 WHERE batch_id = ?2",
                params![advanced.to_db_str(), batch_id],
            )?;
        }
        Ok(advanced)
    }

    pub(crate) fn mark_rolled_back_tx(
        conn: &Connection,
        batch_id: &str,
        rolled_back_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let rows = conn.execute(
            r#"
            UPDATE import_batch
            SET status = 'rolled_back', rolled_back_at = ?1
            WHERE batch_id = ?2 AND status = 'applied'
            "#,
            params![rolled_back_at.to_rfc3339(), batch_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::InvalidStateTransition {
                from: "non-applied".to_string(),
                to: BatchStatus::RolledBack.to_string(),
            });
        }
        Ok(())
    }
}

fn map_batch_row(row: &Row) -> rusqlite::Result<ImportBatch> {
    let status: String = row.get(1)?;
    let uploaded_at: String = row.get(3)?;
    let range_start: String = row.get(7)?;
    let range_end: String = row.get(8)?;
    let rolled_back_at: Option<String> = row.get(11)?;

    Ok(ImportBatch {
        batch_id: row.get(0)?,
        status: parse_batch_status(1, &status)?,
        file_name: row.get(2)?,
        uploaded_at: parse_utc(3, &uploaded_at)?,
        block_number: row.get(4)?,
        academic_year: row.get(5)?,
        notes: row.get(6)?,
        range_start: parse_date(7, &range_start)?,
        range_end: parse_date(8, &range_end)?,
        row_count: row.get(9)?,
        created_by: row.get(10)?,
        rolled_back_at: rolled_back_at.map(|s| parse_utc(11, &s)).transpose()?,
    })
}

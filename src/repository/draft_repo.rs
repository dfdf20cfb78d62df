// ==========================================
// 排班表导入暂存系统 - 草稿仓储
// ==========================================
// 职责: import_draft_changeset / import_applied_change 的数据访问
// 说明:
// - 一个批次可累积多个草稿（按 seq 有序）
// - applied_change 以自增 seq 记录全局写入顺序，回滚时逆序消费
// ==========================================

use crate::domain::draft::{AppliedChange, DraftChangeset, RowApplyFailure};
use crate::domain::types::DiffType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_mapping::{
    fmt_date, parse_date, parse_json, parse_time_of_day, parse_utc,
};
use rusqlite::{params, Connection, Row};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

const CHANGESET_COLUMNS: &str = r#"draft_id, batch_id, selected_ids_json, notes, created_by, created_at,
       added, modified, removed, skipped, failed, total_selected,
       failures_json, interrupted, message"#;

const APPLIED_COLUMNS: &str = r#"seq, batch_id, draft_id, staged_id, person_id, slot_date, time_of_day,
       prior_value, prior_version, applied_value, applied_version, applied_at"#;

pub struct DraftRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DraftRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 草稿查询
    // ==========================================

    /// 按创建顺序列出批次的全部草稿
    pub fn list_by_batch(&self, batch_id: &str) -> RepositoryResult<Vec<DraftChangeset>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM import_draft_changeset WHERE batch_id = ?1 ORDER BY seq",
            CHANGESET_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let drafts = stmt
            .query_map(params![batch_id], map_changeset_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(drafts)
    }

    /// 批次当前待回滚的变更数量
    pub fn count_applied(&self, batch_id: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM import_applied_change WHERE batch_id = ?1",
            params![batch_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==========================================
    // 草稿写入（事务内）
    // ==========================================

    /// 插入草稿头（计数为 0，执行完成后再回填）
    pub(crate) fn insert_changeset_tx(
        conn: &Connection,
        draft: &DraftChangeset,
    ) -> RepositoryResult<()> {
        let next_seq: i64 = conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM import_draft_changeset WHERE batch_id = ?1",
            params![draft.batch_id],
            |row| row.get(0),
        )?;

        conn.execute(
            r#"
            INSERT INTO import_draft_changeset (
                draft_id, batch_id, seq, selected_ids_json, notes, created_by, created_at,
                added, modified, removed, skipped, failed, total_selected,
                failures_json, interrupted, message
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                draft.draft_id,
                draft.batch_id,
                next_seq,
                serde_json::to_string(&draft.selected_ids)?,
                draft.notes,
                draft.created_by,
                draft.created_at.to_rfc3339(),
                draft.added,
                draft.modified,
                draft.removed,
                draft.skipped,
                draft.failed,
                draft.total_selected,
                serde_json::to_string(&draft.failures)?,
                draft.interrupted as i32,
                draft.message,
            ],
        )?;
        Ok(())
    }

    /// 回填草稿结果计数
    pub(crate) fn finalize_changeset_tx(
        conn: &Connection,
        draft: &DraftChangeset,
    ) -> RepositoryResult<()> {
        let rows = conn.execute(
            r#"
            UPDATE import_draft_changeset
            SET added = ?1, modified = ?2, removed = ?3, skipped = ?4, failed = ?5,
                total_selected = ?6, failures_json = ?7, interrupted = ?8, message = ?9
            WHERE draft_id = ?10
            "#,
            params![
                draft.added,
                draft.modified,
                draft.removed,
                draft.skipped,
                draft.failed,
                draft.total_selected,
                serde_json::to_string(&draft.failures)?,
                draft.interrupted as i32,
                draft.message,
                draft.draft_id,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "DraftChangeset".to_string(),
                id: draft.draft_id.clone(),
            });
        }
        Ok(())
    }

    /// 单行写入成功后累加草稿头计数（与时段写入同一事务）
    pub(crate) fn record_success_tx(
        conn: &Connection,
        draft_id: &str,
        diff_type: DiffType,
    ) -> RepositoryResult<()> {
        let column = match diff_type {
            DiffType::Added => "added",
            DiffType::Modified => "modified",
            DiffType::Removed => "removed",
            DiffType::Unchanged => {
                return Err(RepositoryError::FieldValueError {
                    field: "diff_type".to_string(),
                    message: "unchanged 行不产生写入".to_string(),
                })
            }
        };
        let sql = format!(
            "UPDATE import_draft_changeset SET {col} = {col} + 1 WHERE draft_id = ?1",
            col = column
        );
        let rows = conn.execute(&sql, params![draft_id])?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "DraftChangeset".to_string(),
                id: draft_id.to_string(),
            });
        }
        Ok(())
    }

    // ==========================================
    // 已写入变更
    // ==========================================

    /// 批次内已被任意草稿成功写入的 stagedId 集合
    pub(crate) fn applied_staged_ids_tx(
        conn: &Connection,
        batch_id: &str,
    ) -> RepositoryResult<HashSet<String>> {
        let mut stmt =
            conn.prepare("SELECT staged_id FROM import_applied_change WHERE batch_id = ?1")?;
        let ids = stmt
            .query_map(params![batch_id], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    pub(crate) fn insert_applied_change_tx(
        conn: &Connection,
        change: &AppliedChange,
    ) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT INTO import_applied_change (
                batch_id, draft_id, staged_id, person_id, slot_date, time_of_day,
                prior_value, prior_version, applied_value, applied_version, applied_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                change.batch_id,
                change.draft_id,
                change.staged_id,
                change.person_id,
                fmt_date(change.assignment_date),
                change.time_of_day.to_db_str(),
                change.prior_value,
                change.prior_version,
                change.applied_value,
                change.applied_version,
                change.applied_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 按写入顺序逆序列出批次的已写入变更（回滚顺序）
    pub(crate) fn list_applied_reverse_tx(
        conn: &Connection,
        batch_id: &str,
    ) -> RepositoryResult<Vec<AppliedChange>> {
        let sql = format!(
            "SELECT {} FROM import_applied_change WHERE batch_id = ?1 ORDER BY seq DESC",
            APPLIED_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let changes = stmt
            .query_map(params![batch_id], map_applied_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(changes)
    }

    pub(crate) fn delete_applied_by_batch_tx(
        conn: &Connection,
        batch_id: &str,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "DELETE FROM import_applied_change WHERE batch_id = ?1",
            params![batch_id],
        )?;
        Ok(rows)
    }
}

fn map_changeset_row(row: &Row) -> rusqlite::Result<DraftChangeset> {
    let selected_ids: String = row.get(2)?;
    let created_at: String = row.get(5)?;
    let failures: String = row.get(12)?;

    Ok(DraftChangeset {
        draft_id: row.get(0)?,
        batch_id: row.get(1)?,
        selected_ids: parse_json::<Vec<String>>(2, &selected_ids)?,
        notes: row.get(3)?,
        created_by: row.get(4)?,
        created_at: parse_utc(5, &created_at)?,
        added: row.get(6)?,
        modified: row.get(7)?,
        removed: row.get(8)?,
        skipped: row.get(9)?,
        failed: row.get(10)?,
        total_selected: row.get(11)?,
        failures: parse_json::<Vec<RowApplyFailure>>(12, &failures)?,
        interrupted: row.get::<_, i32>(13)? != 0,
        message: row.get(14)?,
    })
}

fn map_applied_row(row: &Row) -> rusqlite::Result<AppliedChange> {
    let slot_date: String = row.get(5)?;
    let time_of_day: String = row.get(6)?;
    let applied_at: String = row.get(11)?;

    Ok(AppliedChange {
        seq: row.get(0)?,
        batch_id: row.get(1)?,
        draft_id: row.get(2)?,
        staged_id: row.get(3)?,
        person_id: row.get(4)?,
        assignment_date: parse_date(5, &slot_date)?,
        time_of_day: parse_time_of_day(6, &time_of_day)?,
        prior_value: row.get(7)?,
        prior_version: row.get(8)?,
        applied_value: row.get(9)?,
        applied_version: row.get(10)?,
        applied_at: parse_utc(11, &applied_at)?,
    })
}

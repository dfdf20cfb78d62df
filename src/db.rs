// ==========================================
// 排班表导入暂存系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键/busy_timeout）
// - 统一建表入口（暂存表与实时排班表隔离）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开连接、建表，并包装为仓储层共享的 Arc<Mutex<Connection>>
pub fn open_shared_connection(db_path: &str) -> rusqlite::Result<Arc<Mutex<Connection>>> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 建表（幂等）
///
/// 分三组:
/// - 实时排班: person / activity / schedule_slot
/// - 导入暂存: import_batch / import_staged_row / import_staged_diff
/// - 草稿与回滚: import_draft_changeset / import_applied_change
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        -- ===== 实时排班 =====
        CREATE TABLE IF NOT EXISTS person (
            person_id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS activity (
            code TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            weekday_only INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS schedule_slot (
            person_id TEXT NOT NULL REFERENCES person(person_id),
            slot_date TEXT NOT NULL,
            time_of_day TEXT NOT NULL CHECK(time_of_day IN ('AM', 'PM')),
            activity_code TEXT NOT NULL REFERENCES activity(code),
            version INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            PRIMARY KEY (person_id, slot_date, time_of_day)
        );

        CREATE INDEX IF NOT EXISTS idx_schedule_slot_date ON schedule_slot(slot_date);

        -- 时段版本序列: 删除后重建仍从上次版本继续递增
        CREATE TABLE IF NOT EXISTS schedule_slot_version_seq (
            person_id TEXT NOT NULL,
            slot_date TEXT NOT NULL,
            time_of_day TEXT NOT NULL,
            last_version INTEGER NOT NULL,
            PRIMARY KEY (person_id, slot_date, time_of_day)
        );

        -- ===== 导入暂存（与实时排班隔离）=====
        CREATE TABLE IF NOT EXISTS import_batch (
            batch_id TEXT PRIMARY KEY,
            status TEXT NOT NULL CHECK(status IN ('staged', 'drafted', 'applied', 'rolled_back')),
            file_name TEXT NOT NULL,
            uploaded_at TEXT NOT NULL,
            block_number INTEGER NOT NULL,
            academic_year TEXT NOT NULL,
            notes TEXT,
            range_start TEXT NOT NULL,
            range_end TEXT NOT NULL,
            row_count INTEGER NOT NULL DEFAULT 0,
            created_by TEXT NOT NULL,
            rolled_back_at TEXT
        );

        CREATE TABLE IF NOT EXISTS import_staged_row (
            row_id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL REFERENCES import_batch(batch_id) ON DELETE CASCADE,
            row_number INTEGER NOT NULL,
            person_id TEXT,
            person_name TEXT,
            slot_date TEXT NOT NULL,
            time_of_day TEXT NOT NULL,
            activity_code TEXT,
            raw_cells_json TEXT NOT NULL,
            warnings_json TEXT NOT NULL DEFAULT '[]'
        );

        CREATE INDEX IF NOT EXISTS idx_staged_row_batch ON import_staged_row(batch_id);

        CREATE TABLE IF NOT EXISTS import_staged_diff (
            staged_id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL REFERENCES import_batch(batch_id) ON DELETE CASCADE,
            seq INTEGER NOT NULL,
            row_number INTEGER,
            person_id TEXT,
            person_name TEXT NOT NULL,
            slot_date TEXT NOT NULL,
            time_of_day TEXT NOT NULL,
            diff_type TEXT NOT NULL CHECK(diff_type IN ('added', 'removed', 'modified', 'unchanged')),
            excel_value TEXT,
            current_value TEXT,
            live_version INTEGER,
            errors_json TEXT NOT NULL DEFAULT '[]',
            warnings_json TEXT NOT NULL DEFAULT '[]'
        );

        CREATE INDEX IF NOT EXISTS idx_staged_diff_batch_seq ON import_staged_diff(batch_id, seq);

        -- ===== 草稿与回滚 =====
        CREATE TABLE IF NOT EXISTS import_draft_changeset (
            draft_id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL REFERENCES import_batch(batch_id),
            seq INTEGER NOT NULL,
            selected_ids_json TEXT NOT NULL,
            notes TEXT,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            added INTEGER NOT NULL DEFAULT 0,
            modified INTEGER NOT NULL DEFAULT 0,
            removed INTEGER NOT NULL DEFAULT 0,
            skipped INTEGER NOT NULL DEFAULT 0,
            failed INTEGER NOT NULL DEFAULT 0,
            total_selected INTEGER NOT NULL DEFAULT 0,
            failures_json TEXT NOT NULL DEFAULT '[]',
            interrupted INTEGER NOT NULL DEFAULT 0,
            message TEXT NOT NULL DEFAULT '',
            UNIQUE(batch_id, seq)
        );

        CREATE TABLE IF NOT EXISTS import_applied_change (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id TEXT NOT NULL REFERENCES import_batch(batch_id),
            draft_id TEXT NOT NULL REFERENCES import_draft_changeset(draft_id),
            staged_id TEXT NOT NULL,
            person_id TEXT NOT NULL,
            slot_date TEXT NOT NULL,
            time_of_day TEXT NOT NULL,
            prior_value TEXT,
            prior_version INTEGER,
            applied_value TEXT,
            applied_version INTEGER,
            applied_at TEXT NOT NULL,
            UNIQUE(batch_id, staged_id)
        );

        CREATE INDEX IF NOT EXISTS idx_applied_change_batch ON import_applied_change(batch_id, seq);

        -- ===== 审计 =====
        CREATE TABLE IF NOT EXISTS import_action_log (
            action_id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL,
            action_type TEXT NOT NULL,
            action_ts TEXT NOT NULL,
            actor TEXT NOT NULL,
            payload_json TEXT,
            detail TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_import_action_log_batch ON import_action_log(batch_id, action_ts);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_schema_version_missing_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }
}

// ==========================================
// 排班表导入暂存系统 - 实时排班仓储
// ==========================================
// 职责: person / activity / schedule_slot 的数据访问
// 红线: 所有时段写入都必须带版本条件（乐观锁），不允许静默覆盖
// ==========================================

use crate::domain::schedule::{Activity, LiveSlot, Person, SlotKey};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_mapping::{fmt_date, parse_date, parse_time_of_day, parse_utc};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SLOT_COLUMNS: &str =
    "person_id, slot_date, time_of_day, activity_code, version, updated_at, updated_by";

// ==========================================
// ScheduleRepository - 实时排班仓储
// ==========================================
pub struct ScheduleRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScheduleRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 人员 / 活动代码（主数据）
    // ==========================================

    pub fn upsert_person(&self, person: &Person) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO person (person_id, display_name, active) VALUES (?1, ?2, ?3)
            ON CONFLICT(person_id) DO UPDATE SET display_name = excluded.display_name,
                                                 active = excluded.active
            "#,
            params![person.person_id, person.display_name, person.active as i32],
        )?;
        Ok(())
    }

    pub fn upsert_activity(&self, activity: &Activity) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO activity (code, display_name, weekday_only) VALUES (?1, ?2, ?3)
            ON CONFLICT(code) DO UPDATE SET display_name = excluded.display_name,
                                            weekday_only = excluded.weekday_only
            "#,
            params![activity.code, activity.display_name, activity.weekday_only as i32],
        )?;
        Ok(())
    }

    pub fn list_persons(&self) -> RepositoryResult<Vec<Person>> {
        let conn = self.get_conn()?;
        Self::list_persons_tx(&conn)
    }

    pub fn list_activities(&self) -> RepositoryResult<Vec<Activity>> {
        let conn = self.get_conn()?;
        Self::list_activities_tx(&conn)
    }

    pub(crate) fn list_persons_tx(conn: &Connection) -> RepositoryResult<Vec<Person>> {
        let mut stmt = conn.prepare(
            "SELECT person_id, display_name, active FROM person ORDER BY person_id",
        )?;
        let persons = stmt
            .query_map([], |row| {
                Ok(Person {
                    person_id: row.get(0)?,
                    display_name: row.get(1)?,
                    active: row.get::<_, i32>(2)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(persons)
    }

    pub(crate) fn list_activities_tx(conn: &Connection) -> RepositoryResult<Vec<Activity>> {
        let mut stmt =
            conn.prepare("SELECT code, display_name, weekday_only FROM activity ORDER BY code")?;
        let activities = stmt
            .query_map([], |row| {
                Ok(Activity {
                    code: row.get(0)?,
                    display_name: row.get(1)?,
                    weekday_only: row.get::<_, i32>(2)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(activities)
    }

    // ==========================================
    // 时段查询
    // ==========================================

    pub fn find_slot(&self, key: &SlotKey) -> RepositoryResult<Option<LiveSlot>> {
        let conn = self.get_conn()?;
        Self::find_slot_tx(&conn, key)
    }

    pub fn list_slots_in_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<LiveSlot>> {
        let conn = self.get_conn()?;
        Self::list_slots_in_range_tx(&conn, from, to)
    }

    pub(crate) fn find_slot_tx(
        conn: &Connection,
        key: &SlotKey,
    ) -> RepositoryResult<Option<LiveSlot>> {
        let sql = format!(
            "SELECT {} FROM schedule_slot WHERE person_id = ?1 AND slot_date = ?2 AND time_of_day = ?3",
            SLOT_COLUMNS
        );
        let slot = conn
            .query_row(
                &sql,
                params![
                    key.person_id,
                    fmt_date(key.assignment_date),
                    key.time_of_day.to_db_str()
                ],
                map_slot_row,
            )
            .optional()?;
        Ok(slot)
    }

    pub(crate) fn list_slots_in_range_tx(
        conn: &Connection,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<LiveSlot>> {
        let sql = format!(
            r#"
            SELECT {} FROM schedule_slot
            WHERE slot_date >= ?1 AND slot_date <= ?2
            ORDER BY person_id, slot_date, time_of_day
            "#,
            SLOT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let slots = stmt
            .query_map(params![fmt_date(from), fmt_date(to)], map_slot_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(slots)
    }

    // ==========================================
    // 时段写入（乐观锁）
    // ==========================================

    /// 分配时段下一个版本号
    ///
    /// 说明: 取 max(序列, 当前版本) + 1 并回写序列；删除不回收版本号，
    /// 同一时段删除后重建得到的版本一定大于之前出现过的任何版本
    pub(crate) fn next_version_tx(conn: &Connection, key: &SlotKey) -> RepositoryResult<i64> {
        let date = fmt_date(key.assignment_date);
        let tod = key.time_of_day.to_db_str();

        let last: Option<i64> = conn
            .query_row(
                r#"SELECT last_version FROM schedule_slot_version_seq
                   WHERE person_id = ?1 AND slot_date = ?2 AND time_of_day = ?3"#,
                params![key.person_id, date, tod],
                |row| row.get(0),
            )
            .optional()?;
        let current = Self::find_slot_tx(conn, key)?.map(|s| s.version);
        let next = last.unwrap_or(0).max(current.unwrap_or(0)) + 1;

        conn.execute(
            r#"
            INSERT INTO schedule_slot_version_seq (person_id, slot_date, time_of_day, last_version)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(person_id, slot_date, time_of_day) DO UPDATE SET
                last_version = excluded.last_version
            "#,
            params![key.person_id, date, tod, next],
        )?;
        Ok(next)
    }

    /// 人工编辑入口（非导入写入）
    ///
    /// 说明: 无条件 upsert，分配新版本号；用于模拟其他写入方（手工编辑/换班）
    pub fn write_slot(
        &self,
        key: &SlotKey,
        activity_code: &str,
        actor: &str,
    ) -> RepositoryResult<i64> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let version = Self::next_version_tx(&tx, key)?;
        tx.execute(
            r#"
            INSERT INTO schedule_slot (
                person_id, slot_date, time_of_day, activity_code, version, updated_at, updated_by
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(person_id, slot_date, time_of_day) DO UPDATE SET
                activity_code = excluded.activity_code,
                version = excluded.version,
                updated_at = excluded.updated_at,
                updated_by = excluded.updated_by
            "#,
            params![
                key.person_id,
                fmt_date(key.assignment_date),
                key.time_of_day.to_db_str(),
                activity_code,
                version,
                Utc::now().to_rfc3339(),
                actor,
            ],
        )?;

        tx.commit()?;
        Ok(version)
    }

    /// 人工删除入口（非导入写入）
    pub fn delete_slot(&self, key: &SlotKey) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "DELETE FROM schedule_slot WHERE person_id = ?1 AND slot_date = ?2 AND time_of_day = ?3",
            params![
                key.person_id,
                fmt_date(key.assignment_date),
                key.time_of_day.to_db_str()
            ],
        )?;
        Ok(rows)
    }

    /// 插入新时段（要求当前不存在）
    ///
    /// # 返回
    /// - Ok(version): 新时段版本号（延续该时段的版本序列）
    /// - Err(SlotVersionConflict): 时段已被其他写入方创建
    pub(crate) fn insert_slot_if_absent_tx(
        conn: &Connection,
        key: &SlotKey,
        activity_code: &str,
        actor: &str,
    ) -> RepositoryResult<i64> {
        if let Some(existing) = Self::find_slot_tx(conn, key)? {
            return Err(RepositoryError::SlotVersionConflict {
                slot: slot_label(key),
                expected: None,
                actual: Some(existing.version),
            });
        }

        let version = Self::next_version_tx(conn, key)?;
        conn.execute(
            r#"
            INSERT INTO schedule_slot (
                person_id, slot_date, time_of_day, activity_code, version, updated_at, updated_by
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                key.person_id,
                fmt_date(key.assignment_date),
                key.time_of_day.to_db_str(),
                activity_code,
                version,
                Utc::now().to_rfc3339(),
                actor,
            ],
        )?;
        Ok(version)
    }

    /// 按版本条件更新时段
    ///
    /// # 返回
    /// - Ok(new_version)
    /// - Err(SlotVersionConflict): 版本不一致或时段已不存在
    pub(crate) fn update_slot_if_version_tx(
        conn: &Connection,
        key: &SlotKey,
        activity_code: &str,
        expected_version: i64,
        actor: &str,
    ) -> RepositoryResult<i64> {
        let actual = Self::find_slot_tx(conn, key)?.map(|s| s.version);
        if actual != Some(expected_version) {
            return Err(RepositoryError::SlotVersionConflict {
                slot: slot_label(key),
                expected: Some(expected_version),
                actual,
            });
        }

        let version = Self::next_version_tx(conn, key)?;
        conn.execute(
            r#"
            UPDATE schedule_slot
            SET activity_code = ?1,
                version = ?2,
                updated_at = ?3,
                updated_by = ?4
            WHERE person_id = ?5 AND slot_date = ?6 AND time_of_day = ?7 AND version = ?8
            "#,
            params![
                activity_code,
                version,
                Utc::now().to_rfc3339(),
                actor,
                key.person_id,
                fmt_date(key.assignment_date),
                key.time_of_day.to_db_str(),
                expected_version,
            ],
        )?;
        Ok(version)
    }

    /// 按版本条件删除时段
    pub(crate) fn delete_slot_if_version_tx(
        conn: &Connection,
        key: &SlotKey,
        expected_version: i64,
    ) -> RepositoryResult<()> {
        let rows = conn.execute(
            r#"
            DELETE FROM schedule_slot
            WHERE person_id = ?1 AND slot_date = ?2 AND time_of_day = ?3 AND version = ?4
            "#,
            params![
                key.person_id,
                fmt_date(key.assignment_date),
                key.time_of_day.to_db_str(),
                expected_version,
            ],
        )?;

        if rows == 0 {
            let actual = Self::find_slot_tx(conn, key)?.map(|s| s.version);
            return Err(RepositoryError::SlotVersionConflict {
                slot: slot_label(key),
                expected: Some(expected_version),
                actual,
            });
        }
        Ok(())
    }
}

pub(crate) fn slot_label(key: &SlotKey) -> String {
    format!(
        "{}@{}/{}",
        key.person_id,
        fmt_date(key.assignment_date),
        key.time_of_day
    )
}

fn map_slot_row(row: &Row) -> rusqlite::Result<LiveSlot> {
    let slot_date: String = row.get(1)?;
    let time_of_day: String = row.get(2)?;
    let updated_at: String = row.get(5)?;
    Ok(LiveSlot {
        person_id: row.get(0)?,
        assignment_date: parse_date(1, &slot_date)?,
        time_of_day: parse_time_of_day(2, &time_of_day)?,
        activity_code: row.get(3)?,
        version: row.get(4)?,
        updated_at: parse_utc(5, &updated_at)?,
        updated_by: row.get(6)?,
    })
}

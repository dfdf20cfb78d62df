// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、参考数据（人员/活动）与实时时段初始化
// ==========================================

#![allow(dead_code)]

use chrono::NaiveDate;
use rusqlite::Connection;
use schedule_import::api::ImportApi;
use schedule_import::config::ImportConfig;
use schedule_import::db::open_shared_connection;
use schedule_import::domain::{Activity, LiveSlot, Person, SlotKey, StagedSlotDiff, TimeOfDay};
use schedule_import::engine::PreviewFilters;
use schedule_import::importer::StageRequest;
use schedule_import::repository::ScheduleRepository;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

pub const OPERATOR: &str = "chief.resident";

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - Arc<Mutex<Connection>>: 共享连接
pub fn create_test_db() -> Result<(NamedTempFile, Arc<Mutex<Connection>>), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();
    let conn = open_shared_connection(&db_path)?;
    Ok((temp_file, conn))
}

/// 2026 年 7 月的某天（Block 1: 07-01 ~ 07-28）
pub fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 7, day).unwrap()
}

pub fn key(person_id: &str, day: u32, tod: TimeOfDay) -> SlotKey {
    SlotKey::new(person_id, d(day), tod)
}

/// 初始化人员与活动
pub fn seed_reference(conn: &Arc<Mutex<Connection>>) {
    let repo = ScheduleRepository::new(conn.clone());
    for (id, name, active) in [
        ("R001", "Ada Lovelace", true),
        ("R002", "Grace Hopper", true),
        ("R003", "Alan Turing", true),
        ("R004", "Katherine Johnson", true),
        ("R005", "Barbara Liskov", false),
    ] {
        repo.upsert_person(&Person {
            person_id: id.to_string(),
            display_name: name.to_string(),
            active,
        })
        .unwrap();
    }
    for (code, name, weekday_only) in [
        ("CLINIC", "Continuity Clinic", true),
        ("INPT", "Inpatient Wards", false),
        ("CALL", "Overnight Call", false),
        ("ELECTIVE", "Elective", false),
    ] {
        repo.upsert_activity(&Activity {
            code: code.to_string(),
            display_name: name.to_string(),
            weekday_only,
        })
        .unwrap();
    }
}

/// 写入实时时段（模拟导入之外的编辑入口）
pub fn seed_slot(
    conn: &Arc<Mutex<Connection>>,
    person_id: &str,
    day: u32,
    tod: TimeOfDay,
    code: &str,
) -> i64 {
    ScheduleRepository::new(conn.clone())
        .write_slot(&key(person_id, day, tod), code, "seed")
        .unwrap()
}

pub fn live(
    conn: &Arc<Mutex<Connection>>,
    person_id: &str,
    day: u32,
    tod: TimeOfDay,
) -> Option<LiveSlot> {
    ScheduleRepository::new(conn.clone())
        .find_slot(&key(person_id, day, tod))
        .unwrap()
}

pub fn live_value(
    conn: &Arc<Mutex<Connection>>,
    person_id: &str,
    day: u32,
    tod: TimeOfDay,
) -> Option<String> {
    live(conn, person_id, day, tod).map(|s| s.activity_code)
}

/// 全部实时时段快照（person, date, tod, activity）
pub fn live_snapshot(conn: &Arc<Mutex<Connection>>) -> Vec<(String, NaiveDate, TimeOfDay, String)> {
    ScheduleRepository::new(conn.clone())
        .list_slots_in_range(
            d(1) - chrono::Duration::days(365),
            d(28) + chrono::Duration::days(365),
        )
        .unwrap()
        .into_iter()
        .map(|s| (s.person_id, s.assignment_date, s.time_of_day, s.activity_code))
        .collect()
}

pub fn test_api(conn: &Arc<Mutex<Connection>>) -> ImportApi {
    ImportApi::new(conn.clone(), ImportConfig::default())
}

pub fn csv_request(csv: &str) -> StageRequest {
    StageRequest {
        file_name: "block1.csv".to_string(),
        content: csv.as_bytes().to_vec(),
        block_number: 1,
        academic_year: "2026-2027".to_string(),
        notes: Some("block 1 master schedule".to_string()),
        range_start: d(1),
        range_end: d(28),
        operator: OPERATOR.to_string(),
    }
}

/// 批次全部差异（含 unchanged）
pub fn all_diffs(api: &ImportApi, batch_id: &str) -> Vec<StagedSlotDiff> {
    let filters = PreviewFilters {
        include_unchanged: true,
        ..Default::default()
    };
    api.preview(batch_id, 1, 500, &filters).unwrap().diffs
}

pub fn diff_for<'a>(
    diffs: &'a [StagedSlotDiff],
    person_id: &str,
    day: u32,
    tod: TimeOfDay,
) -> &'a StagedSlotDiff {
    diffs
        .iter()
        .find(|x| {
            x.person_id.as_deref() == Some(person_id)
                && x.assignment_date == d(day)
                && x.time_of_day == tod
        })
        .unwrap_or_else(|| panic!("no diff for {} {} {:?}", person_id, d(day), tod))
}

pub fn ids(diffs: &[StagedSlotDiff]) -> Vec<String> {
    diffs.iter().map(|x| x.staged_id.clone()).collect()
}

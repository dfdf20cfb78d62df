// ==========================================
// 排班表导入暂存系统 - 差异引擎
// ==========================================
// 职责: 暂存行 vs 实时排班 -> StagedSlotDiff
// 规则:
// - added: 暂存有值，实时无记录
// - modified: 双方有值且不同
// - unchanged: 双方一致（含双方都为空）
// - removed: 批次日期范围内的实时记录，暂存中无对应行
//           （暂存行活动为空且实时有值，同样判定为 removed）
// 校验: 行级错误阻断选择，行级警告仅提示
// ==========================================

use crate::domain::import_batch::{issue_codes, ImportBatch, RowIssue, StagedRow};
use crate::domain::schedule::{Activity, LiveSlot, Person, SlotKey};
use crate::domain::staged_diff::StagedSlotDiff;
use crate::domain::types::{DiffType, TimeOfDay};
use crate::repository::error::RepositoryResult;
use crate::repository::schedule_repo::ScheduleRepository;
use chrono::{Datelike, NaiveDate, Weekday};
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

// ==========================================
// ReferenceData - 人员/活动参考数据
// ==========================================
pub struct ReferenceData {
    persons_by_id: HashMap<String, Person>,
    persons_by_name: HashMap<String, Vec<Person>>,
    activities: HashMap<String, Activity>,
}

impl ReferenceData {
    pub fn new(persons: Vec<Person>, activities: Vec<Activity>) -> Self {
        let mut persons_by_name: HashMap<String, Vec<Person>> = HashMap::new();
        for person in &persons {
            persons_by_name
                .entry(name_key(&person.display_name))
                .or_default()
                .push(person.clone());
        }

        Self {
            persons_by_id: persons
                .into_iter()
                .map(|p| (p.person_id.clone(), p))
                .collect(),
            persons_by_name,
            activities: activities.into_iter().map(|a| (a.code.clone(), a)).collect(),
        }
    }

    fn display_name(&self, person_id: &str) -> String {
        self.persons_by_id
            .get(person_id)
            .map(|p| p.display_name.clone())
            .unwrap_or_else(|| person_id.to_string())
    }
}

fn name_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// 人员解析结果
enum PersonResolution {
    Resolved { person: Person, by_name: bool },
    Unknown { identifier: String },
    Ambiguous { name: String, candidates: usize },
}

impl PersonResolution {
    fn person(&self) -> Option<&Person> {
        match self {
            PersonResolution::Resolved { person, .. } => Some(person),
            _ => None,
        }
    }
}

fn resolve_person(row: &StagedRow, reference: &ReferenceData) -> PersonResolution {
    if let Some(person_id) = &row.person_id {
        return match reference.persons_by_id.get(person_id) {
            Some(person) => PersonResolution::Resolved {
                person: person.clone(),
                by_name: false,
            },
            None => PersonResolution::Unknown {
                identifier: person_id.clone(),
            },
        };
    }

    let name = row.person_name.clone().unwrap_or_default();
    match reference.persons_by_name.get(&name_key(&name)) {
        Some(candidates) if candidates.len() == 1 => PersonResolution::Resolved {
            person: candidates[0].clone(),
            by_name: true,
        },
        Some(candidates) => PersonResolution::Ambiguous {
            name,
            candidates: candidates.len(),
        },
        None => PersonResolution::Unknown { identifier: name },
    }
}

/// 批次内去重键（未解析人员按原始标识归并）
fn duplicate_key(
    row: &StagedRow,
    resolution: &PersonResolution,
) -> (String, NaiveDate, TimeOfDay) {
    let who = match resolution.person() {
        Some(person) => person.person_id.clone(),
        None => format!(
            "?{}",
            name_key(
                row.person_id
                    .as_deref()
                    .or(row.person_name.as_deref())
                    .unwrap_or_default()
            )
        ),
    };
    (who, row.assignment_date, row.time_of_day)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub struct DiffEngine;

impl DiffEngine {
    /// 事务内计算差异（读取参考数据与实时时段）
    pub fn compute_tx(
        conn: &Connection,
        batch: &ImportBatch,
        rows: &[StagedRow],
    ) -> RepositoryResult<Vec<StagedSlotDiff>> {
        let reference = ReferenceData::new(
            ScheduleRepository::list_persons_tx(conn)?,
            ScheduleRepository::list_activities_tx(conn)?,
        );

        let mut live: HashMap<SlotKey, LiveSlot> =
            ScheduleRepository::list_slots_in_range_tx(conn, batch.range_start, batch.range_end)?
                .into_iter()
                .map(|slot| (slot.key(), slot))
                .collect();

        // 范围外的行仍需对照实时值（该行会带 OUT_OF_RANGE 错误）
        for row in rows.iter().filter(|r| !batch.covers(r.assignment_date)) {
            if let PersonResolution::Resolved { person, .. } = resolve_person(row, &reference) {
                let key = SlotKey::new(&person.person_id, row.assignment_date, row.time_of_day);
                if live.contains_key(&key) {
                    continue;
                }
                if let Some(slot) = ScheduleRepository::find_slot_tx(conn, &key)? {
                    live.insert(key, slot);
                }
            }
        }

        Ok(Self::compute(batch, rows, &reference, &live))
    }

    /// 纯函数: 暂存行 + 参考数据 + 实时快照 -> 有序差异列表
    pub fn compute(
        batch: &ImportBatch,
        rows: &[StagedRow],
        reference: &ReferenceData,
        live: &HashMap<SlotKey, LiveSlot>,
    ) -> Vec<StagedSlotDiff> {
        let resolved: Vec<(&StagedRow, PersonResolution)> = rows
            .iter()
            .map(|row| (row, resolve_person(row, reference)))
            .collect();

        let mut occurrences: HashMap<(String, NaiveDate, TimeOfDay), usize> = HashMap::new();
        for (row, resolution) in &resolved {
            *occurrences.entry(duplicate_key(row, resolution)).or_insert(0) += 1;
        }

        let mut covered: HashSet<SlotKey> = HashSet::new();
        let mut diffs = Vec::with_capacity(rows.len());

        for (row, resolution) in &resolved {
            let mut errors = Vec::new();
            let mut warnings = row.warnings.clone();

            // ----- 人员 -----
            match resolution {
                PersonResolution::Resolved { person, by_name } => {
                    if *by_name {
                        warnings.push(RowIssue::new(
                            issue_codes::MATCHED_BY_NAME,
                            Some("person_name"),
                            format!("按姓名匹配到人员 {}", person.person_id),
                        ));
                    }
                    if !person.active {
                        warnings.push(RowIssue::new(
                            issue_codes::INACTIVE_PERSON,
                            Some("person_id"),
                            format!("人员 {} 已停用", person.person_id),
                        ));
                    }
                }
                PersonResolution::Unknown { identifier } => errors.push(RowIssue::new(
                    issue_codes::UNKNOWN_PERSON,
                    Some(if row.person_id.is_some() { "person_id" } else { "person_name" }),
                    format!("未知人员 '{}'", identifier),
                )),
                PersonResolution::Ambiguous { name, candidates } => errors.push(RowIssue::new(
                    issue_codes::AMBIGUOUS_PERSON,
                    Some("person_name"),
                    format!("姓名 '{}' 匹配到 {} 名人员", name, candidates),
                )),
            }

            // ----- 活动 -----
            if let Some(code) = &row.activity_code {
                match reference.activities.get(code) {
                    None => errors.push(RowIssue::new(
                        issue_codes::UNKNOWN_ACTIVITY,
                        Some("activity_code"),
                        format!("未知活动代码 '{}'", code),
                    )),
                    Some(activity) if activity.weekday_only && is_weekend(row.assignment_date) => {
                        warnings.push(RowIssue::new(
                            issue_codes::WEEKEND_ACTIVITY,
                            Some("activity_code"),
                            format!("活动 {} 通常仅安排在工作日", code),
                        ))
                    }
                    Some(_) => {}
                }
            }

            // ----- 范围 / 重复 -----
            if !batch.covers(row.assignment_date) {
                errors.push(RowIssue::new(
                    issue_codes::OUT_OF_RANGE,
                    Some("date"),
                    format!(
                        "日期 {} 不在批次范围 {} ~ {} 内",
                        row.assignment_date, batch.range_start, batch.range_end
                    ),
                ));
            }
            let count = occurrences
                .get(&duplicate_key(row, resolution))
                .copied()
                .unwrap_or(0);
            if count > 1 {
                errors.push(RowIssue::new(
                    issue_codes::DUPLICATE_SLOT,
                    None,
                    format!("同一时段在文件中出现 {} 次", count),
                ));
            }

            // ----- 对照实时值 -----
            let slot = resolution.person().and_then(|person| {
                let key = SlotKey::new(&person.person_id, row.assignment_date, row.time_of_day);
                let slot = live.get(&key);
                covered.insert(key);
                slot
            });

            let diff_type = match (&row.activity_code, slot) {
                (Some(_), None) => DiffType::Added,
                (Some(code), Some(slot)) if *code == slot.activity_code => DiffType::Unchanged,
                (Some(_), Some(_)) => DiffType::Modified,
                (None, Some(_)) => DiffType::Removed,
                (None, None) => DiffType::Unchanged,
            };

            let person_name = match resolution.person() {
                Some(person) => person.display_name.clone(),
                None => row
                    .person_name
                    .clone()
                    .or_else(|| row.person_id.clone())
                    .unwrap_or_default(),
            };

            diffs.push(StagedSlotDiff {
                staged_id: Uuid::new_v4().to_string(),
                batch_id: batch.batch_id.clone(),
                row_number: Some(row.row_number),
                person_id: resolution.person().map(|p| p.person_id.clone()),
                person_name,
                assignment_date: row.assignment_date,
                time_of_day: row.time_of_day,
                diff_type,
                excel_value: row.activity_code.clone(),
                current_value: slot.map(|s| s.activity_code.clone()),
                live_version: slot.map(|s| s.version),
                errors,
                warnings,
            });
        }

        // ----- 范围内缺失行 -> removed -----
        for slot in live.values() {
            if !batch.covers(slot.assignment_date) || covered.contains(&slot.key()) {
                continue;
            }
            diffs.push(StagedSlotDiff {
                staged_id: Uuid::new_v4().to_string(),
                batch_id: batch.batch_id.clone(),
                row_number: None,
                person_id: Some(slot.person_id.clone()),
                person_name: reference.display_name(&slot.person_id),
                assignment_date: slot.assignment_date,
                time_of_day: slot.time_of_day,
                diff_type: DiffType::Removed,
                excel_value: None,
                current_value: Some(slot.activity_code.clone()),
                live_version: Some(slot.version),
                errors: Vec::new(),
                warnings: Vec::new(),
            });
        }

        diffs.sort_by(|a, b| {
            name_key(&a.person_name)
                .cmp(&name_key(&b.person_name))
                .then(a.assignment_date.cmp(&b.assignment_date))
                .then(a.time_of_day.cmp(&b.time_of_day))
                .then(
                    a.row_number
                        .unwrap_or(usize::MAX)
                        .cmp(&b.row_number.unwrap_or(usize::MAX)),
                )
                .then(a.staged_id.cmp(&b.staged_id))
        });

        tracing::debug!(
            batch_id = %batch.batch_id,
            rows = rows.len(),
            diffs = diffs.len(),
            "差异计算完成"
        );
        diffs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::BatchStatus;
    use chrono::Utc;
    use serde_json::json;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, d).unwrap()
    }

    fn batch() -> ImportBatch {
        ImportBatch {
            batch_id: "B1".to_string(),
            status: BatchStatus::Staged,
            file_name: "block1.csv".to_string(),
            uploaded_at: Utc::now(),
            block_number: 1,
            academic_year: "2026-2027".to_string(),
            notes: None,
            range_start: date(1),
            range_end: date(10),
            row_count: 0,
            created_by: "tester".to_string(),
            rolled_back_at: None,
        }
    }

    fn reference() -> ReferenceData {
        ReferenceData::new(
            vec![
                Person {
                    person_id: "R001".into(),
                    display_name: "Ada Lovelace".into(),
                    active: true,
                },
                Person {
                    person_id: "R002".into(),
                    display_name: "Grace Hopper".into(),
                    active: true,
                },
                Person {
                    person_id: "R003".into(),
                    display_name: "Alan Turing".into(),
                    active: false,
                },
                Person {
                    person_id: "R004".into(),
                    display_name: "Alan Turing".into(),
                    active: true,
                },
            ],
            vec![
                Activity {
                    code: "CLINIC".into(),
                    display_name: "Clinic".into(),
                    weekday_only: true,
                },
                Activity {
                    code: "INPT".into(),
                    display_name: "Inpatient".into(),
                    weekday_only: false,
                },
                Activity {
                    code: "CALL".into(),
                    display_name: "Call".into(),
                    weekday_only: false,
                },
            ],
        )
    }

    fn row(
        n: usize,
        id: Option<&str>,
        name: Option<&str>,
        d: u32,
        tod: TimeOfDay,
        code: Option<&str>,
    ) -> StagedRow {
        StagedRow {
            row_id: format!("row-{}", n),
            batch_id: "B1".to_string(),
            row_number: n,
            person_id: id.map(String::from),
            person_name: name.map(String::from),
            assignment_date: date(d),
            time_of_day: tod,
            activity_code: code.map(String::from),
            raw_cells: json!({}),
            warnings: Vec::new(),
        }
    }

    fn live_slot(id: &str, d: u32, tod: TimeOfDay, code: &str) -> LiveSlot {
        LiveSlot {
            person_id: id.to_string(),
            assignment_date: date(d),
            time_of_day: tod,
            activity_code: code.to_string(),
            version: 3,
            updated_at: Utc::now(),
            updated_by: "seed".to_string(),
        }
    }

    fn live_map(slots: Vec<LiveSlot>) -> HashMap<SlotKey, LiveSlot> {
        slots.into_iter().map(|s| (s.key(), s)).collect()
    }

    fn codes(issues: &[RowIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.code.as_str()).collect()
    }

    #[test]
    fn test_classifies_added_modified_unchanged_removed() {
        // 2026-07-01 为周三
        let rows = vec![
            row(2, Some("R001"), None, 1, TimeOfDay::AM, Some("CLINIC")),
            row(3, Some("R002"), None, 1, TimeOfDay::AM, Some("CALL")),
            row(4, Some("R002"), None, 1, TimeOfDay::PM, Some("INPT")),
            row(5, Some("R002"), None, 2, TimeOfDay::AM, None),
        ];
        let live = live_map(vec![
            live_slot("R002", 1, TimeOfDay::AM, "INPT"),
            live_slot("R002", 1, TimeOfDay::PM, "INPT"),
            live_slot("R002", 2, TimeOfDay::AM, "INPT"),
            live_slot("R001", 3, TimeOfDay::PM, "INPT"),
            live_slot("R001", 20, TimeOfDay::PM, "INPT"), // 范围外
        ]);

        let diffs = DiffEngine::compute(&batch(), &rows, &reference(), &live);

        let summary: Vec<(Option<&str>, NaiveDate, TimeOfDay, DiffType)> = diffs
            .iter()
            .map(|d| (d.person_id.as_deref(), d.assignment_date, d.time_of_day, d.diff_type))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Some("R001"), date(1), TimeOfDay::AM, DiffType::Added),
                (Some("R001"), date(3), TimeOfDay::PM, DiffType::Removed),
                (Some("R002"), date(1), TimeOfDay::AM, DiffType::Modified),
                (Some("R002"), date(1), TimeOfDay::PM, DiffType::Unchanged),
                (Some("R002"), date(2), TimeOfDay::AM, DiffType::Removed),
            ]
        );

        let modified = &diffs[2];
        assert_eq!(modified.excel_value.as_deref(), Some("CALL"));
        assert_eq!(modified.current_value.as_deref(), Some("INPT"));
        assert_eq!(modified.live_version, Some(3));
        assert!(diffs.iter().all(|d| !d.has_errors()));

        // 无源行的 removed
        assert_eq!(diffs[1].row_number, None);
        assert_eq!(diffs[1].person_name, "Ada Lovelace");
    }

    #[test]
    fn test_row_validation_errors() {
        let rows = vec![
            row(2, Some("R999"), None, 1, TimeOfDay::AM, Some("CLINIC")),
            row(3, Some("R001"), None, 1, TimeOfDay::AM, Some("SURGERY")),
            row(4, None, Some("alan  turing"), 1, TimeOfDay::AM, Some("CALL")),
            row(5, Some("R002"), None, 15, TimeOfDay::AM, Some("CALL")),
            row(6, Some("R002"), None, 2, TimeOfDay::PM, Some("CALL")),
            row(7, Some("R002"), None, 2, TimeOfDay::PM, Some("INPT")),
        ];

        let diffs = DiffEngine::compute(&batch(), &rows, &reference(), &HashMap::new());

        let by_row = |n: usize| diffs.iter().find(|d| d.row_number == Some(n)).unwrap();
        assert_eq!(codes(&by_row(2).errors), vec![issue_codes::UNKNOWN_PERSON]);
        assert_eq!(by_row(2).person_id, None);
        assert_eq!(by_row(2).person_name, "R999");
        assert_eq!(codes(&by_row(3).errors), vec![issue_codes::UNKNOWN_ACTIVITY]);
        assert_eq!(codes(&by_row(4).errors), vec![issue_codes::AMBIGUOUS_PERSON]);
        assert_eq!(codes(&by_row(5).errors), vec![issue_codes::OUT_OF_RANGE]);
        assert_eq!(codes(&by_row(6).errors), vec![issue_codes::DUPLICATE_SLOT]);
        assert_eq!(codes(&by_row(7).errors), vec![issue_codes::DUPLICATE_SLOT]);
    }

    #[test]
    fn test_row_warnings() {
        // 2026-07-04 为周六
        let mut normalized = row(3, Some("R002"), None, 1, TimeOfDay::PM, Some("INPT"));
        normalized.warnings.push(RowIssue::new(
            issue_codes::CELL_NORMALIZED,
            Some("activity_code"),
            "inpt",
        ));
        let rows = vec![
            row(2, None, Some("grace hopper"), 4, TimeOfDay::AM, Some("CLINIC")),
            normalized,
        ];

        let diffs = DiffEngine::compute(&batch(), &rows, &reference(), &HashMap::new());

        assert_eq!(diffs.len(), 2);
        assert!(diffs.iter().all(|d| !d.has_errors()));
        let weekend = diffs.iter().find(|d| d.row_number == Some(2)).unwrap();
        assert_eq!(weekend.person_id.as_deref(), Some("R002"));
        assert_eq!(
            codes(&weekend.warnings),
            vec![issue_codes::MATCHED_BY_NAME, issue_codes::WEEKEND_ACTIVITY]
        );
        let carried = diffs.iter().find(|d| d.row_number == Some(3)).unwrap();
        assert_eq!(codes(&carried.warnings), vec![issue_codes::CELL_NORMALIZED]);
    }

    #[test]
    fn test_inactive_person_warning() {
        let rows = vec![row(2, Some("R003"), None, 1, TimeOfDay::AM, Some("CALL"))];

        let diffs = DiffEngine::compute(&batch(), &rows, &reference(), &HashMap::new());

        assert_eq!(codes(&diffs[0].warnings), vec![issue_codes::INACTIVE_PERSON]);
        assert!(!diffs[0].has_errors());
    }

    #[test]
    fn test_blank_activity_without_live_is_unchanged() {
        let rows = vec![row(2, Some("R001"), None, 1, TimeOfDay::AM, None)];

        let diffs = DiffEngine::compute(&batch(), &rows, &reference(), &HashMap::new());

        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].diff_type, DiffType::Unchanged);
        assert_eq!(diffs[0].resolved_value(), None);
    }

    #[test]
    fn test_staged_ids_unique() {
        let rows: Vec<StagedRow> = (1..=10)
            .map(|d| row(d as usize + 1, Some("R001"), None, d, TimeOfDay::PM, Some("INPT")))
            .collect();

        let diffs = DiffEngine::compute(&batch(), &rows, &reference(), &HashMap::new());

        let ids: HashSet<&str> = diffs.iter().map(|d| d.staged_id.as_str()).collect();
        assert_eq!(ids.len(), 10);
    }
}

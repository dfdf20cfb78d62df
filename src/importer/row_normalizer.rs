// ==========================================
// 排班表导入暂存系统 - 行规范化器实现
// ==========================================
// 职责: 表头别名映射 + 单元格清洗 -> StagedRow
// 规则:
// - 无法定位到时段的行（缺人员 / 日期 / 时段）丢弃并记录警告
// - 活动单元格为空表示"该时段无排班"
// - 清洗改写过的单元格记录 CELL_NORMALIZED 警告
// ==========================================

use crate::domain::import_batch::{issue_codes, RowIssue, StageWarning, StagedRow};
use crate::domain::types::TimeOfDay;
use crate::importer::error::{ParseError, ParseResult};
use crate::importer::importer_trait::{RawRecord, RawSheet, RowNormalizer};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// 标准列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    PersonId,
    PersonName,
    Date,
    TimeOfDay,
    Activity,
}

impl Column {
    fn label(&self) -> &'static str {
        match self {
            Column::PersonId => "person_id",
            Column::PersonName => "person_name",
            Column::Date => "date",
            Column::TimeOfDay => "time_of_day",
            Column::Activity => "activity_code",
        }
    }

    /// 列名别名（已做 normalize_header 处理）
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Column::PersonId => &[
                "person_id",
                "personid",
                "resident_id",
                "staff_id",
                "id",
                "人员编号",
            ],
            Column::PersonName => &["person_name", "name", "resident", "resident_name", "姓名"],
            Column::Date => &["date", "assignment_date", "slot_date", "日期"],
            Column::TimeOfDay => &["time_of_day", "session", "am_pm", "time", "时段"],
            Column::Activity => &["activity_code", "activity", "assignment", "code", "活动"],
        }
    }
}

/// 表头规范化: 去空白 / 小写 / 空格与连字符转下划线
fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Excel 序列号 -> 日期（1900 日期系统，纪元 1899-12-30）
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

/// 解析日期单元格（兼容常见格式与 Excel 序列号）
pub fn parse_date_cell(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d", "%m/%d/%Y", "%d-%b-%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return Some(date);
        }
    }

    // 带时间部分的日期（Excel 导出为文本时常见）
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.date());
        }
    }

    value.parse::<f64>().ok().and_then(excel_serial_to_date)
}

/// 占位符单元格（视为空）
const BLANK_PLACEHOLDERS: [&str; 3] = ["-", "--", "N/A"];

pub struct ScheduleRowNormalizer;

impl ScheduleRowNormalizer {
    /// 表头 -> 标准列 映射（按别名优先级取第一个命中）
    fn resolve_columns(&self, headers: &[String]) -> ParseResult<HashMap<Column, String>> {
        let normalized: Vec<(String, &String)> =
            headers.iter().map(|h| (normalize_header(h), h)).collect();

        let mut columns = HashMap::new();
        for column in [
            Column::PersonId,
            Column::PersonName,
            Column::Date,
            Column::TimeOfDay,
            Column::Activity,
        ] {
            let hit = column.aliases().iter().find_map(|alias| {
                normalized
                    .iter()
                    .find(|(n, _)| n == alias)
                    .map(|(_, original)| (*original).clone())
            });
            if let Some(original) = hit {
                columns.insert(column, original);
            }
        }

        let mut missing = Vec::new();
        if !columns.contains_key(&Column::PersonId) && !columns.contains_key(&Column::PersonName) {
            missing.push("person_id|person_name".to_string());
        }
        for column in [Column::Date, Column::TimeOfDay, Column::Activity] {
            if !columns.contains_key(&column) {
                missing.push(column.label().to_string());
            }
        }
        if !missing.is_empty() {
            return Err(ParseError::MissingColumns(missing));
        }

        Ok(columns)
    }

    fn cell<'a>(
        &self,
        record: &'a RawRecord,
        columns: &HashMap<Column, String>,
        column: Column,
    ) -> Option<&'a str> {
        columns
            .get(&column)
            .and_then(|header| record.cells.get(header))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// 规范化单行
    ///
    /// # 返回
    /// - Ok(StagedRow): 可定位到时段
    /// - Err(String): 丢弃原因
    fn normalize_record(
        &self,
        batch_id: &str,
        record: &RawRecord,
        columns: &HashMap<Column, String>,
    ) -> Result<StagedRow, String> {
        let person_id = self
            .cell(record, columns, Column::PersonId)
            .map(|v| v.to_string());
        let person_name = self
            .cell(record, columns, Column::PersonName)
            .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "));
        if person_id.is_none() && person_name.is_none() {
            return Err("缺少人员编号与姓名".to_string());
        }

        let date_raw = self
            .cell(record, columns, Column::Date)
            .ok_or_else(|| "日期为空".to_string())?;
        let assignment_date =
            parse_date_cell(date_raw).ok_or_else(|| format!("无法解析日期 '{}'", date_raw))?;

        let time_raw = self
            .cell(record, columns, Column::TimeOfDay)
            .ok_or_else(|| "时段为空".to_string())?;
        let time_of_day =
            TimeOfDay::parse(time_raw).ok_or_else(|| format!("无法解析时段 '{}'", time_raw))?;

        let mut warnings = Vec::new();
        let activity_raw = self.cell(record, columns, Column::Activity);
        let activity_code = match activity_raw {
            None => None,
            Some(raw) if BLANK_PLACEHOLDERS.contains(&raw.to_uppercase().as_str()) => {
                warnings.push(RowIssue::new(
                    issue_codes::CELL_NORMALIZED,
                    Some(Column::Activity.label()),
                    format!("活动 '{}' 视为空（无排班）", raw),
                ));
                None
            }
            Some(raw) => {
                let code = raw.to_uppercase();
                if code != raw {
                    warnings.push(RowIssue::new(
                        issue_codes::CELL_NORMALIZED,
                        Some(Column::Activity.label()),
                        format!("活动 '{}' 规范化为 '{}'", raw, code),
                    ));
                }
                Some(code)
            }
        };

        // 保留全部原始单元格（按表头排序）
        let mut raw_cells = Map::new();
        let mut keys: Vec<&String> = record.cells.keys().collect();
        keys.sort();
        for key in keys {
            raw_cells.insert(key.clone(), Value::String(record.cells[key].clone()));
        }

        Ok(StagedRow {
            row_id: Uuid::new_v4().to_string(),
            batch_id: batch_id.to_string(),
            row_number: record.row_number,
            person_id,
            person_name,
            assignment_date,
            time_of_day,
            activity_code,
            raw_cells: Value::Object(raw_cells),
            warnings,
        })
    }
}

impl RowNormalizer for ScheduleRowNormalizer {
    fn normalize(
        &self,
        batch_id: &str,
        sheet: &RawSheet,
    ) -> ParseResult<(Vec<StagedRow>, Vec<StageWarning>)> {
        let columns = self.resolve_columns(&sheet.headers)?;

        let mut rows = Vec::with_capacity(sheet.records.len());
        let mut warnings = Vec::new();
        let mut dropped = 0usize;

        for record in &sheet.records {
            match self.normalize_record(batch_id, record, &columns) {
                Ok(row) => {
                    for issue in &row.warnings {
                        warnings.push(StageWarning {
                            row_number: row.row_number,
                            code: issue.code.clone(),
                            message: issue.message.clone(),
                        });
                    }
                    rows.push(row);
                }
                Err(reason) => {
                    dropped += 1;
                    tracing::debug!(row = record.row_number, reason = %reason, "丢弃不可定位行");
                    warnings.push(StageWarning {
                        row_number: record.row_number,
                        code: issue_codes::ROW_DROPPED.to_string(),
                        message: reason,
                    });
                }
            }
        }

        if rows.is_empty() {
            return Err(ParseError::NoUsableRows { dropped });
        }

        Ok((rows, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(headers: &[&str], rows: &[&[&str]]) -> RawSheet {
        let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        let records = rows
            .iter()
            .enumerate()
            .map(|(idx, values)| RawRecord {
                row_number: idx + 2,
                cells: headers
                    .iter()
                    .cloned()
                    .zip(values.iter().map(|v| v.to_string()))
                    .collect(),
            })
            .collect();
        RawSheet { headers, records }
    }

    #[test]
    fn test_excel_serial_to_date() {
        assert_eq!(excel_serial_to_date(46204.0), NaiveDate::from_ymd_opt(2026, 7, 1));
        assert_eq!(excel_serial_to_date(46204.75), NaiveDate::from_ymd_opt(2026, 7, 1));
        assert_eq!(excel_serial_to_date(0.0), None);
        assert_eq!(excel_serial_to_date(-3.0), None);
    }

    #[test]
    fn test_parse_date_cell_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 7, 1);
        assert_eq!(parse_date_cell("2026-07-01"), expected);
        assert_eq!(parse_date_cell("2026/07/01"), expected);
        assert_eq!(parse_date_cell("20260701"), expected);
        assert_eq!(parse_date_cell("07/01/2026"), expected);
        assert_eq!(parse_date_cell("2026-07-01 00:00:00"), expected);
        assert_eq!(parse_date_cell("46204"), expected);
        assert_eq!(parse_date_cell("next tuesday"), None);
        assert_eq!(parse_date_cell(""), None);
    }

    #[test]
    fn test_normalize_header_aliases() {
        let sheet = sheet(
            &["Resident ID", "Assignment-Date", "Session", "Activity"],
            &[&["R001", "2026-07-01", "am", "clinic"]],
        );

        let (rows, warnings) = ScheduleRowNormalizer.normalize("B1", &sheet).unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.person_id.as_deref(), Some("R001"));
        assert_eq!(row.time_of_day, TimeOfDay::AM);
        assert_eq!(row.activity_code.as_deref(), Some("CLINIC"));
        assert_eq!(row.row_number, 2);
        assert_eq!(row.raw_cells["Activity"], "clinic");

        // 小写活动被规范化
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, issue_codes::CELL_NORMALIZED);
        assert_eq!(row.warnings[0].field.as_deref(), Some("activity_code"));
    }

    #[test]
    fn test_missing_columns() {
        let sheet = sheet(&["name", "date"], &[&["Ada", "2026-07-01"]]);

        let result = ScheduleRowNormalizer.normalize("B1", &sheet);

        match result {
            Err(ParseError::MissingColumns(cols)) => {
                assert_eq!(cols, vec!["time_of_day".to_string(), "activity_code".to_string()]);
            }
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_unaddressable_rows_dropped_with_warning() {
        let sheet = sheet(
            &["person_id", "date", "time_of_day", "activity"],
            &[
                &["R001", "2026-07-01", "AM", "CLINIC"],
                &["R002", "not a date", "AM", "CLINIC"],
                &["R003", "2026-07-01", "evening", "CLINIC"],
                &["", "2026-07-01", "PM", "CLINIC"],
            ],
        );

        let (rows, warnings) = ScheduleRowNormalizer.normalize("B1", &sheet).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().all(|w| w.code == issue_codes::ROW_DROPPED));
        assert_eq!(
            warnings.iter().map(|w| w.row_number).collect::<Vec<_>>(),
            vec![3, 4, 5]
        );
    }

    #[test]
    fn test_blank_activity_and_placeholder() {
        let sheet = sheet(
            &["person_id", "date", "time_of_day", "activity"],
            &[
                &["R001", "2026-07-01", "AM", ""],
                &["R001", "2026-07-01", "PM", "-"],
            ],
        );

        let (rows, warnings) = ScheduleRowNormalizer.normalize("B1", &sheet).unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.activity_code.is_none()));
        // 仅占位符记录规范化警告
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].row_number, 3);
    }

    #[test]
    fn test_name_only_sheet() {
        let sheet = sheet(
            &["姓名", "日期", "时段", "活动"],
            &[&["  Ada   Lovelace ", "2026-07-02", "PM", "INPT"]],
        );

        let (rows, _) = ScheduleRowNormalizer.normalize("B1", &sheet).unwrap();

        assert_eq!(rows[0].person_id, None);
        assert_eq!(rows[0].person_name.as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn test_all_rows_dropped_is_fatal() {
        let sheet = sheet(
            &["person_id", "date", "time_of_day", "activity"],
            &[&["R001", "??", "AM", "CLINIC"]],
        );

        let result = ScheduleRowNormalizer.normalize("B1", &sheet);

        assert!(matches!(result, Err(ParseError::NoUsableRows { dropped: 1 })));
    }
}

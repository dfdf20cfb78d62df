// ==========================================
// 排班表导入暂存系统 - 行映射辅助
// ==========================================
// 职责: TEXT 列 <-> chrono / 枚举 / JSON 的统一转换
// ==========================================

use crate::domain::types::{BatchStatus, DiffType, TimeOfDay};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use serde::de::DeserializeOwned;

pub(crate) const DATE_FMT: &str = "%Y-%m-%d";

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

pub(crate) fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

pub(crate) fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FMT)
        .map_err(|e| conversion_error(idx, format!("日期格式错误 {}: {}", raw, e)))
}

pub(crate) fn parse_utc(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("时间格式错误 {}: {}", raw, e)))
}

pub(crate) fn parse_time_of_day(idx: usize, raw: &str) -> rusqlite::Result<TimeOfDay> {
    TimeOfDay::parse(raw).ok_or_else(|| conversion_error(idx, format!("未知时段: {}", raw)))
}

pub(crate) fn parse_batch_status(idx: usize, raw: &str) -> rusqlite::Result<BatchStatus> {
    BatchStatus::from_db_str(raw)
        .ok_or_else(|| conversion_error(idx, format!("未知批次状态: {}", raw)))
}

pub(crate) fn parse_diff_type(idx: usize, raw: &str) -> rusqlite::Result<DiffType> {
    DiffType::from_db_str(raw)
        .ok_or_else(|| conversion_error(idx, format!("未知差异类型: {}", raw)))
}

pub(crate) fn parse_json<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| conversion_error(idx, format!("JSON 解析失败: {}", e)))
}

// ==========================================
// 排班表导入暂存系统 - 实时排班领域模型
// ==========================================
// 职责: 人员 / 活动代码 / 实时时段
// 说明: 实时排班由本系统之外的编辑入口共同维护，
//       所有写入都通过 version 做乐观并发控制
// ==========================================

use crate::domain::types::TimeOfDay;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub person_id: String,
    pub display_name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub code: String,
    pub display_name: String,
    pub weekday_only: bool, // 仅工作日安排（周末出现时给出警告）
}

/// 时段主键: 人员 + 日期 + 时段
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotKey {
    pub person_id: String,
    pub assignment_date: NaiveDate,
    pub time_of_day: TimeOfDay,
}

impl SlotKey {
    pub fn new(person_id: &str, assignment_date: NaiveDate, time_of_day: TimeOfDay) -> Self {
        Self {
            person_id: person_id.to_string(),
            assignment_date,
            time_of_day,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSlot {
    pub person_id: String,
    pub assignment_date: NaiveDate,
    pub time_of_day: TimeOfDay,
    pub activity_code: String,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl LiveSlot {
    pub fn key(&self) -> SlotKey {
        SlotKey::new(&self.person_id, self.assignment_date, self.time_of_day)
    }
}

// ==========================================
// 排班表导入暂存系统 - 差异领域模型
// ==========================================
// 职责: StagedSlotDiff（以 stagedId 为稳定键）
// 红线: errors 非空的差异永远不能被写入实时排班
// ==========================================

use crate::domain::import_batch::RowIssue;
use crate::domain::types::{DiffType, TimeOfDay};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedSlotDiff {
    pub staged_id: String,
    pub batch_id: String,
    pub row_number: Option<usize>, // removed 差异无对应源行
    pub person_id: Option<String>, // 未能解析人员时为 None
    pub person_name: String,
    pub assignment_date: NaiveDate,
    pub time_of_day: TimeOfDay,
    pub diff_type: DiffType,
    pub excel_value: Option<String>,
    pub current_value: Option<String>,
    pub live_version: Option<i64>, // 计算差异时实时时段的版本号（乐观锁基准）
    pub errors: Vec<RowIssue>,
    pub warnings: Vec<RowIssue>,
}

impl StagedSlotDiff {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// 写入实时排班时的目标值（removed 为 None）
    pub fn resolved_value(&self) -> Option<&str> {
        match self.diff_type {
            DiffType::Removed => None,
            _ => self.excel_value.as_deref(),
        }
    }
}

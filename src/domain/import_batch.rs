// ==========================================
// 排班表导入暂存系统 - 导入批次领域模型
// ==========================================
// 职责: ImportBatch / StagedRow / 行级问题 定义
// 红线: 暂存数据与实时排班表隔离存储
// ==========================================

use crate::domain::types::{BatchStatus, TimeOfDay};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ImportBatch - 导入批次
// ==========================================
// 用途: 一次上传文件对应一个批次
// 约束: 状态单调前进；rolled_back 后不再修改
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBatch {
    pub batch_id: String,
    pub status: BatchStatus,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub block_number: i32,
    pub academic_year: String,
    pub notes: Option<String>,

    // ===== 声明覆盖的日期范围（闭区间）=====
    // 用途: 限定 removed 判定范围
    pub range_start: NaiveDate,
    pub range_end: NaiveDate,

    pub row_count: i64,
    pub created_by: String,
    pub rolled_back_at: Option<DateTime<Utc>>,
}

impl ImportBatch {
    /// 日期是否落在批次声明范围内
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.range_start && date <= self.range_end
    }
}

// ==========================================
// RowIssue - 行级问题（错误/警告通用结构）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowIssue {
    pub code: String,
    pub field: Option<String>,
    pub message: String,
}

impl RowIssue {
    pub fn new(code: &str, field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            field: field.map(|f| f.to_string()),
            message: message.into(),
        }
    }
}

/// 行级问题代码
pub mod issue_codes {
    // ===== 阻断错误（RowValidationError）=====
    pub const UNKNOWN_PERSON: &str = "UNKNOWN_PERSON";
    pub const AMBIGUOUS_PERSON: &str = "AMBIGUOUS_PERSON";
    pub const UNKNOWN_ACTIVITY: &str = "UNKNOWN_ACTIVITY";
    pub const DUPLICATE_SLOT: &str = "DUPLICATE_SLOT";
    pub const OUT_OF_RANGE: &str = "OUT_OF_RANGE";

    // ===== 提示警告（RowWarning）=====
    pub const MATCHED_BY_NAME: &str = "MATCHED_BY_NAME";
    pub const WEEKEND_ACTIVITY: &str = "WEEKEND_ACTIVITY";
    pub const INACTIVE_PERSON: &str = "INACTIVE_PERSON";
    pub const CELL_NORMALIZED: &str = "CELL_NORMALIZED";
    pub const ROW_DROPPED: &str = "ROW_DROPPED";
}

// ==========================================
// StagedRow - 暂存行（规范化后的表格行）
// ==========================================
// 格式: (personId|personName, date, timeOfDay, activityCode, rawCells)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedRow {
    pub row_id: String,
    pub batch_id: String,
    pub row_number: usize, // 源文件行号（1-based，含表头）
    pub person_id: Option<String>,
    pub person_name: Option<String>,
    pub assignment_date: NaiveDate,
    pub time_of_day: TimeOfDay,
    pub activity_code: Option<String>, // None = 单元格为空（清空该时段）
    pub raw_cells: serde_json::Value,
    pub warnings: Vec<RowIssue>,
}

// ==========================================
// StageWarning - 暂存阶段警告（行被丢弃或单元格被规范化）
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageWarning {
    pub row_number: usize,
    pub code: String,
    pub message: String,
}

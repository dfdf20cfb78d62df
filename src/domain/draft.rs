// ==========================================
// 排班表导入暂存系统 - 草稿领域模型
// ==========================================
// 职责: DraftChangeset（一次选择性写入） / AppliedChange（回滚依据）
// 约束: added + modified + removed + skipped + failed == total_selected
// ==========================================

use crate::domain::schedule::SlotKey;
use crate::domain::types::TimeOfDay;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// RowApplyFailure - 单行写入失败
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowApplyFailure {
    pub staged_id: String,
    pub code: String,
    pub reason: String,
}

/// 单行写入失败代码
pub mod failure_codes {
    pub const NOT_IN_BATCH: &str = "NOT_IN_BATCH";
    pub const ALREADY_APPLIED: &str = "ALREADY_APPLIED";
    pub const VERSION_CONFLICT: &str = "VERSION_CONFLICT";
    pub const WRITE_FAILED: &str = "WRITE_FAILED";
    pub const CANCELLED: &str = "CANCELLED";
}

// ==========================================
// DraftChangeset - 草稿（一次选择性写入的结果）
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftChangeset {
    pub draft_id: String,
    pub batch_id: String,
    pub selected_ids: Vec<String>,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,

    // ===== 结果计数 =====
    pub added: i64,
    pub modified: i64,
    pub removed: i64,
    pub skipped: i64,
    pub failed: i64,
    pub total_selected: i64,

    pub failures: Vec<RowApplyFailure>,
    pub interrupted: bool, // 请求超时/取消导致提前结束
    pub message: String,
}

impl DraftChangeset {
    pub fn succeeded(&self) -> i64 {
        self.added + self.modified + self.removed
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.staged_id.clone()).collect()
    }

    /// 计数守恒校验
    pub fn is_balanced(&self) -> bool {
        self.added + self.modified + self.removed + self.skipped + self.failed
            == self.total_selected
    }
}

// ==========================================
// AppliedChange - 已写入变更（回滚专用）
// ==========================================
// 用途: 记录写入前的实时值，回滚时按写入顺序逆序恢复
// 生命周期: 写入时创建，回滚时消费并删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedChange {
    pub seq: i64, // 全局写入顺序（自增）
    pub batch_id: String,
    pub draft_id: String,
    pub staged_id: String,
    pub person_id: String,
    pub assignment_date: NaiveDate,
    pub time_of_day: TimeOfDay,
    pub prior_value: Option<String>,   // None = 写入前无记录
    pub prior_version: Option<i64>,
    pub applied_value: Option<String>, // None = 本次写入为删除
    pub applied_version: Option<i64>,
    pub applied_at: DateTime<Utc>,
}

impl AppliedChange {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey::new(&self.person_id, self.assignment_date, self.time_of_day)
    }
}

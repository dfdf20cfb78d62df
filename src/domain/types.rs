// ==========================================
// 排班表导入暂存系统 - 领域类型定义
// ==========================================
// 职责: 批次状态 / 差异类型 / 时段 等枚举
// 序列化格式: 数据库统一小写 snake_case 存储
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 批次状态 (Batch Status)
// ==========================================
// 红线: 只能单调前进 staged -> drafted -> applied -> rolled_back
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Staged,     // 已暂存（尚未执行任何草稿）
    Drafted,    // 已执行草稿，但没有任何行成功写入
    Applied,    // 至少一行成功写入实时排班
    RolledBack, // 已整批回滚（终态）
}

impl BatchStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            BatchStatus::Staged => "staged",
            BatchStatus::Drafted => "drafted",
            BatchStatus::Applied => "applied",
            BatchStatus::RolledBack => "rolled_back",
        }
    }

    pub fn from_db_str(s: &str) -> Option<BatchStatus> {
        match s.trim().to_lowercase().as_str() {
            "staged" => Some(BatchStatus::Staged),
            "drafted" => Some(BatchStatus::Drafted),
            "applied" => Some(BatchStatus::Applied),
            "rolled_back" => Some(BatchStatus::RolledBack),
            _ => None,
        }
    }

    /// 是否允许继续执行草稿（选择性写入）
    pub fn is_draftable(&self) -> bool {
        matches!(
            self,
            BatchStatus::Staged | BatchStatus::Drafted | BatchStatus::Applied
        )
    }

    /// 状态推进（单调）：返回 max(self, next)
    ///
    /// rolled_back 为终态，不再变化
    pub fn advance_to(self, next: BatchStatus) -> BatchStatus {
        if self == BatchStatus::RolledBack {
            return self;
        }
        self.max(next)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 差异类型 (Diff Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffType {
    Added,     // 暂存有值，实时无记录
    Removed,   // 实时有记录，暂存缺失（限定在批次声明日期范围内）
    Modified,  // 双方都有值且不同
    Unchanged, // 双方一致（默认视图不展示）
}

impl DiffType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            DiffType::Added => "added",
            DiffType::Removed => "removed",
            DiffType::Modified => "modified",
            DiffType::Unchanged => "unchanged",
        }
    }

    pub fn from_db_str(s: &str) -> Option<DiffType> {
        match s.trim().to_lowercase().as_str() {
            "added" => Some(DiffType::Added),
            "removed" => Some(DiffType::Removed),
            "modified" => Some(DiffType::Modified),
            "unchanged" => Some(DiffType::Unchanged),
            _ => None,
        }
    }

    /// 是否会改变实时排班
    pub fn is_change(&self) -> bool {
        !matches!(self, DiffType::Unchanged)
    }
}

impl fmt::Display for DiffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 时段 (Time Of Day)
// ==========================================
// 排班最小单元: 人员 + 日期 + 时段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimeOfDay {
    AM,
    PM,
}

impl TimeOfDay {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            TimeOfDay::AM => "AM",
            TimeOfDay::PM => "PM",
        }
    }

    /// 解析时段文本（兼容表格中的常见写法）
    pub fn parse(raw: &str) -> Option<TimeOfDay> {
        match raw.trim().to_uppercase().as_str() {
            "AM" | "A" | "MORNING" | "A.M." => Some(TimeOfDay::AM),
            "PM" | "P" | "AFTERNOON" | "P.M." => Some(TimeOfDay::PM),
            _ => None,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_status_advance_is_monotonic() {
        assert_eq!(
            BatchStatus::Staged.advance_to(BatchStatus::Drafted),
            BatchStatus::Drafted
        );
        assert_eq!(
            BatchStatus::Applied.advance_to(BatchStatus::Drafted),
            BatchStatus::Applied
        );
        assert_eq!(
            BatchStatus::RolledBack.advance_to(BatchStatus::Applied),
            BatchStatus::RolledBack
        );
    }

    #[test]
    fn test_batch_status_draftable() {
        assert!(BatchStatus::Staged.is_draftable());
        assert!(BatchStatus::Applied.is_draftable());
        assert!(!BatchStatus::RolledBack.is_draftable());
    }

    #[test]
    fn test_time_of_day_parse() {
        assert_eq!(TimeOfDay::parse(" am "), Some(TimeOfDay::AM));
        assert_eq!(TimeOfDay::parse("Afternoon"), Some(TimeOfDay::PM));
        assert_eq!(TimeOfDay::parse("noon"), None);
        assert!(TimeOfDay::AM < TimeOfDay::PM);
    }

    #[test]
    fn test_db_str_parse_back() {
        assert_eq!(
            BatchStatus::from_db_str("ROLLED_BACK"),
            Some(BatchStatus::RolledBack)
        );
        assert_eq!(DiffType::from_db_str("modified"), Some(DiffType::Modified));
        assert_eq!(DiffType::from_db_str("moved"), None);
    }
}

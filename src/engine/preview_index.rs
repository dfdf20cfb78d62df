// ==========================================
// 排班表导入暂存系统 - 预览索引
// ==========================================
// 职责: (diffs, filters, page, pageSize) -> {diffs[], totalDiffs, metrics}
// 红线: 纯函数，任何过滤/分页组合都不修改批次状态
// 说明: metrics 统计全批次，与当前过滤/分页无关
// ==========================================

use crate::config::import_config::ImportConfig;
use crate::domain::staged_diff::StagedSlotDiff;
use crate::domain::types::DiffType;
use serde::{Deserialize, Serialize};

/// 预览过滤条件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewFilters {
    pub diff_type: Option<DiffType>,
    pub activity_code: Option<String>, // 子串匹配（忽略大小写）
    pub has_errors: Option<bool>,      // 三态
    pub person_id: Option<String>,     // 格式不合法时忽略
    pub include_unchanged: bool,
}

/// 全批次指标
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewMetrics {
    pub total_slots: usize,
    pub changed_slots: usize,
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub error_rows: usize,
    pub warning_rows: usize,
    pub manual_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewPage {
    pub diffs: Vec<StagedSlotDiff>,
    pub total_diffs: usize,
    pub page: usize,
    pub page_size: usize,
    pub metrics: PreviewMetrics,
}

/// personId 格式校验: 1..=64 位 [A-Za-z0-9_-]
pub fn is_well_formed_person_id(raw: &str) -> bool {
    !raw.is_empty()
        && raw.len() <= 64
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug, Clone)]
pub struct PreviewIndex {
    slot_hours: f64,
    default_page_size: usize,
    max_page_size: usize,
}

impl PreviewIndex {
    pub fn new(config: &ImportConfig) -> Self {
        Self {
            slot_hours: config.slot_hours,
            default_page_size: config.preview_default_page_size.max(1),
            max_page_size: config.preview_max_page_size.max(1),
        }
    }

    /// 规范化分页参数: page 从 1 开始；pageSize 0 取默认值，超限截断
    pub fn normalize_paging(&self, page: usize, page_size: usize) -> (usize, usize) {
        let page = page.max(1);
        let size = if page_size == 0 {
            self.default_page_size
        } else {
            page_size
        };
        (page, size.clamp(1, self.max_page_size))
    }

    /// 单条差异是否命中过滤条件
    pub fn matches(&self, diff: &StagedSlotDiff, filters: &PreviewFilters) -> bool {
        if diff.diff_type == DiffType::Unchanged {
            let requested =
                filters.include_unchanged || filters.diff_type == Some(DiffType::Unchanged);
            if !requested || filters.has_errors.is_some() {
                return false;
            }
        }

        if let Some(diff_type) = filters.diff_type {
            if diff.diff_type != diff_type {
                return false;
            }
        }

        if let Some(has_errors) = filters.has_errors {
            if diff.has_errors() != has_errors {
                return false;
            }
        }

        if let Some(needle) = filters
            .activity_code
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let needle = needle.to_lowercase();
            let hit = [&diff.excel_value, &diff.current_value]
                .iter()
                .filter_map(|v| v.as_deref())
                .any(|v| v.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }

        if let Some(person_id) = filters
            .person_id
            .as_deref()
            .filter(|p| is_well_formed_person_id(p))
        {
            if diff.person_id.as_deref() != Some(person_id) {
                return false;
            }
        }

        true
    }

    pub fn metrics(&self, diffs: &[StagedSlotDiff]) -> PreviewMetrics {
        let mut metrics = PreviewMetrics {
            total_slots: diffs.len(),
            ..PreviewMetrics::default()
        };
        for diff in diffs {
            match diff.diff_type {
                DiffType::Added => metrics.added += 1,
                DiffType::Removed => metrics.removed += 1,
                DiffType::Modified => metrics.modified += 1,
                DiffType::Unchanged => metrics.unchanged += 1,
            }
            if diff.has_errors() {
                metrics.error_rows += 1;
            }
            if !diff.warnings.is_empty() {
                metrics.warning_rows += 1;
            }
        }
        metrics.changed_slots = metrics.added + metrics.removed + metrics.modified;
        metrics.manual_hours = metrics.changed_slots as f64 * self.slot_hours;
        metrics
    }

    /// 构建预览页
    pub fn build(
        &self,
        diffs: &[StagedSlotDiff],
        filters: &PreviewFilters,
        page: usize,
        page_size: usize,
    ) -> PreviewPage {
        let (page, page_size) = self.normalize_paging(page, page_size);

        let filtered: Vec<&StagedSlotDiff> =
            diffs.iter().filter(|d| self.matches(d, filters)).collect();
        let total_diffs = filtered.len();

        let offset = (page - 1).saturating_mul(page_size);
        let page_items = filtered
            .into_iter()
            .skip(offset)
            .take(page_size)
            .cloned()
            .collect();

        PreviewPage {
            diffs: page_items,
            total_diffs,
            page,
            page_size,
            metrics: self.metrics(diffs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::import_batch::RowIssue;
    use crate::domain::types::TimeOfDay;
    use chrono::NaiveDate;

    fn diff(
        n: usize,
        person: &str,
        diff_type: DiffType,
        excel: Option<&str>,
        current: Option<&str>,
    ) -> StagedSlotDiff {
        StagedSlotDiff {
            staged_id: format!("S{:02}", n),
            batch_id: "B1".to_string(),
            row_number: Some(n + 1),
            person_id: Some(person.to_string()),
            person_name: person.to_string(),
            assignment_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            time_of_day: TimeOfDay::AM,
            diff_type,
            excel_value: excel.map(String::from),
            current_value: current.map(String::from),
            live_version: current.map(|_| 1),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn index() -> PreviewIndex {
        PreviewIndex::new(&ImportConfig::default())
    }

    fn sample() -> Vec<StagedSlotDiff> {
        let mut errored = diff(3, "R003", DiffType::Added, Some("CLINIC"), None);
        errored.errors.push(RowIssue::new("UNKNOWN_PERSON", None, "unknown"));
        vec![
            diff(1, "R001", DiffType::Added, Some("CLINIC"), None),
            diff(2, "R002", DiffType::Modified, Some("CALL"), Some("INPT")),
            errored,
            diff(4, "R004", DiffType::Unchanged, Some("INPT"), Some("INPT")),
            diff(5, "R005", DiffType::Removed, None, Some("CALL")),
        ]
    }

    fn ids(page: &PreviewPage) -> Vec<&str> {
        page.diffs.iter().map(|d| d.staged_id.as_str()).collect()
    }

    #[test]
    fn test_default_view_hides_unchanged() {
        let page = index().build(&sample(), &PreviewFilters::default(), 1, 50);

        assert_eq!(ids(&page), vec!["S01", "S02", "S03", "S05"]);
        assert_eq!(page.total_diffs, 4);
    }

    #[test]
    fn test_has_errors_filter() {
        let filters = PreviewFilters {
            has_errors: Some(true),
            include_unchanged: true,
            ..Default::default()
        };
        let page = index().build(&sample(), &filters, 1, 50);
        assert_eq!(ids(&page), vec!["S03"]);
        assert_eq!(page.total_diffs, 1);

        let clean = PreviewFilters {
            has_errors: Some(false),
            include_unchanged: true,
            ..Default::default()
        };
        let page = index().build(&sample(), &clean, 1, 50);
        assert_eq!(ids(&page), vec!["S01", "S02", "S05"]);
    }

    #[test]
    fn test_unchanged_on_request() {
        let filters = PreviewFilters {
            diff_type: Some(DiffType::Unchanged),
            ..Default::default()
        };
        let page = index().build(&sample(), &filters, 1, 50);
        assert_eq!(ids(&page), vec!["S04"]);

        let all = PreviewFilters {
            include_unchanged: true,
            ..Default::default()
        };
        assert_eq!(index().build(&sample(), &all, 1, 50).total_diffs, 5);
    }

    #[test]
    fn test_activity_code_substring_matches_either_side() {
        let filters = PreviewFilters {
            activity_code: Some("inp".to_string()),
            ..Default::default()
        };
        let page = index().build(&sample(), &filters, 1, 50);

        assert_eq!(ids(&page), vec!["S02"]);
    }

    #[test]
    fn test_malformed_person_id_is_ignored() {
        let filters = PreviewFilters {
            person_id: Some("R002".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&index().build(&sample(), &filters, 1, 50)), vec!["S02"]);

        let malformed = PreviewFilters {
            person_id: Some("R002' OR 1=1 --".to_string()),
            ..Default::default()
        };
        assert_eq!(index().build(&sample(), &malformed, 1, 50).total_diffs, 4);
    }

    #[test]
    fn test_person_id_well_formedness() {
        assert!(is_well_formed_person_id("R-001_a"));
        assert!(!is_well_formed_person_id(""));
        assert!(!is_well_formed_person_id("R 001"));
        assert!(!is_well_formed_person_id(&"x".repeat(65)));
    }

    #[test]
    fn test_paging_and_clamping() {
        let idx = index();
        assert_eq!(idx.normalize_paging(0, 0), (1, 50));
        assert_eq!(idx.normalize_paging(2, 10_000), (2, 500));

        let page = idx.build(&sample(), &PreviewFilters::default(), 2, 3);
        assert_eq!(ids(&page), vec!["S05"]);
        assert_eq!(page.total_diffs, 4);

        let beyond = idx.build(&sample(), &PreviewFilters::default(), 9, 3);
        assert!(beyond.diffs.is_empty());
        assert_eq!(beyond.total_diffs, 4);
    }

    #[test]
    fn test_metrics_cover_full_batch() {
        let filters = PreviewFilters {
            diff_type: Some(DiffType::Removed),
            ..Default::default()
        };
        let page = index().build(&sample(), &filters, 1, 1);

        let m = &page.metrics;
        assert_eq!(m.total_slots, 5);
        assert_eq!(m.changed_slots, 4);
        assert_eq!((m.added, m.modified, m.removed, m.unchanged), (2, 1, 1, 1));
        assert_eq!(m.error_rows, 1);
        assert!((m.manual_hours - 16.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_build_is_idempotent() {
        let diffs = sample();
        let filters = PreviewFilters {
            include_unchanged: true,
            ..Default::default()
        };

        let first = index().build(&diffs, &filters, 1, 2);
        let second = index().build(&diffs, &filters, 1, 2);

        assert_eq!(first, second);
    }
}

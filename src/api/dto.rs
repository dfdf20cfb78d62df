// ==========================================
// 排班表导入暂存系统 - API 数据传输对象
// ==========================================
// 约定: 对外字段统一 camelCase
// ==========================================

use crate::domain::draft::{DraftChangeset, RowApplyFailure};
use crate::domain::import_batch::StageWarning;
use crate::domain::staged_diff::StagedSlotDiff;
use crate::domain::types::BatchStatus;
use crate::engine::preview_index::{PreviewMetrics, PreviewPage};
use crate::engine::rollback::RollbackOutcome;
use crate::importer::batch_stager::StageOutcome;
use serde::{Deserialize, Serialize};

/// 暂存响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResponse {
    pub batch_id: String,
    pub warnings: Vec<StageWarning>,
    pub row_count: usize,
    pub diff_count: usize,
    /// 暂存耗时（毫秒）
    pub elapsed_ms: u64,
}

impl From<StageOutcome> for StageResponse {
    fn from(outcome: StageOutcome) -> Self {
        Self {
            batch_id: outcome.batch_id,
            warnings: outcome.warnings,
            row_count: outcome.row_count,
            diff_count: outcome.diff_count,
            elapsed_ms: outcome.elapsed_ms,
        }
    }
}

/// 预览响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub batch_id: String,
    pub status: BatchStatus,
    pub diffs: Vec<StagedSlotDiff>,
    pub total_diffs: usize,
    pub page: usize,
    pub page_size: usize,
    /// 全批次指标（与过滤/分页无关）
    pub metrics: PreviewMetrics,
}

impl PreviewResponse {
    pub fn new(batch_id: &str, status: BatchStatus, page: PreviewPage) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            status,
            diffs: page.diffs,
            total_diffs: page.total_diffs,
            page: page.page,
            page_size: page.page_size,
            metrics: page.metrics,
        }
    }
}

/// 草稿请求体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDraftRequest {
    pub staged_ids: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// 草稿响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDraftResponse {
    pub draft_id: String,
    pub added: i64,
    pub modified: i64,
    pub removed: i64,
    pub skipped: i64,
    pub failed: i64,
    pub total_selected: i64,
    /// 失败的 stagedId 列表
    pub failed_ids: Vec<String>,
    /// 失败明细（代码 + 原因）
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub failures: Vec<RowApplyFailure>,
    /// 因请求超时提前结束
    pub interrupted: bool,
    pub message: String,
}

impl From<DraftChangeset> for CreateDraftResponse {
    fn from(draft: DraftChangeset) -> Self {
        Self {
            failed_ids: draft.failed_ids(),
            draft_id: draft.draft_id,
            added: draft.added,
            modified: draft.modified,
            removed: draft.removed,
            skipped: draft.skipped,
            failed: draft.failed,
            total_selected: draft.total_selected,
            failures: draft.failures,
            interrupted: draft.interrupted,
            message: draft.message,
        }
    }
}

/// 回滚响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackResponse {
    pub batch_id: String,
    pub success: bool,
    pub restored_slots: usize,
    pub drafts_reverted: usize,
    pub message: String,
}

impl From<RollbackOutcome> for RollbackResponse {
    fn from(outcome: RollbackOutcome) -> Self {
        let message = format!(
            "已回滚 {} 个草稿，恢复 {} 个时段",
            outcome.drafts_reverted, outcome.restored_slots
        );
        Self {
            batch_id: outcome.batch_id,
            success: true,
            restored_slots: outcome.restored_slots,
            drafts_reverted: outcome.drafts_reverted,
            message,
        }
    }
}

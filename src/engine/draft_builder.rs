// ==========================================
// 排班表导入暂存系统 - 选择性草稿执行器
// ==========================================
// 职责: 按所选 stagedId 逐行写入实时排班，生成 DraftChangeset
// 红线:
// - 带 errors 的差异永远不写入（服务端强制跳过）
// - 批次级前置条件失败时整体拒绝，零副作用
// - 每行写入与其 AppliedChange 同事务提交，乐观锁冲突只影响该行
// - 计数守恒: added + modified + removed + skipped + failed == total_selected
// ==========================================

use crate::domain::action_log::{ImportActionLog, ImportActionType};
use crate::domain::draft::{failure_codes, AppliedChange, DraftChangeset, RowApplyFailure};
use crate::domain::schedule::SlotKey;
use crate::domain::staged_diff::StagedSlotDiff;
use crate::domain::types::{BatchStatus, DiffType};
use crate::engine::batch_lock::{BatchLockRegistry, LockPurpose};
use crate::engine::cancel::CancelFlag;
use crate::repository::action_log_repo::ImportActionLogRepository;
use crate::repository::draft_repo::DraftRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_batch_repo::ImportBatchRepository;
use crate::repository::schedule_repo::ScheduleRepository;
use crate::repository::staged_diff_repo::StagedDiffRepository;
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

// ==========================================
// DraftCreationError - 批次级拒绝
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DraftErrorCode {
    BatchNotFound,
    BatchNotDraftable,
    EmptySelection,
    LockContention,
    StorageFailure,
}

impl DraftErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftErrorCode::BatchNotFound => "BATCH_NOT_FOUND",
            DraftErrorCode::BatchNotDraftable => "BATCH_NOT_DRAFTABLE",
            DraftErrorCode::EmptySelection => "EMPTY_SELECTION",
            DraftErrorCode::LockContention => "LOCK_CONTENTION",
            DraftErrorCode::StorageFailure => "STORAGE_FAILURE",
        }
    }
}

#[derive(Error, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct DraftCreationError {
    pub message: String,
    pub error_code: DraftErrorCode,
    pub failed_ids: Vec<String>,
}

impl DraftCreationError {
    fn new(
        error_code: DraftErrorCode,
        message: impl Into<String>,
        failed_ids: Vec<String>,
    ) -> Self {
        Self {
            message: message.into(),
            error_code,
            failed_ids,
        }
    }

    fn storage(err: RepositoryError, failed_ids: Vec<String>) -> Self {
        Self::new(
            DraftErrorCode::StorageFailure,
            format!("读取批次数据失败: {}", err),
            failed_ids,
        )
    }
}

/// 草稿请求
#[derive(Debug, Clone)]
pub struct DraftRequest {
    pub batch_id: String,
    pub staged_ids: Vec<String>,
    pub notes: Option<String>,
    pub operator: String,
}

/// 去重（保留首次出现顺序）
pub fn dedupe_selection(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(|id| id.to_string())
        .collect()
}

/// 草稿头 + 批次差异（按 stagedId 索引）+ 之前草稿已写入的 stagedId
type PreparedDraft = (DraftChangeset, HashMap<String, StagedSlotDiff>, HashSet<String>);

pub struct DraftBuilder {
    conn: Arc<Mutex<Connection>>,
    locks: Arc<BatchLockRegistry>,
}

impl DraftBuilder {
    pub fn new(conn: Arc<Mutex<Connection>>, locks: Arc<BatchLockRegistry>) -> Self {
        Self { conn, locks }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 执行一次选择性写入
    ///
    /// # 返回
    /// - Ok(DraftChangeset): 逐行结果汇总（行级失败记录在 failures 中）
    /// - Err(DraftCreationError): 批次级前置条件失败，实时排班未被修改
    pub fn create_draft(
        &self,
        request: &DraftRequest,
        cancel: &CancelFlag,
    ) -> Result<DraftChangeset, DraftCreationError> {
        let batch_id = request.batch_id.as_str();
        let selected = dedupe_selection(&request.staged_ids);
        if selected.is_empty() {
            return Err(DraftCreationError::new(
                DraftErrorCode::EmptySelection,
                "未选择任何差异行",
                Vec::new(),
            ));
        }

        // 与回滚 / 其他草稿互斥
        let _guard = self
            .locks
            .try_acquire(batch_id, LockPurpose::Draft)
            .map_err(|holder| {
                DraftCreationError::new(
                    DraftErrorCode::LockContention,
                    format!("批次 {} 正在执行 {}，请稍后重试", batch_id, holder.as_str()),
                    selected.clone(),
                )
            })?;

        let (mut draft, diffs, mut applied) = self.prepare(request, &selected)?;

        tracing::info!(
            batch_id = %batch_id,
            draft_id = %draft.draft_id,
            selected = selected.len(),
            "开始执行草稿"
        );

        for (idx, staged_id) in selected.iter().enumerate() {
            if cancel.is_cancelled() {
                for remaining in &selected[idx..] {
                    record_failure(
                        &mut draft,
                        remaining,
                        failure_codes::CANCELLED,
                        "请求超时，未执行",
                    );
                }
                draft.interrupted = true;
                tracing::warn!(
                    batch_id = %batch_id,
                    draft_id = %draft.draft_id,
                    not_attempted = selected.len() - idx,
                    "草稿执行被取消"
                );
                break;
            }

            let diff = match diffs.get(staged_id) {
                Some(diff) => diff,
                None => {
                    record_failure(
                        &mut draft,
                        staged_id,
                        failure_codes::NOT_IN_BATCH,
                        "差异行不属于该批次",
                    );
                    continue;
                }
            };

            if diff.has_errors() || !diff.diff_type.is_change() {
                draft.skipped += 1;
                continue;
            }

            if applied.contains(staged_id) {
                record_failure(
                    &mut draft,
                    staged_id,
                    failure_codes::ALREADY_APPLIED,
                    "该行已在之前的草稿中写入",
                );
                continue;
            }

            match self.apply_row(&draft.draft_id, diff, &request.operator) {
                Ok(()) => {
                    match diff.diff_type {
                        DiffType::Added => draft.added += 1,
                        DiffType::Modified => draft.modified += 1,
                        DiffType::Removed => draft.removed += 1,
                        DiffType::Unchanged => {}
                    }
                    applied.insert(staged_id.clone());
                }
                Err(RepositoryError::SlotVersionConflict {
                    slot,
                    expected,
                    actual,
                }) => {
                    tracing::debug!(staged_id = %staged_id, slot = %slot, "时段版本冲突");
                    record_failure(
                        &mut draft,
                        staged_id,
                        failure_codes::VERSION_CONFLICT,
                        &format!(
                            "时段 {} 已被修改（预期版本 {:?}，实际版本 {:?}）",
                            slot, expected, actual
                        ),
                    );
                }
                Err(e) => {
                    tracing::warn!(staged_id = %staged_id, error = %e, "单行写入失败");
                    record_failure(
                        &mut draft,
                        staged_id,
                        failure_codes::WRITE_FAILED,
                        &e.to_string(),
                    );
                }
            }
        }

        draft.message = summary_message(&draft);
        if let Err(e) = self.finalize(&draft) {
            // 已提交的行写入及其计数不受影响
            tracing::error!(draft_id = %draft.draft_id, error = %e, "草稿汇总落库失败");
            draft.message = format!("{}（汇总落库失败: {}）", draft.message, e);
        }

        tracing::info!(
            batch_id = %batch_id,
            draft_id = %draft.draft_id,
            added = draft.added,
            modified = draft.modified,
            removed = draft.removed,
            skipped = draft.skipped,
            failed = draft.failed,
            interrupted = draft.interrupted,
            "草稿执行完成"
        );

        Ok(draft)
    }

    /// 校验批次、加载差异并落库草稿头
    fn prepare(
        &self,
        request: &DraftRequest,
        selected: &[String],
    ) -> Result<PreparedDraft, DraftCreationError> {
        let storage = |e: RepositoryError| DraftCreationError::storage(e, selected.to_vec());

        let conn = self.get_conn().map_err(storage)?;

        let batch = ImportBatchRepository::find_by_id_tx(&conn, &request.batch_id)
            .map_err(storage)?
            .ok_or_else(|| {
                DraftCreationError::new(
                    DraftErrorCode::BatchNotFound,
                    format!("批次不存在: {}", request.batch_id),
                    selected.to_vec(),
                )
            })?;

        if !batch.status.is_draftable() {
            return Err(DraftCreationError::new(
                DraftErrorCode::BatchNotDraftable,
                format!("批次状态为 {}，不允许执行草稿", batch.status),
                selected.to_vec(),
            ));
        }

        let diffs: HashMap<String, StagedSlotDiff> =
            StagedDiffRepository::list_by_batch_tx(&conn, &request.batch_id)
                .map_err(storage)?
                .into_iter()
                .map(|d| (d.staged_id.clone(), d))
                .collect();
        let applied =
            DraftRepository::applied_staged_ids_tx(&conn, &request.batch_id).map_err(storage)?;

        let draft = DraftChangeset {
            draft_id: Uuid::new_v4().to_string(),
            batch_id: request.batch_id.clone(),
            selected_ids: selected.to_vec(),
            notes: request.notes.clone(),
            created_by: request.operator.clone(),
            created_at: Utc::now(),
            added: 0,
            modified: 0,
            removed: 0,
            skipped: 0,
            failed: 0,
            total_selected: selected.len() as i64,
            failures: Vec::new(),
            interrupted: false,
            message: String::new(),
        };
        DraftRepository::insert_changeset_tx(&conn, &draft).map_err(storage)?;

        Ok((draft, diffs, applied))
    }

    /// 单行写入（独立事务）
    fn apply_row(
        &self,
        draft_id: &str,
        diff: &StagedSlotDiff,
        operator: &str,
    ) -> RepositoryResult<()> {
        let person_id = diff
            .person_id
            .as_deref()
            .ok_or_else(|| RepositoryError::FieldValueError {
                field: "person_id".to_string(),
                message: "差异行未解析到人员".to_string(),
            })?;
        let key = SlotKey::new(person_id, diff.assignment_date, diff.time_of_day);

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let (applied_value, applied_version) = match diff.diff_type {
            DiffType::Added => {
                let code = required_value(diff)?;
                let version =
                    ScheduleRepository::insert_slot_if_absent_tx(&tx, &key, code, operator)?;
                (Some(code.to_string()), Some(version))
            }
            DiffType::Modified => {
                let code = required_value(diff)?;
                let version = ScheduleRepository::update_slot_if_version_tx(
                    &tx,
                    &key,
                    code,
                    required_version(diff)?,
                    operator,
                )?;
                (Some(code.to_string()), Some(version))
            }
            DiffType::Removed => {
                ScheduleRepository::delete_slot_if_version_tx(&tx, &key, required_version(diff)?)?;
                (None, None)
            }
            DiffType::Unchanged => {
                return Err(RepositoryError::FieldValueError {
                    field: "diff_type".to_string(),
                    message: "unchanged 行不产生写入".to_string(),
                })
            }
        };

        let change = AppliedChange {
            seq: 0,
            batch_id: diff.batch_id.clone(),
            draft_id: draft_id.to_string(),
            staged_id: diff.staged_id.clone(),
            person_id: person_id.to_string(),
            assignment_date: diff.assignment_date,
            time_of_day: diff.time_of_day,
            prior_value: diff.current_value.clone(),
            prior_version: diff.live_version,
            applied_value,
            applied_version,
            applied_at: Utc::now(),
        };
        DraftRepository::insert_applied_change_tx(&tx, &change)?;
        DraftRepository::record_success_tx(&tx, draft_id, diff.diff_type)?;
        ImportBatchRepository::advance_status_tx(&tx, &diff.batch_id, BatchStatus::Applied)?;

        tx.commit()?;
        Ok(())
    }

    /// 回填计数、推进批次状态、记录操作日志（同一事务）
    fn finalize(&self, draft: &DraftChangeset) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        DraftRepository::finalize_changeset_tx(&tx, draft)?;

        let next = if draft.succeeded() > 0 {
            BatchStatus::Applied
        } else {
            BatchStatus::Drafted
        };
        ImportBatchRepository::advance_status_tx(&tx, &draft.batch_id, next)?;

        let log = ImportActionLog::new(
            &draft.batch_id,
            ImportActionType::CreateDraft,
            &draft.created_by,
            Some(json!({
                "draftId": draft.draft_id,
                "added": draft.added,
                "modified": draft.modified,
                "removed": draft.removed,
                "skipped": draft.skipped,
                "failed": draft.failed,
                "totalSelected": draft.total_selected,
                "interrupted": draft.interrupted,
            })),
            Some(draft.message.clone()),
        );
        ImportActionLogRepository::insert_tx(&tx, &log)?;

        tx.commit()?;
        Ok(())
    }
}

fn record_failure(draft: &mut DraftChangeset, staged_id: &str, code: &str, reason: &str) {
    draft.failed += 1;
    draft.failures.push(RowApplyFailure {
        staged_id: staged_id.to_string(),
        code: code.to_string(),
        reason: reason.to_string(),
    });
}

fn required_value(diff: &StagedSlotDiff) -> RepositoryResult<&str> {
    diff.resolved_value()
        .ok_or_else(|| RepositoryError::FieldValueError {
            field: "excel_value".to_string(),
            message: format!("差异行 {} 缺少目标值", diff.staged_id),
        })
}

fn required_version(diff: &StagedSlotDiff) -> RepositoryResult<i64> {
    diff.live_version
        .ok_or_else(|| RepositoryError::FieldValueError {
            field: "live_version".to_string(),
            message: format!("差异行 {} 缺少实时版本号", diff.staged_id),
        })
}

fn summary_message(draft: &DraftChangeset) -> String {
    let mut message = format!(
        "选择 {} 行: 新增 {}，修改 {}，删除 {}，跳过 {}，失败 {}",
        draft.total_selected,
        draft.added,
        draft.modified,
        draft.removed,
        draft.skipped,
        draft.failed
    );
    if draft.interrupted {
        message.push_str("（请求超时，提前结束）");
    }
    message
}

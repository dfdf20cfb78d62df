// ==========================================
// 排班表导入暂存系统 - 导入流水线 API
// ==========================================
// 职责: 暂存 / 预览 / 选择性草稿 / 整批回滚 + 只读查询
// 说明:
// - 长耗时操作放到阻塞线程池执行，并在请求边界受 request_timeout_ms 约束
// - 超时只设置取消标记，等待执行线程在安全点停止后再返回，
//   因此返回结果与实际已提交的写入完全一致
// ==========================================

use crate::api::dto::{
    CreateDraftRequest, CreateDraftResponse, PreviewResponse, RollbackResponse, StageResponse,
};
use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, ImportConfig, ImportConfigReader};
use crate::domain::action_log::ImportActionLog;
use crate::domain::draft::DraftChangeset;
use crate::domain::import_batch::ImportBatch;
use crate::engine::batch_lock::BatchLockRegistry;
use crate::engine::cancel::CancelFlag;
use crate::engine::draft_builder::{DraftBuilder, DraftRequest};
use crate::engine::preview_index::{PreviewFilters, PreviewIndex};
use crate::engine::rollback::RollbackManager;
use crate::importer::batch_stager::{BatchStager, StageRequest};
use crate::repository::{
    DraftRepository, ImportActionLogRepository, ImportBatchRepository, StagedDiffRepository,
};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 导入API
pub struct ImportApi {
    conn: Arc<Mutex<Connection>>,
    config: ImportConfig,
    locks: Arc<BatchLockRegistry>,
    batch_repo: ImportBatchRepository,
    diff_repo: StagedDiffRepository,
    draft_repo: DraftRepository,
    action_log_repo: ImportActionLogRepository,
}

impl ImportApi {
    pub fn new(conn: Arc<Mutex<Connection>>, config: ImportConfig) -> Self {
        Self {
            batch_repo: ImportBatchRepository::new(conn.clone()),
            diff_repo: StagedDiffRepository::new(conn.clone()),
            draft_repo: DraftRepository::new(conn.clone()),
            action_log_repo: ImportActionLogRepository::new(conn.clone()),
            locks: BatchLockRegistry::new(),
            config,
            conn,
        }
    }

    /// 从共享连接创建，配置从 config_kv 读取
    pub async fn from_connection(conn: Arc<Mutex<Connection>>) -> ApiResult<Self> {
        let config_manager = ConfigManager::from_connection(conn.clone())?;
        let config = config_manager.load_import_config().await?;
        tracing::debug!(?config, "导入配置已加载");
        Ok(Self::new(conn, config))
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.config.request_timeout_ms.max(1))
    }

    /// 在阻塞线程池执行，超时后设置取消标记并等待其结束
    async fn run_bounded<T, F>(&self, operation: &str, cancel: CancelFlag, work: F) -> ApiResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let mut handle = tokio::task::spawn_blocking(work);

        let joined = match tokio::time::timeout(self.request_timeout(), &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(
                    operation = operation,
                    timeout_ms = self.config.request_timeout_ms,
                    "请求超时，通知执行线程停止"
                );
                cancel.cancel();
                handle.await
            }
        };

        joined.map_err(|e| ApiError::InternalError(format!("{} 执行线程异常: {}", operation, e)))
    }

    // ==========================================
    // 暂存
    // ==========================================

    /// 暂存上传文件
    ///
    /// # 返回
    /// - Ok(StageResponse): `{batchId, warnings[]}` 及统计
    /// - Err(ApiError::ParseError): 文件整体不可解析，未落库
    pub async fn stage(&self, request: StageRequest) -> ApiResult<StageResponse> {
        let stager = BatchStager::new(self.conn.clone(), self.config.max_stage_rows);
        let cancel = CancelFlag::new();
        let worker_cancel = cancel.clone();

        let outcome = self
            .run_bounded("stage", cancel, move || stager.stage(&request, &worker_cancel))
            .await?;

        match outcome {
            Ok(outcome) => Ok(StageResponse::from(outcome)),
            Err(e) => {
                tracing::warn!(error = %e, "暂存失败");
                Err(ApiError::from(e))
            }
        }
    }

    // ==========================================
    // 预览（只读）
    // ==========================================

    /// 预览批次差异
    ///
    /// 说明: 同一批次上重复调用返回一致结果
    pub fn preview(
        &self,
        batch_id: &str,
        page: usize,
        page_size: usize,
        filters: &PreviewFilters,
    ) -> ApiResult<PreviewResponse> {
        let batch = self.require_batch(batch_id)?;
        let diffs = self.diff_repo.list_by_batch(batch_id)?;

        let index = PreviewIndex::new(&self.config);
        let preview = index.build(&diffs, filters, page, page_size);

        Ok(PreviewResponse::new(batch_id, batch.status, preview))
    }

    // ==========================================
    // 选择性草稿
    // ==========================================

    /// 对所选 stagedId 执行一次写入
    ///
    /// # 返回
    /// - Ok(CreateDraftResponse): 逐行结果汇总（含失败 stagedId）
    /// - Err(ApiError::DraftCreation): 批次级拒绝，零副作用
    pub async fn create_draft(
        &self,
        batch_id: &str,
        request: CreateDraftRequest,
        operator: &str,
    ) -> ApiResult<CreateDraftResponse> {
        let builder = DraftBuilder::new(self.conn.clone(), Arc::clone(&self.locks));
        let draft_request = DraftRequest {
            batch_id: batch_id.to_string(),
            staged_ids: request.staged_ids,
            notes: request.notes,
            operator: operator.to_string(),
        };
        let cancel = CancelFlag::new();
        let worker_cancel = cancel.clone();

        let result = self
            .run_bounded("create_draft", cancel, move || {
                builder.create_draft(&draft_request, &worker_cancel)
            })
            .await?;

        match result {
            Ok(draft) => Ok(CreateDraftResponse::from(draft)),
            Err(e) => {
                tracing::warn!(
                    batch_id = %batch_id,
                    error_code = e.error_code.as_str(),
                    error = %e,
                    "草稿创建被拒绝"
                );
                Err(ApiError::DraftCreation(e))
            }
        }
    }

    // ==========================================
    // 整批回滚
    // ==========================================

    /// 回滚批次全部草稿
    ///
    /// 说明: 单事务执行，不响应取消；超时只影响日志
    pub async fn rollback(&self, batch_id: &str, operator: &str) -> ApiResult<RollbackResponse> {
        let manager = RollbackManager::new(self.conn.clone(), Arc::clone(&self.locks));
        let batch_id_owned = batch_id.to_string();
        let operator = operator.to_string();

        let result = self
            .run_bounded("rollback", CancelFlag::new(), move || {
                manager.rollback(&batch_id_owned, &operator)
            })
            .await?;

        match result {
            Ok(outcome) => Ok(RollbackResponse::from(outcome)),
            Err(e) => {
                tracing::warn!(batch_id = %batch_id, error = %e, "回滚失败");
                Err(ApiError::from(e))
            }
        }
    }

    // ==========================================
    // 只读查询
    // ==========================================

    pub fn get_batch(&self, batch_id: &str) -> ApiResult<ImportBatch> {
        self.require_batch(batch_id)
    }

    /// 最近的批次（按上传时间倒序）
    pub fn list_batches(&self, limit: usize) -> ApiResult<Vec<ImportBatch>> {
        Ok(self.batch_repo.list_recent(limit)?)
    }

    /// 批次的草稿列表（按创建顺序）
    pub fn list_drafts(&self, batch_id: &str) -> ApiResult<Vec<DraftChangeset>> {
        self.require_batch(batch_id)?;
        Ok(self.draft_repo.list_by_batch(batch_id)?)
    }

    /// 批次当前仍有效的已写入变更数（回滚后为 0）
    pub fn count_applied_changes(&self, batch_id: &str) -> ApiResult<i64> {
        self.require_batch(batch_id)?;
        Ok(self.draft_repo.count_applied(batch_id)?)
    }

    pub fn list_action_logs(&self, batch_id: &str) -> ApiResult<Vec<ImportActionLog>> {
        Ok(self.action_log_repo.list_by_batch(batch_id)?)
    }

    fn require_batch(&self, batch_id: &str) -> ApiResult<ImportBatch> {
        if batch_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("batch_id 不能为空".to_string()));
        }
        self.batch_repo
            .find_by_id(batch_id)?
            .ok_or_else(|| ApiError::NotFound(format!("ImportBatch(id={})不存在", batch_id)))
    }
}

// ==========================================
// 排班表导入暂存系统 - 批次暂存
// ==========================================
// 流程: 解析 -> 规范化 -> 计算差异 -> 单事务落库
// 红线:
// - 暂存数据写入与实时排班隔离的 import_* 表
// - 整文件级错误（ParseError）不落库任何数据
// - 批次一经暂存不可修改（差异随批次一并固化）
// ==========================================

use crate::domain::action_log::{ImportActionLog, ImportActionType};
use crate::domain::import_batch::{ImportBatch, StageWarning};
use crate::domain::types::BatchStatus;
use crate::engine::cancel::CancelFlag;
use crate::engine::diff_engine::DiffEngine;
use crate::importer::error::{ParseError, StageError};
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::importer_trait::RowNormalizer;
use crate::importer::row_normalizer::ScheduleRowNormalizer;
use crate::repository::action_log_repo::ImportActionLogRepository;
use crate::repository::error::RepositoryError;
use crate::repository::import_batch_repo::ImportBatchRepository;
use crate::repository::staged_diff_repo::StagedDiffRepository;
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use uuid::Uuid;

/// 暂存请求
#[derive(Debug, Clone)]
pub struct StageRequest {
    pub file_name: String,
    pub content: Vec<u8>,
    pub block_number: i32,
    pub academic_year: String,
    pub notes: Option<String>,
    pub range_start: NaiveDate,
    pub range_end: NaiveDate,
    pub operator: String,
}

/// 暂存结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    pub batch_id: String,
    pub warnings: Vec<StageWarning>,
    pub row_count: usize,
    pub diff_count: usize,
    pub elapsed_ms: u64,
}

pub struct BatchStager {
    conn: Arc<Mutex<Connection>>,
    parser: UniversalFileParser,
    normalizer: Box<dyn RowNormalizer>,
    max_rows: usize,
}

impl BatchStager {
    pub fn new(conn: Arc<Mutex<Connection>>, max_rows: usize) -> Self {
        Self {
            conn,
            parser: UniversalFileParser,
            normalizer: Box::new(ScheduleRowNormalizer),
            max_rows,
        }
    }

    fn validate(&self, request: &StageRequest) -> Result<(), StageError> {
        if request.range_start > request.range_end {
            return Err(StageError::InvalidRequest(format!(
                "日期范围无效: {} > {}",
                request.range_start, request.range_end
            )));
        }
        if request.academic_year.trim().is_empty() {
            return Err(StageError::InvalidRequest("学年不能为空".to_string()));
        }
        if request.file_name.trim().is_empty() {
            return Err(StageError::InvalidRequest("文件名不能为空".to_string()));
        }
        Ok(())
    }

    /// 暂存一个上传文件
    ///
    /// # 返回
    /// - Ok(StageOutcome): 批次 ID + 行级警告
    /// - Err(StageError): 不落库任何数据
    pub fn stage(
        &self,
        request: &StageRequest,
        cancel: &CancelFlag,
    ) -> Result<StageOutcome, StageError> {
        let started = Instant::now();
        self.validate(request)?;

        // === 阶段 1: 解析 ===
        let sheet = self.parser.parse(&request.file_name, &request.content)?;
        if sheet.records.len() > self.max_rows {
            return Err(ParseError::TooManyRows {
                rows: sheet.records.len(),
                limit: self.max_rows,
            }
            .into());
        }

        // === 阶段 2: 规范化 ===
        let batch_id = Uuid::new_v4().to_string();
        let (rows, warnings) = self.normalizer.normalize(&batch_id, &sheet)?;

        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }

        let batch = ImportBatch {
            batch_id: batch_id.clone(),
            status: BatchStatus::Staged,
            file_name: request.file_name.clone(),
            uploaded_at: Utc::now(),
            block_number: request.block_number,
            academic_year: request.academic_year.trim().to_string(),
            notes: request.notes.clone(),
            range_start: request.range_start,
            range_end: request.range_end,
            row_count: rows.len() as i64,
            created_by: request.operator.clone(),
            rolled_back_at: None,
        };

        // === 阶段 3: 差异 + 落库（单事务）===
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let tx = conn.transaction()?;

        ImportBatchRepository::insert_batch_tx(&tx, &batch)?;
        ImportBatchRepository::insert_rows_tx(&tx, &rows)?;
        let diffs = DiffEngine::compute_tx(&tx, &batch, &rows)?;
        StagedDiffRepository::insert_diffs_tx(&tx, &diffs)?;

        let log = ImportActionLog::new(
            &batch_id,
            ImportActionType::Stage,
            &request.operator,
            Some(json!({
                "fileName": request.file_name,
                "rows": rows.len(),
                "diffs": diffs.len(),
                "warnings": warnings.len(),
            })),
            request.notes.clone(),
        );
        ImportActionLogRepository::insert_tx(&tx, &log)?;

        if cancel.is_cancelled() {
            // 未提交的事务随 tx 析构回滚
            return Err(StageError::Cancelled);
        }
        tx.commit()?;

        let outcome = StageOutcome {
            batch_id,
            row_count: rows.len(),
            diff_count: diffs.len(),
            warnings,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        tracing::info!(
            batch_id = %outcome.batch_id,
            file_name = %request.file_name,
            rows = outcome.row_count,
            diffs = outcome.diff_count,
            warnings = outcome.warnings.len(),
            elapsed_ms = outcome.elapsed_ms,
            "批次暂存完成"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_shared_connection;

    const ONE_ROW: &str = "person_id,date,time_of_day,activity\nR001,2026-07-01,AM,CLINIC\n";

    fn request(file_name: &str, content: &str) -> StageRequest {
        StageRequest {
            file_name: file_name.to_string(),
            content: content.as_bytes().to_vec(),
            block_number: 1,
            academic_year: "2026-2027".to_string(),
            notes: None,
            range_start: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            range_end: NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(),
            operator: "tester".to_string(),
        }
    }

    fn batch_count(conn: &Arc<Mutex<Connection>>) -> i64 {
        conn.lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM import_batch", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_inverted_range_rejected() {
        let conn = open_shared_connection(":memory:").unwrap();
        let stager = BatchStager::new(conn.clone(), 100);
        let mut req = request("block.csv", ONE_ROW);
        std::mem::swap(&mut req.range_start, &mut req.range_end);

        let result = stager.stage(&req, &CancelFlag::new());

        assert!(matches!(result, Err(StageError::InvalidRequest(_))));
        assert_eq!(batch_count(&conn), 0);
    }

    #[test]
    fn test_too_many_rows() {
        let conn = open_shared_connection(":memory:").unwrap();
        let stager = BatchStager::new(conn.clone(), 1);
        let req = request(
            "block.csv",
            concat!(
                "person_id,date,time_of_day,activity\n",
                "R001,2026-07-01,AM,CLINIC\n",
                "R001,2026-07-01,PM,CLINIC\n",
            ),
        );

        let result = stager.stage(&req, &CancelFlag::new());

        assert!(matches!(
            result,
            Err(StageError::Parse(ParseError::TooManyRows { rows: 2, limit: 1 }))
        ));
        assert_eq!(batch_count(&conn), 0);
    }

    #[test]
    fn test_cancelled_stage_persists_nothing() {
        let conn = open_shared_connection(":memory:").unwrap();
        let stager = BatchStager::new(conn.clone(), 100);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = stager.stage(&request("block.csv", ONE_ROW), &cancel);

        assert!(matches!(result, Err(StageError::Cancelled)));
        assert_eq!(batch_count(&conn), 0);
    }
}

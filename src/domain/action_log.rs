// ==========================================
// 排班表导入暂存系统 - 操作日志领域模型
// ==========================================
// 红线: 所有对暂存区/实时排班的写入都必须留痕
// ==========================================

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// ==========================================
// ImportActionLog - 导入操作日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportActionLog {
    pub action_id: String,
    pub batch_id: String,
    pub action_type: String,
    pub action_ts: NaiveDateTime,
    pub actor: String,
    pub payload_json: Option<JsonValue>,
    pub detail: Option<String>,
}

impl ImportActionLog {
    pub fn new(
        batch_id: &str,
        action_type: ImportActionType,
        actor: &str,
        payload_json: Option<JsonValue>,
        detail: Option<String>,
    ) -> Self {
        Self {
            action_id: Uuid::new_v4().to_string(),
            batch_id: batch_id.to_string(),
            action_type: action_type.as_str().to_string(),
            action_ts: Utc::now().naive_utc(),
            actor: actor.to_string(),
            payload_json,
            detail,
        }
    }
}

// ==========================================
// ImportActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportActionType {
    Stage,       // 暂存批次
    CreateDraft, // 选择性写入
    Rollback,    // 整批回滚
}

impl ImportActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportActionType::Stage => "STAGE",
            ImportActionType::CreateDraft => "CREATE_DRAFT",
            ImportActionType::Rollback => "ROLLBACK",
        }
    }
}

// ==========================================
// 排班表导入暂存系统 - 导入 Trait
// ==========================================
// 职责: 定义文件解析 / 行规范化接口（不包含实现）
// ==========================================

use crate::domain::import_batch::{StageWarning, StagedRow};
use crate::importer::error::ParseResult;
use std::collections::HashMap;

/// 原始记录（表头 -> 单元格文本）
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// 源文件行号（1-based，表头为第 1 行）
    pub row_number: usize,
    pub cells: HashMap<String, String>,
}

/// 原始表格（保留表头顺序，用于列校验）
#[derive(Debug, Clone, PartialEq)]
pub struct RawSheet {
    pub headers: Vec<String>,
    pub records: Vec<RawRecord>,
}

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 把上传文件字节解析为原始表格
// 实现者: CsvParser / ExcelParser
pub trait FileParser: Send + Sync {
    /// 解析文件内容
    ///
    /// # 返回
    /// - Ok(RawSheet): 表头 + 非空数据行
    /// - Err(ParseError): 文件不可读 / 格式错误
    fn parse_bytes(&self, content: &[u8]) -> ParseResult<RawSheet>;
}

// ==========================================
// RowNormalizer Trait
// ==========================================
// 用途: 原始表格 -> 规范化暂存行
// 输出格式: (personId|personName, date, timeOfDay, activityCode, rawCells)
pub trait RowNormalizer: Send + Sync {
    /// 规范化
    ///
    /// # 返回
    /// - Ok((rows, warnings)): 可定位的暂存行 + 行级警告（含被丢弃行）
    /// - Err(ParseError::MissingColumns): 必需列缺失
    fn normalize(
        &self,
        batch_id: &str,
        sheet: &RawSheet,
    ) -> ParseResult<(Vec<StagedRow>, Vec<StageWarning>)>;
}

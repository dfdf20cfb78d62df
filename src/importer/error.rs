// ==========================================
// 排班表导入暂存系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: ParseError 为整文件级致命错误，发生时不落库任何数据
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 文件解析错误（整文件级）
#[derive(Error, Debug)]
pub enum ParseError {
    // ===== 文件相关错误 =====
    #[error("文件格式不支持: {0}（仅支持 .xlsx/.csv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 结构错误 =====
    #[error("文件无数据行")]
    EmptyFile,

    #[error("缺少必需列: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("数据行数 {rows} 超过上限 {limit}")]
    TooManyRows { rows: usize, limit: usize },

    #[error("没有可定位到时段的数据行（共 {dropped} 行被丢弃）")]
    NoUsableRows { dropped: usize },
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        ParseError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ParseError {
    fn from(err: csv::Error) -> Self {
        ParseError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::XlsxError>
impl From<calamine::XlsxError> for ParseError {
    fn from(err: calamine::XlsxError) -> Self {
        ParseError::ExcelParseError(err.to_string())
    }
}

/// 暂存错误（批次级）
///
/// 任一变体发生时，批次及其行都不会落库
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("暂存请求无效: {0}")]
    InvalidRequest(String),

    #[error("暂存已取消（请求超时）")]
    Cancelled,

    #[error("暂存落库失败: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<rusqlite::Error> for StageError {
    fn from(err: rusqlite::Error) -> Self {
        StageError::Repository(RepositoryError::from(err))
    }
}

/// Result 类型别名
pub type ParseResult<T> = Result<T, ParseError>;

// ==========================================
// 排班表导入暂存系统 - 导入层
// ==========================================
// 职责: 上传文件 -> 规范化暂存行 -> 批次落库
// 支持: Excel (.xlsx), CSV
// ==========================================

// 模块声明
pub mod batch_stager;
pub mod error;
pub mod file_parser;
pub mod importer_trait;
pub mod row_normalizer;

// 重导出核心类型
pub use batch_stager::{BatchStager, StageOutcome, StageRequest};
pub use error::{ParseError, ParseResult, StageError};
pub use file_parser::{CsvParser, ExcelParser, UniversalFileParser};
pub use importer_trait::{FileParser, RawRecord, RawSheet, RowNormalizer};
pub use row_normalizer::ScheduleRowNormalizer;

// ==========================================
// 排班表导入暂存系统 - 文件解析器实现
// ==========================================
// 支持: Excel (.xlsx) / CSV (.csv)
// 输入: 上传文件的字节内容（不落盘）
// ==========================================

use crate::importer::error::{ParseError, ParseResult};
use crate::importer::importer_trait::{FileParser, RawRecord, RawSheet};
use crate::importer::row_normalizer::excel_serial_to_date;
use calamine::{Data, Reader, Xlsx};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::io::Cursor;

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse_bytes(&self, content: &[u8]) -> ParseResult<RawSheet> {
        // 去除 UTF-8 BOM（Excel 另存为 CSV 时常见）
        let content = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(content);

        // 读取表头
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(ParseError::EmptyFile);
        }

        // 读取所有行
        let mut records = Vec::new();
        for (row_idx, result) in reader.records().enumerate() {
            let record = result?;
            let mut cells = HashMap::new();

            for (col_idx, value) in record.iter().enumerate() {
                if let Some(header) = headers.get(col_idx) {
                    if header.is_empty() {
                        continue;
                    }
                    cells.insert(header.clone(), value.trim().to_string());
                }
            }

            // 跳过完全空白的行
            if cells.values().all(|v| v.is_empty()) {
                continue;
            }

            records.push(RawRecord {
                row_number: row_idx + 2,
                cells,
            });
        }

        Ok(RawSheet { headers, records })
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse_bytes(&self, content: &[u8]) -> ParseResult<RawSheet> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(content.to_vec()))?;

        // 读取第一个 sheet
        let sheet_names = workbook.sheet_names();
        let sheet_name = sheet_names
            .first()
            .cloned()
            .ok_or_else(|| ParseError::ExcelParseError("Excel 文件无工作表".to_string()))?;

        let range = workbook.worksheet_range(&sheet_name)?;

        // 提取表头（第一行）
        let mut rows = range.rows();
        let header_row = rows.next().ok_or(ParseError::EmptyFile)?;

        let headers: Vec<String> = header_row
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();

        // 读取数据行
        let mut records = Vec::new();
        for (row_idx, data_row) in rows.enumerate() {
            let mut cells = HashMap::new();

            for (col_idx, cell) in data_row.iter().enumerate() {
                if let Some(header) = headers.get(col_idx) {
                    if header.is_empty() {
                        continue;
                    }
                    cells.insert(header.clone(), cell_to_text(cell));
                }
            }

            if cells.values().all(|v| v.is_empty()) {
                continue;
            }

            records.push(RawRecord {
                row_number: row_idx + 2,
                cells,
            });
        }

        Ok(RawSheet { headers, records })
    }
}

/// 单元格 -> 文本
///
/// 日期单元格统一输出为 YYYY-MM-DD；整数值浮点去掉小数部分
fn cell_to_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            match excel_serial_to_date(serial) {
                Some(date) => date.format("%Y-%m-%d").to_string(),
                None => serial.to_string(),
            }
        }
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string().trim().to_string(),
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl UniversalFileParser {
    pub fn parse(&self, file_name: &str, content: &[u8]) -> ParseResult<RawSheet> {
        if content.is_empty() {
            return Err(ParseError::EmptyFile);
        }

        let ext = std::path::Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let sheet = match ext.as_str() {
            "csv" => CsvParser.parse_bytes(content)?,
            "xlsx" => ExcelParser.parse_bytes(content)?,
            _ => return Err(ParseError::UnsupportedFormat(ext)),
        };

        if sheet.records.is_empty() {
            return Err(ParseError::EmptyFile);
        }
        Ok(sheet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_parser_valid_content() {
        let content = concat!(
            "person_id,date,time_of_day,activity\n",
            "R001,2026-07-01,AM,CLINIC\n",
            "R002,2026-07-01,PM,INPT\n",
        );

        let sheet = CsvParser.parse_bytes(content.as_bytes()).unwrap();

        assert_eq!(sheet.headers, vec!["person_id", "date", "time_of_day", "activity"]);
        assert_eq!(sheet.records.len(), 2);
        assert_eq!(sheet.records[0].row_number, 2);
        assert_eq!(sheet.records[0].cells.get("person_id"), Some(&"R001".to_string()));
        assert_eq!(sheet.records[1].cells.get("activity"), Some(&"INPT".to_string()));
    }

    #[test]
    fn test_csv_parser_skips_blank_rows_and_keeps_row_numbers() {
        let content = "person_id,date,time_of_day,activity\n,,,\nR001,2026-07-01,AM,CLINIC\n";

        let sheet = CsvParser.parse_bytes(content.as_bytes()).unwrap();

        assert_eq!(sheet.records.len(), 1);
        assert_eq!(sheet.records[0].row_number, 3);
    }

    #[test]
    fn test_csv_parser_strips_bom() {
        let mut content = b"\xEF\xBB\xBF".to_vec();
        content.extend_from_slice(b"person_id,date\nR001,2026-07-01\n");

        let sheet = CsvParser.parse_bytes(&content).unwrap();

        assert_eq!(sheet.headers[0], "person_id");
    }

    #[test]
    fn test_universal_parser_unsupported_format() {
        let result = UniversalFileParser.parse("schedule.pdf", b"%PDF-1.4");

        assert!(matches!(result, Err(ParseError::UnsupportedFormat(ext)) if ext == "pdf"));
    }

    #[test]
    fn test_universal_parser_empty_content() {
        let result = UniversalFileParser.parse("schedule.csv", b"");

        assert!(matches!(result, Err(ParseError::EmptyFile)));
    }

    #[test]
    fn test_universal_parser_header_only() {
        let result =
            UniversalFileParser.parse("schedule.csv", b"person_id,date,time_of_day,activity\n");

        assert!(matches!(result, Err(ParseError::EmptyFile)));
    }

    #[test]
    fn test_excel_parser_rejects_garbage() {
        let result = UniversalFileParser.parse("schedule.xlsx", b"not a zip archive");

        assert!(matches!(result, Err(ParseError::ExcelParseError(_))));
    }
}

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::io::Cursor;
use bytes::Bytes;
use crate::error::AppError;
use crate::models::{CellValue, DataRow, Table};
use super::utils::unique_header;

/// Plain decimal literal, optionally negative, optionally with an exponent.
static FLOAT_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*-?(\d+\.?|\.\d+|\d+\.\d+)([eE][-+]?\d+)?\s*$").unwrap()
});

/// Integers beyond 2^53 would lose digits, so they stay text.
const MAX_SAFE_FLOAT: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Spreadsheet,
}

impl FileKind {
    pub fn from_file_name(file_name: &str) -> Result<Self, AppError> {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Ok(FileKind::Csv),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Ok(FileKind::Spreadsheet),
            _ => Err(AppError::UnsupportedFileType(file_name.to_string())),
        }
    }
}

/// Decodes an uploaded file into a typed table. Cell types are decided here,
/// once; nothing downstream re-types a value.
pub fn parse_file(file_name: &str, file_data: Bytes) -> Result<Table, AppError> {
    let start = std::time::Instant::now();
    let kind = FileKind::from_file_name(file_name)?;
    tracing::info!("Parsing {} ({:?}, {}KB)", file_name, kind, file_data.len() / 1024);

    let table = match kind {
        FileKind::Csv => parse_csv(&file_data)?,
        FileKind::Spreadsheet => parse_spreadsheet(file_data)?,
    };

    tracing::info!(
        "Parsed {} rows, {} columns in {:?}",
        table.len(),
        table.columns().len(),
        start.elapsed()
    );
    Ok(table)
}

fn parse_csv(file_data: &[u8]) -> Result<Table, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file_data);

    // Invalid UTF-8 is replaced with U+FFFD rather than rejecting the file.
    let mut existing_names = HashSet::new();
    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|field| unique_header(&String::from_utf8_lossy(field), &mut existing_names))
        .collect();

    let mut rows = Vec::new();
    for result in reader.byte_records() {
        let record = result?;
        if record.len() > headers.len() {
            tracing::debug!(
                "Ignoring {} extra fields on line {:?}",
                record.len() - headers.len(),
                record.position().map(|p| p.line())
            );
        }
        let row: DataRow = headers
            .iter()
            .zip(record.iter())
            .map(|(header, field)| {
                (header.clone(), type_csv_field(&String::from_utf8_lossy(field)))
            })
            .collect();
        rows.push(row);
    }

    if rows.is_empty() {
        tracing::error!("CSV file produced no data rows");
        return Err(AppError::FileProcessingError("CSV file is empty or invalid".to_string()));
    }

    Ok(Table::new(rows))
}

/// Types one CSV field: booleans and in-range decimal literals become native
/// values, blanks become null, everything else stays verbatim text.
pub fn type_csv_field(field: &str) -> CellValue {
    match field {
        "" => CellValue::Null,
        "true" | "TRUE" => CellValue::Bool(true),
        "false" | "FALSE" => CellValue::Bool(false),
        _ if FLOAT_LITERAL.is_match(field) => match field.trim().parse::<f64>() {
            Ok(n) if n > -MAX_SAFE_FLOAT && n < MAX_SAFE_FLOAT => CellValue::Number(n),
            _ => CellValue::Text(field.to_string()),
        },
        _ => CellValue::Text(field.to_string()),
    }
}

fn parse_spreadsheet(file_data: Bytes) -> Result<Table, AppError> {
    let cursor = Cursor::new(file_data);
    let mut workbook = open_workbook_auto_from_rs(cursor).map_err(|e| {
        tracing::error!("Failed to open spreadsheet: {}", e);
        AppError::FileProcessingError(format!("Failed to open spreadsheet: {}", e))
    })?;

    let sheet_names = workbook.sheet_names().to_vec();
    tracing::info!("Found {} sheets: {:?}", sheet_names.len(), sheet_names);

    let sheet_name = sheet_names
        .first()
        .ok_or_else(|| AppError::FileProcessingError("No sheets found in workbook".to_string()))?;

    let range = workbook.worksheet_range(sheet_name).map_err(|e| {
        tracing::error!("Failed to read worksheet {}: {}", sheet_name, e);
        AppError::FileProcessingError(format!("Failed to read worksheet {}: {}", sheet_name, e))
    })?;

    let mut rows = range.rows();
    let mut existing_names = HashSet::new();
    let headers: Vec<String> = rows
        .next()
        .map(|row| {
            row.iter()
                .map(|cell| unique_header(&cell.to_string(), &mut existing_names))
                .collect()
        })
        .unwrap_or_default();

    let table_rows: Vec<DataRow> = rows
        .map(|row| {
            headers
                .iter()
                .zip(row.iter())
                .filter_map(|(header, cell)| spreadsheet_cell(cell).map(|v| (header.clone(), v)))
                .collect::<DataRow>()
        })
        .filter(|row| !row.is_empty())
        .collect();

    if table_rows.is_empty() {
        tracing::warn!("Sheet {} has no data rows", sheet_name);
    }

    Ok(Table::new(table_rows))
}

/// Empty cells are left out of the row entirely.
fn spreadsheet_cell(cell: &Data) -> Option<CellValue> {
    match cell {
        Data::Empty => None,
        Data::Int(i) => Some(CellValue::Number(*i as f64)),
        Data::Float(f) => Some(CellValue::Number(*f)),
        Data::Bool(b) => Some(CellValue::Bool(*b)),
        Data::String(s) => Some(CellValue::Text(s.clone())),
        Data::DateTime(d) => Some(CellValue::Number(d.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(CellValue::Text(s.clone())),
        Data::Error(e) => Some(CellValue::Text(e.to_string())),
    }
}

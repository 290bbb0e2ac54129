use std::fmt::Debug;
use std::io::{Cursor, Read, Seek};

use bytes::Bytes;
use calamine::{open_workbook_auto_from_rs, open_workbook_from_rs, Data, Range, Reader, Xls, Xlsx};
use chrono::Duration;

use super::utils::clean_headers;
use crate::error::AppError;
use crate::models::{CellValue, Table};
use crate::services::normalizer::parse::parse_datetime_str;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookFormat {
    Xlsx,
    Xls,
}

/// Reads the first sheet, trying the reader for the declared format first and
/// falling back to format detection when that fails.
pub fn load_workbook(file_data: Bytes, format: WorkbookFormat) -> Result<Table, AppError> {
    let start = std::time::Instant::now();
    let range = match open_primary(file_data.clone(), format) {
        Ok(range) => range,
        Err(e) => {
            tracing::warn!("{:?} reader failed ({}), retrying with format detection", format, e);
            let mut workbook = open_workbook_auto_from_rs(Cursor::new(file_data)).map_err(|e| {
                tracing::error!("Failed to open workbook: {}", e);
                AppError::FileProcessingError(format!("Failed to open spreadsheet: {}", e))
            })?;
            first_sheet(&mut workbook)?
        }
    };

    let table = range_to_table(&range);
    tracing::info!(
        "Workbook read in {:?}: {} rows, {} columns",
        start.elapsed(),
        table.row_count(),
        table.column_count()
    );
    Ok(table)
}

fn open_primary(file_data: Bytes, format: WorkbookFormat) -> Result<Range<Data>, AppError> {
    let cursor = Cursor::new(file_data);
    match format {
        WorkbookFormat::Xlsx => {
            let mut workbook: Xlsx<_> = open_workbook_from_rs(cursor)
                .map_err(|e| AppError::FileProcessingError(format!("Failed to open Excel file: {}", e)))?;
            first_sheet(&mut workbook)
        }
        WorkbookFormat::Xls => {
            let mut workbook: Xls<_> = open_workbook_from_rs(cursor)
                .map_err(|e| AppError::FileProcessingError(format!("Failed to open Excel file: {}", e)))?;
            first_sheet(&mut workbook)
        }
    }
}

fn first_sheet<RS, R>(workbook: &mut R) -> Result<Range<Data>, AppError>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: Debug,
{
    let sheet_names = workbook.sheet_names();
    tracing::info!("Found {} sheets: {:?}", sheet_names.len(), sheet_names);

    match workbook.worksheet_range_at(0) {
        Some(Ok(range)) => Ok(range),
        Some(Err(e)) => Err(AppError::FileProcessingError(format!(
            "Failed to read worksheet: {:?}",
            e
        ))),
        None => Err(AppError::FileProcessingError("No sheets found in workbook".to_string())),
    }
}

/// First row becomes the header, the rest are data rows.
pub fn range_to_table(range: &Range<Data>) -> Table {
    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Table::default();
    };

    let header_text: Vec<String> = header_row.iter().map(|cell| cell.to_string()).collect();
    let headers = clean_headers(header_text.iter().map(String::as_str));
    let data = rows.map(|row| row.iter().map(convert_cell).collect()).collect();

    Table::from_rows(headers, data)
}

pub fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::number(*f),
        Data::String(s) if s.trim().is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(d) => {
            // serial values below one day carry only a time of day
            if d.is_duration() || d.as_f64() < 1.0 {
                serial_duration(d.as_f64()).map_or(CellValue::Empty, CellValue::Duration)
            } else {
                d.as_datetime().map_or(CellValue::Empty, CellValue::DateTime)
            }
        }
        Data::DateTimeIso(s) => {
            parse_datetime_str(s).map_or_else(|| CellValue::Text(s.clone()), CellValue::DateTime)
        }
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        _ => CellValue::Empty,
    }
}

/// Day-based serial to a duration, `None` when it does not fit.
fn serial_duration(days: f64) -> Option<Duration> {
    let millis = (days * 86_400_000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    Duration::try_milliseconds(millis as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{ExcelDateTime, ExcelDateTimeType};

    const REPORT_XLSX: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/raport.xlsx"));

    #[test]
    fn range_header_and_cells() {
        let mut range: Range<Data> = Range::new((0, 0), (2, 1));
        range.set_value((0, 0), Data::String("Dział".to_string()));
        range.set_value((0, 1), Data::String("Dostępność/h".to_string()));
        range.set_value((1, 0), Data::String("Tłocznia".to_string()));
        range.set_value((1, 1), Data::Float(7.5));
        range.set_value((2, 0), Data::String("  ".to_string()));
        range.set_value((2, 1), Data::Int(3));

        let table = range_to_table(&range);
        assert_eq!(table.column_names(), vec!["Dział", "Dostępność/h"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell("Dostępność/h", 0), Some(&CellValue::Number(7.5)));
        assert_eq!(table.cell("Dział", 1), Some(&CellValue::Empty));
    }

    #[test]
    fn iso_datetimes_are_parsed() {
        let cell = convert_cell(&Data::DateTimeIso("2024-05-06T07:00:00".to_string()));
        assert_eq!(cell.to_string(), "2024-05-06 07:00:00");
    }

    #[test]
    fn time_of_day_serials_become_durations() {
        let cell = convert_cell(&Data::DateTime(ExcelDateTime::new(0.25, ExcelDateTimeType::DateTime, false)));
        assert_eq!(cell, CellValue::Duration(Duration::hours(6)));
    }

    #[test]
    fn out_of_range_serials_become_empty() {
        for serial in [-1.0e20, f64::NEG_INFINITY, -1.0e12] {
            let cell = convert_cell(&Data::DateTime(ExcelDateTime::new(serial, ExcelDateTimeType::DateTime, false)));
            assert_eq!(cell, CellValue::Empty, "serial {serial}");
        }
        let duration = convert_cell(&Data::DateTime(ExcelDateTime::new(1.0e20, ExcelDateTimeType::TimeDelta, false)));
        assert_eq!(duration, CellValue::Empty);
    }

    #[test]
    fn mislabelled_xlsx_falls_back_to_detection() {
        let table = load_workbook(Bytes::from_static(REPORT_XLSX), WorkbookFormat::Xls).unwrap();
        assert_eq!(table.column_names(), vec!["Dział", "Dostępność/h"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell("Dział", 1), Some(&CellValue::Text("Lakiernia".to_string())));
        assert_eq!(table.cell("Dostępność/h", 0), Some(&CellValue::Number(7.5)));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let err = load_workbook(Bytes::from_static(b"definitely not a workbook"), WorkbookFormat::Xlsx)
            .unwrap_err();
        assert!(matches!(err, AppError::FileProcessingError(_)));
    }
}

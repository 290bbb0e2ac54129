pub mod csv;
pub mod excel;
pub mod utils;

use bytes::Bytes;

use crate::error::AppError;
use crate::models::Table;
pub use excel::WorkbookFormat;

/// Kind of uploaded file, guessed from an extension, file name or MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Workbook(WorkbookFormat),
}

impl SourceFormat {
    pub fn from_hint(hint: &str) -> Option<Self> {
        let hint = hint.trim().to_lowercase();
        if hint.ends_with("xlsx") || hint.contains("spreadsheetml") {
            Some(SourceFormat::Workbook(WorkbookFormat::Xlsx))
        } else if hint.ends_with("xls") || hint.contains("ms-excel") {
            Some(SourceFormat::Workbook(WorkbookFormat::Xls))
        } else if hint.ends_with("csv") || hint.contains("text/plain") {
            Some(SourceFormat::Csv)
        } else {
            None
        }
    }
}

pub fn load_table(file_data: Bytes, format: SourceFormat) -> Result<Table, AppError> {
    match format {
        SourceFormat::Csv => csv::load_csv(&file_data),
        SourceFormat::Workbook(workbook) => excel::load_workbook(file_data, workbook),
    }
}

use csv::WriterBuilder;

use crate::error::AppError;
use crate::models::Table;

pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Serializes a table to UTF-8 CSV with a header row.
pub fn table_to_csv(table: &Table) -> Result<Vec<u8>, AppError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(table.column_names())?;

    for row in 0..table.row_count() {
        writer.write_record(table.row(row).iter().map(|cell| cell.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to finish CSV export: {}", e)))
}

pub fn content_disposition(file_name: &str) -> String {
    format!("attachment; filename=\"{}\"", file_name.replace('"', ""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CellValue;

    #[test]
    fn writes_header_and_rows() {
        let table = Table::from_rows(
            vec!["Dział".to_string(), "Dostępność/h".to_string(), "Uwagi".to_string()],
            vec![
                vec![CellValue::Text("Tłocznia".to_string()), CellValue::Number(7.5), CellValue::Empty],
                vec![
                    CellValue::Text("Lakiernia".to_string()),
                    CellValue::Int(8),
                    CellValue::Text("a, b".to_string()),
                ],
            ],
        );
        let csv = String::from_utf8(table_to_csv(&table).unwrap()).unwrap();
        assert_eq!(csv, "Dział,Dostępność/h,Uwagi\nTłocznia,7.5,\nLakiernia,8,\"a, b\"\n");
    }

    #[test]
    fn attachment_header() {
        assert_eq!(
            content_disposition("obciazenie_filtrowane.csv"),
            "attachment; filename=\"obciazenie_filtrowane.csv\""
        );
    }
}

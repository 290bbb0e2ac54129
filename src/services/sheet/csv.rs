use csv::ReaderBuilder;
use encoding_rs::WINDOWS_1250;

use super::utils::{clean_headers, infer_cell};
use crate::error::AppError;
use crate::models::{CellValue, Table};

const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];
const SNIFF_LINES: usize = 20;
const UTF8_BOM: &[u8; 3] = b"\xEF\xBB\xBF";

/// Decodes CSV bytes as UTF-8, falling back once to Windows-1250.
pub fn decode(file_data: &[u8]) -> Result<String, AppError> {
    let bytes = file_data.strip_prefix(UTF8_BOM).unwrap_or(file_data);
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        Err(e) => {
            tracing::warn!("CSV is not valid UTF-8 ({}), retrying as Windows-1250", e);
            WINDOWS_1250
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned())
                .ok_or_else(|| {
                    AppError::Decode("file is neither valid UTF-8 nor Windows-1250".to_string())
                })
        }
    }
}

fn count_outside_quotes(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for b in line.bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if b == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

/// Picks the delimiter whose per-line count matches the header on the most
/// sample lines. Ties go to the earlier candidate; defaults to a comma.
pub fn sniff_delimiter(text: &str) -> u8 {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();
    let Some(header) = lines.first() else {
        return b',';
    };

    let mut best = (b',', 0usize);
    for delimiter in DELIMITERS {
        let expected = count_outside_quotes(header, delimiter);
        if expected == 0 {
            continue;
        }
        let consistent = lines
            .iter()
            .filter(|l| count_outside_quotes(l, delimiter) == expected)
            .count();
        if consistent > best.1 {
            best = (delimiter, consistent);
        }
    }
    best.0
}

/// Parses decoded CSV text. Rows with more fields than the header are
/// skipped, shorter rows are padded with empty cells.
pub fn read_csv(text: &str) -> Result<Table, AppError> {
    let delimiter = sniff_delimiter(text);
    tracing::debug!("Using CSV delimiter {:?}", delimiter as char);

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = clean_headers(reader.headers()?.iter());
    let width = headers.len();

    let mut rows: Vec<Vec<CellValue>> = Vec::new();
    let mut skipped = 0usize;
    for (line_num, record) in reader.records().enumerate() {
        match record {
            Ok(record) if record.len() > width => {
                skipped += 1;
                tracing::debug!(
                    "Skipping line {}: {} fields, expected {}",
                    line_num + 2,
                    record.len(),
                    width
                );
            }
            Ok(record) => rows.push(record.iter().map(infer_cell).collect()),
            Err(e) => {
                skipped += 1;
                tracing::debug!("Skipping malformed line {}: {}", line_num + 2, e);
            }
        }
    }

    if skipped > 0 {
        tracing::debug!("Skipped {} malformed CSV lines", skipped);
    }

    Ok(Table::from_rows(headers, rows))
}

pub fn load_csv(file_data: &[u8]) -> Result<Table, AppError> {
    let text = decode(file_data)?;
    read_csv(&text)
}

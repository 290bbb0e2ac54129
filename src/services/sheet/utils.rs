use std::collections::HashSet;

use crate::models::CellValue;

/// Trims a header, strips a BOM and makes it unique within the file.
/// Blank headers become `Unnamed: <index>`, repeats get `.1`, `.2`, ...
pub fn clean_column_name(name: &str, index: usize, existing_names: &mut HashSet<String>) -> String {
    let trimmed = name.trim_start_matches('\u{feff}').trim();
    let base_name = if trimmed.is_empty() {
        format!("Unnamed: {}", index)
    } else {
        trimmed.to_string()
    };

    // If the name already exists, add a numeric suffix
    let mut cleaned = base_name.clone();
    let mut counter = 1;
    while !existing_names.insert(cleaned.clone()) {
        cleaned = format!("{}.{}", base_name, counter);
        counter += 1;
    }

    cleaned
}

pub fn clean_headers<'a, I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut existing_names = HashSet::new();
    names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| clean_column_name(name, idx, &mut existing_names))
        .collect()
}

/// Types a CSV field: integer, then float, otherwise text.
pub fn infer_cell(raw: &str) -> CellValue {
    let value = raw.trim();
    if value.is_empty() {
        return CellValue::Empty;
    }
    if let Ok(i) = value.parse::<i64>() {
        return CellValue::Int(i);
    }
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() => CellValue::Number(f),
        _ => CellValue::Text(value.to_string()),
    }
}

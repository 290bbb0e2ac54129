use std::fmt;

use chrono::{Duration, NaiveDateTime};
use serde::{Serialize, Serializer};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single cell as it came out of a CSV or spreadsheet file.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Int(i64),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    Duration(Duration),
}

impl CellValue {
    /// Wraps a float, turning NaN and infinities into `Empty`.
    pub fn number(value: f64) -> Self {
        if value.is_finite() {
            CellValue::Number(value)
        } else {
            CellValue::Empty
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Lenient numeric reading. Text is trimmed and a decimal comma is accepted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => parse_number(s),
            _ => None,
        }
    }
}

pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = if trimmed.contains(',') && !trimmed.contains('.') {
        trimmed.replace(',', ".")
    } else {
        trimmed.to_string()
    };
    candidate.parse::<f64>().ok().filter(|n| n.is_finite())
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            CellValue::Duration(d) => {
                let total = d.num_seconds();
                let sign = if total < 0 { "-" } else { "" };
                let total = total.abs();
                write!(
                    f,
                    "{}{:02}:{:02}:{:02}",
                    sign,
                    total / 3600,
                    (total % 3600) / 60,
                    total % 60
                )
            }
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Empty => serializer.serialize_none(),
            CellValue::Int(i) => serializer.serialize_i64(*i),
            CellValue::Number(n) => serializer.serialize_f64(*n),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<CellValue>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<CellValue>) -> Self {
        Self { name: name.into(), values }
    }
}

/// Ordered, rectangular set of named columns.
///
/// Every column holds exactly `row_count` cells; callers that add columns must
/// keep that true, `push_column` pads or truncates to enforce it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    pub fn new(row_count: usize) -> Self {
        Self { columns: Vec::new(), row_count }
    }

    /// Builds a table from a header row and data rows. Short rows are padded
    /// with `Empty`, extra cells are dropped.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let row_count = rows.len();
        let mut columns: Vec<Column> = headers
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(row_count)))
            .collect();

        for row in rows {
            let mut cells = row.into_iter();
            for column in columns.iter_mut() {
                column.values.push(cells.next().unwrap_or(CellValue::Empty));
            }
        }

        Self { columns, row_count }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn push_column(&mut self, mut column: Column) {
        column.values.resize(self.row_count, CellValue::Empty);
        self.columns.push(column);
    }

    /// Renames a column in place. Returns false when `from` does not exist.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.columns.iter_mut().find(|c| c.name == from) {
            Some(column) => {
                column.name = to.to_string();
                true
            }
            None => false,
        }
    }

    pub fn cell(&self, column: &str, row: usize) -> Option<&CellValue> {
        self.column(column).and_then(|c| c.values.get(row))
    }

    pub fn row(&self, index: usize) -> Vec<CellValue> {
        self.columns
            .iter()
            .map(|c| c.values.get(index).cloned().unwrap_or(CellValue::Empty))
            .collect()
    }

    /// Keeps the rows whose index satisfies `keep`, preserving order.
    pub fn retain_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(usize) -> bool,
    {
        let indices: Vec<usize> = (0..self.row_count).filter(|&i| keep(i)).collect();
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), indices.iter().map(|&i| c.values[i].clone()).collect()))
            .collect();
        Table { columns, row_count: indices.len() }
    }

    /// Stacks the rows of several tables. The resulting column set is the union
    /// in first-seen order; rows from a table lacking a column get `Empty`.
    pub fn concat(tables: Vec<Table>) -> Table {
        let mut names: Vec<String> = Vec::new();
        for table in &tables {
            for column in &table.columns {
                if !names.contains(&column.name) {
                    names.push(column.name.clone());
                }
            }
        }

        let total_rows = tables.iter().map(|t| t.row_count).sum();
        let mut columns: Vec<Column> = names
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(total_rows)))
            .collect();

        for table in tables {
            for column in columns.iter_mut() {
                match table.column(&column.name) {
                    Some(source) => column.values.extend(source.values.iter().cloned()),
                    None => column
                        .values
                        .extend(std::iter::repeat(CellValue::Empty).take(table.row_count)),
                }
            }
        }

        Table { columns, row_count: total_rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn from_rows_pads_short_rows() {
        let table = Table::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![CellValue::Int(1)], vec![CellValue::Int(2), text("x"), text("extra")]],
        );
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell("b", 0), Some(&CellValue::Empty));
        assert_eq!(table.cell("b", 1), Some(&text("x")));
    }

    #[test]
    fn concat_leaves_gaps_for_missing_columns() {
        let first = Table::from_rows(vec!["a".into()], vec![vec![CellValue::Int(1)]]);
        let second = Table::from_rows(
            vec!["b".into(), "a".into()],
            vec![vec![text("x"), CellValue::Int(2)]],
        );
        let merged = Table::concat(vec![first, second]);

        assert_eq!(merged.column_names(), vec!["a", "b"]);
        assert_eq!(merged.row_count(), 2);
        assert_eq!(merged.cell("b", 0), Some(&CellValue::Empty));
        assert_eq!(merged.cell("a", 1), Some(&CellValue::Int(2)));
    }

    #[test]
    fn numeric_text_accepts_decimal_comma() {
        assert_eq!(text("5,5").as_f64(), Some(5.5));
        assert_eq!(text(" 12 ").as_f64(), Some(12.0));
        assert_eq!(text("n/a").as_f64(), None);
        assert_eq!(text("1,234.5").as_f64(), None);
    }

    #[test]
    fn durations_display_as_clock() {
        let cell = CellValue::Duration(Duration::minutes(150));
        assert_eq!(cell.to_string(), "02:30:00");
    }

    #[test]
    fn retain_rows_keeps_order() {
        let table = Table::from_rows(
            vec!["n".into()],
            (0..5).map(|i| vec![CellValue::Int(i)]).collect(),
        );
        let odd = table.retain_rows(|i| i % 2 == 1);
        assert_eq!(odd.row_count(), 2);
        assert_eq!(odd.cell("n", 1), Some(&CellValue::Int(3)));
    }
}

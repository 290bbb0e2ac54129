//! Filtering and aggregation over a normalized table.
//!
//! Everything here is a pure function of the table and the caller's
//! [`FilterSelection`]; nothing is kept between requests.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{CellValue, Column, Table};
use crate::services::normalizer::{
    ensure_complete, mapping_choices, ColumnChoice, ManualMapping, MappingError, NormalizationReport,
    Normalizer, StandardField,
};

/// Sidebar selections. An empty list leaves that field unfiltered.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterSelection {
    pub departments: Vec<String>,
    pub devices: Vec<String>,
    pub months: Vec<String>,
    pub weeks: Vec<u32>,
}

impl FilterSelection {
    pub fn is_empty(&self) -> bool {
        self.departments.is_empty() && self.devices.is_empty() && self.months.is_empty() && self.weeks.is_empty()
    }
}

fn cell_key(cell: &CellValue) -> String {
    cell.to_string().trim().to_string()
}

fn cell_at(column: Option<&Column>, row: usize) -> Option<&CellValue> {
    column.and_then(|c| c.values.get(row))
}

fn matches_any(cell: Option<&CellValue>, selected: &[String]) -> bool {
    selected.is_empty() || cell.is_some_and(|c| selected.iter().any(|s| *s == cell_key(c)))
}

fn matches_week(cell: Option<&CellValue>, selected: &[u32]) -> bool {
    selected.is_empty()
        || cell
            .and_then(CellValue::as_f64)
            .is_some_and(|w| selected.iter().any(|&s| f64::from(s) == w))
}

/// AND across fields, OR within one field's selected values.
pub fn apply_filters(table: &Table, filters: &FilterSelection) -> Table {
    if filters.is_empty() {
        return table.clone();
    }

    let department = table.column(StandardField::Department.column_name());
    let device = table.column(StandardField::DeviceName.column_name());
    let month = table.column(StandardField::Month.column_name());
    let week = table.column(StandardField::Week.column_name());

    table.retain_rows(|row| {
        matches_any(cell_at(department, row), &filters.departments)
            && matches_any(cell_at(device, row), &filters.devices)
            && matches_any(cell_at(month, row), &filters.months)
            && matches_week(cell_at(week, row), &filters.weeks)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Kpis {
    pub availability_hours: f64,
    pub load_hours: f64,
    pub missing_hours: f64,
}

fn column_sum(table: &Table, field: StandardField) -> f64 {
    table
        .column(field.column_name())
        .map(|c| c.values.iter().filter_map(CellValue::as_f64).sum())
        .unwrap_or(0.0)
}

pub fn compute_kpis(table: &Table) -> Kpis {
    Kpis {
        availability_hours: column_sum(table, StandardField::AvailabilityHours),
        load_hours: column_sum(table, StandardField::LoadHours),
        missing_hours: column_sum(table, StandardField::MissingHours),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub name: String,
    pub values: Vec<f64>,
}

/// Bar chart data: one bar group per category, one bar per series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub title: String,
    pub x_field: String,
    pub categories: Vec<String>,
    pub series: Vec<ChartSeries>,
}

/// Sums each value field per category, categories in first-seen order.
pub fn grouped_sums(table: &Table, group_by: StandardField, values: &[StandardField]) -> (Vec<String>, Vec<Vec<f64>>) {
    let mut categories: Vec<String> = Vec::new();
    let mut sums: Vec<Vec<f64>> = vec![Vec::new(); values.len()];

    let Some(groups) = table.column(group_by.column_name()) else {
        return (categories, sums);
    };
    let value_columns: Vec<_> = values.iter().map(|f| table.column(f.column_name())).collect();

    for (row, group) in groups.values.iter().enumerate() {
        if group.is_empty() {
            continue;
        }
        let key = cell_key(group);
        let idx = match categories.iter().position(|c| *c == key) {
            Some(idx) => idx,
            None => {
                categories.push(key);
                sums.iter_mut().for_each(|s| s.push(0.0));
                categories.len() - 1
            }
        };
        for (series, column) in value_columns.iter().enumerate() {
            if let Some(v) = cell_at(*column, row).and_then(CellValue::as_f64) {
                sums[series][idx] += v;
            }
        }
    }

    (categories, sums)
}

fn build_chart(title: &str, table: &Table, group_by: StandardField, values: &[StandardField]) -> ChartData {
    let (categories, sums) = grouped_sums(table, group_by, values);
    ChartData {
        title: title.to_string(),
        x_field: group_by.column_name().to_string(),
        categories,
        series: values
            .iter()
            .zip(sums)
            .map(|(field, values)| ChartSeries { name: field.column_name().to_string(), values })
            .collect(),
    }
}

/// Availability vs load per device, grouped bars.
pub fn load_by_device_chart(table: &Table) -> ChartData {
    build_chart(
        "Dostępność vs obciążenie wg urządzenia",
        table,
        StandardField::DeviceName,
        &[StandardField::AvailabilityHours, StandardField::LoadHours],
    )
}

/// Missing hours per department.
pub fn missing_by_department_chart(table: &Table) -> ChartData {
    build_chart(
        "Brakujące godziny wg działu",
        table,
        StandardField::Department,
        &[StandardField::MissingHours],
    )
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterOptions {
    pub departments: Vec<String>,
    pub devices: Vec<String>,
    pub months: Vec<String>,
    pub weeks: Vec<u32>,
}

fn distinct_values(table: &Table, field: StandardField) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    if let Some(column) = table.column(field.column_name()) {
        for value in column.values.iter().filter(|v| !v.is_empty()) {
            let key = cell_key(value);
            if !seen.contains(&key) {
                seen.push(key);
            }
        }
    }
    seen
}

fn distinct_weeks(table: &Table) -> Vec<u32> {
    let mut seen: Vec<u32> = Vec::new();
    if let Some(column) = table.column(StandardField::Week.column_name()) {
        for week in column.values.iter().filter_map(CellValue::as_f64) {
            if week.fract() == 0.0 && (1.0..=53.0).contains(&week) {
                let week = week as u32;
                if !seen.contains(&week) {
                    seen.push(week);
                }
            }
        }
    }
    seen
}

pub fn filter_options(table: &Table) -> FilterOptions {
    FilterOptions {
        departments: distinct_values(table, StandardField::Department),
        devices: distinct_values(table, StandardField::DeviceName),
        months: distinct_values(table, StandardField::Month),
        weeks: distinct_weeks(table),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

pub fn detail_table(table: &Table) -> DetailTable {
    DetailTable {
        columns: table.column_names().into_iter().map(str::to_string).collect(),
        rows: (0..table.row_count()).map(|i| table.row(i)).collect(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub row_count: usize,
    pub filtered_row_count: usize,
    pub kpis: Kpis,
    pub charts: Vec<ChartData>,
    pub filter_options: FilterOptions,
    pub details: DetailTable,
}

/// Normalizes, resolves manual mappings and filters. Halts with
/// `MappingRequired` when standard fields are still missing and with
/// `EmptySelection` when the filters leave no rows.
pub fn prepare(
    normalizer: &Normalizer,
    raw: Table,
    mapping: &ManualMapping,
    filters: &FilterSelection,
) -> Result<(Table, Table), AppError> {
    let (table, unmapped) = normalizer.normalize(raw);
    let table = if unmapped.is_empty() {
        table
    } else {
        let fields: Vec<_> = unmapped.iter().filter_map(MappingError::field).collect();
        tracing::info!("Applying manual mapping for {:?}", fields);
        let choices = mapping_choices(&table);
        match normalizer.resolve(table, mapping) {
            Ok(table) => table,
            Err(MappingError::MissingFields(missing)) => {
                tracing::warn!("Blocking dashboard, unmapped fields: {:?}", missing);
                return Err(AppError::MappingRequired { missing, choices });
            }
            Err(e) => return Err(AppError::Mapping(e)),
        }
    };
    ensure_complete(&table)?;

    let filtered = apply_filters(&table, filters);
    if filtered.is_empty() {
        tracing::warn!("No rows left after filters {:?}", filters);
        return Err(AppError::EmptySelection);
    }
    Ok((table, filtered))
}

pub fn build_view(table: &Table, filtered: &Table) -> DashboardView {
    DashboardView {
        row_count: table.row_count(),
        filtered_row_count: filtered.row_count(),
        kpis: compute_kpis(filtered),
        charts: vec![load_by_device_chart(filtered), missing_by_department_chart(filtered)],
        filter_options: filter_options(table),
        details: detail_table(filtered),
    }
}

/// One full evaluation: normalize, map, filter, aggregate.
pub fn evaluate(
    normalizer: &Normalizer,
    raw: Table,
    mapping: &ManualMapping,
    filters: &FilterSelection,
) -> Result<DashboardView, AppError> {
    let start = std::time::Instant::now();
    let (table, filtered) = prepare(normalizer, raw, mapping, filters)?;
    let view = build_view(&table, &filtered);
    tracing::info!(
        "Dashboard evaluated in {:?}: {} of {} rows after filters",
        start.elapsed(),
        view.filtered_row_count,
        view.row_count
    );
    Ok(view)
}

/// Normalization outcome without any filtering, for the mapping screen.
#[derive(Debug, Clone, Serialize)]
pub struct MappingView {
    pub report: NormalizationReport,
    pub columns: Vec<String>,
    pub column_choices: Vec<ColumnChoice>,
}

pub fn mapping_view(normalizer: &Normalizer, raw: Table) -> MappingView {
    let (table, report) = normalizer.normalize_with_report(raw);
    MappingView {
        columns: table.column_names().into_iter().map(str::to_string).collect(),
        column_choices: mapping_choices(&table),
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn row(dept: &str, device: &str, avail: f64, load: f64, week: i64, month: &str) -> Vec<CellValue> {
        vec![
            text(dept),
            text(device),
            CellValue::Number(avail),
            CellValue::Number(load),
            CellValue::Int(week),
            text(month),
            text("P-1"),
        ]
    }

    fn sample() -> Table {
        Table::from_rows(
            ["Dział", "Nazwa Urządzenia", "Dostępność/h", "Obciążenie/h", "Tydzień", "Miesiąc", "Numer części"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            vec![
                row("Tłocznia", "Prasa 1", 8.0, 6.0, 1, "2024-01"),
                row("Tłocznia", "Prasa 2", 8.0, 9.0, 1, "2024-01"),
                row("Lakiernia", "Kabina", 10.0, 4.0, 6, "2024-02"),
                row("Tłocznia", "Prasa 1", 6.0, 5.5, 6, "2024-02"),
            ],
        )
    }

    fn evaluate_sample(filters: FilterSelection) -> Result<DashboardView, AppError> {
        evaluate(&Normalizer::default(), sample(), &ManualMapping::new(), &filters)
    }

    #[test]
    fn no_filters_sums_everything() {
        let view = evaluate_sample(FilterSelection::default()).unwrap();
        assert_eq!(view.filtered_row_count, 4);
        assert_eq!(view.kpis.availability_hours, 32.0);
        assert_eq!(view.kpis.load_hours, 24.5);
        // 2 + 0 + 6 + 0.5
        assert_eq!(view.kpis.missing_hours, 8.5);
    }

    #[test]
    fn filters_and_across_fields_or_within() {
        let filters = FilterSelection {
            departments: vec!["Tłocznia".to_string()],
            weeks: vec![1, 6],
            devices: vec!["Prasa 1".to_string(), "Kabina".to_string()],
            ..Default::default()
        };
        let view = evaluate_sample(filters).unwrap();
        assert_eq!(view.filtered_row_count, 2);
        assert_eq!(view.kpis.availability_hours, 14.0);
        // options come from the unfiltered table
        assert_eq!(view.filter_options.departments, vec!["Tłocznia", "Lakiernia"]);
        assert_eq!(view.filter_options.weeks, vec![1, 6]);
    }

    #[test]
    fn empty_result_halts() {
        let filters = FilterSelection { months: vec!["2030-01".to_string()], ..Default::default() };
        assert!(matches!(evaluate_sample(filters), Err(AppError::EmptySelection)));
    }

    #[test]
    fn charts_group_in_first_seen_order() {
        let table = sample();
        let (table, _) = Normalizer::default().normalize(table);

        let chart = load_by_device_chart(&table);
        assert_eq!(chart.categories, vec!["Prasa 1", "Prasa 2", "Kabina"]);
        assert_eq!(chart.series[0].name, "Dostępność/h");
        assert_eq!(chart.series[0].values, vec![14.0, 8.0, 10.0]);
        assert_eq!(chart.series[1].values, vec![11.5, 9.0, 4.0]);

        let missing = missing_by_department_chart(&table);
        assert_eq!(missing.categories, vec!["Tłocznia", "Lakiernia"]);
        assert_eq!(missing.series[0].values, vec![2.5, 6.0]);
    }

    #[test]
    fn unmapped_fields_block_the_dashboard() {
        let raw = Table::from_rows(
            vec!["Dział".to_string(), "Maszyna".to_string()],
            vec![vec![text("A"), text("B")]],
        );
        let err = evaluate(&Normalizer::default(), raw, &ManualMapping::new(), &FilterSelection::default())
            .unwrap_err();
        match err {
            AppError::MappingRequired { missing, choices } => {
                assert!(missing.contains(&StandardField::DeviceName));
                assert_eq!(choices.len(), 1);
                assert_eq!(choices[0].name, "Maszyna");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn manual_mapping_unblocks_the_dashboard() {
        let mut raw = sample();
        raw.rename_column("Nazwa Urządzenia", "Maszyna");
        raw.rename_column("Obciążenie/h", "Praca");
        let mapping: ManualMapping = [
            (StandardField::DeviceName, Some("Maszyna".to_string())),
            (StandardField::LoadHours, Some("Praca".to_string())),
        ]
        .into_iter()
        .collect();

        let (table, filtered) =
            prepare(&Normalizer::default(), raw, &mapping, &FilterSelection::default()).unwrap();
        assert!(table.has_column("Nazwa Urządzenia"));
        assert_eq!(compute_kpis(&filtered).missing_hours, 8.5);
    }

    #[test]
    fn detail_table_has_one_row_per_record() {
        let details = detail_table(&sample());
        assert_eq!(details.rows.len(), 4);
        assert_eq!(details.columns[0], "Dział");
        assert_eq!(details.rows[2][1], text("Kabina"));
    }
}

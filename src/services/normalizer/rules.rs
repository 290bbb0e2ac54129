//! Ordered derivation rules. Each rule matches candidate columns by name and
//! fills standard fields that are still absent; none of them touches a field
//! that is already present.

use chrono::Datelike;
use tracing::{debug, warn};

use super::parse::{duration_hours, parse_datetime, to_numeric};
use super::schema::{StandardField, AVAILABILITY_ALIASES, LOAD_ALIASES};
use crate::models::{CellValue, Column, Table};

/// What a rule did to the table.
#[derive(Debug, Clone, PartialEq)]
pub struct Derivation {
    pub rule: &'static str,
    pub field: StandardField,
    pub sources: Vec<String>,
}

pub trait DerivationRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Applies the rule, returning one entry per field it added.
    fn apply(&self, table: &mut Table) -> Vec<Derivation>;
}

/// The rules in evaluation order.
pub fn default_rules() -> Vec<Box<dyn DerivationRule>> {
    vec![
        Box::new(DateRule),
        Box::new(IntervalRule),
        Box::new(DurationColumnRule),
        Box::new(AliasRule),
        Box::new(MissingHoursRule),
    ]
}

fn has_field(table: &Table, field: StandardField) -> bool {
    table.has_column(field.column_name())
}

/// First column whose lowercased name contains any of `needles`.
pub fn find_column_containing(table: &Table, needles: &[&str], skip: Option<&str>) -> Option<String> {
    table
        .columns()
        .iter()
        .filter(|c| Some(c.name.as_str()) != skip)
        .find(|c| {
            let lowered = c.name.to_lowercase();
            needles.iter().any(|n| lowered.contains(n))
        })
        .map(|c| c.name.clone())
}

/// First column whose trimmed, lowercased name equals one of `aliases`.
pub fn find_alias_column(table: &Table, aliases: &[&str]) -> Option<String> {
    table
        .columns()
        .iter()
        .find(|c| {
            let lowered = c.name.trim().to_lowercase();
            aliases.iter().any(|a| lowered == *a)
        })
        .map(|c| c.name.clone())
}

fn derived(rule: &'static str, field: StandardField, sources: &[&str]) -> Derivation {
    Derivation {
        rule,
        field,
        sources: sources.iter().map(|s| s.to_string()).collect(),
    }
}

/// Week and Month from the first "date"/"data" column.
pub struct DateRule;

impl DerivationRule for DateRule {
    fn name(&self) -> &'static str {
        "date"
    }

    fn apply(&self, table: &mut Table) -> Vec<Derivation> {
        let need_week = !has_field(table, StandardField::Week);
        let need_month = !has_field(table, StandardField::Month);
        if !need_week && !need_month {
            return Vec::new();
        }

        let Some(source) = find_column_containing(table, &["date", "data"], None) else {
            return Vec::new();
        };

        let dates: Vec<_> = match table.column(&source) {
            Some(column) => column.values.iter().map(parse_datetime).collect(),
            None => return Vec::new(),
        };
        let invalid = dates.iter().filter(|d| d.is_none()).count();
        if invalid > 0 {
            debug!("{} of {} cells in '{}' are not dates", invalid, dates.len(), source);
        }

        let mut out = Vec::new();
        if need_week {
            let weeks = dates
                .iter()
                .map(|d| d.map_or(CellValue::Empty, |d| CellValue::Int(d.iso_week().week() as i64)))
                .collect();
            table.push_column(Column::new(StandardField::Week.column_name(), weeks));
            out.push(derived(self.name(), StandardField::Week, &[source.as_str()]));
        }
        if need_month {
            let months = dates
                .iter()
                .map(|d| d.map_or(CellValue::Empty, |d| CellValue::Text(d.format("%Y-%m").to_string())))
                .collect();
            table.push_column(Column::new(StandardField::Month.column_name(), months));
            out.push(derived(self.name(), StandardField::Month, &[source.as_str()]));
        }
        out
    }
}

/// Availability hours as end minus start. Negative spans are kept as-is.
pub struct IntervalRule;

impl DerivationRule for IntervalRule {
    fn name(&self) -> &'static str {
        "interval"
    }

    fn apply(&self, table: &mut Table) -> Vec<Derivation> {
        if has_field(table, StandardField::AvailabilityHours) {
            return Vec::new();
        }
        let Some(start) = find_column_containing(table, &["start"], None) else {
            return Vec::new();
        };
        let Some(end) = find_column_containing(table, &["end"], Some(start.as_str())) else {
            return Vec::new();
        };
        let (Some(start_col), Some(end_col)) = (table.column(&start), table.column(&end)) else {
            return Vec::new();
        };

        let mut negative = 0usize;
        let hours: Vec<CellValue> = start_col
            .values
            .iter()
            .zip(end_col.values.iter())
            .map(|(s, e)| match (parse_datetime(s), parse_datetime(e)) {
                (Some(s), Some(e)) => {
                    let h = (e - s).num_milliseconds() as f64 / 3_600_000.0;
                    if h < 0.0 {
                        negative += 1;
                    }
                    CellValue::number(h)
                }
                _ => CellValue::Empty,
            })
            .collect();

        if negative > 0 {
            warn!(
                "{} rows have '{}' before '{}'; keeping negative availability hours",
                negative, end, start
            );
        }

        table.push_column(Column::new(StandardField::AvailabilityHours.column_name(), hours));
        vec![derived(self.name(), StandardField::AvailabilityHours, &[start.as_str(), end.as_str()])]
    }
}

/// Load hours from a "czas"/"duration" column.
pub struct DurationColumnRule;

impl DerivationRule for DurationColumnRule {
    fn name(&self) -> &'static str {
        "duration"
    }

    fn apply(&self, table: &mut Table) -> Vec<Derivation> {
        if has_field(table, StandardField::LoadHours) {
            return Vec::new();
        }
        let Some(source) = find_column_containing(table, &["czas", "duration"], None) else {
            return Vec::new();
        };
        let Some(column) = table.column(&source) else {
            return Vec::new();
        };

        let hours: Vec<CellValue> = column
            .values
            .iter()
            .map(|c| duration_hours(c).map_or(CellValue::Empty, CellValue::number))
            .collect();

        table.push_column(Column::new(StandardField::LoadHours.column_name(), hours));
        vec![derived(self.name(), StandardField::LoadHours, &[source.as_str()])]
    }
}

/// Availability and load hours from whole-name aliases.
pub struct AliasRule;

impl AliasRule {
    fn apply_one(
        &self,
        table: &mut Table,
        field: StandardField,
        aliases: &[&str],
    ) -> Option<Derivation> {
        if has_field(table, field) {
            return None;
        }
        let source = find_alias_column(table, aliases)?;
        let values: Vec<CellValue> = table.column(&source)?.values.iter().map(to_numeric).collect();
        table.push_column(Column::new(field.column_name(), values));
        Some(derived(self.name(), field, &[source.as_str()]))
    }
}

impl DerivationRule for AliasRule {
    fn name(&self) -> &'static str {
        "alias"
    }

    fn apply(&self, table: &mut Table) -> Vec<Derivation> {
        [
            self.apply_one(table, StandardField::AvailabilityHours, AVAILABILITY_ALIASES),
            self.apply_one(table, StandardField::LoadHours, LOAD_ALIASES),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Missing hours as max(0, availability - load).
pub struct MissingHoursRule;

impl DerivationRule for MissingHoursRule {
    fn name(&self) -> &'static str {
        "missing_hours"
    }

    fn apply(&self, table: &mut Table) -> Vec<Derivation> {
        if has_field(table, StandardField::MissingHours) {
            return Vec::new();
        }
        let availability_name = StandardField::AvailabilityHours.column_name();
        let load_name = StandardField::LoadHours.column_name();
        let (Some(availability), Some(load)) = (table.column(availability_name), table.column(load_name))
        else {
            return Vec::new();
        };

        let missing: Vec<CellValue> = availability
            .values
            .iter()
            .zip(load.values.iter())
            .map(|(a, l)| match (a.as_f64(), l.as_f64()) {
                (Some(a), Some(l)) => CellValue::number((a - l).max(0.0)),
                _ => CellValue::Empty,
            })
            .collect();

        table.push_column(Column::new(StandardField::MissingHours.column_name(), missing));
        vec![derived(self.name(), StandardField::MissingHours, &[availability_name, load_name])]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn table(headers: &[&str], rows: Vec<Vec<CellValue>>) -> Table {
        Table::from_rows(headers.iter().map(|h| h.to_string()).collect(), rows)
    }

    fn number_at(table: &Table, field: StandardField, row: usize) -> Option<f64> {
        table.cell(field.column_name(), row).and_then(CellValue::as_f64)
    }

    #[test]
    fn date_rule_derives_iso_week_and_month() {
        let mut t = table(
            &["Data produkcji"],
            vec![vec![text("2024-12-30")], vec![text("garbage")]],
        );
        let out = DateRule.apply(&mut t);

        assert_eq!(out.len(), 2);
        // 2024-12-30 belongs to ISO week 1 of 2025
        assert_eq!(t.cell("Tydzień", 0), Some(&CellValue::Int(1)));
        assert_eq!(t.cell("Miesiąc", 0), Some(&text("2024-12")));
        assert_eq!(t.cell("Tydzień", 1), Some(&CellValue::Empty));
        assert_eq!(t.cell("Miesiąc", 1), Some(&CellValue::Empty));
    }

    #[test]
    fn date_rule_keeps_existing_week() {
        let mut t = table(
            &["Tydzień", "Date"],
            vec![vec![CellValue::Int(7), text("2024-03-15")]],
        );
        let out = DateRule.apply(&mut t);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].field, StandardField::Month);
        assert_eq!(t.cell("Tydzień", 0), Some(&CellValue::Int(7)));
        assert_eq!(t.cell("Miesiąc", 0), Some(&text("2024-03")));
    }

    #[test]
    fn interval_rule_computes_hours() {
        let mut t = table(
            &["Start", "End"],
            vec![vec![text("2024-01-01T08:00"), text("2024-01-01T16:00")]],
        );
        IntervalRule.apply(&mut t);
        assert_eq!(number_at(&t, StandardField::AvailabilityHours, 0), Some(8.0));
    }

    #[test]
    fn interval_rule_keeps_negative_spans() {
        let mut t = table(
            &["start_time", "end_time"],
            vec![
                vec![text("2024-01-01 16:00"), text("2024-01-01 14:30")],
                vec![text("2024-01-01 16:00"), text("???")],
            ],
        );
        IntervalRule.apply(&mut t);
        assert_eq!(number_at(&t, StandardField::AvailabilityHours, 0), Some(-1.5));
        assert_eq!(t.cell("Dostępność/h", 1), Some(&CellValue::Empty));
    }

    #[test]
    fn interval_rule_needs_both_columns() {
        let mut t = table(&["Start"], vec![vec![text("2024-01-01T08:00")]]);
        assert!(IntervalRule.apply(&mut t).is_empty());
        assert!(!t.has_column("Dostępność/h"));
    }

    #[test]
    fn duration_rule_reads_clock_values() {
        let mut t = table(
            &["Czas pracy"],
            vec![vec![text("02:30:00")], vec![text("1,5")], vec![text("?")]],
        );
        DurationColumnRule.apply(&mut t);
        assert_eq!(number_at(&t, StandardField::LoadHours, 0), Some(2.5));
        assert_eq!(number_at(&t, StandardField::LoadHours, 1), Some(1.5));
        assert_eq!(t.cell("Obciążenie/h", 2), Some(&CellValue::Empty));
    }

    #[test]
    fn alias_rule_matches_whole_names_only() {
        let mut t = table(
            &["overload", "Planowane godz"],
            vec![vec![CellValue::Int(3), CellValue::Int(5)]],
        );
        let out = AliasRule.apply(&mut t);

        assert_eq!(out.len(), 1);
        assert_eq!(number_at(&t, StandardField::AvailabilityHours, 0), Some(5.0));
        assert!(!t.has_column("Obciążenie/h"));
    }

    #[test]
    fn alias_rule_is_case_insensitive() {
        let mut t = table(&[" WORK HOURS "], vec![vec![text("7")]]);
        AliasRule.apply(&mut t);
        assert_eq!(t.cell("Obciążenie/h", 0), Some(&CellValue::Number(7.0)));
    }

    #[test]
    fn missing_hours_are_clamped() {
        let mut t = table(
            &["Dostępność/h", "Obciążenie/h"],
            vec![
                vec![CellValue::Int(10), CellValue::Int(12)],
                vec![CellValue::Number(8.0), CellValue::Number(5.5)],
                vec![CellValue::Empty, CellValue::Int(1)],
            ],
        );
        MissingHoursRule.apply(&mut t);
        assert_eq!(number_at(&t, StandardField::MissingHours, 0), Some(0.0));
        assert_eq!(number_at(&t, StandardField::MissingHours, 1), Some(2.5));
        assert_eq!(t.cell("Brakujące Godziny", 2), Some(&CellValue::Empty));
    }
}

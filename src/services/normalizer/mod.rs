pub mod parse;
pub mod rules;
pub mod schema;

use std::collections::BTreeMap;

use serde::Serialize;
use smallvec::SmallVec;
use thiserror::Error;

use crate::models::Table;
pub use rules::{default_rules, Derivation, DerivationRule};
pub use schema::{expected_columns, field_list, StandardField};

pub const SAMPLE_SIZE: usize = 3;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MappingError {
    #[error("column '{}' could not be found or derived", .0.column_name())]
    Unmapped(StandardField),

    #[error("column '{column}' chosen for '{}' does not exist", .field.column_name())]
    UnknownColumn { field: StandardField, column: String },

    #[error("column '{column}' already holds standard field '{}'", .holder.column_name())]
    ColumnTaken { column: String, holder: StandardField },

    #[error("missing columns: {}", field_list(.0))]
    MissingFields(Vec<StandardField>),
}

impl MappingError {
    pub fn field(&self) -> Option<StandardField> {
        match self {
            MappingError::Unmapped(field) | MappingError::UnknownColumn { field, .. } => Some(*field),
            _ => None,
        }
    }
}

/// User choice per standard field: a raw column name, or `None` for "none".
pub type ManualMapping = BTreeMap<StandardField, Option<String>>;

/// A raw column offered for manual mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnChoice {
    pub name: String,
    pub sample_values: SmallVec<[String; SAMPLE_SIZE]>,
}

/// Summary of one normalization pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizationReport {
    pub present: Vec<StandardField>,
    pub derived: Vec<DerivedField>,
    pub unmapped: Vec<StandardField>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedField {
    pub field: StandardField,
    pub rule: &'static str,
    pub sources: Vec<String>,
}

impl From<Derivation> for DerivedField {
    fn from(d: Derivation) -> Self {
        Self { field: d.field, rule: d.rule, sources: d.sources }
    }
}

pub struct Normalizer {
    rules: Vec<Box<dyn DerivationRule>>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl Normalizer {
    pub fn new(rules: Vec<Box<dyn DerivationRule>>) -> Self {
        Self { rules }
    }

    /// Runs every rule in order and reports which standard fields are still absent.
    pub fn normalize(&self, raw: Table) -> (Table, Vec<MappingError>) {
        let (table, report) = self.normalize_with_report(raw);
        let errors = report.unmapped.into_iter().map(MappingError::Unmapped).collect();
        (table, errors)
    }

    pub fn normalize_with_report(&self, mut table: Table) -> (Table, NormalizationReport) {
        let present = present_fields(&table);

        let mut derived = Vec::new();
        for rule in &self.rules {
            for derivation in rule.apply(&mut table) {
                tracing::info!(
                    "Derived '{}' via {} rule from {:?}",
                    derivation.field.column_name(),
                    derivation.rule,
                    derivation.sources
                );
                derived.push(DerivedField::from(derivation));
            }
        }

        let unmapped = missing_fields(&table);
        if !unmapped.is_empty() {
            tracing::warn!("Unmapped standard fields after inference: {:?}", unmapped);
        }

        (table, NormalizationReport { present, derived, unmapped })
    }

    /// Applies the user's manual choices, re-runs inference and insists that
    /// every standard field is now present.
    pub fn resolve(&self, table: Table, mapping: &ManualMapping) -> Result<Table, MappingError> {
        let table = apply_manual_mapping(table, mapping)?;
        let (table, _) = self.normalize_with_report(table);
        ensure_complete(&table)?;
        Ok(table)
    }
}

pub fn present_fields(table: &Table) -> Vec<StandardField> {
    StandardField::ALL
        .into_iter()
        .filter(|f| table.has_column(f.column_name()))
        .collect()
}

pub fn missing_fields(table: &Table) -> Vec<StandardField> {
    StandardField::ALL
        .into_iter()
        .filter(|f| !table.has_column(f.column_name()))
        .collect()
}

pub fn ensure_complete(table: &Table) -> Result<(), MappingError> {
    let missing = missing_fields(table);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(MappingError::MissingFields(missing))
    }
}

/// Raw columns the user may pick from. Standard columns are left out since
/// renaming them would drop the field they already hold.
pub fn mapping_choices(table: &Table) -> Vec<ColumnChoice> {
    table
        .columns()
        .iter()
        .filter(|c| StandardField::from_column_name(&c.name).is_none())
        .map(|c| ColumnChoice {
            name: c.name.clone(),
            sample_values: c
                .values
                .iter()
                .filter(|v| !v.is_empty())
                .take(SAMPLE_SIZE)
                .map(|v| v.to_string())
                .collect(),
        })
        .collect()
}

/// Renames the chosen raw columns to the standard names of fields that are
/// still absent. Choices for fields already present are ignored.
pub fn apply_manual_mapping(mut table: Table, mapping: &ManualMapping) -> Result<Table, MappingError> {
    for (field, choice) in mapping {
        let Some(column) = choice else {
            continue;
        };
        if table.has_column(field.column_name()) {
            tracing::debug!("Ignoring manual mapping for '{}', already present", field.column_name());
            continue;
        }
        if let Some(holder) = StandardField::from_column_name(column) {
            return Err(MappingError::ColumnTaken { column: column.clone(), holder });
        }
        if !table.rename_column(column, field.column_name()) {
            return Err(MappingError::UnknownColumn { field: *field, column: column.clone() });
        }
        tracing::info!("Mapped column '{}' to '{}'", column, field.column_name());
    }
    Ok(table)
}

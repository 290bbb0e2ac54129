use serde::{Deserialize, Serialize};

/// The fixed set of columns the dashboard works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StandardField {
    Department,
    DeviceName,
    AvailabilityHours,
    LoadHours,
    MissingHours,
    Week,
    Month,
    PartNumber,
}

impl StandardField {
    pub const ALL: [StandardField; 8] = [
        StandardField::Department,
        StandardField::DeviceName,
        StandardField::AvailabilityHours,
        StandardField::LoadHours,
        StandardField::MissingHours,
        StandardField::Week,
        StandardField::Month,
        StandardField::PartNumber,
    ];

    /// Exact column header used both to recognise the field and to name it.
    pub fn column_name(self) -> &'static str {
        match self {
            StandardField::Department => "Dział",
            StandardField::DeviceName => "Nazwa Urządzenia",
            StandardField::AvailabilityHours => "Dostępność/h",
            StandardField::LoadHours => "Obciążenie/h",
            StandardField::MissingHours => "Brakujące Godziny",
            StandardField::Week => "Tydzień",
            StandardField::Month => "Miesiąc",
            StandardField::PartNumber => "Numer części",
        }
    }

    pub fn from_column_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.column_name() == name)
    }
}

pub const AVAILABILITY_ALIASES: &[&str] = &[
    "available",
    "available hours",
    "available_hours",
    "planowane",
    "planowane godz",
];

pub const LOAD_ALIASES: &[&str] = &["load", "work hours", "work_hours", "obciazenie", "czas pracy"];

pub fn field_list(fields: &[StandardField]) -> String {
    fields
        .iter()
        .map(|f| f.column_name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Comma separated list of the standard headers, used in user-facing messages.
pub fn expected_columns() -> String {
    field_list(&StandardField::ALL)
}

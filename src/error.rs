use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};
use serde_json::json;
use axum::Json;
use thiserror::Error;

use crate::services::normalizer::{field_list, ColumnChoice, MappingError, StandardField};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("File processing error: {0}")]
    FileProcessingError(String),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Missing required columns: {}", field_list(.missing))]
    MappingRequired {
        missing: Vec<StandardField>,
        choices: Vec<ColumnChoice>,
    },

    #[error("No data left after applying filters")]
    EmptySelection,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ParseError(err.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::ParseError(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, body) = match self {
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            AppError::ParseError(_) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            AppError::Decode(_) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            AppError::Mapping(_) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            AppError::MappingRequired { missing, choices } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": message,
                    "missing_fields": missing,
                    "column_choices": choices,
                }),
            ),
            AppError::EmptySelection => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": message, "warning": "Brak danych po filtrach." }),
            ),
            AppError::IoError(_) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": message })),
            AppError::FileProcessingError(_) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": message })),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": message })),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_required_lists_polish_column_names() {
        let err = AppError::MappingRequired {
            missing: vec![StandardField::Week, StandardField::PartNumber],
            choices: Vec::new(),
        };
        assert_eq!(err.to_string(), "Missing required columns: Tydzień, Numer części");
    }

    #[test]
    fn empty_selection_is_unprocessable() {
        let response = AppError::EmptySelection.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}

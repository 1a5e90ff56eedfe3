//! Error taxonomy of the reconciliation pipeline.
//!
//! Row-level variants (`MalformedRow`, `UnknownStatus`, and a `Storage`
//! failure raised while handling one row) are collected into a run's error
//! list and never abort the batch. Duplicate external ids and unmatched
//! identities are row outcomes, not errors, and have no variant here.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Row {line}: malformed row: {reason}")]
    MalformedRow { line: u64, reason: String },

    #[error("Row {line}: Unknown status \"{status}\"")]
    UnknownStatus { line: u64, status: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Unmatched booking {0} is already resolved")]
    AlreadyResolved(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

impl ResponseError for ReconcileError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyResolved(_) => StatusCode::CONFLICT,
            Self::MalformedRow { .. }
            | Self::UnknownStatus { .. }
            | Self::InvalidInput(_)
            | Self::Upload(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) | Self::Csv(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "error": self.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_errors_carry_line_numbers() {
        let err = ReconcileError::UnknownStatus {
            line: 7,
            status: "Pending".into(),
        };
        assert_eq!(err.to_string(), "Row 7: Unknown status \"Pending\"");
    }

    #[test]
    fn maps_to_http_status() {
        assert_eq!(
            ReconcileError::NotFound("Unmatched booking 3".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ReconcileError::AlreadyResolved(3).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ReconcileError::InvalidInput("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}

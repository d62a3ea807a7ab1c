use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;
use tracing::error;

/// Failures while reading hardware monitor logs.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV file not found for date {0}")]
    FileNotFound(NaiveDate),

    #[error("Invalid date format: {0}")]
    InvalidDate(String),

    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("Invalid log file pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Errors surfaced by HTTP handlers, rendered as `{"detail": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DataError> for ApiError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::InvalidDate(_) | DataError::InvalidRange(_) => {
                ApiError::BadRequest(err.to_string())
            }
            DataError::FileNotFound(_) => ApiError::NotFound(err.to_string()),
            DataError::Io { .. } | DataError::Csv(_) | DataError::Pattern(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("analysis task failed: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {}", self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_error_display() {
        let err = DataError::InvalidDate("2024-13-01".to_string());
        assert_eq!(err.to_string(), "Invalid date format: 2024-13-01");

        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(
            DataError::FileNotFound(date).to_string(),
            "CSV file not found for date 2024-01-15"
        );
    }

    #[test]
    fn test_data_error_maps_to_status() {
        let bad: ApiError = DataError::InvalidRange("end before start".to_string()).into();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let io: ApiError = DataError::Io {
            path: PathBuf::from("data/x.csv"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }
        .into();
        assert_eq!(io.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let missing: ApiError = DataError::FileNotFound(date).into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_into_response_status() {
        let response = ApiError::NotFound("No data found for cpu_usage".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DataError>();
        assert_send_sync::<ApiError>();
    }
}

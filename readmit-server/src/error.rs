//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use readmit_core::ReadmitError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No data provided")]
    NoData,
    #[error("{0}")]
    BadRequest(String),
    #[error("Prediction failed: {0}")]
    Prediction(String),
}

impl From<ReadmitError> for ApiError {
    fn from(err: ReadmitError) -> Self {
        match err {
            ReadmitError::MissingData => ApiError::NoData,
            ReadmitError::Parse(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::Prediction(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NoData | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Prediction(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::billing::BillingError;
use crate::pagination::PaginationError;
use crate::storage::StorageError;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Every error an API handler can return.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Pagination(#[from] PaginationError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Billing(#[from] BillingError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Conflict => ApiError::Conflict("record already exists".to_string()),
            StorageError::Pagination(e) => ApiError::Pagination(e),
            StorageError::Other(e) => ApiError::Internal(e),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Pagination(e) => e.status(),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Billing(e) => e.status(),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
            match &self {
                ApiError::Billing(e) => e.public_message().to_string(),
                _ => "internal server error".to_string(),
            }
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_errors_keep_their_status() {
        let invalid: ApiError = StorageError::Pagination(PaginationError::invalid("size", "0")).into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let range: ApiError = StorageError::Pagination(PaginationError::RangeNotSatisfiable).into();
        assert_eq!(range.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    }

    #[test]
    fn storage_failures_are_internal() {
        let err: ApiError = StorageError::Other(anyhow::anyhow!("disk full")).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ApiError::from(StorageError::Conflict).status(), StatusCode::CONFLICT);
    }
}

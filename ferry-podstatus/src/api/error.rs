//! API Error Handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ferry_core::dto::status::USAGE;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    /// The request is not one the service understands
    Usage,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Usage => (StatusCode::NOT_FOUND, USAGE).into_response(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Fallback for every unknown path
pub async fn usage() -> ApiError {
    ApiError::Usage
}

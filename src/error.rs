use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LimitError {
    /// Replica unreachable or refused authentication.
    #[error("setup failed for {replica}: {message}")]
    Setup { replica: String, message: String },

    #[error("read from {replica} failed: {message}")]
    Read { replica: String, message: String },

    #[error("corrupt bucket state: {0}")]
    Decode(String),

    #[error("liveness probe of {replica} failed: {message}")]
    Probe { replica: String, message: String },

    /// One or more writers rejected the update.
    #[error("write rejected by {failed} of {total} writers")]
    PartialWrite { failed: usize, total: usize },

    #[error("{operation} timed out after {millis}ms")]
    Timeout { operation: &'static str, millis: u64 },

    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type LimitResult<T> = Result<T, LimitError>;

impl From<redis::RedisError> for LimitError {
    fn from(err: redis::RedisError) -> Self {
        LimitError::Store(err.to_string())
    }
}

impl From<validator::ValidationErrors> for LimitError {
    fn from(err: validator::ValidationErrors) -> Self {
        LimitError::Validation(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_limit_error(err: &LimitError) -> Self {
        let message = err.to_string();
        match err {
            LimitError::Validation(_) => Self::new("validation_error", &message, 422),
            LimitError::Config(_) => Self::new("configuration_error", &message, 400),
            _ => Self::new("internal_error", &message, 500),
        }
    }
}

impl IntoResponse for LimitError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_limit_error(&self);
        let status = StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_codes() {
        let err = LimitError::Validation("zone must not be empty".into());
        assert_eq!(ErrorResponse::from_limit_error(&err).code, 422);

        let err = LimitError::Config("no writers".into());
        assert_eq!(ErrorResponse::from_limit_error(&err).code, 400);

        let err = LimitError::PartialWrite { failed: 1, total: 2 };
        let body = ErrorResponse::from_limit_error(&err);
        assert_eq!(body.code, 500);
        assert_eq!(body.message, "write rejected by 1 of 2 writers");
    }

    #[test]
    fn test_into_response_status() {
        let response = LimitError::Validation("bad".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::engine::Verdict;

#[derive(Debug, Serialize)]
pub struct LimitResponse {
    pub verdict: Verdict,
    pub zone: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl LimitResponse {
    pub fn new(verdict: Verdict, zone: &str, key: &str) -> Self {
        Self {
            verdict,
            zone: zone.to_string(),
            key: key.to_string(),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl ToString) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }

    /// HTTP status a host should answer with for this verdict.
    pub fn status(&self) -> StatusCode {
        match self.verdict {
            Verdict::Admit => StatusCode::OK,
            Verdict::Busy => StatusCode::SERVICE_UNAVAILABLE,
            Verdict::Forbidden => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for LimitResponse {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

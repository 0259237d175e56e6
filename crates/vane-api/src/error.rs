use thiserror::Error;
use vane_core::{CoreError, RunnerError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("no result for family: {0}")]
    NoResult(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl ApiError {
    /// Whether the caller, not the engine, is at fault.
    pub fn is_client_error(&self) -> bool {
        match self {
            ApiError::InvalidRequest(_) | ApiError::JobNotFound(_) | ApiError::NoResult(_) => true,
            ApiError::Core(CoreError::NoRunner(_))
            | ApiError::Core(CoreError::Runner(RunnerError::InvalidParams(_))) => true,
            _ => false,
        }
    }
}

#[cfg(feature = "http")]
impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::JobNotFound(_) | ApiError::NoResult(_) => StatusCode::NOT_FOUND,
            ApiError::Core(CoreError::NoRunner(_)) => StatusCode::NOT_IMPLEMENTED,
            ApiError::Core(CoreError::Runner(RunnerError::InvalidParams(_))) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use scriptd_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `scriptd_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => classify_core_error(core),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Map a core error to an HTTP status, error code, and message.
///
/// Script-level failures keep the engine diagnostic; store and internal
/// failures are logged and replaced by a generic message.
fn classify_core_error(err: &CoreError) -> (StatusCode, &'static str, String) {
    let message = err.to_string();
    match err {
        CoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", message),
        CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message),
        CoreError::AlreadyExists { .. } => (StatusCode::BAD_REQUEST, "ALREADY_EXISTS", message),
        CoreError::Compile(_) => (StatusCode::BAD_REQUEST, "COMPILE_ERROR", message),
        CoreError::Eval(_) => (StatusCode::BAD_REQUEST, "EVAL_ERROR", message),
        CoreError::Inactive { .. } => (StatusCode::CONFLICT, "INACTIVE", message),
        CoreError::VersionConflict { .. } => (StatusCode::CONFLICT, "VERSION_CONFLICT", message),
        CoreError::EvalTimeout { .. } => (StatusCode::REQUEST_TIMEOUT, "EVAL_TIMEOUT", message),
        CoreError::Store(_) | CoreError::Internal(_) => {
            tracing::error!(error = %err, "Internal core error");
            internal()
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

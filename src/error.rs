use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

pub type QueueResult<T> = Result<T, QueueError>;

/// Error taxonomy for the queue core.
///
/// `Conflict` doubles as the claim-precondition failure; the drain loop
/// treats it as skip-and-continue and it only reaches the API for user
/// actions (duplicate session, uncancellable job).
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("worker report rejected: {0}")]
    WorkerReport(String),
}

impl QueueError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            QueueError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            QueueError::NotFound(_) => StatusCode::NOT_FOUND,
            QueueError::Conflict(_) => StatusCode::CONFLICT,
            QueueError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
            QueueError::WorkerReport(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for QueueError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gatekeeper_models::command::CommandError;
use gatekeeper_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Invalid command: {0}")]
    InvalidCommand(#[from] CommandError),

    #[error("Invalid command id: {0}")]
    InvalidId(String),

    #[error("Command not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    fn status(&self) -> StatusCode {
        match self {
            SupervisorError::InvalidCommand(_) | SupervisorError::InvalidId(_) => {
                StatusCode::BAD_REQUEST
            }
            SupervisorError::NotFound(_) => StatusCode::NOT_FOUND,
            SupervisorError::Store(_) | SupervisorError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for SupervisorError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

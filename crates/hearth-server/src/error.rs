use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hearth_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// A required field is missing or malformed.  The message is sent to the
    /// client verbatim.
    #[error("{0}")]
    Validation(String),

    /// No caller identity on a request that needs one.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid image data: {0}")]
    Decoding(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Request body too large")]
    RequestTooLarge,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Object storage error: {0}")]
    ObjectStorage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServerError::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Validation(_) | ServerError::Decoding(_) => StatusCode::BAD_REQUEST,
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ServerError::PayloadTooLarge { .. } | ServerError::RequestTooLarge => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ServerError::Store(_) | ServerError::ObjectStorage(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServerError::Decoding(_) => "Invalid image data".to_string(),
            ServerError::Store(_) | ServerError::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                "Internal server error".to_string()
            }
            ServerError::ObjectStorage(_) => {
                tracing::error!(error = %self, "request failed");
                "Object storage error".to_string()
            }
            _ => self.to_string(),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

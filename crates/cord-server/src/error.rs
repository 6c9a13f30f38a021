use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use cord_shared::WebhookError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Webhook rejected: {0}")]
    Unauthorized(WebhookError),

    #[error("Invalid webhook: {0}")]
    BadRequest(WebhookError),

    #[error("Webhook receiver has no project secret")]
    NotConfigured,

    #[error("Webhook queue is full")]
    QueueFull,

    #[error("Webhook queue is closed")]
    QueueClosed,
}

impl From<WebhookError> for ServerError {
    fn from(e: WebhookError) -> Self {
        if e.is_authentication_failure() {
            ServerError::Unauthorized(e)
        } else {
            ServerError::BadRequest(e)
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotConfigured | ServerError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::QueueClosed => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}

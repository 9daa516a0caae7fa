//! HTTP route handlers

pub mod notifications;
pub mod websocket;

use axum::{http::StatusCode, Json};
use serde::Serialize;
use waddle_notify::NotifyError;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

/// Map a core error onto an HTTP error response.
pub fn notify_error_to_response(err: NotifyError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, error_code) = if err.is_validation() {
        (StatusCode::BAD_REQUEST, "invalid_input")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
    };
    (status, Json(ErrorResponse::new(error_code, &err.to_string())))
}

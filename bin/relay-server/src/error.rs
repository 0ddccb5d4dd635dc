//! Unified server error type.
//!
//! Upstream failures never come through here: the relay turns them into an
//! `[error] ...` reply with a 200 status. What is left is request decoding.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ServerError {
    /// The body was missing, not JSON, or not the expected shape.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message): (StatusCode, String) = match &self {
            ServerError::InvalidBody(rejection) => {
                debug!(error = %rejection, "rejected request body");
                (rejection.status(), rejection.body_text())
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

//! Request-level error types.
//!
//! Only two things can fail a valid-looking request: the caller sent bad
//! parameters (400), or an internal invariant broke (500). Upstream provider
//! failure is explicitly NOT an error; the fetch chains absorb it and the
//! response reports it in-band.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// An error terminating a /safety request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The caller's query parameters failed validation.
    #[error("{0}")]
    Validation(String),

    /// An internal invariant was violated while synthesizing the response.
    #[error("internal error: {0}")]
    Computation(String),
}

impl RequestError {
    pub fn validation(message: impl Into<String>) -> Self {
        RequestError::Validation(message.into())
    }

    pub fn computation(message: impl Into<String>) -> Self {
        RequestError::Computation(message.into())
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let status = match &self {
            RequestError::Validation(_) => StatusCode::BAD_REQUEST,
            RequestError::Computation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::decode::DecodeError;

const REDACTED_DETAIL: &str = "Internal server error";

/// Every failure a gateway request can end in.
///
/// | variant           | status |
/// |-------------------|--------|
/// | `InvalidImage`    | 400    |
/// | `PayloadTooLarge` | 413    |
/// | `Form`            | 422    |
/// | `Backend`         | 500    |
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid image")]
    InvalidImage,
    #[error("{0}")]
    Form(String),
    #[error("request body too large")]
    PayloadTooLarge,
    #[error("{0}")]
    Backend(String),
}

impl GatewayError {
    /// Wrap an identity-service failure. The full error is logged; the
    /// response carries its text only when `expose` is set.
    pub fn backend(err: anyhow::Error, expose: bool) -> Self {
        tracing::warn!(error = %err, "identity service call failed");
        if expose {
            GatewayError::Backend(err.to_string())
        } else {
            GatewayError::Backend(REDACTED_DETAIL.to_string())
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidImage => StatusCode::BAD_REQUEST,
            GatewayError::Form(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DecodeError> for GatewayError {
    fn from(err: DecodeError) -> Self {
        tracing::debug!(error = %err, "rejecting upload");
        GatewayError::InvalidImage
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

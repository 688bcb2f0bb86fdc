//! JSON error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;
use crate::LedgerError;

impl LedgerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::InvalidState(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing text; provider and database details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            Self::Gateway(_) => "payment provider is unavailable, please try again".into(),
            Self::Storage(_) => "internal error".into(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        if let Self::Storage(e) = &self {
            error!(error = %e, "storage failure");
        }
        let status = self.status_code();
        (status, Json(json!({ "error": self.kind(), "message": self.public_message() }))).into_response()
    }
}

/// Rejection for requests that arrive without a resolved identity.
pub fn missing_identity(reason: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthenticated", "message": reason }))).into_response()
}

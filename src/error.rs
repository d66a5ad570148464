// Error handling module
// Defines the error taxonomy and its JSON envelope

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/// Errors surfaced by the gateway, each mapped to a stable envelope kind
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed request or missing required fields
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Action name not present in the action table
    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    /// No credential stored for the user
    #[error("User not connected to Notion: {0}")]
    NotConnected(String),

    /// Proxy API key missing or wrong
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// OAuth code exchange failed
    #[error("OAuth token exchange failed")]
    UpstreamAuthError {
        status: Option<u16>,
        details: Value,
    },

    /// Notion API call failed after authentication
    #[error("Notion API error")]
    UpstreamApiError {
        status: Option<u16>,
        details: Value,
    },

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Stable machine-readable kind, rendered as the `error` field
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::UnsupportedAction(_) => "unsupported_action",
            ApiError::NotConnected(_) => "not_connected",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::UpstreamAuthError { .. } => "upstream_auth_error",
            ApiError::UpstreamApiError { .. } => "upstream_api_error",
            ApiError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) | ApiError::UnsupportedAction(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotConnected(_) | ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::UpstreamAuthError { .. }
            | ApiError::UpstreamApiError { .. }
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build the JSON error envelope
    pub fn to_envelope(&self) -> Value {
        let mut body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });

        match self {
            ApiError::UpstreamAuthError { status, details }
            | ApiError::UpstreamApiError { status, details } => {
                body["details"] = details.clone();
                if let Some(status) = status {
                    body["upstream_status"] = json!(status);
                }
            }
            ApiError::Internal(_) => {
                body["message"] = json!("Internal server error");
            }
            _ => {}
        }

        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref err) = self {
            tracing::error!("Internal error: {:?}", err);
        }

        (self.status_code(), Json(self.to_envelope())).into_response()
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;

//! Failure taxonomy of the relay endpoint and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

/// Every way a relay call can fail.
///
/// Each variant maps to exactly one HTTP status and a fixed public message,
/// so handlers can return `Result<_, RelayError>` and never leak internals
/// (or the credential) to the caller.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The provider credential is not configured on the server.
    #[error("MISTRAL_API_KEY is not set")]
    Configuration,

    /// The provider answered with a non-success status.
    #[error("provider responded with status {status}")]
    Upstream { status: u16 },

    /// Network failure, or the provider payload could not be decoded.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The request body did not carry a `message`.
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration | Self::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream { status } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message returned to the caller in the `error` field.
    pub fn public_message(&self) -> String {
        match self {
            Self::Configuration => "Missing API Key".to_string(),
            Self::Upstream { .. } => "Failed to fetch Mistral AI response".to_string(),
            Self::Transport(_) => "Error connecting to Mistral API.".to_string(),
            Self::BadRequest(reason) => reason.clone(),
        }
    }
}

/// Body of every failed relay response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(%status, "relay request failed: {self}");
        } else {
            warn!(%status, "relay request rejected: {self}");
        }

        let body = ErrorResponse {
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

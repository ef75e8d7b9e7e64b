//! Gate error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use super::session_gate::GateState;

/// Errors surfaced by the identity/code/amount flow
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Identifier must not be empty")]
    InvalidIdentifier,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Verification code mismatch")]
    CodeMismatch,

    #[error("Session is not verified (state: {state:?})")]
    NotVerified { state: GateState },

    #[error("No active session")]
    SessionRequired,

    #[error("Identifier does not match the session")]
    IdentityMismatch,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GateError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidIdentifier | Self::InvalidAmount(_) | Self::IdentityMismatch => {
                StatusCode::BAD_REQUEST
            }
            Self::CodeMismatch | Self::SessionRequired => StatusCode::UNAUTHORIZED,
            Self::NotVerified { .. } => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable code for clients
    pub fn error_code(&self) -> &str {
        match self {
            Self::InvalidIdentifier => "invalid_identifier",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::CodeMismatch => "code_mismatch",
            Self::NotVerified { .. } => "not_verified",
            Self::SessionRequired => "session_required",
            Self::IdentityMismatch => "identity_mismatch",
            Self::Internal(_) => "server_error",
        }
    }

    pub fn user_message(&self) -> &str {
        match self {
            Self::InvalidIdentifier => "Please enter your phone number",
            Self::InvalidAmount(_) => "Please enter a valid non-negative amount",
            Self::CodeMismatch => "Invalid PIN, please try again",
            Self::NotVerified { .. } => "Please verify your PIN before submitting an amount",
            Self::SessionRequired => "Please enter your phone number first",
            Self::IdentityMismatch => "Phone number does not match this session",
            Self::Internal(_) => "Something went wrong, please try again later",
        }
    }

    /// Whether repeating the same step can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CodeMismatch | Self::InvalidAmount(_) | Self::InvalidIdentifier
        )
    }

    /// Where the client should go next, if elsewhere
    pub fn redirect(&self) -> Option<&'static str> {
        match self {
            Self::SessionRequired => Some("/api/identity"),
            Self::NotVerified { state } => match state {
                GateState::Start => Some("/api/identity"),
                _ => Some("/api/code"),
            },
            _ => None,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            tracing::error!("Internal gate error: {}", detail);
        }

        let body = Json(json!({
            "code": self.error_code(),
            "message": self.user_message(),
            "retryable": self.is_retryable(),
            "redirect": self.redirect(),
        }));

        (self.status_code(), body).into_response()
    }
}

/// Unified error types for the endorsement service
use crate::agent::AgentError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the endorsement service
#[derive(Error, Debug)]
pub enum WebvhError {
    /// Missing or invalid plugin configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Endorsement protocol errors
    #[error("Endorsement error: {0}")]
    Endorsement(String),

    /// The configured endorser invitation could not be decoded or was rejected
    #[error("Error receiving endorser invitation: {0}")]
    EndorserInvitation(#[source] AgentError),

    /// No signing key registered for the log entry's domain
    #[error(
        "Endorsement key not found for domain: {0}. The administrator must add the key \
         to the wallet that matches the key on the server."
    )]
    EndorsementKeyNotFound(String),

    /// Log entry carries no proof to endorse
    #[error("No proof found in log entry {0}")]
    MissingProof(String),

    /// Failure reported by an agent collaborator
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    /// Operations manager failed to finalize a log entry
    #[error("Operations error: {0}")]
    Operations(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g., ambiguous pending entry)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert WebvhError to HTTP response
impl IntoResponse for WebvhError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            WebvhError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            WebvhError::Validation(_) | WebvhError::MissingProof(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            WebvhError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            WebvhError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            WebvhError::Configuration(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "ConfigurationError",
                self.to_string(),
            ),
            WebvhError::Endorsement(_)
            | WebvhError::EndorserInvitation(_)
            | WebvhError::EndorsementKeyNotFound(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "EndorsementError",
                self.to_string(),
            ),
            WebvhError::Agent(_) => (StatusCode::BAD_GATEWAY, "AgentError", self.to_string()),
            WebvhError::Database(_) | WebvhError::Internal(_) | WebvhError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                self.to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for endorsement operations
pub type WebvhResult<T> = Result<T, WebvhError>;

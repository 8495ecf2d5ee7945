//! Error types for the public forms API

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for public forms API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    /// No published form exists under the requested slug.
    #[error("form not found")]
    NotFound,

    /// HTTP 400 with a structured list of per-field rejections. The embed
    /// reconciles these into its own field error map.
    #[error("submission rejected: {} field(s) failed server validation", .0.len())]
    Validation(Vec<ServerFieldError>),

    /// Any other non-success status.
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// The request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Transport-level failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A success status carrying a body we could not parse.
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ApiError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound)
    }

    /// One displayable line for non-field failures. The embed shows this
    /// as the top-level request error.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::NotFound => "This form is no longer available.".to_string(),
            ApiError::Validation(_) => "Please correct the highlighted fields.".to_string(),
            ApiError::Timeout => "The request timed out. Please try again.".to_string(),
            ApiError::Status { message, .. } if !message.is_empty() => message.clone(),
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

/// One rejected field from a structured 400 response.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerFieldError {
    pub field: String,
    pub message: String,
    /// Server-side reason code, passed through verbatim.
    #[serde(default)]
    pub code: String,
}

//! Error types for the extraction service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for extraction operations
pub type Result<T> = std::result::Result<T, Error>;

/// Extraction service errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No API credential in the secrets file or the environment
    #[error("Missing API credential: set {0} in secrets or environment variables")]
    MissingCredential(String),

    /// Schema rejected before a run starts
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// File parsing error
    #[error("Failed to parse file '{filename}': {message}")]
    FileParse { filename: String, message: String },

    /// Unsupported file type
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Uploaded document never left the provider's processing state
    #[error("Document '{filename}' still processing after {polls} polls")]
    UploadTimeout { filename: String, polls: u32 },

    /// Model output that could not be decoded
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// Filter expression parse or evaluation error
    #[error("Filter error: {0}")]
    Filter(String),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Missing run, session, record or document
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request payload
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a file parse error
    pub fn file_parse(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FileParse {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create a filter error
    pub fn filter(message: impl Into<String>) -> Self {
        Self::Filter(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            Error::Config(msg) => (StatusCode::BAD_REQUEST, "config_error", msg.clone()),
            Error::MissingCredential(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "missing_credential",
                self.to_string(),
            ),
            Error::InvalidSchema(msg) => (StatusCode::BAD_REQUEST, "invalid_schema", msg.clone()),
            Error::FileParse { filename, message } => (
                StatusCode::BAD_REQUEST,
                "parse_error",
                format!("Failed to parse '{}': {}", filename, message),
            ),
            Error::UnsupportedFileType(ext) => (
                StatusCode::BAD_REQUEST,
                "unsupported_type",
                format!("Unsupported file type: {}", ext),
            ),
            Error::Llm(msg) => (StatusCode::SERVICE_UNAVAILABLE, "llm_error", msg.clone()),
            Error::UploadTimeout { .. } => {
                (StatusCode::GATEWAY_TIMEOUT, "upload_timeout", self.to_string())
            }
            Error::MalformedResponse(msg) => {
                (StatusCode::BAD_GATEWAY, "malformed_response", msg.clone())
            }
            Error::Filter(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "filter_error", msg.clone()),
            Error::Csv(err) => (StatusCode::BAD_REQUEST, "csv_error", err.to_string()),
            Error::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Not found: {}", what),
            ),
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            Error::Io(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "io_error",
                err.to_string(),
            ),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "json_error", err.to_string()),
            Error::Http(err) => (StatusCode::BAD_GATEWAY, "http_error", err.to_string()),
            Error::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

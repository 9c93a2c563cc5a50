//! Error types for margin.

use thiserror::Error;

/// Result type alias using margin's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for margin operations.
///
/// The first five variants are the failure taxonomy surfaced to users; the
/// rest are programming or environment errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Document, chat, or other resource unknown or not visible to the user
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport-level or non-success response from a collaborator
    #[error("Network error: {0}")]
    Network(String),

    /// Asset upload rejected or failed
    #[error("Upload error: {0}")]
    Upload(String),

    /// Stored content could not be parsed into a rich content tree
    #[error("Parse error: {0}")]
    Parse(String),

    /// Assistant backend failed to answer a query
    #[error("Assistant error: {0}")]
    Assistant(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation attempted before the component reached the required state
    #[error("Not ready: {0}")]
    NotReady(String),

    /// The owning session was torn down
    #[error("Session closed: {0}")]
    Closed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable snake_case tag for notices and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::Network(_) => "network_failure",
            Error::Upload(_) => "upload_error",
            Error::Parse(_) => "parse_failure",
            Error::Assistant(_) => "assistant_failure",
            Error::InvalidInput(_) => "invalid_input",
            Error::NotReady(_) => "not_ready",
            Error::Closed(_) => "closed",
            Error::Config(_) => "config",
            Error::Serialization(_) => "serialization",
            Error::Internal(_) => "internal",
            Error::Io(_) => "io",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}

//! Error types for pw-core
//!
//! Provides a unified error type that can be converted to appropriate exit codes.

use thiserror::Error;

/// Result type alias for pw-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for pw-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Backend could not serve the page (timeout, throttling, connection reset)
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Continuation token is malformed or belongs to a different request
    #[error("Invalid continuation token: {0}")]
    InvalidContinuationToken(String),

    /// List request is malformed
    #[error("Request rejected: {0}")]
    RequestRejected(String),

    /// Feature not supported by backend
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid listing path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Alias not found
    #[error("Alias not found: {0}")]
    AliasNotFound(String),

    /// Alias already exists
    #[error("Alias already exists: {0}")]
    AliasExists(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Get the appropriate exit code for this error
    pub const fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidPath(_) | Error::Config(_) | Error::RequestRejected(_) => 2, // UsageError
            Error::BackendUnavailable(_) => 3,                 // NetworkError
            Error::Auth(_) => 4,                               // AuthError
            Error::NotFound(_) | Error::AliasNotFound(_) => 5, // NotFound
            Error::AliasExists(_) => 6,                        // Conflict
            Error::UnsupportedFeature(_) => 7,                 // UnsupportedFeature
            Error::InvalidContinuationToken(_) => 8,           // InvalidToken
            _ => 1,                                            // GeneralError
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Only transient backend failures qualify. A rejected token or request
    /// fails the same way every time.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Error::BackendUnavailable(_))
    }
}

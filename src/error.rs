//! Error types.
//!
//! Configuration and authentication failures abort a run. Analysis failures
//! are scoped to a single batch and end up in the report instead.

use std::path::PathBuf;
use thiserror::Error;

/// A missing or invalid configuration value. Always reported before any
/// network call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "Missing environment variable $EMAIL, which should be the main participant \
         in the calendar entries to look at"
    )]
    MissingEmail,

    #[error("Missing credentials path: set $GOOGLE_CREDS_PATH or [google].credentials_path")]
    MissingCredentialsPath,

    #[error("Missing credentials: {}", .0.display())]
    CredentialsNotFound(PathBuf),

    #[error("Missing API key: set $GEMINI_API_KEY or [model].api_key")]
    MissingApiKey,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("Authentication failed: {0}. Delete the cached token file and run again to re-authorize.")]
    Authentication(String),

    #[error("Analysis unavailable: {0}")]
    AnalysisUnavailable(String),

    #[error("Provider API error: {0}")]
    Provider(String),

    #[error("Notes error: {0}")]
    Notes(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AppError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Configuration(_) => 2,
            AppError::Authentication(_) => 3,
            _ => 1,
        }
    }
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, AppError>;

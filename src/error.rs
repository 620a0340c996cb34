//! Error types and exit codes for pinstream

use std::process::ExitCode;
use thiserror::Error;

/// Main error type for pinstream operations
#[derive(Error, Debug)]
pub enum PinstreamError {
    #[error("Registry error: {message}")]
    Registry { message: String },

    #[error("Connection registration failed for {connection_id}: {message}")]
    Registration {
        connection_id: String,
        message: String,
    },

    #[error("Malformed change: {reason}")]
    MalformedChange { reason: String },

    #[error("Invalid selection: {message}")]
    Selection { message: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Pin API error: {0}")]
    Api(#[from] crate::client::ApiError),

    #[error("Push channel error: {message}")]
    Channel { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PinstreamError {
    /// Convert error to appropriate exit code:
    /// - 1: IO error
    /// - 2: Invalid configuration
    /// - 3: Registry unavailable
    /// - 4: Malformed input
    /// - 5: Remote collaborator failure
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io(_) => ExitCode::from(1),
            Self::Config { .. } => ExitCode::from(2),
            Self::Registry { .. } | Self::Registration { .. } => ExitCode::from(3),
            Self::MalformedChange { .. } | Self::Selection { .. } | Self::Json(_) => {
                ExitCode::from(4)
            }
            Self::Api(_) | Self::Channel { .. } => ExitCode::from(5),
        }
    }
}

impl From<rusqlite::Error> for PinstreamError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Registry {
            message: e.to_string(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for PinstreamError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Channel {
            message: e.to_string(),
        }
    }
}

/// Result type alias for pinstream operations
pub type Result<T> = std::result::Result<T, PinstreamError>;

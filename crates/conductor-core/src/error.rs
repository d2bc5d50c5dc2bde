//! Error types for conductor core

use thiserror::Error;

/// Core error type shared by the manager, registry and command surface.
#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("{0} not initialized")]
    NotInitialized(&'static str),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Vault error: {0}")]
    Vault(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConductorError {
    /// Stable machine-readable code used across the IPC boundary.
    pub fn code(&self) -> &'static str {
        match self {
            ConductorError::NotInitialized(_) => "NOT_INITIALIZED",
            ConductorError::NotFound(_) => "NOT_FOUND",
            ConductorError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            ConductorError::UnknownProvider(_) => "UNKNOWN_PROVIDER",
            ConductorError::Vault(_) => "VAULT_ERROR",
            ConductorError::Io(_) => "IO_ERROR",
            ConductorError::Json(_) => "JSON_ERROR",
        }
    }
}

/// Result type alias for conductor operations
pub type Result<T> = std::result::Result<T, ConductorError>;

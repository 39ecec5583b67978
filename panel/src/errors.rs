//! Error types for the dockyard panel

use thiserror::Error;

/// Main error type for the dockyard panel
#[derive(Error, Debug)]
pub enum DockyardError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Unknown deployment id on a lookup or control operation
    #[error("Deployment not found: {0}")]
    NotFound(String),

    /// An external command (git, tar, pack) failed or could not be spawned.
    /// `detail` carries the tool's diagnostic output with credentials redacted.
    #[error("{tool} failed: {detail}")]
    ExternalTool { tool: String, detail: String },

    #[error("Container engine error: {0}")]
    EngineError(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DockyardError {
    pub fn external_tool(tool: impl Into<String>, detail: impl Into<String>) -> Self {
        DockyardError::ExternalTool {
            tool: tool.into(),
            detail: detail.into(),
        }
    }
}

//! Error types for deskpilot
//!
//! Centralized error handling using thiserror. Per-step capability failures
//! are not errors at this level: they become failed observations (see
//! `tools::ToolFailure`).

use thiserror::Error;

/// All error types that can occur in deskpilot
#[derive(Debug, Error)]
pub enum PilotError {
    /// Configuration could not be found or parsed
    #[error("Config error: {0}")]
    Config(String),

    /// Guardrail evaluation error
    #[error("Policy error: {0}")]
    Policy(String),

    /// Journal read/append error
    #[error("Journal error: {0}")]
    Journal(String),

    /// Planner collaborator error
    #[error("Planner error: {0}")]
    Planner(String),

    /// Capability execution error
    #[error("Tool error: {0}")]
    Tool(String),

    /// Caller supplied malformed input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for deskpilot operations
pub type Result<T> = std::result::Result<T, PilotError>;

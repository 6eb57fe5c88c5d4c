//! Error types for the agent orchestrator
//!
//! Only backend failures travel between pipeline stages as `Err`. Planning,
//! validation, dispatch and capability failures are turned into data (an
//! empty plan or a per-step error result) where they are detected.

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Model Backend Errors
    // =============================

    #[error("No model backend available: {0}")]
    BackendUnavailable(String),

    #[error("Rate limited by model backend: {0}")]
    RateLimited(String),

    #[error("Model backend still rate limited after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    #[error("LLM error: {0}")]
    LlmError(String),

    // =============================
    // Tool Errors
    // =============================

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Capability '{name}' is already registered")]
    DuplicateCapability { name: String },

    // =============================
    // Setup Errors
    // =============================

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// True for failures of the model backend itself (the only class that
    /// crosses component boundaries).
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable(_)
                | Self::RateLimited(_)
                | Self::RateLimitExceeded { .. }
                | Self::LlmError(_)
                | Self::HttpError(_)
        )
    }
}

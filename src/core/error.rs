//! Custom error types for qa-pilot
//!
//! One error enum for the whole crate; run-level failures carry their message
//! into the crash record.

use thiserror::Error;

/// Main error type for qa-pilot operations
#[derive(Error, Debug)]
pub enum PilotError {
    /// Decision oracle connection or API errors
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// Model not available on the oracle backend
    #[error("Model '{model}' is not available from {provider}")]
    ModelNotFound { provider: String, model: String },

    /// Browser launch, navigation or page-level errors
    #[error("Browser error: {0}")]
    Browser(String),

    /// Locator resolution found nothing for the target
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Every interaction tier was rejected by the page
    #[error("Interaction failed: {0}")]
    Interaction(String),

    /// A page operation exceeded its deadline
    #[error("Timed out after {0}ms: {1}")]
    Timeout(u64, String),

    /// Rejected inbound trigger
    #[error("Invalid run request: {0}")]
    InvalidRequest(String),

    /// A terminal run was mutated
    #[error("Run {0} is already {1}")]
    InvalidTransition(String, String),

    /// Run record or artifact persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport failure talking to an oracle backend
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for qa-pilot operations
pub type Result<T> = std::result::Result<T, PilotError>;

impl PilotError {
    /// Create an oracle error
    pub fn oracle(msg: impl Into<String>) -> Self {
        Self::Oracle(msg.into())
    }

    pub fn model_not_found(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self::ModelNotFound {
            provider: provider.into(),
            model: model.into(),
        }
    }

    pub fn browser(msg: impl Into<String>) -> Self {
        Self::Browser(msg.into())
    }

    /// Create an interaction error
    pub fn interaction(msg: impl Into<String>) -> Self {
        Self::Interaction(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}

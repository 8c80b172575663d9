//! Error types for the labeling engine.

use labeler_cloud::CloudProviderError;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type LabelerResult<T> = Result<T, LabelerError>;

/// Errors surfaced by the registry, dispatcher and configuration.
#[derive(Debug, Error)]
pub enum LabelerError {
    /// A reconciliation request named a plugin that is not registered.
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    /// Two plugins were registered under the same name or resource kind.
    #[error("Duplicate plugin registration: {0}")]
    DuplicatePlugin(String),

    /// A plugin descriptor violates its own invariants.
    #[error("Invalid plugin {name}: {reason}")]
    InvalidPlugin { name: String, reason: String },

    /// Startup or request-handling configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An inbound message could not be decoded.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Cloud API failure.
    #[error("Provider error: {0}")]
    Provider(#[from] CloudProviderError),

    /// Configuration file could not be parsed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LabelerError {
    /// Shorthand for a [`LabelerError::Configuration`] error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Shorthand for a [`LabelerError::InvalidPayload`] error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }
}

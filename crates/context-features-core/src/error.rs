//! Error types for context-features-core.
//!
//! The taxonomy follows how each failure is surfaced to callers:
//!
//! - `Validation`: malformed identifiers or frames, raised before any I/O
//! - `NotFound`: unknown feature or missing persisted context
//! - `BackendUnavailable`: missing relation, unreachable cache, engine error
//! - `ComputeFailed`: a feature function failed and no default was declared
//! - `Persistence`: a write that lost data

use thiserror::Error;

/// Top-level error type for context-features-core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("Backend unavailable ({backend}): {message}")]
    BackendUnavailable { backend: String, message: String },

    #[error("Compute failed for feature '{feature}': {message}")]
    ComputeFailed { feature: String, message: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn feature_not_found(name: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind: "Feature",
            name: name.into(),
        }
    }

    pub fn context_not_found(id: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind: "Context",
            name: id.into(),
        }
    }

    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::BackendUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Whether this error belongs to the validation class.
    ///
    /// Validation errors are raised before any I/O and abort bulk calls.
    #[inline]
    pub fn is_validation(&self) -> bool {
        matches!(self, CoreError::Validation { .. })
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

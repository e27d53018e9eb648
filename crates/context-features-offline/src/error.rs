//! Error types for the offline join engine.

use context_features_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OfflineError {
    #[error("Invalid feature name: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid value in column '{column}': {message}")]
    InvalidValue { column: String, message: String },

    #[error("Failed to open SQLite database at '{path}': {message}")]
    OpenFailed { path: String, message: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<OfflineError> for CoreError {
    fn from(e: OfflineError) -> Self {
        match e {
            OfflineError::InvalidIdentifier(_) => CoreError::validation("feature_name", e.to_string()),
            OfflineError::InvalidValue { ref column, .. } => {
                CoreError::validation(column.clone(), e.to_string())
            }
            OfflineError::OpenFailed { .. } | OfflineError::Sqlite(_) => {
                CoreError::backend("sqlite", e.to_string())
            }
            OfflineError::Internal(message) => CoreError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_identifier_is_validation() {
        let err: CoreError = OfflineError::InvalidIdentifier("1bad".into()).into();
        assert!(err.is_validation());
        assert!(err.to_string().contains("1bad"));
    }

    #[test]
    fn test_sqlite_error_is_backend_unavailable() {
        let err: CoreError = OfflineError::Sqlite(rusqlite::Error::InvalidQuery).into();
        assert!(matches!(err, CoreError::BackendUnavailable { .. }));
    }
}

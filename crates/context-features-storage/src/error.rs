//! Error types for the lineage store.
//!
//! Every error carries the operation, column family and key involved.

use context_features_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("RocksDB {operation} failed on CF '{cf}' with key '{key:?}': {source}")]
    RocksDbOperation {
        operation: &'static str,
        cf: &'static str,
        key: Option<String>,
        #[source]
        source: rocksdb::Error,
    },

    #[error("Failed to open RocksDB at '{path}': {message}")]
    OpenFailed { path: String, message: String },

    #[error("Column family '{name}' not found in database")]
    ColumnFamilyNotFound { name: String },

    #[error("Serialization error for {type_name}: {message}")]
    Serialization {
        type_name: &'static str,
        message: String,
    },

    #[error("Deserialization error for key '{key}' in CF '{cf}': {message}")]
    Deserialization {
        cf: &'static str,
        key: String,
        message: String,
    },

    #[error("Malformed key in CF '{cf}': {len} bytes")]
    MalformedKey { cf: &'static str, len: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    pub fn rocksdb_op(
        operation: &'static str,
        cf: &'static str,
        key: Option<&str>,
        source: rocksdb::Error,
    ) -> Self {
        Self::RocksDbOperation {
            operation,
            cf,
            key: key.map(str::to_string),
            source,
        }
    }
}

impl From<StorageError> for CoreError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::OpenFailed { .. } | StorageError::ColumnFamilyNotFound { .. } => {
                CoreError::backend("rocksdb", e.to_string())
            }
            StorageError::Serialization { .. } | StorageError::Deserialization { .. } => {
                CoreError::Serialization(e.to_string())
            }
            _ => CoreError::Persistence(e.to_string()),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

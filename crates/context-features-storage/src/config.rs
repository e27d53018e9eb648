//! Configuration for the RocksDB lineage store.
//!
//! | Setting | Default |
//! |---------|---------|
//! | `block_cache_size` | 64MB |
//! | `max_open_files` | 1000 |
//! | `enable_wal` | true |
//! | `create_if_missing` | true |
//!
//! ```rust
//! use context_features_storage::RocksDbConfig;
//!
//! let config = RocksDbConfig::default();
//! assert_eq!(config.block_cache_size, 64 * 1024 * 1024);
//! assert!(config.enable_wal);
//! ```

use context_features_core::config::LineageStoreConfig;

/// Default block cache size: 64MB.
pub const DEFAULT_CACHE_SIZE: usize = 64 * 1024 * 1024;

/// Default maximum open files: 1000.
///
/// Linux often ships a 1024 descriptor ulimit, so this leaves headroom.
pub const DEFAULT_MAX_OPEN_FILES: i32 = 1000;

#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Shared LRU cache for data blocks across all column families.
    pub block_cache_size: usize,
    pub max_open_files: i32,
    /// When disabled, writes skip the WAL and recent contexts may be lost on
    /// crash.
    pub enable_wal: bool,
    /// If false, opening a missing database fails with `OpenFailed`.
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            block_cache_size: DEFAULT_CACHE_SIZE,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
            enable_wal: true,
            create_if_missing: true,
        }
    }
}

impl From<&LineageStoreConfig> for RocksDbConfig {
    fn from(config: &LineageStoreConfig) -> Self {
        Self {
            block_cache_size: config.block_cache_size,
            max_open_files: config.max_open_files,
            enable_wal: config.enable_wal,
            create_if_missing: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_lineage_store_config() {
        let lineage = LineageStoreConfig {
            backend: "rocksdb".into(),
            path: "/tmp/ctx".into(),
            block_cache_size: 1024,
            max_open_files: 64,
            enable_wal: false,
        };
        let config = RocksDbConfig::from(&lineage);
        assert_eq!(config.block_cache_size, 1024);
        assert_eq!(config.max_open_files, 64);
        assert!(!config.enable_wal);
        assert!(config.create_if_missing);
    }
}

//! RocksDB-backed context lineage log.
//!
//! Writes go to three column families in one atomic batch: the full record,
//! its list projection and a time-index entry. Listing scans the time index
//! newest-first and reads only projections, never content.
//!
//! Point reads and writes run inline; range scans run under
//! `spawn_blocking`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rocksdb::{Cache, ColumnFamily, Direction, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use tracing::{debug, error, info, info_span, warn, Span};

use context_features_core::config::LineageStoreConfig;
use context_features_core::error::CoreResult;
use context_features_core::traits::{ContextLogStore, SnapshotStore};
use context_features_core::types::{
    ContextMetaProjection, ContextQuery, ContextRecord, ContextSummary, RetrieverSnapshot,
};

use crate::column_families::{cf_names, get_column_family_descriptors};
use crate::config::RocksDbConfig;
use crate::error::{StorageError, StorageResult};
use crate::keys::{parse_temporal_key, reverse_seek_key, scan_floor, temporal_key};

fn get_cf<'a>(db: &'a DB, name: &str) -> StorageResult<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| StorageError::ColumnFamilyNotFound {
            name: name.to_string(),
        })
}

/// RocksDB implementation of [`ContextLogStore`] and [`SnapshotStore`].
///
/// # Thread Safety
/// RocksDB's `DB` is internally synchronized; share the store via `Arc`.
/// Record writes additionally serialize on `write_lock` because re-logging
/// reads the previous time-index key before replacing it.
///
/// # Example
/// ```rust,ignore
/// use context_features_storage::RocksDbContextStore;
/// use tempfile::TempDir;
///
/// let tmp = TempDir::new().unwrap();
/// let store = RocksDbContextStore::open(tmp.path()).unwrap();
/// assert!(store.health_check().is_ok());
/// ```
pub struct RocksDbContextStore {
    db: Arc<DB>,
    /// Shared block cache (kept alive for DB lifetime).
    #[allow(dead_code)]
    cache: Cache,
    path: PathBuf,
    enable_wal: bool,
    write_lock: Mutex<()>,
    span: Span,
}

impl RocksDbContextStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::open_with_config(path, RocksDbConfig::default())
    }

    /// Open the store described by the `lineage_store` config section.
    pub fn from_config(config: &LineageStoreConfig) -> StorageResult<Self> {
        Self::open_with_config(&config.path, RocksDbConfig::from(config))
    }

    /// Open with custom configuration. Missing column families are created.
    ///
    /// # Errors
    /// `StorageError::OpenFailed` if the path is invalid, missing with
    /// `create_if_missing = false`, or locked by another process.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: RocksDbConfig) -> StorageResult<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let path_str = path_buf.to_string_lossy().to_string();

        info!(
            "Opening RocksDbContextStore at '{}' with cache_size={}MB",
            path_str,
            config.block_cache_size / (1024 * 1024)
        );

        let cache = Cache::new_lru_cache(config.block_cache_size);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(config.create_if_missing);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);

        let cf_descriptors = get_column_family_descriptors(&cache);
        let db = DB::open_cf_descriptors(&db_opts, &path_str, cf_descriptors).map_err(|e| {
            error!("Failed to open RocksDB at '{}': {}", path_str, e);
            StorageError::OpenFailed {
                path: path_str.clone(),
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            db: Arc::new(db),
            cache,
            path: path_buf,
            enable_wal: config.enable_wal,
            write_lock: Mutex::new(()),
            span: info_span!("context_store", backend = "rocksdb"),
        })
    }

    /// Replace the span that store events are emitted under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verify every column family is accessible.
    pub fn health_check(&self) -> StorageResult<()> {
        for name in cf_names::ALL {
            get_cf(&self.db, name)?;
        }
        Ok(())
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.disable_wal(!self.enable_wal);
        opts
    }

    /// Insert or replace a record.
    ///
    /// Re-logging an id moves its time-index entry to the new timestamp.
    pub fn write_record(&self, record: &ContextRecord) -> StorageResult<()> {
        let id = record.context_id.as_str();
        let cf_log = get_cf(&self.db, cf_names::CONTEXT_LOG)?;
        let cf_meta = get_cf(&self.db, cf_names::CONTEXT_META)?;
        let cf_time = get_cf(&self.db, cf_names::CONTEXT_BY_TIME)?;

        let projection = record.meta_projection();
        let record_bytes = serde_json::to_vec(record).map_err(|e| StorageError::Serialization {
            type_name: "ContextRecord",
            message: e.to_string(),
        })?;
        let meta_bytes =
            serde_json::to_vec(&projection).map_err(|e| StorageError::Serialization {
                type_name: "ContextMetaProjection",
                message: e.to_string(),
            })?;

        let _guard = self.write_lock.lock();
        let mut batch = WriteBatch::default();
        let time_key = temporal_key(record.timestamp, id);
        if let Some(previous) = self.read_projection(id)? {
            let old_key = temporal_key(previous.timestamp, id);
            if old_key != time_key {
                batch.delete_cf(cf_time, &old_key);
            }
        }
        batch.put_cf(cf_log, id.as_bytes(), &record_bytes);
        batch.put_cf(cf_meta, id.as_bytes(), &meta_bytes);
        batch.put_cf(cf_time, &time_key, b"");

        self.db
            .write_opt(batch, &self.write_options())
            .map_err(|e| StorageError::rocksdb_op("write_batch", cf_names::CONTEXT_LOG, Some(id), e))?;

        debug!(parent: &self.span, "Stored context {} ({} bytes)", id, record_bytes.len());
        Ok(())
    }

    pub fn read_record(&self, context_id: &str) -> StorageResult<Option<ContextRecord>> {
        let cf = get_cf(&self.db, cf_names::CONTEXT_LOG)?;
        let bytes = self
            .db
            .get_cf(cf, context_id.as_bytes())
            .map_err(|e| StorageError::rocksdb_op("get", cf_names::CONTEXT_LOG, Some(context_id), e))?;
        bytes
            .map(|b| {
                serde_json::from_slice(&b).map_err(|e| StorageError::Deserialization {
                    cf: cf_names::CONTEXT_LOG,
                    key: context_id.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    fn read_projection(&self, context_id: &str) -> StorageResult<Option<ContextMetaProjection>> {
        read_projection(&self.db, context_id)
    }

    /// Newest-first summaries matching `query`.
    pub async fn scan(&self, query: ContextQuery) -> StorageResult<Vec<ContextSummary>> {
        let db = Arc::clone(&self.db);
        let span = self.span.clone();
        tokio::task::spawn_blocking(move || scan_summaries(&db, &query, &span))
            .await
            .map_err(|e| StorageError::Internal(format!("scan task failed: {}", e)))?
    }

    pub fn write_snapshot(&self, snapshot: &RetrieverSnapshot) -> StorageResult<()> {
        let id = snapshot.snapshot_id.as_str();
        let cf = get_cf(&self.db, cf_names::RETRIEVER_SNAPSHOTS)?;
        let bytes = serde_json::to_vec(snapshot).map_err(|e| StorageError::Serialization {
            type_name: "RetrieverSnapshot",
            message: e.to_string(),
        })?;
        self.db
            .put_cf_opt(cf, id.as_bytes(), &bytes, &self.write_options())
            .map_err(|e| {
                StorageError::rocksdb_op("put", cf_names::RETRIEVER_SNAPSHOTS, Some(id), e)
            })
    }

    pub fn read_snapshot(&self, snapshot_id: &str) -> StorageResult<Option<RetrieverSnapshot>> {
        let cf = get_cf(&self.db, cf_names::RETRIEVER_SNAPSHOTS)?;
        let bytes = self.db.get_cf(cf, snapshot_id.as_bytes()).map_err(|e| {
            StorageError::rocksdb_op("get", cf_names::RETRIEVER_SNAPSHOTS, Some(snapshot_id), e)
        })?;
        bytes
            .map(|b| {
                serde_json::from_slice(&b).map_err(|e| StorageError::Deserialization {
                    cf: cf_names::RETRIEVER_SNAPSHOTS,
                    key: snapshot_id.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()
    }
}

fn read_projection(db: &DB, context_id: &str) -> StorageResult<Option<ContextMetaProjection>> {
    let cf = get_cf(db, cf_names::CONTEXT_META)?;
    let bytes = db
        .get_cf(cf, context_id.as_bytes())
        .map_err(|e| StorageError::rocksdb_op("get", cf_names::CONTEXT_META, Some(context_id), e))?;
    bytes
        .map(|b| {
            serde_json::from_slice(&b).map_err(|e| StorageError::Deserialization {
                cf: cf_names::CONTEXT_META,
                key: context_id.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

/// Reverse scan of the time index from `query.end` down to `query.start`.
///
/// Unreadable projections are skipped with an error log, as are index
/// entries whose millisecond no longer matches the projection's timestamp.
fn scan_summaries(db: &DB, query: &ContextQuery, span: &Span) -> StorageResult<Vec<ContextSummary>> {
    let mut summaries = Vec::new();
    if query.limit == 0 {
        return Ok(summaries);
    }

    let cf_time = get_cf(db, cf_names::CONTEXT_BY_TIME)?;
    let seek = query.end.map(reverse_seek_key);
    let mode = match &seek {
        Some(key) => IteratorMode::From(key.as_slice(), Direction::Reverse),
        None => IteratorMode::End,
    };
    let floor = query.start.map(scan_floor);

    for item in db.iterator_cf(cf_time, mode) {
        let (key, _) = item.map_err(|e| {
            StorageError::rocksdb_op("iterate", cf_names::CONTEXT_BY_TIME, None, e)
        })?;
        let (millis, id) = parse_temporal_key(&key).ok_or(StorageError::MalformedKey {
            cf: cf_names::CONTEXT_BY_TIME,
            len: key.len(),
        })?;
        if floor.is_some_and(|f| millis < f) {
            break;
        }

        let projection = match read_projection(db, id) {
            Ok(Some(p)) => p,
            Ok(None) => {
                warn!(parent: span, "Time index points at missing context {}", id);
                continue;
            }
            Err(e @ StorageError::Deserialization { .. }) => {
                error!(parent: span, "METADATA CORRUPTION: skipping context {}: {}", id, e);
                continue;
            }
            Err(e) => return Err(e),
        };

        if projection.timestamp.timestamp_millis() != millis {
            warn!(parent: span, "Skipping stale time index entry for context {}", id);
            continue;
        }

        if query.contains_time(projection.timestamp) && projection.matches(query) {
            summaries.push(projection.to_summary());
            if summaries.len() >= query.limit {
                break;
            }
        }
    }

    debug!(parent: span, "Listed {} contexts", summaries.len());
    Ok(summaries)
}

#[async_trait]
impl ContextLogStore for RocksDbContextStore {
    async fn log(&self, record: ContextRecord) -> CoreResult<()> {
        self.write_record(&record).map_err(|e| {
            error!(parent: &self.span, "Failed to log context {}: {}", record.context_id, e);
            e.into()
        })
    }

    async fn get(&self, context_id: &str) -> Option<ContextRecord> {
        match self.read_record(context_id) {
            Ok(record) => record,
            Err(e) => {
                error!(parent: &self.span, "Failed to read context {}: {}", context_id, e);
                None
            }
        }
    }

    async fn list(&self, query: ContextQuery) -> Vec<ContextSummary> {
        match self.scan(query).await {
            Ok(summaries) => summaries,
            Err(e) => {
                error!(parent: &self.span, "Failed to list contexts: {}", e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl SnapshotStore for RocksDbContextStore {
    async fn save_snapshot(&self, snapshot: RetrieverSnapshot) -> CoreResult<()> {
        self.write_snapshot(&snapshot).map_err(|e| {
            error!(parent: &self.span, "Failed to save snapshot {}: {}", snapshot.snapshot_id, e);
            e.into()
        })
    }

    async fn get_snapshot(&self, snapshot_id: &str) -> Option<RetrieverSnapshot> {
        match self.read_snapshot(snapshot_id) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(parent: &self.span, "Failed to read snapshot {}: {}", snapshot_id, e);
                None
            }
        }
    }
}

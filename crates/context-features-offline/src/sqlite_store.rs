//! SQLite implementation of the offline store.
//!
//! One connection behind a `parking_lot::Mutex`; every statement runs under
//! `spawn_blocking`, so concurrent joins queue at the connection rather than
//! blocking the runtime.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde_json::Value;
use tracing::{debug, error, info, info_span, warn, Span};

use context_features_core::config::OfflineConfig;
use context_features_core::error::{CoreError, CoreResult};
use context_features_core::traits::OfflineStore;
use context_features_core::types::{cell_timestamp, FeatureValue, Frame};

use crate::convert::{cell_key, cell_micros, datetime_micros, from_sql_value, to_sql_value};
use crate::error::OfflineError;
use crate::query_builder::{
    build_historical_query, build_training_query, create_feature_relation, insert_feature_row,
    is_valid_identifier, validate_identifier, ENTITY_RELATION, REQUEST_RELATION,
};

/// Path that opens a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Offline store over an embedded SQLite database.
///
/// Feature relations have the shape `f(entity_id TEXT, timestamp INTEGER, f)`
/// with timestamps in epoch microseconds.
pub struct SqliteOfflineStore {
    conn: Arc<Mutex<Connection>>,
    path: String,
    span: Span,
}

impl SqliteOfflineStore {
    /// Open the database at `path`, or an in-memory one for `:memory:`.
    pub fn open(path: &str) -> Result<Self, OfflineError> {
        let conn = if path == IN_MEMORY {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| OfflineError::OpenFailed {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        let span = info_span!("offline_store", backend = "sqlite");
        info!(parent: &span, "Opened SQLite offline store at '{}'", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_string(),
            span,
        })
    }

    pub fn in_memory() -> Result<Self, OfflineError> {
        Self::open(IN_MEMORY)
    }

    pub fn from_config(config: &OfflineConfig) -> Result<Self, OfflineError> {
        Self::open(&config.database)
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_connection<T, F>(&self, f: F) -> Result<T, OfflineError>
    where
        F: FnOnce(&mut Connection) -> Result<T, OfflineError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| OfflineError::Internal(format!("blocking task failed: {}", e)))?
    }
}

/// Load `keys` into the entity relation and run `sql` against it.
///
/// Returns one row of feature values per key, in key order. A `None` id or
/// timestamp binds NULL, which matches no feature row.
fn run_training_join(
    conn: &mut Connection,
    sql: &str,
    keys: &[(Option<String>, Option<i64>)],
    feature_count: usize,
) -> Result<Vec<Vec<Value>>, OfflineError> {
    conn.execute_batch(&format!(
        "CREATE TEMP TABLE IF NOT EXISTS {ENTITY_RELATION} \
         (__row_id INTEGER PRIMARY KEY, entity_id TEXT, ts INTEGER)"
    ))?;

    let tx = conn.transaction()?;
    tx.execute(&format!("DELETE FROM {ENTITY_RELATION}"), [])?;
    {
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {ENTITY_RELATION} (__row_id, entity_id, ts) VALUES (?1, ?2, ?3)"
        ))?;
        for (row_id, (entity_id, micros)) in keys.iter().enumerate() {
            insert.execute(params![row_id as i64, entity_id, micros])?;
        }
    }

    let mut results = Vec::with_capacity(keys.len());
    {
        let mut stmt = tx.prepare(sql)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(feature_count);
            for i in 0..feature_count {
                values.push(from_sql_value(row.get_ref(i + 1)?));
            }
            results.push(values);
        }
    }
    tx.execute(&format!("DELETE FROM {ENTITY_RELATION}"), [])?;
    tx.commit()?;
    Ok(results)
}

fn run_historical_lookup(
    conn: &mut Connection,
    sql: &str,
    entity_id: &str,
    micros: i64,
    feature_count: usize,
) -> Result<Vec<Value>, OfflineError> {
    conn.execute_batch(&format!(
        "CREATE TEMP TABLE IF NOT EXISTS {REQUEST_RELATION} (entity_id TEXT, ts INTEGER)"
    ))?;

    let tx = conn.transaction()?;
    tx.execute(&format!("DELETE FROM {REQUEST_RELATION}"), [])?;
    tx.execute(
        &format!("INSERT INTO {REQUEST_RELATION} (entity_id, ts) VALUES (?1, ?2)"),
        params![entity_id, micros],
    )?;
    let values = tx.query_row(sql, [], |row| {
        (0..feature_count)
            .map(|i| row.get_ref(i).map(from_sql_value))
            .collect::<Result<Vec<_>, _>>()
    })?;
    tx.execute(&format!("DELETE FROM {REQUEST_RELATION}"), [])?;
    tx.commit()?;
    Ok(values)
}

fn run_query(conn: &mut Connection, sql: &str) -> Result<Frame, OfflineError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
    let width = columns.len();
    let mut frame = Frame::new(columns);
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(from_sql_value(row.get_ref(i)?));
        }
        frame
            .push_row(values)
            .map_err(|e| OfflineError::Internal(e.to_string()))?;
    }
    Ok(frame)
}

fn append_rows(
    conn: &mut Connection,
    feature: &str,
    rows: &[(String, i64, rusqlite::types::Value)],
) -> Result<usize, OfflineError> {
    conn.execute_batch(&create_feature_relation(feature)?)?;
    let tx = conn.transaction()?;
    {
        let mut insert = tx.prepare(&insert_feature_row(feature)?)?;
        for (entity_id, micros, value) in rows {
            insert.execute(params![entity_id, micros, value])?;
        }
    }
    tx.commit()?;
    Ok(rows.len())
}

#[async_trait]
impl OfflineStore for SqliteOfflineStore {
    async fn get_training_data(
        &self,
        entity_frame: Frame,
        feature_names: &[String],
        entity_id_column: &str,
        timestamp_column: &str,
    ) -> CoreResult<Frame> {
        for name in feature_names {
            validate_identifier(name)?;
        }
        if feature_names.is_empty() {
            return Ok(entity_frame);
        }

        let id_idx = entity_frame.require_column(entity_id_column)?;
        let ts_idx = entity_frame.require_column(timestamp_column)?;
        let mut unreadable = 0usize;
        let keys: Vec<(Option<String>, Option<i64>)> = entity_frame
            .rows()
            .iter()
            .map(|row| {
                let (id_cell, ts_cell) = (&row[id_idx], &row[ts_idx]);
                let id = cell_key(id_cell, entity_id_column).ok().flatten();
                let micros = cell_timestamp(ts_cell).map(datetime_micros);
                let bad_id = id.is_none() && !id_cell.is_null();
                let bad_ts = micros.is_none() && !ts_cell.is_null();
                if bad_id || bad_ts {
                    unreadable += 1;
                }
                (id, micros)
            })
            .collect();
        if unreadable > 0 {
            warn!(
                parent: &self.span,
                "{} entity rows have unreadable '{}' or '{}' cells; their features will be null",
                unreadable,
                entity_id_column,
                timestamp_column
            );
        }

        let sql = build_training_query(feature_names)?;
        let feature_count = feature_names.len();
        let row_count = keys.len();
        let joined = self
            .with_connection(move |conn| run_training_join(conn, &sql, &keys, feature_count))
            .await;

        let joined = match joined {
            Ok(rows) if rows.len() == row_count => rows,
            Ok(rows) => {
                warn!(
                    parent: &self.span,
                    "Point-in-time join returned {} rows for {} entities; returning entity frame unchanged",
                    rows.len(),
                    row_count
                );
                return Ok(entity_frame);
            }
            Err(e) => {
                warn!(
                    parent: &self.span,
                    "Point-in-time join failed, returning entity frame unchanged: {}", e
                );
                return Ok(entity_frame);
            }
        };

        let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(row_count); feature_count];
        for row in joined {
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value);
            }
        }
        let mut frame = entity_frame;
        for (name, values) in feature_names.iter().zip(columns) {
            frame = frame.with_column(name.clone(), values)?;
        }
        debug!(
            parent: &self.span,
            "Joined {} features onto {} rows", feature_count, row_count
        );
        Ok(frame)
    }

    async fn get_historical_features(
        &self,
        entity_name: &str,
        entity_id: &str,
        feature_names: &[String],
        timestamp: DateTime<Utc>,
    ) -> HashMap<String, FeatureValue> {
        if feature_names.is_empty() {
            return HashMap::new();
        }

        let valid: Vec<&str> = feature_names
            .iter()
            .map(String::as_str)
            .filter(|name| {
                let ok = is_valid_identifier(name);
                if !ok {
                    warn!(parent: &self.span, "Skipping invalid feature name '{}'", name);
                }
                ok
            })
            .collect();
        if valid.is_empty() {
            return HashMap::new();
        }

        let sql = match build_historical_query(&valid) {
            Ok(sql) => sql,
            Err(e) => {
                warn!(parent: &self.span, "Historical lookup not built: {}", e);
                return HashMap::new();
            }
        };
        let id = entity_id.to_string();
        let count = valid.len();
        let micros = datetime_micros(timestamp);
        let result = self
            .with_connection(move |conn| run_historical_lookup(conn, &sql, &id, micros, count))
            .await;

        match result {
            Ok(values) => valid
                .into_iter()
                .map(str::to_string)
                .zip(values)
                .collect(),
            Err(e) => {
                warn!(
                    parent: &self.span,
                    "Historical lookup for {}:{} failed: {}", entity_name, entity_id, e
                );
                HashMap::new()
            }
        }
    }

    async fn execute_sql(&self, sql: &str) -> CoreResult<Frame> {
        let sql = sql.to_string();
        self.with_connection(move |conn| run_query(conn, &sql))
            .await
            .map_err(|e| {
                warn!(parent: &self.span, "Query failed: {}", e);
                e.into()
            })
    }

    async fn write_feature_frame(&self, feature_name: &str, frame: &Frame) -> CoreResult<usize> {
        validate_identifier(feature_name)?;
        let id_idx = frame.require_column("entity_id")?;
        let ts_idx = frame.require_column("timestamp")?;
        let value_idx = frame.require_column(feature_name)?;

        let mut rows = Vec::with_capacity(frame.len());
        for row in frame.rows() {
            let entity_id = cell_key(&row[id_idx], "entity_id")?.ok_or_else(|| {
                CoreError::validation("entity_id", "feature rows need an entity id")
            })?;
            let micros = cell_micros(&row[ts_idx], "timestamp")?;
            rows.push((entity_id, micros, to_sql_value(&row[value_idx])));
        }

        let feature = feature_name.to_string();
        let written = self
            .with_connection(move |conn| append_rows(conn, &feature, &rows))
            .await
            .map_err(|e| {
                error!(
                    parent: &self.span,
                    "Failed to write feature relation {}: {}", feature_name, e
                );
                CoreError::Persistence(e.to_string())
            })?;
        debug!(parent: &self.span, "Wrote {} rows to {}", written, feature_name);
        Ok(written)
    }
}

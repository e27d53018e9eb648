//! SQL construction for point-in-time joins.
//!
//! Feature names become table and column identifiers, which SQLite cannot
//! bind as parameters. Every builder here validates each name against
//! [`is_valid_identifier`] before interpolating it; values are always bound.

pub use context_features_core::identifier::is_valid_identifier;

use crate::error::OfflineError;

/// Temp relation holding the entity frame: `(__row_id, entity_id, ts)`.
pub const ENTITY_RELATION: &str = "__entity_df";

/// Temp one-row relation for single-entity lookups: `(entity_id, ts)`.
pub const REQUEST_RELATION: &str = "__request";

pub fn validate_identifier(name: &str) -> Result<(), OfflineError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(OfflineError::InvalidIdentifier(name.to_string()))
    }
}

/// Latest value of `feature` at or before `{outer}.ts` for `{outer}.entity_id`.
///
/// Ties on timestamp resolve to the most recently inserted row.
fn as_of_subquery(feature: &str, outer: &str) -> String {
    format!(
        "(SELECT f.{feature} FROM {feature} f \
         WHERE CAST(f.entity_id AS TEXT) = {outer}.entity_id AND f.timestamp <= {outer}.ts \
         ORDER BY f.timestamp DESC, f.rowid DESC LIMIT 1)"
    )
}

/// AS-OF left join of the entity relation against every feature relation.
///
/// Selects `__row_id` followed by one column per feature, in order.
pub fn build_training_query(features: &[String]) -> Result<String, OfflineError> {
    let mut columns = vec!["e.__row_id".to_string()];
    for feature in features {
        validate_identifier(feature)?;
        columns.push(format!("{} AS {}", as_of_subquery(feature, "e"), feature));
    }
    Ok(format!(
        "SELECT {} FROM {} e ORDER BY e.__row_id",
        columns.join(", "),
        ENTITY_RELATION
    ))
}

/// AS-OF lookup against the one-row request relation.
///
/// Callers filter out invalid names first; any left over fail here.
pub fn build_historical_query(features: &[&str]) -> Result<String, OfflineError> {
    let mut columns = Vec::with_capacity(features.len());
    for feature in features {
        validate_identifier(feature)?;
        columns.push(format!("{} AS {}", as_of_subquery(feature, "r"), feature));
    }
    Ok(format!(
        "SELECT {} FROM {} r",
        columns.join(", "),
        REQUEST_RELATION
    ))
}

/// DDL for a feature relation and its `(entity_id, timestamp)` index.
pub fn create_feature_relation(feature: &str) -> Result<String, OfflineError> {
    validate_identifier(feature)?;
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {feature} (entity_id TEXT NOT NULL, timestamp INTEGER NOT NULL, {feature}); \
         CREATE INDEX IF NOT EXISTS {feature}__entity_ts ON {feature} (entity_id, timestamp);"
    ))
}

pub fn insert_feature_row(feature: &str) -> Result<String, OfflineError> {
    validate_identifier(feature)?;
    Ok(format!(
        "INSERT INTO {feature} (entity_id, timestamp, {feature}) VALUES (?1, ?2, ?3)"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injection_names_never_reach_sql() {
        for bad in ["x; DROP TABLE y", "a--", "quote\"d", "unicodé"] {
            assert!(build_training_query(&[bad.to_string()]).is_err(), "{:?}", bad);
            assert!(build_historical_query(&[bad]).is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn test_training_query_shape() {
        let sql = build_training_query(&["clicks".to_string(), "tier".to_string()]).unwrap();
        assert!(sql.starts_with("SELECT e.__row_id, (SELECT f.clicks FROM clicks f"));
        assert!(sql.contains("AS tier"));
        assert!(sql.contains("f.timestamp <= e.ts"));
        assert!(sql.ends_with("FROM __entity_df e ORDER BY e.__row_id"));
    }

    #[test]
    fn test_training_query_rejects_invalid_name() {
        let err = build_training_query(&["ok".to_string(), "1bad".to_string()]).unwrap_err();
        assert!(matches!(err, OfflineError::InvalidIdentifier(name) if name == "1bad"));
    }

    #[test]
    fn test_historical_query_uses_request_relation() {
        let sql = build_historical_query(&["clicks"]).unwrap();
        assert!(sql.contains("CAST(f.entity_id AS TEXT) = r.entity_id"));
        assert!(sql.ends_with("FROM __request r"));
    }

    #[test]
    fn test_ddl_validates_before_interpolating() {
        assert!(create_feature_relation("x; DROP TABLE y").is_err());
        assert!(insert_feature_row("1bad").is_err());
        let ddl = create_feature_relation("clicks").unwrap();
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS clicks"));
    }
}

//! Key formatting for the time index.

use chrono::{DateTime, Utc};

/// Width of the big-endian millisecond prefix.
pub const TIME_PREFIX_LEN: usize = 8;

/// Flipping the sign bit maps signed millis onto unsigned order, so keys for
/// pre-1970 timestamps sort below the epoch.
const SIGN_BIT: u64 = 1 << 63;

#[inline]
fn encode_millis(millis: i64) -> [u8; TIME_PREFIX_LEN] {
    ((millis as u64) ^ SIGN_BIT).to_be_bytes()
}

#[inline]
fn decode_millis(prefix: [u8; TIME_PREFIX_LEN]) -> i64 {
    (u64::from_be_bytes(prefix) ^ SIGN_BIT) as i64
}

/// Format temporal index key: 8-byte sign-flipped millis (big-endian) + id bytes.
///
/// Big-endian ensures lexicographic ordering matches temporal ordering.
#[inline]
pub fn temporal_key(timestamp: DateTime<Utc>, context_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(TIME_PREFIX_LEN + context_id.len());
    key.extend_from_slice(&encode_millis(timestamp.timestamp_millis()));
    key.extend_from_slice(context_id.as_bytes());
    key
}

/// Split a temporal key into its millisecond prefix and context id.
///
/// Returns `None` for keys shorter than the prefix or with a non-UTF-8 id.
pub fn parse_temporal_key(key: &[u8]) -> Option<(i64, &str)> {
    if key.len() < TIME_PREFIX_LEN {
        return None;
    }
    let (prefix, id) = key.split_at(TIME_PREFIX_LEN);
    let millis = decode_millis(prefix.try_into().ok()?);
    let id = std::str::from_utf8(id).ok()?;
    Some((millis, id))
}

/// Seek target for a reverse scan ending at `end` inclusive.
///
/// The bare prefix of the following millisecond sorts after every key of
/// `end`'s millisecond and before any key of the next one.
pub fn reverse_seek_key(end: DateTime<Utc>) -> [u8; TIME_PREFIX_LEN] {
    encode_millis(end.timestamp_millis().saturating_add(1))
}

/// Millisecond prefix below which a scan starting at `start` can stop.
#[inline]
pub fn scan_floor(start: DateTime<Utc>) -> i64 {
    start.timestamp_millis()
}

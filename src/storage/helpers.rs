//! Shared storage helper functions.
//!
//! Timestamp conversion and snapshot window logic used across storage
//! backend implementations.

use chrono::{DateTime, Utc};

use super::{Result, StorageError};
use crate::model::TimeWindow;

/// Timestamps are persisted as milliseconds since the Unix epoch.
pub fn to_millis(at: &DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Convert stored epoch milliseconds back into a timestamp.
pub fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::Decode(format!("timestamp out of range: {millis}ms")))
}

/// Current time truncated to the persisted precision, so values read back
/// compare equal to values written.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Filter snapshots to a window and order them newest first.
///
/// Used by backends that cannot push the query down (the in-memory mock).
pub fn select_window<T, F>(
    snapshots: impl IntoIterator<Item = T>,
    window: &TimeWindow,
    updated_at: F,
) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    let mut selected: Vec<T> = snapshots
        .into_iter()
        .filter(|s| window.contains(&updated_at(s)))
        .collect();
    selected.sort_by_key(|s| std::cmp::Reverse(updated_at(s)));
    if let Some(limit) = window.limit {
        selected.truncate(limit as usize);
    }
    selected
}

/// Convert a member counter read from storage.
pub fn counter_from_i64(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StorageError::Decode(format!("{field} out of range: {value}")))
}

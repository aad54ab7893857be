//! Persistence interfaces the pipeline reads from and writes to.
//!
//! The storage engine itself is external. Anything that can insert readings,
//! query them by time range and keep two settings tables can back the
//! pipeline; [`MemoryStore`](crate::MemoryStore) is the in-process reference.

use std::time::Duration;

use aerium_types::{NewReading, Reading, SettingKey, SettingsPatch, Source, UserId, WindowStats};
use async_trait::async_trait;

use crate::error::StoreResult;

/// Half-open time window `[start_ms, end_ms)` in Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub start_ms: u64,
    pub end_ms: u64,
}

impl TimeRange {
    pub fn new(start_ms: u64, end_ms: u64) -> Self {
        Self { start_ms, end_ms }
    }

    /// Every instant.
    pub fn all() -> Self {
        Self::new(0, u64::MAX)
    }

    /// The `window` ending at `now_ms`.
    pub fn last(now_ms: u64, window: Duration) -> Self {
        let span = window.as_millis() as u64;
        Self::new(now_ms.saturating_sub(span), now_ms)
    }

    /// The window of the same length immediately before this one.
    pub fn previous(&self) -> Self {
        let span = self.end_ms - self.start_ms;
        Self::new(self.start_ms.saturating_sub(span), self.start_ms)
    }

    pub fn contains(&self, timestamp_ms: u64) -> bool {
        timestamp_ms >= self.start_ms && timestamp_ms < self.end_ms
    }

    /// Split at the midpoint into `(earlier, later)`.
    pub fn halves(&self) -> (Self, Self) {
        let mid = self.start_ms + (self.end_ms - self.start_ms) / 2;
        (Self::new(self.start_ms, mid), Self::new(mid, self.end_ms))
    }
}

/// Time-indexed reading storage.
///
/// Query results are ordered ascending by timestamp.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Persist a reading and return its id.
    async fn insert_reading(&self, reading: NewReading) -> StoreResult<u64>;

    /// Readings inside `range`, optionally restricted to one source.
    async fn query_readings(&self, range: TimeRange, source: Option<Source>) -> StoreResult<Vec<Reading>>;

    /// `{count, avg, min, max}` over `range`.
    async fn query_aggregate(&self, range: TimeRange, source: Option<Source>) -> StoreResult<WindowStats>;

    /// First and last timestamps present, as an inclusive-exclusive range.
    ///
    /// `None` when no reading matches.
    async fn time_bounds(&self, source: Option<Source>) -> StoreResult<Option<TimeRange>>;
}

/// The two settings tables: a global key/value table and one override row
/// per user.
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    /// Raw global rows. Keys outside the known set may appear and are
    /// ignored by the reader.
    async fn global_values(&self) -> StoreResult<Vec<(String, String)>>;

    /// Upsert global rows.
    async fn put_global_values(&self, values: &[(SettingKey, String)]) -> StoreResult<()>;

    /// Delete every global row.
    async fn clear_global(&self) -> StoreResult<()>;

    async fn user_row(&self, user: UserId) -> StoreResult<Option<SettingsPatch>>;

    async fn put_user_row(&self, user: UserId, row: &SettingsPatch) -> StoreResult<()>;

    /// Delete a user's override row. Returns whether one existed.
    async fn delete_user_row(&self, user: UserId) -> StoreResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_and_previous() {
        let range = TimeRange::last(10_000, Duration::from_secs(4));
        assert_eq!(range, TimeRange::new(6_000, 10_000));
        assert_eq!(range.previous(), TimeRange::new(2_000, 6_000));
    }

    #[test]
    fn range_is_half_open() {
        let range = TimeRange::new(100, 200);
        assert!(range.contains(100));
        assert!(range.contains(199));
        assert!(!range.contains(200));
    }

    #[test]
    fn last_saturates_at_epoch() {
        let range = TimeRange::last(1_000, Duration::from_secs(60));
        assert_eq!(range.start_ms, 0);
        assert_eq!(range.previous(), TimeRange::new(0, 0));
    }

    #[test]
    fn halves_split_at_midpoint() {
        let (earlier, later) = TimeRange::new(0, 101).halves();
        assert_eq!(earlier, TimeRange::new(0, 50));
        assert_eq!(later, TimeRange::new(50, 101));
    }
}

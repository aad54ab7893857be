//! In-process store backing both persistence traits.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use aerium_types::{NewReading, Reading, SettingKey, SettingsPatch, Source, UserId, WindowStats};
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::StoreResult;
use crate::store::{ReadingStore, SettingsBackend, TimeRange};

/// Thread-safe in-memory store.
///
/// Readings are kept sorted by timestamp so range queries are two binary
/// searches.
#[derive(Debug, Default)]
pub struct MemoryStore {
    readings: RwLock<Vec<Reading>>,
    next_id: AtomicU64,
    global: RwLock<BTreeMap<String, String>>,
    users: RwLock<HashMap<UserId, SettingsPatch>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored readings.
    pub fn len(&self) -> usize {
        self.readings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.read().is_empty()
    }

    /// Delete readings older than `cutoff_ms`. Returns how many were removed.
    pub fn purge_before(&self, cutoff_ms: u64) -> usize {
        let mut readings = self.readings.write();
        let split = readings.partition_point(|r| r.timestamp_ms < cutoff_ms);
        readings.drain(..split);
        if split > 0 {
            debug!(removed = split, cutoff_ms, "Purged expired readings");
        }
        split
    }

    /// Write a raw global row, bypassing key validation.
    ///
    /// Lets callers seed rows written by older deployments.
    pub fn put_raw_global(&self, key: impl Into<String>, value: impl Into<String>) {
        self.global.write().insert(key.into(), value.into());
    }

    fn select(&self, range: TimeRange, source: Option<Source>) -> Vec<Reading> {
        let readings = self.readings.read();
        let start = readings.partition_point(|r| r.timestamp_ms < range.start_ms);
        let end = readings.partition_point(|r| r.timestamp_ms < range.end_ms);
        readings[start..end.max(start)]
            .iter()
            .filter(|r| source.map_or(true, |s| r.source == s))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn insert_reading(&self, reading: NewReading) -> StoreResult<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let reading = Reading::from_new(id, reading);

        let mut readings = self.readings.write();
        // Upper bound keeps equal timestamps in insertion order.
        let at = readings.partition_point(|r| r.timestamp_ms <= reading.timestamp_ms);
        readings.insert(at, reading);
        Ok(id)
    }

    async fn query_readings(&self, range: TimeRange, source: Option<Source>) -> StoreResult<Vec<Reading>> {
        Ok(self.select(range, source))
    }

    async fn query_aggregate(&self, range: TimeRange, source: Option<Source>) -> StoreResult<WindowStats> {
        let selected = self.select(range, source);
        if selected.is_empty() {
            return Ok(WindowStats::default());
        }

        let sum: u64 = selected.iter().map(|r| u64::from(r.ppm)).sum();
        Ok(WindowStats {
            count: selected.len() as u64,
            avg: Some(sum as f64 / selected.len() as f64),
            min: selected.iter().map(|r| r.ppm).min(),
            max: selected.iter().map(|r| r.ppm).max(),
        })
    }

    async fn time_bounds(&self, source: Option<Source>) -> StoreResult<Option<TimeRange>> {
        let readings = self.readings.read();
        let mut matching = readings
            .iter()
            .filter(|r| source.map_or(true, |s| r.source == s))
            .map(|r| r.timestamp_ms);

        let Some(first) = matching.next() else {
            return Ok(None);
        };
        let last = matching.last().unwrap_or(first);
        Ok(Some(TimeRange::new(first, last.saturating_add(1))))
    }
}

#[async_trait]
impl SettingsBackend for MemoryStore {
    async fn global_values(&self) -> StoreResult<Vec<(String, String)>> {
        Ok(self
            .global
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn put_global_values(&self, values: &[(SettingKey, String)]) -> StoreResult<()> {
        let mut global = self.global.write();
        for (key, value) in values {
            global.insert(key.as_str().to_string(), value.clone());
        }
        Ok(())
    }

    async fn clear_global(&self) -> StoreResult<()> {
        self.global.write().clear();
        Ok(())
    }

    async fn user_row(&self, user: UserId) -> StoreResult<Option<SettingsPatch>> {
        Ok(self.users.read().get(&user).cloned())
    }

    async fn put_user_row(&self, user: UserId, row: &SettingsPatch) -> StoreResult<()> {
        self.users.write().insert(user, row.clone());
        Ok(())
    }

    async fn delete_user_row(&self, user: UserId) -> StoreResult<bool> {
        Ok(self.users.write().remove(&user).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for (ts, ppm, source) in [
            (3_000, 900, Source::Live),
            (1_000, 700, Source::Live),
            (2_000, 800, Source::Import),
            (4_000, 1_000, Source::Live),
        ] {
            store.insert_reading(NewReading::at(ts, ppm, source)).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_insert_keeps_timestamp_order() {
        let store = seeded().await;
        let all = store.query_readings(TimeRange::all(), None).await.unwrap();
        let stamps: Vec<u64> = all.iter().map(|r| r.timestamp_ms).collect();
        assert_eq!(stamps, vec![1_000, 2_000, 3_000, 4_000]);

        // ids follow insertion, not timestamp
        assert_eq!(all[0].id, 2);
        assert_eq!(all[2].id, 1);
    }

    #[tokio::test]
    async fn query_filters_range_and_source() {
        let store = seeded().await;
        let live = store
            .query_readings(TimeRange::new(1_000, 4_000), Some(Source::Live))
            .await
            .unwrap();
        let ppm: Vec<u32> = live.iter().map(|r| r.ppm).collect();
        assert_eq!(ppm, vec![700, 900]);
    }

    #[tokio::test]
    async fn test_aggregate() {
        let store = seeded().await;
        let stats = store
            .query_aggregate(TimeRange::all(), Some(Source::Live))
            .await
            .unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.avg, Some(2_600.0 / 3.0));
        assert_eq!(stats.min, Some(700));
        assert_eq!(stats.max, Some(1_000));

        let empty = store
            .query_aggregate(TimeRange::new(10_000, 20_000), None)
            .await
            .unwrap();
        assert_eq!(empty, WindowStats::default());
    }

    #[tokio::test]
    async fn time_bounds_cover_matching_readings() {
        let store = seeded().await;
        assert_eq!(
            store.time_bounds(Some(Source::Import)).await.unwrap(),
            Some(TimeRange::new(2_000, 2_001))
        );
        assert_eq!(
            store.time_bounds(None).await.unwrap(),
            Some(TimeRange::new(1_000, 4_001))
        );
        assert_eq!(store.time_bounds(Some(Source::Simulator)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purge_before() {
        let store = seeded().await;
        assert_eq!(store.purge_before(2_500), 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.purge_before(2_500), 0);
    }

    #[tokio::test]
    async fn settings_tables_round_trip() {
        let store = MemoryStore::new();
        store
            .put_global_values(&[(SettingKey::GoodThreshold, "700".into())])
            .await
            .unwrap();
        assert_eq!(
            store.global_values().await.unwrap(),
            vec![("good_threshold".to_string(), "700".to_string())]
        );

        let row = SettingsPatch {
            update_speed: Some(3),
            ..Default::default()
        };
        store.put_user_row(UserId(1), &row).await.unwrap();
        assert_eq!(store.user_row(UserId(1)).await.unwrap(), Some(row));
        assert!(store.delete_user_row(UserId(1)).await.unwrap());
        assert!(!store.delete_user_row(UserId(1)).await.unwrap());

        store.clear_global().await.unwrap();
        assert!(store.global_values().await.unwrap().is_empty());
    }
}

//! Store-backed analytics with per-route caching.
//!
//! Cache keys are `"{route}:{source}"`, so the number of entries is bounded
//! by routes times source filters.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use aerium_types::{
    current_timestamp_ms, AnomalyReport, DailySummary, Forecast, HealthReport, Heatmap, Insight, PeriodComparison,
    Source, TrendResult,
};
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};

use crate::analytics;
use crate::cache::TtlCache;
use crate::error::{InsightsError, StoreError};
use crate::store::{ReadingStore, TimeRange};

/// Default lifetime of a cached result.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

const DAY: Duration = Duration::from_secs(24 * 3600);

/// Which two periods a comparison looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodKind {
    /// The last 7 days against the 7 days before.
    Week,
    /// The current UTC calendar month to date against the whole previous month.
    Month,
    /// The later half of all stored data against the earlier half.
    Halves,
}

impl PeriodKind {
    fn route(&self) -> &'static str {
        match self {
            PeriodKind::Week => "weekcompare",
            PeriodKind::Month => "compare-month",
            PeriodKind::Halves => "compare-halves",
        }
    }
}

impl fmt::Display for PeriodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PeriodKind::Week => "week",
            PeriodKind::Month => "month",
            PeriodKind::Halves => "halves",
        })
    }
}

fn cache_key(route: &str, source: Option<Source>) -> String {
    format!("{route}:{}", source.map_or("all", |s| s.as_str()))
}

/// Imported data is analysed as a whole; live data over a recent window.
fn window(source: Option<Source>, now_ms: u64, span: Duration) -> TimeRange {
    match source {
        Some(Source::Import) => TimeRange::all(),
        _ => TimeRange::last(now_ms, span),
    }
}

/// Start of the UTC calendar month containing `now_ms`, and of the month before.
fn month_starts(now_ms: u64) -> Option<(u64, u64)> {
    let now = DateTime::<Utc>::from_timestamp_millis(i64::try_from(now_ms).ok()?)?;
    let this_month = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)?;
    let last_month = this_month.checked_sub_months(Months::new(1))?;
    let to_ms = |date: NaiveDate| -> Option<u64> {
        u64::try_from(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis()).ok()
    };
    Some((to_ms(this_month)?, to_ms(last_month)?))
}

/// Cached analytics over a [`ReadingStore`].
///
/// Every method has an `*_at` variant taking the current time explicitly.
pub struct Insights {
    store: Arc<dyn ReadingStore>,
    ttl: Duration,
    trends: TtlCache<TrendResult>,
    comparisons: TtlCache<PeriodComparison>,
    heatmaps: TtlCache<Heatmap>,
    anomalies: TtlCache<AnomalyReport>,
    daily: TtlCache<Vec<DailySummary>>,
    forecasts: TtlCache<Option<Forecast>>,
    observations: TtlCache<Vec<Insight>>,
    health: TtlCache<Option<HealthReport>>,
}

impl fmt::Debug for Insights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Insights").field("ttl", &self.ttl).finish()
    }
}

impl Insights {
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self::with_ttl(store, DEFAULT_TTL)
    }

    pub fn with_ttl(store: Arc<dyn ReadingStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            trends: TtlCache::new(),
            comparisons: TtlCache::new(),
            heatmaps: TtlCache::new(),
            anomalies: TtlCache::new(),
            daily: TtlCache::new(),
            forecasts: TtlCache::new(),
            observations: TtlCache::new(),
            health: TtlCache::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Drop every cached result, e.g. after a bulk import.
    pub fn clear(&self) {
        self.trends.clear();
        self.comparisons.clear();
        self.heatmaps.clear();
        self.anomalies.clear();
        self.daily.clear();
        self.forecasts.clear();
        self.observations.clear();
        self.health.clear();
    }

    /// Hourly trend over the last 7 days (all data for imports).
    pub async fn trend(&self, source: Option<Source>) -> Result<TrendResult, InsightsError> {
        self.trend_at(source, current_timestamp_ms()).await
    }

    pub async fn trend_at(&self, source: Option<Source>, now_ms: u64) -> Result<TrendResult, InsightsError> {
        let range = window(source, now_ms, 7 * DAY);
        let result = self
            .trends
            .cached(&cache_key("trend", source), self.ttl, || async move {
                let readings = self.store.query_readings(range, source).await?;
                Ok::<_, StoreError>(analytics::trend(&readings))
            })
            .await?;
        Ok(result)
    }

    pub async fn compare(&self, kind: PeriodKind, source: Option<Source>) -> Result<PeriodComparison, InsightsError> {
        self.compare_at(kind, source, current_timestamp_ms()).await
    }

    pub async fn compare_at(
        &self,
        kind: PeriodKind,
        source: Option<Source>,
        now_ms: u64,
    ) -> Result<PeriodComparison, InsightsError> {
        let result = self
            .comparisons
            .cached(&cache_key(kind.route(), source), self.ttl, || async move {
                let (current, previous) = match kind {
                    PeriodKind::Week => {
                        let current = TimeRange::last(now_ms, 7 * DAY);
                        (current, current.previous())
                    }
                    PeriodKind::Month => {
                        let (this_month, last_month) = month_starts(now_ms)
                            .ok_or_else(|| StoreError::Query(format!("timestamp out of range: {now_ms}")))?;
                        (
                            TimeRange::new(this_month, now_ms),
                            TimeRange::new(last_month, this_month),
                        )
                    }
                    PeriodKind::Halves => match self.store.time_bounds(source).await? {
                        Some(bounds) => {
                            let (earlier, later) = bounds.halves();
                            (later, earlier)
                        }
                        None => (TimeRange::new(0, 0), TimeRange::new(0, 0)),
                    },
                };

                let current = self.store.query_aggregate(current, source).await?;
                let previous = self.store.query_aggregate(previous, source).await?;
                Ok::<_, StoreError>(analytics::compare(current, previous))
            })
            .await?;
        Ok(result)
    }

    /// Weekday/hour heatmap over the last 30 days in local time.
    pub async fn heatmap(&self, source: Option<Source>) -> Result<Heatmap, InsightsError> {
        self.heatmap_at(source, current_timestamp_ms()).await
    }

    pub async fn heatmap_at(&self, source: Option<Source>, now_ms: u64) -> Result<Heatmap, InsightsError> {
        let range = window(source, now_ms, 30 * DAY);
        let result = self
            .heatmaps
            .cached(&cache_key("heatmap", source), self.ttl, || async move {
                let readings = self.store.query_readings(range, source).await?;
                Ok::<_, StoreError>(analytics::heatmap(&readings))
            })
            .await?;
        Ok(result)
    }

    /// Anomalies among the last 24 hours of readings.
    pub async fn anomalies(&self, source: Option<Source>, threshold_std: f64) -> Result<AnomalyReport, InsightsError> {
        self.anomalies_at(source, threshold_std, current_timestamp_ms()).await
    }

    pub async fn anomalies_at(
        &self,
        source: Option<Source>,
        threshold_std: f64,
        now_ms: u64,
    ) -> Result<AnomalyReport, InsightsError> {
        let range = window(source, now_ms, DAY);
        let key = cache_key(&format!("anomalies-{threshold_std}"), source);
        let result = self
            .anomalies
            .cached(&key, self.ttl, || async move {
                let readings = self.store.query_readings(range, source).await?;
                Ok::<_, StoreError>(analytics::anomalies(&readings, threshold_std))
            })
            .await?;
        Ok(result)
    }

    /// Daily summaries over the last 30 days in local time.
    pub async fn daily(&self, source: Option<Source>) -> Result<Vec<DailySummary>, InsightsError> {
        self.daily_at(source, current_timestamp_ms()).await
    }

    pub async fn daily_at(&self, source: Option<Source>, now_ms: u64) -> Result<Vec<DailySummary>, InsightsError> {
        let range = window(source, now_ms, 30 * DAY);
        let result = self
            .daily
            .cached(&cache_key("daily", source), self.ttl, || async move {
                let readings = self.store.query_readings(range, source).await?;
                Ok::<_, StoreError>(analytics::daily_summaries(&readings))
            })
            .await?;
        Ok(result)
    }

    /// Linear forecast from the last 24 hours of readings.
    pub async fn forecast(&self, source: Option<Source>, hours_ahead: u32) -> Result<Option<Forecast>, InsightsError> {
        self.forecast_at(source, hours_ahead, current_timestamp_ms()).await
    }

    pub async fn forecast_at(
        &self,
        source: Option<Source>,
        hours_ahead: u32,
        now_ms: u64,
    ) -> Result<Option<Forecast>, InsightsError> {
        let range = window(source, now_ms, DAY);
        let key = cache_key(&format!("forecast-{hours_ahead}"), source);
        let result = self
            .forecasts
            .cached(&key, self.ttl, || async move {
                let readings = self.store.query_readings(range, source).await?;
                Ok::<_, StoreError>(analytics::forecast(&readings, hours_ahead))
            })
            .await?;
        Ok(result)
    }

    /// Plain-language insights over the last 7 days in local time.
    pub async fn insights(&self, source: Option<Source>) -> Result<Vec<Insight>, InsightsError> {
        self.insights_at(source, current_timestamp_ms()).await
    }

    pub async fn insights_at(&self, source: Option<Source>, now_ms: u64) -> Result<Vec<Insight>, InsightsError> {
        let range = window(source, now_ms, 7 * DAY);
        let result = self
            .observations
            .cached(&cache_key("insights", source), self.ttl, || async move {
                let readings = self.store.query_readings(range, source).await?;
                Ok::<_, StoreError>(analytics::insights(&readings))
            })
            .await?;
        Ok(result)
    }

    /// Health advice from the last 24 hours of readings.
    pub async fn health(&self, source: Option<Source>) -> Result<Option<HealthReport>, InsightsError> {
        self.health_at(source, current_timestamp_ms()).await
    }

    pub async fn health_at(&self, source: Option<Source>, now_ms: u64) -> Result<Option<HealthReport>, InsightsError> {
        let range = window(source, now_ms, DAY);
        let result = self
            .health
            .cached(&cache_key("health", source), self.ttl, || async move {
                let readings = self.store.query_readings(range, source).await?;
                Ok::<_, StoreError>(analytics::health(&readings))
            })
            .await?;
        Ok(result)
    }
}

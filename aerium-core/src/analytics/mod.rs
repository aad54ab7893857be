//! Analytics Engine.
//!
//! Pure functions over a reading history ordered ascending by timestamp.
//! Every function accepts any [`Sample`]; records missing a timestamp or a
//! ppm are skipped, and a batch without valid records degrades to an
//! insufficient or empty result instead of failing.

mod advice;
mod anomaly;
mod calendar;
mod compare;
mod forecast;
mod stats;
mod trend;

pub use advice::{advice_for, health, insights, insights_in, MIN_PEAK_READINGS, TREND_INSIGHT_PERCENT};
pub use anomaly::{anomalies, DEFAULT_THRESHOLD_STD};
pub use calendar::{daily_summaries, daily_summaries_in, heatmap, heatmap_in};
pub use compare::{compare, compare_samples, percent_diff, window_stats};
pub use forecast::{forecast, MIN_FORECAST_READINGS};
pub use stats::{moving_average, percentile, series_stats};
pub use trend::{classify_buckets, hourly_buckets, trend, MAX_BUCKETS, TREND_BAND_PERCENT};

use aerium_types::Sample;

/// Valid `(timestamp_ms, ppm)` pairs, in input order.
pub(crate) fn points<S: Sample>(samples: &[S]) -> Vec<(u64, u32)> {
    samples.iter().filter_map(Sample::point).collect()
}

pub(crate) fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

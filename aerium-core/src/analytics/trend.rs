use std::collections::BTreeMap;

use aerium_types::{HourlyBucket, Sample, TrendClass, TrendResult};

use super::{mean, points};

/// Seven days of hourly buckets.
pub const MAX_BUCKETS: usize = 168;

/// Changes within this many percent classify as stable.
pub const TREND_BAND_PERCENT: f64 = 5.0;

const HOUR_MS: u64 = 3_600_000;
const WINDOW: usize = 24;

/// Hourly averages on UTC hour boundaries, most recent first, capped at
/// [`MAX_BUCKETS`].
pub fn hourly_buckets<S: Sample>(samples: &[S]) -> Vec<HourlyBucket> {
    let mut hours: BTreeMap<u64, (u64, u32)> = BTreeMap::new();
    for (timestamp_ms, ppm) in points(samples) {
        let slot = hours.entry(timestamp_ms / HOUR_MS).or_default();
        slot.0 += u64::from(ppm);
        slot.1 += 1;
    }

    hours
        .into_iter()
        .rev()
        .take(MAX_BUCKETS)
        .map(|(hour, (sum, readings))| HourlyBucket {
            hour_start_ms: hour * HOUR_MS,
            avg_ppm: sum as f64 / f64::from(readings),
            readings,
        })
        .collect()
}

/// Classify the direction of a reading history.
///
/// The most recent 24 hourly buckets are compared with the 24 before them.
/// Without a second day of data the result is `InsufficientData`.
///
/// ```rust
/// use aerium_core::analytics::trend;
/// use aerium_types::TrendClass;
///
/// let hour = 3_600_000;
/// let rising: Vec<(u64, u32)> = (0..48).map(|h| (h * hour, 600 + 10 * h as u32)).collect();
/// assert_eq!(trend(&rising).classification, TrendClass::Rising);
/// ```
pub fn trend<S: Sample>(samples: &[S]) -> TrendResult {
    classify_buckets(hourly_buckets(samples))
}

/// Classify buckets that are already ordered most recent first.
pub fn classify_buckets(buckets: Vec<HourlyBucket>) -> TrendResult {
    let recent_avg = mean(buckets.iter().take(WINDOW).map(|b| b.avg_ppm)).unwrap_or(0.0);
    if buckets.len() < 2 {
        return TrendResult::insufficient(recent_avg, buckets);
    }

    let older_avg = mean(buckets.iter().skip(WINDOW).take(WINDOW).map(|b| b.avg_ppm)).unwrap_or(0.0);
    if older_avg == 0.0 {
        return TrendResult::insufficient(recent_avg, buckets);
    }

    let percent_change = (recent_avg - older_avg) / older_avg * 100.0;
    let classification = if percent_change > TREND_BAND_PERCENT {
        TrendClass::Rising
    } else if percent_change < -TREND_BAND_PERCENT {
        TrendClass::Falling
    } else {
        TrendClass::Stable
    };

    TrendResult {
        classification,
        recent_avg,
        older_avg,
        percent_change,
        buckets,
    }
}

//! Aggregations keyed by calendar position.

use std::collections::BTreeMap;

use aerium_types::{DailySummary, Heatmap, Sample};
use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike, Utc};

use super::points;

pub(super) fn to_zone<Tz: TimeZone>(timestamp_ms: u64, tz: &Tz) -> Option<DateTime<Tz>> {
    let utc = DateTime::<Utc>::from_timestamp_millis(i64::try_from(timestamp_ms).ok()?)?;
    Some(utc.with_timezone(tz))
}

/// Mean ppm per weekday and hour in the process-local time zone.
pub fn heatmap<S: Sample>(samples: &[S]) -> Heatmap {
    heatmap_in(samples, &Local)
}

/// Mean ppm per weekday (Monday first) and hour of day in `tz`.
///
/// Empty cells stay 0 and are excluded from the min/max.
pub fn heatmap_in<S: Sample, Tz: TimeZone>(samples: &[S], tz: &Tz) -> Heatmap {
    let mut sums = [[0u64; 24]; 7];
    let mut heatmap = Heatmap::empty();

    for (timestamp_ms, ppm) in points(samples) {
        let Some(local) = to_zone(timestamp_ms, tz) else {
            continue;
        };
        let day = local.weekday().num_days_from_monday() as usize;
        let hour = local.hour() as usize;
        sums[day][hour] += u64::from(ppm);
        heatmap.counts[day][hour] += 1;
        heatmap.data_points += 1;
    }

    for day in 0..7 {
        for hour in 0..24 {
            let count = heatmap.counts[day][hour];
            if count == 0 {
                continue;
            }
            let value = sums[day][hour] as f64 / f64::from(count);
            heatmap.cells[day][hour] = value;
            heatmap.min_value = Some(heatmap.min_value.map_or(value, |m| m.min(value)));
            heatmap.max_value = Some(heatmap.max_value.map_or(value, |m| m.max(value)));
        }
    }
    heatmap
}

/// Per-day aggregates in the process-local time zone, oldest day first.
pub fn daily_summaries<S: Sample>(samples: &[S]) -> Vec<DailySummary> {
    daily_summaries_in(samples, &Local)
}

/// Per-day aggregates in `tz`, oldest day first.
pub fn daily_summaries_in<S: Sample, Tz: TimeZone>(samples: &[S], tz: &Tz) -> Vec<DailySummary> {
    #[derive(Default)]
    struct Day {
        sum: u64,
        count: u64,
        min: u32,
        max: u32,
    }

    let mut days: BTreeMap<NaiveDate, Day> = BTreeMap::new();
    for (timestamp_ms, ppm) in points(samples) {
        let Some(local) = to_zone(timestamp_ms, tz) else {
            continue;
        };
        let day = days.entry(local.date_naive()).or_insert(Day {
            min: u32::MAX,
            ..Default::default()
        });
        day.sum += u64::from(ppm);
        day.count += 1;
        day.min = day.min.min(ppm);
        day.max = day.max.max(ppm);
    }

    days.into_iter()
        .map(|(date, day)| DailySummary {
            date: date.format("%Y-%m-%d").to_string(),
            avg: day.sum as f64 / day.count as f64,
            min: day.min,
            max: day.max,
            count: day.count,
        })
        .collect()
}

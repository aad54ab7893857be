use aerium_types::{Anomaly, AnomalyReport, Sample, Severity};

use super::series_stats;

/// Z-score above which a reading is reported.
pub const DEFAULT_THRESHOLD_STD: f64 = 2.0;

const HIGH_SEVERITY_Z: f64 = 3.0;

/// Flag readings more than `threshold_std` sample standard deviations from
/// the mean.
///
/// Needs at least three valid readings; shorter series give an empty report
/// without statistics. A constant series has `stdev == 0` and never yields
/// anomalies. Indices are positions in `samples`, so malformed records
/// still count.
pub fn anomalies<S: Sample>(samples: &[S], threshold_std: f64) -> AnomalyReport {
    let points: Vec<(usize, u64, u32)> = samples
        .iter()
        .enumerate()
        .filter_map(|(index, sample)| sample.point().map(|(ts, ppm)| (index, ts, ppm)))
        .collect();
    if points.len() < 3 {
        return AnomalyReport::default();
    }

    let ppm: Vec<u32> = points.iter().map(|&(_, _, ppm)| ppm).collect();
    let Some(statistics) = series_stats(&ppm) else {
        return AnomalyReport::default();
    };

    let mut anomalies = Vec::new();
    if statistics.stdev > 0.0 {
        for &(index, timestamp_ms, ppm) in &points {
            let z_score = (f64::from(ppm) - statistics.mean).abs() / statistics.stdev;
            if z_score > threshold_std {
                let severity = if z_score > HIGH_SEVERITY_Z {
                    Severity::High
                } else {
                    Severity::Medium
                };
                anomalies.push(Anomaly {
                    index,
                    ppm,
                    z_score,
                    severity,
                    timestamp_ms,
                });
            }
        }
    }

    AnomalyReport {
        anomalies,
        statistics: Some(statistics),
    }
}

use aerium_types::{PeriodComparison, Sample, WindowStats};

use super::points;

/// Percent change from `previous` to `current`.
///
/// Zero when the baseline is zero or absent. That also reports "the previous
/// period had no activity" as "no change".
pub fn percent_diff(current: Option<f64>, previous: Option<f64>) -> f64 {
    match (current, previous) {
        (Some(current), Some(previous)) if previous != 0.0 => (current - previous) / previous * 100.0,
        _ => 0.0,
    }
}

/// `{count, avg, min, max}` of the valid readings in `samples`.
pub fn window_stats<S: Sample>(samples: &[S]) -> WindowStats {
    let ppm: Vec<u32> = points(samples).into_iter().map(|(_, ppm)| ppm).collect();
    if ppm.is_empty() {
        return WindowStats::default();
    }

    let sum: u64 = ppm.iter().map(|&v| u64::from(v)).sum();
    WindowStats {
        count: ppm.len() as u64,
        avg: Some(sum as f64 / ppm.len() as f64),
        min: ppm.iter().copied().min(),
        max: ppm.iter().copied().max(),
    }
}

/// Compare two already aggregated windows.
pub fn compare(current: WindowStats, previous: WindowStats) -> PeriodComparison {
    let count = |w: &WindowStats| (w.count > 0).then_some(w.count as f64);
    let count_percent = percent_diff(count(&current), count(&previous));
    let avg_percent = percent_diff(current.avg, previous.avg);
    let min_percent = percent_diff(current.min.map(f64::from), previous.min.map(f64::from));
    let max_percent = percent_diff(current.max.map(f64::from), previous.max.map(f64::from));

    PeriodComparison {
        current,
        previous,
        count_percent,
        avg_percent,
        min_percent,
        max_percent,
    }
}

/// Aggregate both windows, then compare them.
pub fn compare_samples<S: Sample>(current: &[S], previous: &[S]) -> PeriodComparison {
    compare(window_stats(current), window_stats(previous))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_diff() {
        assert!((percent_diff(Some(110.0), Some(100.0)) - 10.0).abs() < 1e-9);
        assert_eq!(percent_diff(Some(50.0), Some(100.0)), -50.0);
        assert_eq!(percent_diff(Some(50.0), Some(0.0)), 0.0);
        assert_eq!(percent_diff(Some(50.0), None), 0.0);
        assert_eq!(percent_diff(None, Some(50.0)), 0.0);
    }

    #[test]
    fn test_compare_windows() {
        let current: [(u64, u32); 3] = [(0, 800), (1, 1_000), (2, 1_200)];
        let previous: [(u64, u32); 2] = [(0, 800), (1, 800)];
        let result = compare_samples(&current, &previous);

        assert_eq!(result.current.count, 3);
        assert_eq!(result.current.avg, Some(1_000.0));
        assert_eq!(result.count_percent, 50.0);
        assert_eq!(result.avg_percent, 25.0);
        assert_eq!(result.min_percent, 0.0);
        assert_eq!(result.max_percent, 50.0);
    }

    #[test]
    fn empty_previous_window_reads_as_no_change() {
        let current: [(u64, u32); 1] = [(0, 800)];
        let previous: [(u64, u32); 0] = [];
        let result = compare_samples(&current, &previous);

        assert_eq!(result.previous, WindowStats::default());
        assert_eq!(result.count_percent, 0.0);
        assert_eq!(result.avg_percent, 0.0);
        assert_eq!(result.max_percent, 0.0);
    }
}

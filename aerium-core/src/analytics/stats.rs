use aerium_types::SeriesStats;

use super::mean;

/// Mean, sample standard deviation, min and max. `None` for an empty series.
pub fn series_stats(values: &[u32]) -> Option<SeriesStats> {
    let mean = mean(values.iter().map(|&v| f64::from(v)))?;
    let stdev = if values.len() > 1 {
        let squares: f64 = values
            .iter()
            .map(|&v| (f64::from(v) - mean).powi(2))
            .sum();
        (squares / (values.len() - 1) as f64).sqrt()
    } else {
        0.0
    };

    Some(SeriesStats {
        mean,
        stdev,
        min: values.iter().copied().min()?,
        max: values.iter().copied().max()?,
    })
}

/// The `p`-th percentile (0-100) by nearest rank: the sorted value at
/// index `floor(n * p / 100)`, capped at the last one.
pub fn percentile(values: &[u32], p: f64) -> Option<u32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let rank = (sorted.len() as f64 * p.clamp(0.0, 100.0) / 100.0) as usize;
    Some(sorted[rank.min(sorted.len() - 1)])
}

/// Trailing means over `window` consecutive values.
///
/// A series shorter than `window` is returned unchanged. Empty when `window`
/// is zero.
pub fn moving_average(values: &[u32], window: usize) -> Vec<f64> {
    if window == 0 {
        return Vec::new();
    }
    if window > values.len() {
        return values.iter().map(|&v| f64::from(v)).collect();
    }
    values
        .windows(window)
        .map(|w| w.iter().map(|&v| f64::from(v)).sum::<f64>() / window as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_stats() {
        let stats = series_stats(&[2, 4, 4, 4, 5, 5, 7, 9]).unwrap();
        assert_eq!(stats.mean, 5.0);
        assert!((stats.stdev - 2.138).abs() < 1e-3);
        assert_eq!((stats.min, stats.max), (2, 9));

        assert!(series_stats(&[]).is_none());
        assert_eq!(series_stats(&[700]).unwrap().stdev, 0.0);
    }

    #[test]
    fn test_percentile() {
        let values = [400, 500, 600, 700, 800];
        assert_eq!(percentile(&values, 0.0), Some(400));
        assert_eq!(percentile(&values, 50.0), Some(600));
        assert_eq!(percentile(&values, 100.0), Some(800));
        // floor(5 * 0.9) = 4
        assert_eq!(percentile(&values, 90.0), Some(800));
        // floor(5 * 0.25) = 1
        assert_eq!(percentile(&[900, 400, 700, 500, 600], 25.0), Some(500));
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn test_moving_average() {
        assert_eq!(moving_average(&[1, 2, 3, 4], 2), vec![1.5, 2.5, 3.5]);
        assert_eq!(moving_average(&[1, 2], 3), vec![1.0, 2.0]);
        assert!(moving_average(&[1, 2], 0).is_empty());
    }
}

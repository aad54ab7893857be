use aerium_types::{Forecast, Sample, TrendClass};

use super::{mean, points};

/// Fewest valid readings a forecast is computed from.
pub const MIN_FORECAST_READINGS: usize = 5;

const EDGE: usize = 5;

/// Extrapolate the series `hours_ahead` hours (clamped to 1..=24) into the
/// future with a least-squares line over reading index.
///
/// The prediction is taken at index `n + hours_ahead / 4` and never drops
/// below zero. `confidence` is R² as a percentage. The trend is `Rising`
/// when the mean of the last five readings exceeds the mean of the first
/// five and `Falling` otherwise.
pub fn forecast<S: Sample>(samples: &[S], hours_ahead: u32) -> Option<Forecast> {
    let ppm: Vec<f64> = points(samples)
        .into_iter()
        .map(|(_, ppm)| f64::from(ppm))
        .collect();
    if ppm.len() < MIN_FORECAST_READINGS {
        return None;
    }

    let hours_ahead = hours_ahead.clamp(1, 24);
    let n = ppm.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = mean(ppm.iter().copied())?;

    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, &y) in ppm.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }
    let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
    let intercept = y_mean - slope * x_mean;

    let (mut ss_res, mut ss_tot) = (0.0, 0.0);
    for (i, &y) in ppm.iter().enumerate() {
        let fitted = intercept + slope * i as f64;
        ss_res += (y - fitted).powi(2);
        ss_tot += (y - y_mean).powi(2);
    }
    let r_squared = if ss_tot == 0.0 { 1.0 } else { 1.0 - ss_res / ss_tot };

    let target = n + f64::from(hours_ahead) / 4.0;
    let predicted_ppm = (intercept + slope * target).max(0.0);

    let first = mean(ppm.iter().take(EDGE).copied())?;
    let last = mean(ppm.iter().rev().take(EDGE).copied())?;
    let trend = if last > first {
        TrendClass::Rising
    } else {
        TrendClass::Falling
    };

    Some(Forecast {
        predicted_ppm,
        confidence: (r_squared * 100.0).clamp(0.0, 100.0),
        trend,
        hours_ahead,
    })
}

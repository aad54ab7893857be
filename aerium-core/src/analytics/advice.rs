//! Plain-language insights and health advice.

use aerium_types::{HealthAdvice, HealthLevel, HealthReport, Insight, InsightKind, Sample};
use chrono::{Local, TimeZone, Timelike};

use super::calendar::to_zone;
use super::{mean, points};

/// Fewest valid readings before a peak hour is reported.
pub const MIN_PEAK_READINGS: usize = 24;

/// Change between the first and last five readings that earns a trend insight.
pub const TREND_INSIGHT_PERCENT: f64 = 10.0;

const EDGE: usize = 5;

/// Insights in the process-local time zone.
pub fn insights<S: Sample>(samples: &[S]) -> Vec<Insight> {
    insights_in(samples, &Local)
}

/// Observations about a reading history, in this order:
///
/// 1. the hour of day with the highest mean, once there are at least
///    [`MIN_PEAK_READINGS`] readings;
/// 2. an overall air quality assessment of the mean;
/// 3. a worsening or improving trend when the last five readings differ from
///    the first five by more than [`TREND_INSIGHT_PERCENT`].
///
/// Empty without valid readings.
pub fn insights_in<S: Sample, Tz: TimeZone>(samples: &[S], tz: &Tz) -> Vec<Insight> {
    let points = points(samples);
    let ppm: Vec<f64> = points.iter().map(|&(_, ppm)| f64::from(ppm)).collect();
    let Some(average) = mean(ppm.iter().copied()) else {
        return Vec::new();
    };

    let mut insights = Vec::new();

    if points.len() >= MIN_PEAK_READINGS {
        if let Some(hour) = peak_hour(&points, tz) {
            insights.push(insight(
                InsightKind::PeakTime,
                format!("CO2 levels peak around {hour:02}:00"),
                0.85,
                "Consider ventilating around this time",
            ));
        }
    }

    insights.push(if average > 1_200.0 {
        insight(
            InsightKind::AirQuality,
            "Air quality is consistently poor".into(),
            0.9,
            "Consider improving ventilation or air purifier",
        )
    } else if average > 800.0 {
        insight(
            InsightKind::AirQuality,
            "Air quality is moderate".into(),
            0.85,
            "Regular ventilation recommended",
        )
    } else {
        insight(
            InsightKind::AirQuality,
            "Air quality is excellent".into(),
            0.9,
            "Keep up good ventilation habits!",
        )
    });

    if ppm.len() >= 2 {
        let older = mean(ppm.iter().take(EDGE).copied()).unwrap_or_default();
        let recent = mean(ppm.iter().rev().take(EDGE).copied()).unwrap_or_default();
        if older > 0.0 {
            let change = (recent - older) / older * 100.0;
            if change > TREND_INSIGHT_PERCENT {
                insights.push(insight(
                    InsightKind::Trend,
                    format!("Air quality is getting worse ({change:.1}% increase)"),
                    0.8,
                    "Increase ventilation frequency",
                ));
            } else if change < -TREND_INSIGHT_PERCENT {
                insights.push(insight(
                    InsightKind::Trend,
                    format!("Air quality is improving ({:.1}% decrease)", change.abs()),
                    0.8,
                    "Good progress! Continue current practices",
                ));
            }
        }
    }

    insights
}

fn insight(kind: InsightKind, message: String, confidence: f64, action: &str) -> Insight {
    Insight {
        kind,
        message,
        confidence,
        action: action.into(),
    }
}

/// Hour of day with the highest mean ppm. Ties go to the earlier hour.
fn peak_hour<Tz: TimeZone>(points: &[(u64, u32)], tz: &Tz) -> Option<u32> {
    let mut hours = [(0u64, 0u32); 24];
    for &(timestamp_ms, ppm) in points {
        let Some(local) = to_zone(timestamp_ms, tz) else {
            continue;
        };
        let slot = &mut hours[local.hour() as usize];
        slot.0 += u64::from(ppm);
        slot.1 += 1;
    }

    let mut peak: Option<(u32, f64)> = None;
    for (hour, &(sum, count)) in hours.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let avg = sum as f64 / f64::from(count);
        if peak.map_or(true, |(_, best)| avg > best) {
            peak = Some((hour as u32, avg));
        }
    }
    peak.map(|(hour, _)| hour)
}

/// Health advice for the mean of a reading history, with the current,
/// average and peak concentrations. `None` without valid readings.
pub fn health<S: Sample>(samples: &[S]) -> Option<HealthReport> {
    let ppm: Vec<u32> = points(samples).into_iter().map(|(_, ppm)| ppm).collect();
    let current_ppm = *ppm.last()?;
    let peak_ppm = ppm.iter().copied().max()?;
    let average_ppm = mean(ppm.iter().map(|&v| f64::from(v)))?;

    Some(HealthReport {
        advice: advice_for(average_ppm),
        current_ppm,
        average_ppm,
        peak_ppm,
    })
}

/// Health band of an average concentration.
///
/// Above 1400 ppm is critical, above 1000 high, above 800 moderate.
pub fn advice_for(average_ppm: f64) -> HealthAdvice {
    let (level, symptom, action, duration_minutes) = if average_ppm > 1_400.0 {
        (
            HealthLevel::Critical,
            "Drowsiness, poor concentration, headaches",
            "Ventilate immediately - open windows",
            10,
        )
    } else if average_ppm > 1_000.0 {
        (
            HealthLevel::High,
            "Mild cognitive impairment, fatigue",
            "Open windows or increase ventilation",
            15,
        )
    } else if average_ppm > 800.0 {
        (
            HealthLevel::Moderate,
            "Possible minor concentration issues",
            "Increase air circulation",
            5,
        )
    } else {
        (HealthLevel::Good, "No issues expected", "Continue monitoring", 0)
    };

    HealthAdvice {
        level,
        symptom: symptom.into(),
        action: action.into(),
        duration_minutes,
    }
}

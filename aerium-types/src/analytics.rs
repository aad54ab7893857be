//! Derived analytics results. None of these are persisted.

use alloc::string::String;
use alloc::vec::Vec;

/// Direction of a reading series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TrendClass {
    Rising,
    Falling,
    Stable,
    InsufficientData,
}

/// Mean concentration of all readings falling into one UTC hour.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HourlyBucket {
    /// Start of the hour, Unix milliseconds.
    pub hour_start_ms: u64,
    pub avg_ppm: f64,
    pub readings: u32,
}

/// Result of comparing the most recent day of hourly averages with the day before.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrendResult {
    pub classification: TrendClass,
    pub recent_avg: f64,
    pub older_avg: f64,
    pub percent_change: f64,
    /// Hourly buckets, most recent first.
    pub buckets: Vec<HourlyBucket>,
}

impl TrendResult {
    /// A result that carries no classification.
    pub fn insufficient(recent_avg: f64, buckets: Vec<HourlyBucket>) -> Self {
        Self {
            classification: TrendClass::InsufficientData,
            recent_avg,
            older_avg: 0.0,
            percent_change: 0.0,
            buckets,
        }
    }
}

/// How far outside the norm an anomaly lies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Severity {
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Anomaly {
    /// Position in the input sequence.
    pub index: usize,
    pub ppm: u32,
    pub z_score: f64,
    pub severity: Severity,
    pub timestamp_ms: u64,
}

/// Summary statistics of a ppm series.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SeriesStats {
    pub mean: f64,
    /// Sample standard deviation (n - 1).
    pub stdev: f64,
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnomalyReport {
    pub anomalies: Vec<Anomaly>,
    /// Absent when the series was too short to analyse.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub statistics: Option<SeriesStats>,
}

impl AnomalyReport {
    pub fn anomaly_count(&self) -> usize {
        self.anomalies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty()
    }
}

/// Aggregate of one time window. Statistics are absent for an empty window.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WindowStats {
    pub count: u64,
    pub avg: Option<f64>,
    pub min: Option<u32>,
    pub max: Option<u32>,
}

/// Percent differences between two windows.
///
/// A difference is `0` whenever the baseline statistic is zero or absent, so
/// "the previous period had no activity" reads as "no change".
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeriodComparison {
    pub current: WindowStats,
    pub previous: WindowStats,
    pub count_percent: f64,
    pub avg_percent: f64,
    pub min_percent: f64,
    pub max_percent: f64,
}

/// Mean ppm per (weekday, hour) cell, Monday first.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Heatmap {
    /// `cells[day][hour]`, 0 for cells without readings.
    pub cells: [[f64; 24]; 7],
    pub counts: [[u32; 24]; 7],
    /// Smallest non-empty cell.
    pub min_value: Option<f64>,
    /// Largest non-empty cell.
    pub max_value: Option<f64>,
    pub data_points: u64,
}

impl Heatmap {
    pub const DAYS: [&'static str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

    pub fn empty() -> Self {
        Self {
            cells: [[0.0; 24]; 7],
            counts: [[0; 24]; 7],
            min_value: None,
            max_value: None,
            data_points: 0,
        }
    }

    pub fn cell(&self, day: usize, hour: usize) -> Option<f64> {
        let count = *self.counts.get(day)?.get(hour)?;
        (count > 0).then(|| self.cells[day][hour])
    }
}

/// Per-calendar-day aggregate.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DailySummary {
    /// ISO date, `YYYY-MM-DD`.
    pub date: String,
    pub avg: f64,
    pub min: u32,
    pub max: u32,
    pub count: u64,
}

/// Linear extrapolation of a reading series.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Forecast {
    pub predicted_ppm: f64,
    /// Goodness of fit, 0-100.
    pub confidence: f64,
    pub trend: TrendClass,
    pub hours_ahead: u32,
}

/// What an [`Insight`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum InsightKind {
    PeakTime,
    AirQuality,
    Trend,
}

/// A plain-language observation about a reading history.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Insight {
    pub kind: InsightKind,
    pub message: String,
    /// 0-1.
    pub confidence: f64,
    pub action: String,
}

/// Health impact band of an average concentration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum HealthLevel {
    Good,
    Moderate,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HealthAdvice {
    pub level: HealthLevel,
    pub symptom: String,
    pub action: String,
    /// Suggested ventilation time; zero when nothing needs doing.
    pub duration_minutes: u32,
}

/// Health advice together with the figures it was derived from.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HealthReport {
    pub advice: HealthAdvice,
    /// Most recent reading.
    pub current_ppm: u32,
    pub average_ppm: f64,
    pub peak_ppm: u32,
}

//! Readings - single persisted CO2 measurements.

use core::fmt;
use core::str::FromStr;

/// Where a reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Source {
    /// Produced by the live broadcast loop.
    #[default]
    Live,
    /// Produced by an operator-driven simulation.
    Simulator,
    /// Bulk-imported from a file.
    Import,
}

impl Source {
    /// All sources, in display order.
    pub const ALL: [Source; 3] = [Source::Live, Source::Simulator, Source::Import];

    /// The lowercase tag used in cache keys and storage filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Live => "live",
            Source::Simulator => "simulator",
            Source::Import => "import",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a source tag is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSource(pub alloc::string::String);

impl fmt::Display for UnknownSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown reading source: {}", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for UnknownSource {}

impl FromStr for Source {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(Source::Live),
            "simulator" | "sim" => Ok(Source::Simulator),
            "import" => Ok(Source::Import),
            other => Err(UnknownSource(other.into())),
        }
    }
}

/// Identifier of a user owning a settings override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted CO2 measurement.
///
/// Readings are immutable once stored. The `id` is an opaque sequence number
/// assigned by the store.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reading {
    pub id: u64,

    /// Unix timestamp in milliseconds (UTC).
    pub timestamp_ms: u64,

    /// Concentration in parts per million.
    pub ppm: u32,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub temperature: Option<f32>,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub humidity: Option<f32>,

    #[cfg_attr(feature = "serde", serde(default))]
    pub source: Source,
}

impl Reading {
    /// Materialise a stored reading from its insert request.
    pub fn from_new(id: u64, new: NewReading) -> Self {
        Self {
            id,
            timestamp_ms: new.timestamp_ms,
            ppm: new.ppm,
            temperature: new.temperature,
            humidity: new.humidity,
            source: new.source,
        }
    }
}

/// An insert request for the reading store.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NewReading {
    pub timestamp_ms: u64,
    pub ppm: u32,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub source: Source,
}

impl NewReading {
    /// Create an insert request stamped with the current time.
    #[cfg(feature = "std")]
    pub fn new(ppm: u32, source: Source) -> Self {
        Self::at(current_timestamp_ms(), ppm, source)
    }

    /// Create an insert request with an explicit timestamp.
    pub fn at(timestamp_ms: u64, ppm: u32, source: Source) -> Self {
        Self {
            timestamp_ms,
            ppm,
            temperature: None,
            humidity: None,
            source,
        }
    }

    /// Attach the optional climate values.
    pub fn with_climate(mut self, temperature: Option<f32>, humidity: Option<f32>) -> Self {
        self.temperature = temperature;
        self.humidity = humidity;
        self
    }
}

/// A decoded record whose fields have not been validated yet.
///
/// Imported rows can miss a timestamp or a concentration. Analytics skips
/// such rows instead of failing the batch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PartialReading {
    #[cfg_attr(feature = "serde", serde(default))]
    pub timestamp_ms: Option<u64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub ppm: Option<u32>,
}

/// Anything analytics can consume.
///
/// Returning `None` from either accessor marks the record as malformed.
pub trait Sample {
    fn timestamp_ms(&self) -> Option<u64>;
    fn ppm(&self) -> Option<u32>;

    /// Both fields, or `None` when the record is malformed.
    fn point(&self) -> Option<(u64, u32)> {
        Some((self.timestamp_ms()?, self.ppm()?))
    }
}

impl Sample for Reading {
    fn timestamp_ms(&self) -> Option<u64> {
        Some(self.timestamp_ms)
    }

    fn ppm(&self) -> Option<u32> {
        Some(self.ppm)
    }
}

impl Sample for PartialReading {
    fn timestamp_ms(&self) -> Option<u64> {
        self.timestamp_ms
    }

    fn ppm(&self) -> Option<u32> {
        self.ppm
    }
}

impl Sample for (u64, u32) {
    fn timestamp_ms(&self) -> Option<u64> {
        Some(self.0)
    }

    fn ppm(&self) -> Option<u32> {
        Some(self.1)
    }
}

impl<T: Sample + ?Sized> Sample for &T {
    fn timestamp_ms(&self) -> Option<u64> {
        (**self).timestamp_ms()
    }

    fn ppm(&self) -> Option<u32> {
        (**self).ppm()
    }
}

/// Get current timestamp in milliseconds since Unix epoch.
#[cfg(feature = "std")]
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

//! Error types for the telemetry pipeline.

use aerium_types::SettingKey;
use thiserror::Error;

/// Errors raised by a persistence backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A query or write failed.
    #[error("query failed: {0}")]
    Query(String),

    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Errors raised when writing settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Thresholds must be strictly increasing.
    #[error("thresholds must satisfy good < bad < alert (got {good}, {bad}, {alert})")]
    InvalidThresholds { good: u32, bad: u32, alert: u32 },

    /// A cadence was zero.
    #[error("{key} must be at least 1 second (got {value})")]
    InvalidSpeed { key: SettingKey, value: u64 },

    /// A value could not be parsed for its key.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: SettingKey, value: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<aerium_types::InvalidValue> for SettingsError {
    fn from(err: aerium_types::InvalidValue) -> Self {
        SettingsError::InvalidValue {
            key: err.key,
            value: err.value,
        }
    }
}

/// Errors raised by the cached analytics service.
#[derive(Debug, Clone, Error)]
pub enum InsightsError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type StoreResult<T> = Result<T, StoreError>;

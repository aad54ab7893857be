//! Live notifications fanned out to subscribers.

use alloc::format;
use alloc::string::String;

use crate::{AirQuality, Settings, UserId};

/// An event published by the pipeline.
///
/// Serialized (with the `serde` feature) as
/// `{"event": "reading" | "settingsChanged" | "alert", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "event", content = "payload", rename_all = "camelCase"))]
pub enum Event {
    Reading(LiveUpdate),
    SettingsChanged(SettingsChanged),
    Alert(Alert),
}

impl Event {
    /// The event name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Reading(_) => "reading",
            Event::SettingsChanged(_) => "settingsChanged",
            Event::Alert(_) => "alert",
        }
    }

    pub fn as_reading(&self) -> Option<&LiveUpdate> {
        match self {
            Event::Reading(update) => Some(update),
            _ => None,
        }
    }

    pub fn as_alert(&self) -> Option<&Alert> {
        match self {
            Event::Alert(alert) => Some(alert),
            _ => None,
        }
    }
}

/// Payload of a `reading` event.
///
/// When analysis is paused the update carries no ppm.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LiveUpdate {
    pub ppm: Option<u32>,
    pub timestamp_ms: u64,
    pub analysis_running: bool,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub quality: Option<AirQuality>,
}

impl LiveUpdate {
    /// A fresh reading, classified against the active thresholds.
    pub fn reading(ppm: u32, timestamp_ms: u64, settings: &Settings) -> Self {
        Self {
            ppm: Some(ppm),
            timestamp_ms,
            analysis_running: true,
            quality: Some(AirQuality::classify(ppm, settings)),
        }
    }

    /// The "analysis paused" message.
    pub fn paused(timestamp_ms: u64) -> Self {
        Self {
            ppm: None,
            timestamp_ms,
            analysis_running: false,
            quality: None,
        }
    }
}

/// Payload of a `settingsChanged` event.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SettingsChanged {
    /// `None` for the global scope.
    pub user: Option<UserId>,
    pub settings: Settings,
}

/// How serious a threshold crossing is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AlertLevel {
    /// At or above `bad_threshold`.
    Warning,
    /// At or above `alert_threshold`.
    Critical,
}

impl AlertLevel {
    /// The alert a reading raises, if any.
    pub fn for_ppm(ppm: u32, settings: &Settings) -> Option<Self> {
        if ppm >= settings.alert_threshold {
            Some(AlertLevel::Critical)
        } else if ppm >= settings.bad_threshold {
            Some(AlertLevel::Warning)
        } else {
            None
        }
    }
}

/// Payload of an `alert` event.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Alert {
    pub level: AlertLevel,
    pub ppm: u32,
    pub timestamp_ms: u64,
    pub message: String,
}

impl Alert {
    /// The alert for a reading, or `None` below `bad_threshold`.
    pub fn for_reading(ppm: u32, timestamp_ms: u64, settings: &Settings) -> Option<Self> {
        let level = AlertLevel::for_ppm(ppm, settings)?;
        let message = match level {
            AlertLevel::Critical => format!("Critical CO2 level detected: {ppm} ppm"),
            AlertLevel::Warning => format!("High CO2 level detected: {ppm} ppm"),
        };
        Some(Self {
            level,
            ppm,
            timestamp_ms,
            message,
        })
    }
}

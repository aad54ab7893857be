//! Operator-tunable settings and their closed key vocabulary.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;
use core::str::FromStr;
use core::time::Duration;

/// Resolved settings for one scope (global or a single user).
///
/// `good_threshold < bad_threshold < alert_threshold` is expected to hold;
/// it is enforced where settings are written, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Settings {
    /// Whether the broadcast loop generates readings.
    pub analysis_running: bool,
    /// Below this ppm the air is considered good.
    pub good_threshold: u32,
    /// At or above this ppm the air is considered bad.
    pub bad_threshold: u32,
    /// At or above this ppm the air is alarming.
    pub alert_threshold: u32,
    /// Random walk (`true`) or uniform noise (`false`).
    pub realistic_mode: bool,
    /// Seconds between broadcast cycles.
    pub update_speed: u64,
    /// Seconds between overview refreshes.
    pub overview_update_speed: u64,
}

impl Settings {
    /// True when the three thresholds are strictly increasing.
    pub fn thresholds_ordered(&self) -> bool {
        self.good_threshold < self.bad_threshold && self.bad_threshold < self.alert_threshold
    }

    /// The broadcast cycle period.
    pub fn update_period(&self) -> Duration {
        Duration::from_secs(self.update_speed)
    }

    /// Render one field as its storage string.
    pub fn value_str(&self, key: SettingKey) -> String {
        match key {
            SettingKey::AnalysisRunning => self.analysis_running.to_string(),
            SettingKey::GoodThreshold => self.good_threshold.to_string(),
            SettingKey::BadThreshold => self.bad_threshold.to_string(),
            SettingKey::AlertThreshold => self.alert_threshold.to_string(),
            SettingKey::RealisticMode => self.realistic_mode.to_string(),
            SettingKey::UpdateSpeed => self.update_speed.to_string(),
            SettingKey::OverviewUpdateSpeed => self.overview_update_speed.to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            analysis_running: true,
            good_threshold: 800,
            bad_threshold: 1200,
            alert_threshold: 1400,
            realistic_mode: true,
            update_speed: 1,
            overview_update_speed: 5,
        }
    }
}

/// The closed set of settings keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SettingKey {
    AnalysisRunning,
    GoodThreshold,
    BadThreshold,
    AlertThreshold,
    RealisticMode,
    UpdateSpeed,
    OverviewUpdateSpeed,
}

impl SettingKey {
    pub const ALL: [SettingKey; 7] = [
        SettingKey::AnalysisRunning,
        SettingKey::GoodThreshold,
        SettingKey::BadThreshold,
        SettingKey::AlertThreshold,
        SettingKey::RealisticMode,
        SettingKey::UpdateSpeed,
        SettingKey::OverviewUpdateSpeed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::AnalysisRunning => "analysis_running",
            SettingKey::GoodThreshold => "good_threshold",
            SettingKey::BadThreshold => "bad_threshold",
            SettingKey::AlertThreshold => "alert_threshold",
            SettingKey::RealisticMode => "realistic_mode",
            SettingKey::UpdateSpeed => "update_speed",
            SettingKey::OverviewUpdateSpeed => "overview_update_speed",
        }
    }

    /// Boolean keys accept `true/false/1/0`; all others are unsigned integers.
    pub fn is_flag(&self) -> bool {
        matches!(self, SettingKey::AnalysisRunning | SettingKey::RealisticMode)
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a key is outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKey(pub String);

impl fmt::Display for UnknownKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown settings key: {}", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for UnknownKey {}

impl FromStr for SettingKey {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| UnknownKey(s.into()))
    }
}

/// Error returned when a value does not parse for its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidValue {
    pub key: SettingKey,
    pub value: String,
}

impl fmt::Display for InvalidValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid value {:?} for {}", self.value, self.key)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InvalidValue {}

/// A partial settings record.
///
/// Used both as the input of a save (only provided keys change) and as the
/// stored per-user override row (unset fields fall back to
/// [`Settings::default`], never to the current global values).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SettingsPatch {
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub analysis_running: Option<bool>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub good_threshold: Option<u32>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub bad_threshold: Option<u32>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub alert_threshold: Option<u32>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub realistic_mode: Option<bool>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub update_speed: Option<u64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub overview_update_speed: Option<u64>,
}

impl SettingsPatch {
    /// A patch that sets every field to the given settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            analysis_running: Some(settings.analysis_running),
            good_threshold: Some(settings.good_threshold),
            bad_threshold: Some(settings.bad_threshold),
            alert_threshold: Some(settings.alert_threshold),
            realistic_mode: Some(settings.realistic_mode),
            update_speed: Some(settings.update_speed),
            overview_update_speed: Some(settings.overview_update_speed),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// Keys this patch provides, in [`SettingKey::ALL`] order.
    pub fn keys(&self) -> Vec<SettingKey> {
        SettingKey::ALL
            .iter()
            .copied()
            .filter(|key| self.value_str(*key).is_some())
            .collect()
    }

    /// Overwrite the provided fields of `settings`.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(v) = self.analysis_running {
            settings.analysis_running = v;
        }
        if let Some(v) = self.good_threshold {
            settings.good_threshold = v;
        }
        if let Some(v) = self.bad_threshold {
            settings.bad_threshold = v;
        }
        if let Some(v) = self.alert_threshold {
            settings.alert_threshold = v;
        }
        if let Some(v) = self.realistic_mode {
            settings.realistic_mode = v;
        }
        if let Some(v) = self.update_speed {
            settings.update_speed = v;
        }
        if let Some(v) = self.overview_update_speed {
            settings.overview_update_speed = v;
        }
    }

    /// Defaults overlaid with this patch.
    pub fn resolve(&self) -> Settings {
        let mut settings = Settings::default();
        self.apply_to(&mut settings);
        settings
    }

    /// Layer `other` on top of `self`; fields provided by `other` win.
    pub fn merge(&mut self, other: &SettingsPatch) {
        self.analysis_running = other.analysis_running.or(self.analysis_running);
        self.good_threshold = other.good_threshold.or(self.good_threshold);
        self.bad_threshold = other.bad_threshold.or(self.bad_threshold);
        self.alert_threshold = other.alert_threshold.or(self.alert_threshold);
        self.realistic_mode = other.realistic_mode.or(self.realistic_mode);
        self.update_speed = other.update_speed.or(self.update_speed);
        self.overview_update_speed = other.overview_update_speed.or(self.overview_update_speed);
    }

    /// The storage string for a key, if provided.
    pub fn value_str(&self, key: SettingKey) -> Option<String> {
        match key {
            SettingKey::AnalysisRunning => self.analysis_running.map(|v| v.to_string()),
            SettingKey::GoodThreshold => self.good_threshold.map(|v| v.to_string()),
            SettingKey::BadThreshold => self.bad_threshold.map(|v| v.to_string()),
            SettingKey::AlertThreshold => self.alert_threshold.map(|v| v.to_string()),
            SettingKey::RealisticMode => self.realistic_mode.map(|v| v.to_string()),
            SettingKey::UpdateSpeed => self.update_speed.map(|v| v.to_string()),
            SettingKey::OverviewUpdateSpeed => self.overview_update_speed.map(|v| v.to_string()),
        }
    }

    /// Set a key from its storage string.
    pub fn set_str(&mut self, key: SettingKey, value: &str) -> Result<(), InvalidValue> {
        let invalid = || InvalidValue {
            key,
            value: value.into(),
        };
        let trimmed = value.trim();

        if key.is_flag() {
            let flag = match trimmed {
                "1" | "true" | "True" | "on" => true,
                "0" | "false" | "False" | "off" => false,
                _ => return Err(invalid()),
            };
            match key {
                SettingKey::AnalysisRunning => self.analysis_running = Some(flag),
                _ => self.realistic_mode = Some(flag),
            }
            return Ok(());
        }

        let number: u64 = trimmed.parse().map_err(|_| invalid())?;
        match key {
            SettingKey::UpdateSpeed => self.update_speed = Some(number),
            SettingKey::OverviewUpdateSpeed => self.overview_update_speed = Some(number),
            _ => {
                let threshold = u32::try_from(number).map_err(|_| invalid())?;
                match key {
                    SettingKey::GoodThreshold => self.good_threshold = Some(threshold),
                    SettingKey::BadThreshold => self.bad_threshold = Some(threshold),
                    _ => self.alert_threshold = Some(threshold),
                }
            }
        }
        Ok(())
    }
}

/// Air quality band of a concentration under a set of thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AirQuality {
    Good,
    Moderate,
    Poor,
    Critical,
}

impl AirQuality {
    pub fn classify(ppm: u32, settings: &Settings) -> Self {
        if ppm < settings.good_threshold {
            AirQuality::Good
        } else if ppm < settings.bad_threshold {
            AirQuality::Moderate
        } else if ppm < settings.alert_threshold {
            AirQuality::Poor
        } else {
            AirQuality::Critical
        }
    }

    /// Returns a short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            AirQuality::Good => "good",
            AirQuality::Moderate => "moderate",
            AirQuality::Poor => "poor",
            AirQuality::Critical => "critical",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_ordered() {
        let settings = Settings::default();
        assert!(settings.thresholds_ordered());
        assert_eq!(settings.good_threshold, 800);
        assert_eq!(settings.bad_threshold, 1200);
        assert_eq!(settings.alert_threshold, 1400);
        assert_eq!(settings.update_period(), Duration::from_secs(1));
    }

    #[test]
    fn key_round_trips_through_str() {
        for key in SettingKey::ALL {
            assert_eq!(key.as_str().parse::<SettingKey>().unwrap(), key);
        }
        assert_eq!(
            "audio_alerts".parse::<SettingKey>(),
            Err(UnknownKey("audio_alerts".into()))
        );
    }

    #[test]
    fn patch_changes_only_provided_fields() {
        let patch = SettingsPatch {
            good_threshold: Some(700),
            ..Default::default()
        };

        let resolved = patch.resolve();
        let defaults = Settings::default();
        assert_eq!(resolved.good_threshold, 700);
        assert_eq!(resolved.bad_threshold, defaults.bad_threshold);
        assert_eq!(resolved.alert_threshold, defaults.alert_threshold);
        assert_eq!(patch.keys(), vec![SettingKey::GoodThreshold]);
    }

    #[test]
    fn merge_prefers_newer_values() {
        let mut stored = SettingsPatch {
            good_threshold: Some(700),
            update_speed: Some(3),
            ..Default::default()
        };
        let incoming = SettingsPatch {
            update_speed: Some(10),
            realistic_mode: Some(false),
            ..Default::default()
        };

        stored.merge(&incoming);
        assert_eq!(stored.good_threshold, Some(700));
        assert_eq!(stored.update_speed, Some(10));
        assert_eq!(stored.realistic_mode, Some(false));
    }

    #[test]
    fn set_str_parses_flags_and_numbers() {
        let mut patch = SettingsPatch::default();
        patch.set_str(SettingKey::AnalysisRunning, "0").unwrap();
        patch.set_str(SettingKey::RealisticMode, "true").unwrap();
        patch.set_str(SettingKey::AlertThreshold, " 1500 ").unwrap();
        patch.set_str(SettingKey::UpdateSpeed, "2").unwrap();

        assert_eq!(patch.analysis_running, Some(false));
        assert_eq!(patch.realistic_mode, Some(true));
        assert_eq!(patch.alert_threshold, Some(1500));
        assert_eq!(patch.update_speed, Some(2));
    }

    #[test]
    fn set_str_rejects_garbage() {
        let mut patch = SettingsPatch::default();
        assert!(patch.set_str(SettingKey::GoodThreshold, "lots").is_err());
        assert!(patch.set_str(SettingKey::AnalysisRunning, "maybe").is_err());
        assert!(patch.set_str(SettingKey::BadThreshold, "99999999999").is_err());
        assert!(patch.is_empty());
    }

    #[test]
    fn value_str_matches_between_patch_and_settings() {
        let settings = Settings::default();
        let patch = SettingsPatch::from_settings(&settings);
        for key in SettingKey::ALL {
            assert_eq!(patch.value_str(key), Some(settings.value_str(key)));
        }
    }

    #[test]
    fn test_air_quality_bands() {
        let settings = Settings::default();
        assert_eq!(AirQuality::classify(799, &settings), AirQuality::Good);
        assert_eq!(AirQuality::classify(800, &settings), AirQuality::Moderate);
        assert_eq!(AirQuality::classify(1200, &settings), AirQuality::Poor);
        assert_eq!(AirQuality::classify(1400, &settings), AirQuality::Critical);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_patch_skips_unset_fields() {
        let patch = SettingsPatch {
            bad_threshold: Some(1100),
            ..Default::default()
        };
        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(json, r#"{"bad_threshold":1100}"#);

        let parsed: SettingsPatch = serde_json::from_str(r#"{"bad_threshold":1100,"theme":"dark"}"#).unwrap();
        assert_eq!(parsed, patch);
    }
}

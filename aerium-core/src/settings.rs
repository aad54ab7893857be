//! Settings Store: global settings plus per-user overrides.
//!
//! Unset per-user fields resolve to [`Settings::default`], never to the
//! current global values. A user's settings therefore do not move when an
//! operator changes the global scope.

use std::collections::HashMap;
use std::sync::Arc;

use aerium_types::{Event, SettingKey, Settings, SettingsChanged, SettingsPatch, UserId};
use parking_lot::RwLock;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::error::SettingsError;
use crate::notify::Notifier;
use crate::store::SettingsBackend;

/// Result of an untyped save.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    /// Settings after the save.
    pub settings: Settings,
    /// Keys that were not recognised and therefore not written.
    pub ignored: Vec<String>,
}

/// Reads, merges and validates settings for the global scope and for
/// individual users.
///
/// Resolved settings are cached in-process. Every successful write updates
/// the cache, bumps the revision observed through [`SettingsStore::subscribe`]
/// and publishes [`Event::SettingsChanged`].
pub struct SettingsStore {
    backend: Arc<dyn SettingsBackend>,
    notifier: Notifier,
    resolved: RwLock<HashMap<Option<UserId>, Settings>>,
    writes: Mutex<()>,
    revision: watch::Sender<u64>,
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("revision", &*self.revision.borrow())
            .field("cached_scopes", &self.resolved.read().len())
            .finish()
    }
}

impl SettingsStore {
    pub fn new(backend: Arc<dyn SettingsBackend>, notifier: Notifier) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            backend,
            notifier,
            resolved: RwLock::new(HashMap::new()),
            writes: Mutex::new(()),
            revision,
        }
    }

    /// Resolved settings for a user, or the global scope when `user` is `None`.
    ///
    /// The first load for a user creates an empty override row.
    pub async fn load(&self, user: Option<UserId>) -> Result<Settings, SettingsError> {
        if let Some(settings) = self.cached(user) {
            return Ok(settings);
        }

        // Serialised with writes so a concurrent save cannot be overwritten
        // by the stale value read here.
        let _guard = self.writes.lock().await;
        if let Some(settings) = self.cached(user) {
            return Ok(settings);
        }

        let mut patch = match user {
            None => self.global_patch().await?,
            Some(user) => match self.backend.user_row(user).await? {
                Some(row) => row,
                None => {
                    let row = SettingsPatch::default();
                    self.backend.put_user_row(user, &row).await?;
                    debug!(%user, "Created settings override row");
                    row
                }
            },
        };

        let repaired = repair(&mut patch);
        if !repaired.is_empty() {
            warn!(user = ?user.map(|u| u.0), keys = ?repaired, "Replaced invalid stored settings with defaults");
        }

        let settings = patch.resolve();
        self.resolved.write().insert(user, settings.clone());
        Ok(settings)
    }

    /// Merge `patch` into the stored settings of a scope.
    ///
    /// Only the provided keys change. The merged result must keep
    /// `good < bad < alert` and both cadences at 1 second or more; otherwise
    /// nothing is written. An empty patch writes nothing and publishes
    /// nothing. Invalid stored values are replaced by their defaults and
    /// written back along with the patch.
    pub async fn save(&self, user: Option<UserId>, patch: SettingsPatch) -> Result<Settings, SettingsError> {
        if patch.is_empty() {
            return self.load(user).await;
        }

        let guard = self.writes.lock().await;

        let mut stored = match user {
            None => self.global_patch().await?,
            Some(user) => self.backend.user_row(user).await?.unwrap_or_default(),
        };
        let repaired = repair(&mut stored);
        stored.merge(&patch);
        let settings = stored.resolve();
        validate(&settings)?;

        match user {
            None => {
                let mut keys = patch.keys();
                for key in repaired {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
                let values: Vec<(SettingKey, String)> = keys
                    .into_iter()
                    .filter_map(|key| stored.value_str(key).map(|value| (key, value)))
                    .collect();
                self.backend.put_global_values(&values).await?;
            }
            Some(user) => self.backend.put_user_row(user, &stored).await?,
        }

        self.resolved.write().insert(user, settings.clone());
        drop(guard);

        info!(user = ?user.map(|u| u.0), keys = ?patch.keys(), "Settings saved");
        self.announce(user, &settings).await;
        Ok(settings)
    }

    /// Save from an untyped JSON object.
    ///
    /// Unknown keys are ignored and reported back. Values may be JSON
    /// booleans, numbers or strings (`"1"`, `"on"`, `"1200"`, ...).
    pub async fn save_json(
        &self,
        user: Option<UserId>,
        values: &serde_json::Value,
    ) -> Result<SaveOutcome, SettingsError> {
        let mut patch = SettingsPatch::default();
        let mut ignored = Vec::new();

        if let Some(object) = values.as_object() {
            for (name, value) in object {
                let Ok(key) = name.parse::<SettingKey>() else {
                    ignored.push(name.clone());
                    continue;
                };
                let raw = match value {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    serde_json::Value::Number(n) => n.to_string(),
                    other => {
                        return Err(SettingsError::InvalidValue {
                            key,
                            value: other.to_string(),
                        })
                    }
                };
                patch.set_str(key, &raw)?;
            }
        }

        if !ignored.is_empty() {
            debug!(keys = ?ignored, "Ignored unknown settings keys");
        }

        let settings = self.save(user, patch).await?;
        Ok(SaveOutcome { settings, ignored })
    }

    /// Drop the stored values of a scope so it resolves to the defaults again.
    pub async fn reset(&self, user: Option<UserId>) -> Result<Settings, SettingsError> {
        let guard = self.writes.lock().await;
        match user {
            None => self.backend.clear_global().await?,
            Some(user) => {
                self.backend.delete_user_row(user).await?;
            }
        }

        let settings = Settings::default();
        self.resolved.write().insert(user, settings.clone());
        drop(guard);

        info!(user = ?user.map(|u| u.0), "Settings reset");
        self.announce(user, &settings).await;
        Ok(settings)
    }

    /// Watch the settings revision. It increases after every successful
    /// save or reset.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn cached(&self, user: Option<UserId>) -> Option<Settings> {
        self.resolved.read().get(&user).cloned()
    }

    async fn global_patch(&self) -> Result<SettingsPatch, SettingsError> {
        let mut patch = SettingsPatch::default();
        for (name, value) in self.backend.global_values().await? {
            let Ok(key) = name.parse::<SettingKey>() else {
                warn!(key = %name, "Ignoring unknown stored setting");
                continue;
            };
            if patch.set_str(key, &value).is_err() {
                warn!(%key, value = %value, "Ignoring unparsable stored setting");
            }
        }
        Ok(patch)
    }

    async fn announce(&self, user: Option<UserId>, settings: &Settings) {
        self.revision.send_modify(|revision| *revision += 1);
        let event = Event::SettingsChanged(SettingsChanged {
            user,
            settings: settings.clone(),
        });
        self.notifier.publish(&event).await;
    }
}

/// Replace the fields of a stored patch that break [`validate`] with their
/// defaults. Returns the keys that changed.
///
/// Out-of-order thresholds are reset together.
fn repair(patch: &mut SettingsPatch) -> Vec<SettingKey> {
    let defaults = Settings::default();
    let resolved = patch.resolve();
    let mut repaired = Vec::new();

    if !resolved.thresholds_ordered() {
        patch.good_threshold = Some(defaults.good_threshold);
        patch.bad_threshold = Some(defaults.bad_threshold);
        patch.alert_threshold = Some(defaults.alert_threshold);
        repaired.extend([
            SettingKey::GoodThreshold,
            SettingKey::BadThreshold,
            SettingKey::AlertThreshold,
        ]);
    }
    if resolved.update_speed == 0 {
        patch.update_speed = Some(defaults.update_speed);
        repaired.push(SettingKey::UpdateSpeed);
    }
    if resolved.overview_update_speed == 0 {
        patch.overview_update_speed = Some(defaults.overview_update_speed);
        repaired.push(SettingKey::OverviewUpdateSpeed);
    }
    repaired
}

/// Check the invariants every stored scope must satisfy.
pub fn validate(settings: &Settings) -> Result<(), SettingsError> {
    if !settings.thresholds_ordered() {
        return Err(SettingsError::InvalidThresholds {
            good: settings.good_threshold,
            bad: settings.bad_threshold,
            alert: settings.alert_threshold,
        });
    }
    for (key, value) in [
        (SettingKey::UpdateSpeed, settings.update_speed),
        (SettingKey::OverviewUpdateSpeed, settings.overview_update_speed),
    ] {
        if value == 0 {
            return Err(SettingsError::InvalidSpeed { key, value });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use serde_json::json;

    fn store() -> (Arc<MemoryStore>, SettingsStore) {
        let backend = Arc::new(MemoryStore::new());
        let settings = SettingsStore::new(backend.clone(), Notifier::broadcast(16));
        (backend, settings)
    }

    #[tokio::test]
    async fn test_save_changes_only_given_field() {
        let (_, settings) = store();
        let user = Some(UserId(1));

        let patch = SettingsPatch {
            good_threshold: Some(700),
            ..Default::default()
        };
        settings.save(user, patch).await.unwrap();

        let loaded = settings.load(user).await.unwrap();
        let defaults = Settings::default();
        assert_eq!(loaded.good_threshold, 700);
        assert_eq!(loaded.bad_threshold, defaults.bad_threshold);
        assert_eq!(loaded.alert_threshold, defaults.alert_threshold);
    }

    #[tokio::test]
    async fn user_fields_fall_back_to_defaults_not_global() {
        let (_, settings) = store();
        settings
            .save(
                None,
                SettingsPatch {
                    bad_threshold: Some(1000),
                    update_speed: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let user = settings.load(Some(UserId(2))).await.unwrap();
        assert_eq!(user, Settings::default());

        let global = settings.load(None).await.unwrap();
        assert_eq!(global.bad_threshold, 1000);
        assert_eq!(global.update_speed, 5);
    }

    #[tokio::test]
    async fn first_user_load_creates_empty_row() {
        let (backend, settings) = store();
        assert_eq!(backend.user_row(UserId(3)).await.unwrap(), None);

        settings.load(Some(UserId(3))).await.unwrap();
        assert_eq!(
            backend.user_row(UserId(3)).await.unwrap(),
            Some(SettingsPatch::default())
        );
    }

    #[tokio::test]
    async fn test_rejects_inverted_thresholds() {
        let (backend, settings) = store();
        let patch = SettingsPatch {
            good_threshold: Some(1300),
            ..Default::default()
        };

        let err = settings.save(None, patch).await.unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidThresholds {
                good: 1300,
                bad: 1200,
                alert: 1400
            }
        ));
        assert!(backend.global_values().await.unwrap().is_empty());
        assert_eq!(settings.revision(), 0);
    }

    #[tokio::test]
    async fn validation_uses_merged_values() {
        let (_, settings) = store();
        let user = Some(UserId(4));

        // Raising alert first makes room for a higher bad threshold.
        settings
            .save(user, SettingsPatch { alert_threshold: Some(2000), ..Default::default() })
            .await
            .unwrap();
        let saved = settings
            .save(user, SettingsPatch { bad_threshold: Some(1800), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(saved.bad_threshold, 1800);
        assert_eq!(saved.alert_threshold, 2000);
    }

    #[tokio::test]
    async fn zero_speed_is_rejected() {
        let (_, settings) = store();
        let err = settings
            .save(None, SettingsPatch { update_speed: Some(0), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidSpeed {
                key: SettingKey::UpdateSpeed,
                value: 0
            }
        ));
    }

    #[tokio::test]
    async fn test_save_publishes_and_bumps_revision() {
        let (_, settings) = store();
        let mut events = settings.notifier.subscribe().unwrap();
        let mut revision = settings.subscribe();

        settings
            .save(None, SettingsPatch { analysis_running: Some(false), ..Default::default() })
            .await
            .unwrap();

        revision.changed().await.unwrap();
        assert_eq!(*revision.borrow(), 1);

        match events.recv().await.unwrap() {
            Event::SettingsChanged(changed) => {
                assert_eq!(changed.user, None);
                assert!(!changed.settings.analysis_running);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn save_json_ignores_unknown_keys() {
        let (_, settings) = store();
        let outcome = settings
            .save_json(
                Some(UserId(5)),
                &json!({"good_threshold": "750", "realistic_mode": "0", "theme": "dark"}),
            )
            .await
            .unwrap();

        assert_eq!(outcome.ignored, vec!["theme".to_string()]);
        assert_eq!(outcome.settings.good_threshold, 750);
        assert!(!outcome.settings.realistic_mode);
    }

    #[tokio::test]
    async fn only_unknown_keys_is_a_no_op() {
        let (_, settings) = store();
        let outcome = settings
            .save_json(None, &json!({"theme": "dark", "audio_alerts": true}))
            .await
            .unwrap();

        assert_eq!(outcome.settings, Settings::default());
        assert_eq!(outcome.ignored.len(), 2);
        assert_eq!(settings.revision(), 0);
    }

    #[tokio::test]
    async fn save_json_rejects_bad_values() {
        let (_, settings) = store();
        let err = settings
            .save_json(None, &json!({"bad_threshold": "loads"}))
            .await
            .unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { key: SettingKey::BadThreshold, .. }));

        let err = settings
            .save_json(None, &json!({"update_speed": [1, 2]}))
            .await
            .unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { key: SettingKey::UpdateSpeed, .. }));
    }

    #[tokio::test]
    async fn test_reset_restores_defaults() {
        let (backend, settings) = store();
        let user = Some(UserId(6));
        settings
            .save(user, SettingsPatch { update_speed: Some(9), ..Default::default() })
            .await
            .unwrap();

        let reset = settings.reset(user).await.unwrap();
        assert_eq!(reset, Settings::default());
        assert_eq!(settings.load(user).await.unwrap(), Settings::default());
        assert_eq!(backend.user_row(UserId(6)).await.unwrap(), None);
        assert_eq!(settings.revision(), 2);
    }

    #[tokio::test]
    async fn stored_garbage_is_skipped() {
        let (backend, settings) = store();
        backend.put_raw_global("legacy_theme", "dark");
        backend.put_raw_global("alert_threshold", "lots");
        backend.put_raw_global("good_threshold", "650");

        let loaded = settings.load(None).await.unwrap();
        assert_eq!(loaded.good_threshold, 650);
        assert_eq!(loaded.alert_threshold, Settings::default().alert_threshold);
    }

    #[tokio::test]
    async fn invalid_stored_values_fall_back_to_defaults() {
        let (backend, settings) = store();
        backend.put_raw_global("update_speed", "0");
        backend.put_raw_global("good_threshold", "1500");
        backend.put_raw_global("realistic_mode", "0");

        let loaded = settings.load(None).await.unwrap();
        assert!(validate(&loaded).is_ok());
        let defaults = Settings::default();
        assert_eq!(loaded.update_speed, defaults.update_speed);
        assert_eq!(loaded.good_threshold, defaults.good_threshold);
        assert_eq!(loaded.bad_threshold, defaults.bad_threshold);
        assert!(!loaded.realistic_mode);
    }

    #[tokio::test]
    async fn save_repairs_invalid_stored_values() {
        let (backend, settings) = store();
        backend.put_raw_global("overview_update_speed", "0");
        backend.put_raw_global("bad_threshold", "300");

        let saved = settings
            .save(None, SettingsPatch { update_speed: Some(4), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(saved.update_speed, 4);
        assert!(validate(&saved).is_ok());

        // a fresh store reads the same values back
        let reloaded = SettingsStore::new(backend.clone(), Notifier::default());
        assert_eq!(reloaded.load(None).await.unwrap(), saved);
        let stored: HashMap<String, String> = backend.global_values().await.unwrap().into_iter().collect();
        assert_eq!(stored.get("overview_update_speed").map(String::as_str), Some("5"));
        assert_eq!(stored.get("bad_threshold").map(String::as_str), Some("1200"));
    }

    #[tokio::test]
    async fn invalid_user_row_falls_back_to_defaults() {
        let (backend, settings) = store();
        let row = SettingsPatch {
            good_threshold: Some(1_300),
            alert_threshold: Some(1_000),
            ..Default::default()
        };
        backend.put_user_row(UserId(7), &row).await.unwrap();

        let loaded = settings.load(Some(UserId(7))).await.unwrap();
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn test_validate_defaults() {
        assert!(validate(&Settings::default()).is_ok());
    }
}

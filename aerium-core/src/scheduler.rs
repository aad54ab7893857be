//! The broadcast loop: generate, persist, notify.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use aerium_types::{current_timestamp_ms, Alert, AlertLevel, Event, LiveUpdate, NewReading, Settings, Source, UserId};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::generator::{GeneratorMode, ReadingGenerator};
use crate::notify::Notifier;
use crate::settings::SettingsStore;
use crate::store::ReadingStore;

/// Smallest ppm change that is worth notifying subscribers about.
pub const MIN_NOTIFY_DELTA: u32 = 5;

/// Lower bound on the wait between cycles.
const MIN_PERIOD: Duration = Duration::from_secs(1);

/// What a single cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A reading was persisted and published.
    Published(u32),
    /// A reading was persisted without notifying.
    Persisted(u32),
    /// Analysis just stopped; the OFF notification was sent.
    Paused,
    /// Analysis is still stopped; nothing happened.
    Idle,
    /// Settings or persistence failed; the cycle was skipped.
    Failed,
}

/// Decides which cycles notify subscribers.
///
/// Readings notify when nothing was persisted before, when the ppm moved by
/// at least [`MIN_NOTIFY_DELTA`], or when analysis resumes. The OFF state
/// notifies once per transition. Alerts are raised when the alert level of
/// the persisted readings changes to warning or critical.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct BroadcastGate {
    last_ppm: Option<u32>,
    last_running: Option<bool>,
    last_alert: Option<AlertLevel>,
}

impl BroadcastGate {
    /// Record an OFF cycle. Returns whether to notify.
    pub(crate) fn pause(&mut self) -> bool {
        let changed = self.last_running != Some(false);
        self.last_running = Some(false);
        changed
    }

    /// Record a persisted reading. Returns whether to notify.
    pub(crate) fn admit(&mut self, ppm: u32) -> bool {
        let resumed = self.last_running == Some(false);
        let moved = self
            .last_ppm
            .map_or(true, |last| last.abs_diff(ppm) >= MIN_NOTIFY_DELTA);
        self.last_running = Some(true);
        self.last_ppm = Some(ppm);
        resumed || moved
    }

    /// Record the alert level of a persisted reading. Returns whether to
    /// raise an alert.
    pub(crate) fn raise(&mut self, level: Option<AlertLevel>) -> bool {
        let changed = level.is_some() && level != self.last_alert;
        self.last_alert = level;
        changed
    }
}

struct Inner {
    store: Arc<dyn ReadingStore>,
    settings: Arc<SettingsStore>,
    notifier: Notifier,
    generator: Mutex<ReadingGenerator>,
    gate: Mutex<BroadcastGate>,
    user: Option<UserId>,
    source: Source,
}

impl Inner {
    /// Run one cycle and return the period to wait before the next one.
    async fn cycle(&self) -> (CycleOutcome, Duration) {
        let settings = match self.settings.load(self.user).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Failed to load settings");
                return (CycleOutcome::Failed, Settings::default().update_period());
            }
        };
        let period = settings.update_period().max(MIN_PERIOD);
        (self.step(&settings).await, period)
    }

    async fn step(&self, settings: &Settings) -> CycleOutcome {
        let now = current_timestamp_ms();

        if !settings.analysis_running {
            if !self.gate.lock().pause() {
                return CycleOutcome::Idle;
            }
            info!("Analysis paused");
            self.notifier.publish(&Event::Reading(LiveUpdate::paused(now))).await;
            return CycleOutcome::Paused;
        }

        let mode = GeneratorMode::from_realistic(settings.realistic_mode);
        let ppm = self.generator.lock().next(mode);

        if let Err(e) = self
            .store
            .insert_reading(NewReading::at(now, ppm, self.source))
            .await
        {
            warn!(ppm, error = %e, "Failed to persist reading");
            return CycleOutcome::Failed;
        }

        let (notify, raise) = {
            let mut gate = self.gate.lock();
            (gate.admit(ppm), gate.raise(AlertLevel::for_ppm(ppm, settings)))
        };

        if notify {
            self.notifier
                .publish(&Event::Reading(LiveUpdate::reading(ppm, now, settings)))
                .await;
        }
        if raise {
            if let Some(alert) = Alert::for_reading(ppm, now, settings) {
                warn!(ppm, level = ?alert.level, "CO2 threshold crossed");
                self.notifier.publish(&Event::Alert(alert)).await;
            }
        }

        if notify {
            CycleOutcome::Published(ppm)
        } else {
            debug!(ppm, "Persisted reading without notifying");
            CycleOutcome::Persisted(ppm)
        }
    }
}

/// Background activity that turns generator output into persisted,
/// published readings.
///
/// The cycle period is re-read from the settings every cycle, so changes to
/// `update_speed` apply from the next tick.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use aerium_core::{MemoryStore, Notifier, Scheduler, SettingsStore};
///
/// #[tokio::main]
/// async fn main() {
///     let store = Arc::new(MemoryStore::new());
///     let notifier = Notifier::broadcast(64);
///     let settings = Arc::new(SettingsStore::new(store.clone(), notifier.clone()));
///
///     let scheduler = Scheduler::builder(store, settings).notifier(notifier).build();
///     scheduler.start();
///
///     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
///     scheduler.shutdown().await;
/// }
/// ```
pub struct Scheduler {
    inner: Arc<Inner>,
    run: Mutex<Option<Run>>,
}

/// One spawned loop and the flag that stops it.
struct Run {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Run {
    fn stopping(&self) -> bool {
        *self.stop_tx.borrow()
    }

    fn is_live(&self) -> bool {
        !self.task.is_finished() && !self.stopping()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("user", &self.inner.user)
            .field("source", &self.inner.source)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Scheduler {
    pub fn builder(store: Arc<dyn ReadingStore>, settings: Arc<SettingsStore>) -> SchedulerBuilder {
        SchedulerBuilder::new(store, settings)
    }

    /// Spawn the loop. Returns `false` if it was already running.
    ///
    /// A loop that was asked to stop no longer counts as running: it finishes
    /// its cycle on its own while a fresh loop takes over.
    pub fn start(&self) -> bool {
        let mut run = self.run.lock();
        if run.as_ref().is_some_and(Run::is_live) {
            return false;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let inner = self.inner.clone();

        info!(user = ?inner.user, source = %inner.source, "Scheduler started");
        let task = tokio::spawn(async move {
            loop {
                if *stop_rx.borrow() {
                    break;
                }

                let (_, period) = inner.cycle().await;

                tokio::select! {
                    _ = tokio::time::sleep(period) => {}
                    _ = stop_rx.changed() => {}
                }
            }
            info!("Scheduler stopped");
        });
        *run = Some(Run { stop_tx, task });
        true
    }

    /// Ask the loop to stop. An in-flight cycle completes first.
    pub fn stop(&self) {
        if let Some(run) = self.run.lock().as_ref() {
            run.stop_tx.send_replace(true);
        }
    }

    /// Stop and wait for the loop to exit.
    pub async fn shutdown(&self) {
        let run = self.run.lock().take();
        if let Some(run) = run {
            run.stop_tx.send_replace(true);
            if let Err(e) = run.task.await {
                warn!(error = %e, "Scheduler task failed");
            }
        }
    }

    /// Whether a loop is active and has not been asked to stop.
    pub fn is_running(&self) -> bool {
        self.run.lock().as_ref().is_some_and(Run::is_live)
    }

    /// Run a single cycle now, independent of the background loop.
    pub async fn run_cycle(&self) -> CycleOutcome {
        self.inner.cycle().await.0
    }

    /// Restart the generator walk from `base_value`.
    pub fn reset_generator(&self, base_value: f64) {
        self.inner.generator.lock().reset(base_value);
        info!(base_value, "Generator reset");
    }
}

/// Builder for a [`Scheduler`].
pub struct SchedulerBuilder {
    store: Arc<dyn ReadingStore>,
    settings: Arc<SettingsStore>,
    notifier: Notifier,
    generator: Option<ReadingGenerator>,
    user: Option<UserId>,
    source: Source,
}

impl SchedulerBuilder {
    pub fn new(store: Arc<dyn ReadingStore>, settings: Arc<SettingsStore>) -> Self {
        Self {
            store,
            settings,
            notifier: Notifier::default(),
            generator: None,
            user: None,
            source: Source::Live,
        }
    }

    /// Where readings are published. Defaults to no outputs.
    pub fn notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Use this generator instead of an entropy-seeded one.
    pub fn generator(mut self, generator: ReadingGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Follow one user's settings instead of the global scope.
    pub fn user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    /// Source tag for persisted readings. Defaults to [`Source::Live`].
    pub fn source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    pub fn build(self) -> Scheduler {
        Scheduler {
            inner: Arc::new(Inner {
                store: self.store,
                settings: self.settings,
                notifier: self.notifier,
                generator: Mutex::new(self.generator.unwrap_or_default()),
                gate: Mutex::new(BroadcastGate::default()),
                user: self.user,
                source: self.source,
            }),
            run: Mutex::new(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::memory::MemoryStore;
    use crate::notify::Output;
    use crate::store::TimeRange;
    use aerium_types::{Reading, SettingsPatch, WindowStats};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;

    /// A reading store that can be switched offline.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        offline: AtomicBool,
    }

    #[async_trait]
    impl ReadingStore for FlakyStore {
        async fn insert_reading(&self, reading: NewReading) -> Result<u64, StoreError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("offline".into()));
            }
            self.inner.insert_reading(reading).await
        }

        async fn query_readings(&self, range: TimeRange, source: Option<Source>) -> Result<Vec<Reading>, StoreError> {
            self.inner.query_readings(range, source).await
        }

        async fn query_aggregate(&self, range: TimeRange, source: Option<Source>) -> Result<WindowStats, StoreError> {
            self.inner.query_aggregate(range, source).await
        }

        async fn time_bounds(&self, source: Option<Source>) -> Result<Option<TimeRange>, StoreError> {
            self.inner.time_bounds(source).await
        }
    }

    struct Fixture {
        store: Arc<FlakyStore>,
        backend: Arc<MemoryStore>,
        settings: Arc<SettingsStore>,
        scheduler: Scheduler,
        events: mpsc::Receiver<Event>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(FlakyStore::default());
        let backend = Arc::new(MemoryStore::new());
        let settings = Arc::new(SettingsStore::new(backend.clone(), Notifier::default()));
        let (output, events) = Output::channel(64);
        let scheduler = Scheduler::builder(store.clone(), settings.clone())
            .notifier(Notifier::builder().output(output).build())
            .generator(ReadingGenerator::seeded(42))
            .build();
        Fixture {
            store,
            backend,
            settings,
            scheduler,
            events,
        }
    }

    async fn set_running(settings: &SettingsStore, running: bool) {
        let patch = SettingsPatch {
            analysis_running: Some(running),
            ..Default::default()
        };
        settings.save(None, patch).await.unwrap();
    }

    fn drain(events: &mut mpsc::Receiver<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn test_gate_dedup() {
        let mut gate = BroadcastGate::default();
        assert!(gate.admit(1_000));
        assert!(!gate.admit(1_003));
        // compared against the last persisted value, 1003
        assert!(gate.admit(1_008));
        assert!(!gate.admit(1_004));
        assert!(gate.admit(998));
    }

    #[test]
    fn gate_threshold_is_inclusive() {
        let mut gate = BroadcastGate {
            last_ppm: Some(1_000),
            last_running: Some(true),
            ..Default::default()
        };
        assert!(!gate.clone().admit(1_003));
        assert!(gate.admit(1_006));
        assert!(gate.admit(1_011));
    }

    #[test]
    fn gate_pause_is_edge_triggered() {
        let mut gate = BroadcastGate::default();
        assert!(gate.pause());
        assert!(!gate.pause());
        assert!(!gate.pause());

        // resuming always notifies, even without movement
        gate.last_ppm = Some(900);
        assert!(gate.admit(900));
        assert!(!gate.admit(900));
        assert!(gate.pause());
    }

    #[test]
    fn test_gate_alerts_on_level_change() {
        let mut gate = BroadcastGate::default();
        assert!(!gate.raise(None));
        assert!(gate.raise(Some(AlertLevel::Warning)));
        assert!(!gate.raise(Some(AlertLevel::Warning)));
        assert!(gate.raise(Some(AlertLevel::Critical)));
        assert!(gate.raise(Some(AlertLevel::Warning)));

        // dropping below the thresholds re-arms
        assert!(!gate.raise(None));
        assert!(gate.raise(Some(AlertLevel::Warning)));
    }

    #[tokio::test]
    async fn threshold_crossing_raises_one_alert() {
        let mut fx = fixture();
        fx.scheduler.reset_generator(1_500.0);

        for _ in 0..3 {
            fx.scheduler.run_cycle().await;
        }

        let events = drain(&mut fx.events);
        let alerts: Vec<&Alert> = events.iter().filter_map(Event::as_alert).collect();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert!(alerts[0].ppm >= 1_400);
        // the reading itself is published before the alert
        assert_eq!(events[0].name(), "reading");
        assert_eq!(events[1].name(), "alert");
    }

    #[tokio::test]
    async fn test_cycle_persists_and_publishes() {
        let mut fx = fixture();

        let outcome = fx.scheduler.run_cycle().await;
        let CycleOutcome::Published(ppm) = outcome else {
            panic!("expected a published reading, got {outcome:?}");
        };
        assert!((400..=2_000).contains(&ppm));
        assert_eq!(fx.store.inner.len(), 1);

        let events = drain(&mut fx.events);
        assert_eq!(events.len(), 1);
        let update = events[0].as_reading().unwrap();
        assert_eq!(update.ppm, Some(ppm));
        assert!(update.analysis_running);
        assert!(update.quality.is_some());
    }

    #[tokio::test]
    async fn off_notifies_exactly_once() {
        let mut fx = fixture();
        fx.scheduler.run_cycle().await;
        drain(&mut fx.events);

        set_running(&fx.settings, false).await;
        assert_eq!(fx.scheduler.run_cycle().await, CycleOutcome::Paused);
        for _ in 0..5 {
            assert_eq!(fx.scheduler.run_cycle().await, CycleOutcome::Idle);
        }

        let events = drain(&mut fx.events);
        assert_eq!(events.len(), 1);
        let update = events[0].as_reading().unwrap();
        assert_eq!(update.ppm, None);
        assert!(!update.analysis_running);
        assert_eq!(fx.store.inner.len(), 1);
    }

    #[tokio::test]
    async fn initial_off_sends_one_notification() {
        let mut fx = fixture();
        set_running(&fx.settings, false).await;

        assert_eq!(fx.scheduler.run_cycle().await, CycleOutcome::Paused);
        assert_eq!(fx.scheduler.run_cycle().await, CycleOutcome::Idle);
        assert_eq!(drain(&mut fx.events).len(), 1);
    }

    #[tokio::test]
    async fn resume_always_notifies() {
        let mut fx = fixture();
        fx.scheduler.run_cycle().await;
        set_running(&fx.settings, false).await;
        fx.scheduler.run_cycle().await;
        drain(&mut fx.events);

        set_running(&fx.settings, true).await;
        assert!(matches!(fx.scheduler.run_cycle().await, CycleOutcome::Published(_)));
        assert_eq!(drain(&mut fx.events).len(), 1);
    }

    #[tokio::test]
    async fn persistence_failure_skips_cycle() {
        let mut fx = fixture();
        fx.store.offline.store(true, Ordering::SeqCst);

        assert_eq!(fx.scheduler.run_cycle().await, CycleOutcome::Failed);
        assert_eq!(fx.scheduler.run_cycle().await, CycleOutcome::Failed);
        assert!(drain(&mut fx.events).is_empty());
        assert_eq!(*fx.scheduler.inner.gate.lock(), BroadcastGate::default());

        // no reading was ever persisted, so the next one always notifies
        fx.store.offline.store(false, Ordering::SeqCst);
        assert!(matches!(fx.scheduler.run_cycle().await, CycleOutcome::Published(_)));
    }

    #[tokio::test]
    async fn test_reset_generator() {
        let fx = fixture();
        fx.scheduler.reset_generator(1_500.0);

        let CycleOutcome::Published(ppm) = fx.scheduler.run_cycle().await else {
            panic!("expected a published reading");
        };
        assert!((1_495..=1_505).contains(&ppm));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let fx = fixture();
        assert!(!fx.scheduler.is_running());
        assert!(fx.scheduler.start());
        assert!(!fx.scheduler.start());
        assert!(fx.scheduler.is_running());

        fx.scheduler.shutdown().await;
        assert!(!fx.scheduler.is_running());

        // can be started again after a stop
        assert!(fx.scheduler.start());
        fx.scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_after_stop_restarts() {
        let fx = fixture();
        assert!(fx.scheduler.start());
        tokio::time::sleep(Duration::from_millis(10)).await;

        // the old loop is asleep and has not seen the flag yet
        fx.scheduler.stop();
        assert!(!fx.scheduler.is_running());
        assert!(fx.scheduler.start());
        assert!(fx.scheduler.is_running());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(fx.scheduler.is_running());
        let persisted = fx.store.inner.len();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fx.store.inner.len() > persisted);

        fx.scheduler.shutdown().await;
        assert!(!fx.scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_update_speed_still_waits() {
        let fx = fixture();
        fx.backend.put_raw_global("update_speed", "0");

        fx.scheduler.start();
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        // cycles at 0s, 1s, 2s and 3s
        assert_eq!(fx.store.inner.len(), 4);
        fx.scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn loop_follows_update_speed() {
        let fx = fixture();
        let patch = SettingsPatch {
            update_speed: Some(2),
            ..Default::default()
        };
        fx.settings.save(None, patch).await.unwrap();

        fx.scheduler.start();
        // cycles at 0s, 2s and 4s
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert_eq!(fx.store.inner.len(), 3);

        let patch = SettingsPatch {
            update_speed: Some(1),
            ..Default::default()
        };
        fx.settings.save(None, patch).await.unwrap();

        // the sleep started at 4s still lasts 2s; then cycles at 6s and 7s
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fx.store.inner.len(), 5);

        fx.scheduler.shutdown().await;
        let persisted = fx.store.inner.len();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fx.store.inner.len(), persisted);
    }
}

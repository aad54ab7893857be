//! Wires the live pipeline against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use aerium_core::{
    GeneratorMode, Insights, MemoryStore, NewReading, Notifier, Output, PeriodKind, ReadingGenerator, ReadingStore,
    Scheduler, SettingsStore, Source, TimeRange,
};
use aerium_types::{
    current_timestamp_ms, AnomalyReport, DailySummary, Forecast, HealthReport, Heatmap, Insight, PeriodComparison,
    Settings, TrendResult,
};
use anyhow::{Context, Result};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::AppConfig;

const MINUTE_MS: u64 = 60_000;
const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Everything `aerium report` prints.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub source: Source,
    pub readings: usize,
    pub trend: TrendResult,
    pub anomalies: AnomalyReport,
    pub week: PeriodComparison,
    pub daily: Vec<DailySummary>,
    pub heatmap: Heatmap,
    pub forecast: Option<Forecast>,
    pub insights: Vec<Insight>,
    pub health: Option<HealthReport>,
}

/// The assembled pipeline.
pub struct Pipeline {
    pub store: Arc<MemoryStore>,
    pub notifier: Notifier,
    pub settings: Arc<SettingsStore>,
    pub scheduler: Scheduler,
    pub insights: Insights,
    config: AppConfig,
}

impl Pipeline {
    /// Build every component from `config` and apply its startup settings.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());

        let mut outputs = Notifier::builder().output(Output::broadcast(config.notify.capacity));
        if let Some(addr) = &config.notify.tcp {
            outputs = outputs.output(Output::tcp(addr.clone()));
        }
        if let Some(path) = &config.notify.file {
            outputs = outputs.output(Output::file(path.clone()));
        }
        let notifier = outputs.build();

        let settings = Arc::new(SettingsStore::new(store.clone(), notifier.clone()));
        if !config.settings.is_empty() {
            settings
                .save(None, config.settings.clone())
                .await
                .context("invalid startup settings")?;
        }

        let mut builder = Scheduler::builder(store.clone(), settings.clone())
            .notifier(notifier.clone())
            .generator(generator(&config))
            .source(config.scheduler.source);
        if let Some(user) = config.scheduler.user_id() {
            builder = builder.user(user);
        }
        let scheduler = builder.build();

        let insights = Insights::with_ttl(store.clone(), config.cache.ttl());

        info!(outputs = notifier.output_count(), ttl_secs = config.cache.ttl_secs, "Pipeline ready");
        Ok(Self {
            store,
            notifier,
            settings,
            scheduler,
            insights,
            config,
        })
    }

    /// Settings the scheduler follows.
    pub async fn active_settings(&self) -> Result<Settings> {
        Ok(self.settings.load(self.config.scheduler.user_id()).await?)
    }

    /// Periodically purge readings older than the retention window.
    pub fn spawn_retention(&self) -> JoinHandle<()> {
        let store = self.store.clone();
        let max_age = self.config.retention.max_age();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(PURGE_INTERVAL);
            loop {
                timer.tick().await;
                let cutoff = current_timestamp_ms().saturating_sub(max_age.as_millis() as u64);
                let removed = store.purge_before(cutoff);
                if removed > 0 {
                    info!(removed, "Retention cleanup");
                }
            }
        })
    }

    /// Persist `hours` of generator output at one-minute spacing, ending at `now_ms`.
    pub async fn backfill(&self, hours: u32, source: Source, now_ms: u64) -> Result<usize> {
        let settings = self.active_settings().await?;
        let mode = GeneratorMode::from_realistic(settings.realistic_mode);
        let mut generator = generator(&self.config);

        let count = u64::from(hours) * 60;
        for i in 0..count {
            let timestamp_ms = now_ms.saturating_sub((count - i) * MINUTE_MS);
            let ppm = generator.next(mode);
            self.store
                .insert_reading(NewReading::at(timestamp_ms, ppm, source))
                .await?;
        }
        debug!(count, %source, "Backfilled readings");
        self.insights.clear();
        Ok(count as usize)
    }

    /// Run every analysis over the stored readings of `source`.
    pub async fn report(&self, source: Source, now_ms: u64) -> Result<Report> {
        let filter = Some(source);
        let insights = &self.insights;

        let readings = self.store.query_aggregate(TimeRange::all(), filter).await?.count;

        Ok(Report {
            source,
            readings: readings as usize,
            trend: insights.trend_at(filter, now_ms).await?,
            anomalies: insights
                .anomalies_at(filter, aerium_core::analytics::DEFAULT_THRESHOLD_STD, now_ms)
                .await?,
            week: insights.compare_at(PeriodKind::Week, filter, now_ms).await?,
            daily: insights.daily_at(filter, now_ms).await?,
            heatmap: insights.heatmap_at(filter, now_ms).await?,
            forecast: insights.forecast_at(filter, 1, now_ms).await?,
            insights: insights.insights_at(filter, now_ms).await?,
            health: insights.health_at(filter, now_ms).await?,
        })
    }
}

fn generator(config: &AppConfig) -> ReadingGenerator {
    let mut generator = match config.generator.seed {
        Some(seed) => ReadingGenerator::seeded(seed),
        None => ReadingGenerator::new(),
    };
    generator.reset(config.generator.base_value);
    generator
}

//! # aerium-core
//!
//! The live CO2 telemetry pipeline: a synthetic reading generator, a settings
//! store with per-user overrides, a single-flight TTL cache, pure analytics
//! and the background broadcast scheduler that ties them together.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use aerium_core::{Insights, MemoryStore, Notifier, Scheduler, SettingsStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MemoryStore::new());
//!     let notifier = Notifier::broadcast(64);
//!     let mut events = notifier.subscribe().unwrap();
//!
//!     let settings = Arc::new(SettingsStore::new(store.clone(), notifier.clone()));
//!     let scheduler = Scheduler::builder(store.clone(), settings)
//!         .notifier(notifier)
//!         .build();
//!
//!     // Start the broadcast loop (non-blocking)
//!     scheduler.start();
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{}: {:?}", event.name(), event);
//!     }
//!
//!     let insights = Insights::new(store);
//!     let trend = insights.trend(None).await.unwrap();
//!     println!("{:?}", trend.classification);
//! }
//! ```
//!
//! ## Features
//!
//! - **Bounded random walk**: realistic readings with regime switching
//! - **Validated settings**: threshold ordering is checked on every write
//! - **Single-flight caching**: one computation per key and expiry window
//! - **Edge-triggered broadcast**: subscribers only hear about real changes
//! - **Pluggable persistence**: [`ReadingStore`] and [`SettingsBackend`] traits

pub mod analytics;
mod cache;
pub mod error;
mod generator;
mod insights;
mod memory;
mod notify;
mod scheduler;
mod settings;
pub mod store;

pub use cache::{CacheStats, TtlCache};
pub use error::{InsightsError, SettingsError, StoreError};
pub use generator::{GeneratorMode, GeneratorState, ReadingGenerator, Trend, DEFAULT_BASE_VALUE};
pub use insights::{Insights, PeriodKind, DEFAULT_TTL};
pub use memory::MemoryStore;
pub use notify::{Notifier, NotifierBuilder, Output, TCP_TIMEOUT};
pub use scheduler::{CycleOutcome, Scheduler, SchedulerBuilder, MIN_NOTIFY_DELTA};
pub use settings::{validate, SaveOutcome, SettingsStore};
pub use store::{ReadingStore, SettingsBackend, TimeRange};

// Re-export types for convenience
pub use aerium_types::{
    Alert, AlertLevel, AirQuality, Event, LiveUpdate, NewReading, Reading, Settings, SettingKey, SettingsPatch, Source,
    UserId,
};

//! # aerium
//!
//! Command-line front end for the live CO2 telemetry pipeline.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Pipeline                            │
//! │  ┌──────────┐   ┌───────────┐   ┌─────────────┐   ┌────────┐ │
//! │  │ Settings │──▶│ Scheduler │──▶│ MemoryStore │──▶│Insights│ │
//! │  └────┬─────┘   └─────┬─────┘   └─────────────┘   └────────┘ │
//! │       │               │                                      │
//! │       ▼               ▼                                      │
//! │  ┌───────────────────────────┐                               │
//! │  │ Notifier                  │──▶ broadcast | tcp | file     │
//! │  └───────────────────────────┘                               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`config`]**: layered configuration (TOML file, then `AERIUM_*` variables)
//! - **[`logging`]**: `tracing` subscriber setup
//! - **[`pipeline`]**: builds the components and runs reports
//!
//! ## Usage
//!
//! ```bash
//! # Stream live readings as JSON lines until Ctrl-C
//! aerium run --config aerium.toml
//!
//! # Simulate two days and print every analysis
//! aerium report --hours 48 --seed 7
//! ```
//!
//! ### As a library
//!
//! ```
//! use aerium::{AppConfig, Pipeline};
//!
//! # tokio_test::block_on(async {
//! let pipeline = Pipeline::new(AppConfig::default()).await.unwrap();
//! let mut events = pipeline.notifier.subscribe().unwrap();
//!
//! pipeline.scheduler.run_cycle().await;
//! let event = events.try_recv().unwrap();
//! assert_eq!(event.name(), "reading");
//! # });
//! ```

pub mod config;
pub mod logging;
pub mod pipeline;

pub use config::AppConfig;
pub use pipeline::{Pipeline, Report};

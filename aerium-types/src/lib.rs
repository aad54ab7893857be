//! # aerium-types
//!
//! Core types for CO2 telemetry. This crate defines the data model shared by
//! the live pipeline, the analytics engine and anything that consumes live
//! events: readings, operator settings, analytics results and notifications.
//!
//! ## Design Goals
//!
//! - **Zero required dependencies**: Core types work without any serialization framework
//! - **Optional serialization**: Enable the `serde` feature to get JSON-ready types
//! - **Closed settings vocabulary**: every tunable is a [`SettingKey`]
//! - **Derived results are plain data**: analytics outputs are never persisted
//!
//! ## Features
//!
//! - `std` (default): Standard library support (wall-clock timestamps)
//! - `serde`: serialization via serde
//!
//! ## Example
//!
//! ```rust
//! use aerium_types::{AirQuality, Settings, SettingsPatch};
//!
//! let patch = SettingsPatch {
//!     good_threshold: Some(700),
//!     ..Default::default()
//! };
//!
//! let settings = patch.resolve();
//! assert_eq!(settings.good_threshold, 700);
//! assert_eq!(settings.bad_threshold, Settings::default().bad_threshold);
//! assert_eq!(AirQuality::classify(650, &settings), AirQuality::Good);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod analytics;
mod event;
mod reading;
mod settings;

pub use analytics::*;
pub use event::*;
pub use reading::*;
pub use settings::*;

/// Lowest concentration the generator will ever emit, in ppm.
pub const PPM_FLOOR: u32 = 400;

/// Highest concentration the generator will ever emit, in ppm.
pub const PPM_CEILING: u32 = 2000;

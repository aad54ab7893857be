//! Synthetic CO2 reading generator.
//!
//! Realistic mode is a bounded random walk that switches between three
//! regimes (falling, stable, rising). Each regime lasts a random number of
//! steps in `5..=15`, after which a new regime is drawn uniformly.

use aerium_types::{PPM_CEILING, PPM_FLOOR};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Value a fresh generator starts from.
pub const DEFAULT_BASE_VALUE: f64 = 600.0;

const MIN_TREND_LENGTH: u32 = 5;
const MAX_TREND_LENGTH: u32 = 15;

/// Directional bias of the random walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trend {
    Falling,
    Stable,
    Rising,
}

impl Trend {
    pub const ALL: [Trend; 3] = [Trend::Falling, Trend::Stable, Trend::Rising];

    /// Inclusive range the per-step delta is drawn from.
    pub fn delta_range(&self) -> (f64, f64) {
        match self {
            Trend::Falling => (-15.0, -5.0),
            Trend::Stable => (-5.0, 5.0),
            Trend::Rising => (5.0, 15.0),
        }
    }
}

/// How the next reading is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorMode {
    /// Regime-switching random walk.
    Realistic,
    /// Independent uniform values over the full range.
    Random,
}

impl GeneratorMode {
    pub fn from_realistic(realistic: bool) -> Self {
        if realistic {
            GeneratorMode::Realistic
        } else {
            GeneratorMode::Random
        }
    }
}

/// Internal state of the random walk.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorState {
    pub current_value: f64,
    pub trend: Trend,
    /// Steps since the last regime change.
    pub trend_age: u32,
    /// Age after which the regime changes; redrawn at every change.
    pub trend_limit: u32,
}

/// Produces the next raw measurement.
///
/// # Example
///
/// ```rust
/// use aerium_core::{GeneratorMode, ReadingGenerator};
///
/// let mut generator = ReadingGenerator::seeded(7);
/// generator.reset(600.0);
///
/// let ppm = generator.next(GeneratorMode::Realistic);
/// assert!((595..=605).contains(&ppm));
/// ```
#[derive(Debug)]
pub struct ReadingGenerator<R = StdRng> {
    state: GeneratorState,
    rng: R,
}

impl ReadingGenerator<StdRng> {
    /// A generator seeded from system entropy, starting at the default base.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// A reproducible generator.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl Default for ReadingGenerator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> ReadingGenerator<R> {
    pub fn with_rng(mut rng: R) -> Self {
        let trend_limit = rng.gen_range(MIN_TREND_LENGTH..=MAX_TREND_LENGTH);
        Self {
            state: GeneratorState {
                current_value: DEFAULT_BASE_VALUE,
                trend: Trend::Stable,
                trend_age: 0,
                trend_limit,
            },
            rng,
        }
    }

    /// Produce the next reading in ppm.
    pub fn next(&mut self, mode: GeneratorMode) -> u32 {
        match mode {
            GeneratorMode::Random => self.rng.gen_range(PPM_FLOOR..=PPM_CEILING),
            GeneratorMode::Realistic => self.step(),
        }
    }

    /// Restart the walk from `base_value` in the stable regime.
    pub fn reset(&mut self, base_value: f64) {
        self.state.current_value = base_value.clamp(f64::from(PPM_FLOOR), f64::from(PPM_CEILING));
        self.state.trend = Trend::Stable;
        self.state.trend_age = 0;
        self.state.trend_limit = self.draw_limit();
    }

    pub fn state(&self) -> &GeneratorState {
        &self.state
    }

    fn step(&mut self) -> u32 {
        self.state.trend_age += 1;
        if self.state.trend_age > self.state.trend_limit {
            self.state.trend = Trend::ALL[self.rng.gen_range(0..Trend::ALL.len())];
            self.state.trend_age = 0;
            self.state.trend_limit = self.draw_limit();
        }

        let (low, high) = self.state.trend.delta_range();
        let delta = self.rng.gen_range(low..=high);
        self.state.current_value = (self.state.current_value + delta)
            .clamp(f64::from(PPM_FLOOR), f64::from(PPM_CEILING));

        // Truncate toward zero; the value is never negative.
        self.state.current_value as u32
    }

    fn draw_limit(&mut self) -> u32 {
        self.rng.gen_range(MIN_TREND_LENGTH..=MAX_TREND_LENGTH)
    }
}

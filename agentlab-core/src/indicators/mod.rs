//! Close-price indicators.
//!
//! Every indicator maps a close slice to an aligned output of the same length.
//! `NaN` marks an undefined value; the first `lookback()` values are always
//! undefined, and a `NaN` input taints every output that depends on it.

pub mod ema;
pub mod engine;
pub mod macd;
pub mod rsi;
pub mod sma;

pub use ema::{ema_of_series, Ema};
pub use engine::{IndicatorConfig, IndicatorEngine, IndicatorError};
pub use macd::{Macd, MacdLines};
pub use rsi::Rsi;
pub use sma::Sma;

/// A single-series indicator over close prices.
pub trait Indicator: Send + Sync {
    /// Column name the series is stored under.
    fn name(&self) -> &str;

    /// Number of leading undefined values.
    fn lookback(&self) -> usize;

    /// Compute the aligned series.
    fn compute(&self, closes: &[f64]) -> Vec<f64>;
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

//! Moving Average Convergence/Divergence (MACD).
//!
//! MACD = EMA(fast) - EMA(slow); signal = EMA(signal) of MACD;
//! histogram = MACD - signal.
//! Lookback: (slow - 1) + (signal - 1). All three lines are undefined until
//! the signal line exists, so the triple warms up together.

use super::ema::ema_of_series;
use super::Indicator;
use crate::schema;

/// The three aligned MACD series.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdLines {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast >= 1 && signal >= 1, "MACD periods must be >= 1");
        assert!(fast < slow, "MACD fast period must be below slow period");
        Self { fast, slow, signal }
    }

    pub fn lines(&self, closes: &[f64]) -> MacdLines {
        let fast = ema_of_series(closes, self.fast);
        let slow = ema_of_series(closes, self.slow);
        let mut macd: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = ema_of_series(&macd, self.signal);

        let warmup = self.lookback().min(macd.len());
        macd[..warmup].fill(f64::NAN);
        let histogram = macd.iter().zip(&signal).map(|(m, s)| m - s).collect();

        MacdLines {
            macd,
            signal,
            histogram,
        }
    }
}

impl Default for Macd {
    fn default() -> Self {
        Self::new(12, 26, 9)
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        schema::MACD
    }

    fn lookback(&self) -> usize {
        (self.slow - 1) + (self.signal - 1)
    }

    fn compute(&self, closes: &[f64]) -> Vec<f64> {
        self.lines(closes).macd
    }
}

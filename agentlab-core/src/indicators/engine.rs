//! Indicator engine: attaches the standard indicator columns to a table and
//! drops the warm-up rows.
//!
//! Columns: `SMA_<P>`, `RSI`, `MACD`, `MACD_SIGNAL`, `MACD_HIST`.
//! Rows holding any undefined value are removed, never zero-filled, so the
//! table shrinks by the longest warm-up among the configured indicators.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::{Indicator, Macd, Rsi, Sma};
use crate::domain::PriceTable;
use crate::schema::{self, SchemaError};

#[derive(Debug, Error)]
pub enum IndicatorError {
    #[error("data quality: {0}")]
    DataQuality(String),

    #[error("{rows} bars cannot cover an indicator warm-up of {warmup} bars")]
    InsufficientBars { rows: usize, warmup: usize },

    #[error("invalid indicator configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Indicator periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub sma_period: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            sma_period: 20,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
        }
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> Result<(), IndicatorError> {
        let periods = [
            ("sma_period", self.sma_period),
            ("rsi_period", self.rsi_period),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal", self.macd_signal),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, p)| *p == 0) {
            return Err(IndicatorError::InvalidConfig(format!("{name} must be >= 1")));
        }
        if self.macd_fast >= self.macd_slow {
            return Err(IndicatorError::InvalidConfig(format!(
                "macd_fast ({}) must be below macd_slow ({})",
                self.macd_fast, self.macd_slow
            )));
        }
        Ok(())
    }

    /// Name of the SMA column this config produces.
    pub fn sma_column(&self) -> String {
        schema::sma_column(self.sma_period)
    }
}

/// Computes indicator columns over a table's close series.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    sma: Sma,
    rsi: Rsi,
    macd: Macd,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Result<Self, IndicatorError> {
        config.validate()?;
        Ok(Self {
            sma: Sma::new(config.sma_period),
            rsi: Rsi::new(config.rsi_period),
            macd: Macd::new(config.macd_fast, config.macd_slow, config.macd_signal),
        })
    }

    /// Longest warm-up across the configured indicators.
    pub fn warmup(&self) -> usize {
        self.sma
            .lookback()
            .max(self.rsi.lookback())
            .max(self.macd.lookback())
    }

    /// Attach indicator columns and drop incomplete rows. Returns the
    /// number of rows dropped.
    pub fn apply(&self, table: &mut PriceTable) -> Result<usize, IndicatorError> {
        let closes = table.closes();
        if closes.is_empty() {
            return Err(IndicatorError::DataQuality(format!(
                "{}: close series is empty",
                table.symbol()
            )));
        }
        if let Some(row) = closes.iter().position(|c| !c.is_finite()) {
            return Err(IndicatorError::DataQuality(format!(
                "{}: non-numeric close at row {row}",
                table.symbol()
            )));
        }

        let macd = self.macd.lines(&closes);
        table.insert_column(self.sma.name(), self.sma.compute(&closes))?;
        table.insert_column(self.rsi.name(), self.rsi.compute(&closes))?;
        table.insert_column(schema::MACD, macd.macd)?;
        table.insert_column(schema::MACD_SIGNAL, macd.signal)?;
        table.insert_column(schema::MACD_HIST, macd.histogram)?;

        let rows = table.len();
        let dropped = table.drop_incomplete();
        debug!(symbol = table.symbol(), dropped, "dropped indicator warm-up rows");

        if table.is_empty() {
            return Err(IndicatorError::InsufficientBars {
                rows,
                warmup: self.warmup(),
            });
        }

        info!(
            symbol = table.symbol(),
            rows = table.len(),
            first = ?table.first_timestamp(),
            "indicators computed"
        );
        Ok(dropped)
    }

    /// Owned variant of [`apply`](Self::apply).
    pub fn compute(&self, mut table: PriceTable) -> Result<PriceTable, IndicatorError> {
        self.apply(&mut table)?;
        Ok(table)
    }
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self {
            sma: Sma::new(20),
            rsi: Rsi::new(14),
            macd: Macd::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PriceBar;
    use chrono::{Duration, NaiveDate};

    fn table(closes: &[f64]) -> PriceTable {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PriceBar {
                timestamp: start + Duration::days(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000,
            })
            .collect();
        PriceTable::new("TEST", bars)
    }

    fn wave(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect()
    }

    #[test]
    fn default_warmup_is_macd() {
        assert_eq!(IndicatorEngine::default().warmup(), 33);
    }

    #[test]
    fn attaches_columns_and_drops_warmup() {
        let mut t = table(&wave(100));
        let dropped = IndicatorEngine::default().apply(&mut t).unwrap();
        assert_eq!(dropped, 33);
        assert_eq!(t.len(), 67);
        assert!(t.is_complete());
        for name in ["SMA_20", "RSI", "MACD", "MACD_SIGNAL", "MACD_HIST"] {
            assert!(t.has_column(name), "missing {name}");
        }
    }

    #[test]
    fn custom_periods_change_column_name_and_warmup() {
        let config = IndicatorConfig {
            sma_period: 50,
            ..IndicatorConfig::default()
        };
        let engine = IndicatorEngine::new(config).unwrap();
        assert_eq!(engine.warmup(), 49);
        let t = engine.compute(table(&wave(120))).unwrap();
        assert_eq!(t.len(), 71);
        assert!(t.has_column("SMA_50"));
    }

    #[test]
    fn constant_series_yields_neutral_rsi() {
        let t = IndicatorEngine::default().compute(table(&[100.0; 220])).unwrap();
        assert_eq!(t.len(), 187);
        assert!(t.column("RSI").unwrap().iter().all(|&v| v == 50.0));
        assert!(t.column("SMA_20").unwrap().iter().all(|&v| (v - 100.0).abs() < 1e-9));
    }

    #[test]
    fn empty_table_is_data_quality_error() {
        let err = IndicatorEngine::default().apply(&mut table(&[])).unwrap_err();
        assert!(matches!(err, IndicatorError::DataQuality(_)));
    }

    #[test]
    fn nan_close_is_data_quality_error() {
        let mut closes = wave(50);
        closes[10] = f64::NAN;
        let err = IndicatorEngine::default().apply(&mut table(&closes)).unwrap_err();
        assert!(matches!(err, IndicatorError::DataQuality(_)));
    }

    #[test]
    fn short_series_is_insufficient() {
        let err = IndicatorEngine::default().apply(&mut table(&wave(33))).unwrap_err();
        assert!(matches!(err, IndicatorError::InsufficientBars { rows: 33, warmup: 33 }));
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let zero = IndicatorConfig {
            rsi_period: 0,
            ..IndicatorConfig::default()
        };
        assert!(matches!(IndicatorEngine::new(zero), Err(IndicatorError::InvalidConfig(_))));

        let inverted = IndicatorConfig {
            macd_fast: 26,
            macd_slow: 12,
            ..IndicatorConfig::default()
        };
        assert!(IndicatorEngine::new(inverted).is_err());
    }
}

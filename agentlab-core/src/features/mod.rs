//! Feature adapter: turns a complete indicator table into the aligned
//! (prices, features) pair a trading environment steps over.
//!
//! For a frame `[start, end)` and window `W` both arrays cover rows
//! `[start - W, end)`, so the first tradable tick already has a full
//! lookback behind it.

pub mod selector;

use std::ops::Range;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::PriceTable;
use crate::schema::{self, SchemaError};

pub use selector::{ColumnSelection, FeatureSelector, PriceDiffSelection};

#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("frame start {start} leaves less than the {window_size}-bar lookback window")]
    InsufficientHistory { start: usize, window_size: usize },

    #[error("frame end {end} is past the end of a {len}-row table")]
    FrameOutOfRange { end: usize, len: usize },

    #[error("frame [{start}, {end}) is empty")]
    EmptyFrame { start: usize, end: usize },

    #[error("window size must be at least 1")]
    ZeroWindow,

    #[error("row {row} has an undefined {column} value")]
    IncompleteRow { row: usize, column: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Tradable index range `[start, end)` of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameBound {
    pub start: usize,
    pub end: usize,
}

impl FrameBound {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Trade everything after the first lookback window: `[window_size, len)`.
    pub fn full(window_size: usize, len: usize) -> Self {
        Self {
            start: window_size,
            end: len,
        }
    }

    /// Check the frame against a table length.
    ///
    /// Order: lookback first, then the table end, then emptiness.
    pub fn validate(&self, window_size: usize, len: usize) -> Result<(), FeatureError> {
        if window_size == 0 {
            return Err(FeatureError::ZeroWindow);
        }
        if self.start < window_size {
            return Err(FeatureError::InsufficientHistory {
                start: self.start,
                window_size,
            });
        }
        if self.end > len {
            return Err(FeatureError::FrameOutOfRange { end: self.end, len });
        }
        if self.start >= self.end {
            return Err(FeatureError::EmptyFrame {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Row range covered by the feature pair, lookback included.
    pub fn rows(&self, window_size: usize) -> Range<usize> {
        self.start.saturating_sub(window_size)..self.end
    }
}

/// Close prices and selected features over the same rows, index-aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturePair {
    pub prices: Array1<f64>,
    pub features: Array2<f64>,
    pub columns: Vec<String>,
    pub window_size: usize,
}

impl FeaturePair {
    /// Rows in the pair: `end - start + W`.
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }
}

/// Builds feature pairs for a fixed window size and feature strategy.
#[derive(Debug)]
pub struct FeatureAdapter {
    window_size: usize,
    selector: Box<dyn FeatureSelector>,
}

impl FeatureAdapter {
    pub fn new(window_size: usize, selector: Box<dyn FeatureSelector>) -> Self {
        Self {
            window_size,
            selector,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn columns(&self) -> Vec<String> {
        self.selector.columns()
    }

    pub fn adapt(&self, table: &PriceTable, frame: FrameBound) -> Result<FeaturePair, FeatureError> {
        adapt(table, self.window_size, frame, self.selector.as_ref())
    }
}

impl Default for FeatureAdapter {
    fn default() -> Self {
        Self::new(20, Box::<ColumnSelection>::default())
    }
}

/// Validate the frame and materialize the feature pair.
pub fn adapt(
    table: &PriceTable,
    window_size: usize,
    frame: FrameBound,
    selector: &dyn FeatureSelector,
) -> Result<FeaturePair, FeatureError> {
    frame.validate(window_size, table.len())?;
    let rows = frame.rows(window_size);

    let closes = table.require_column(schema::CLOSE)?;
    let prices = Array1::from(closes[rows.clone()].to_vec());
    let features = selector.select(table, rows.clone())?;
    let columns = selector.columns();

    for (offset, (price, row)) in prices.iter().zip(features.rows()).enumerate() {
        let undefined = if price.is_finite() {
            row.iter().position(|v| !v.is_finite()).map(|j| columns[j].clone())
        } else {
            Some(schema::CLOSE.to_string())
        };
        if let Some(column) = undefined {
            return Err(FeatureError::IncompleteRow {
                row: rows.start + offset,
                column,
            });
        }
    }

    Ok(FeaturePair {
        prices,
        features,
        columns,
        window_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PriceBar;
    use chrono::{Duration, NaiveDate};

    fn table(n: usize) -> PriceTable {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let bars = (0..n)
            .map(|i| PriceBar {
                timestamp: start + Duration::days(i as i64),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0 + i as f64,
                volume: 10,
            })
            .collect();
        let mut t = PriceTable::new("T", bars);
        t.insert_column("RSI", vec![50.0; n]).unwrap();
        t.insert_column("SMA_20", vec![100.0; n]).unwrap();
        t
    }

    #[test]
    fn frame_220_rows() {
        let pair = FeatureAdapter::default()
            .adapt(&table(220), FrameBound::new(20, 220))
            .unwrap();
        assert_eq!(pair.len(), 220);
        assert_eq!(pair.features.nrows(), 220);
        assert_eq!(pair.n_features(), 6);
        assert_eq!(pair.columns[0], "Close");
    }

    #[test]
    fn prices_start_one_window_before_frame() {
        let pair = FeatureAdapter::default()
            .adapt(&table(100), FrameBound::new(50, 80))
            .unwrap();
        assert_eq!(pair.len(), 80 - 50 + 20);
        assert_eq!(pair.prices[0], 130.0);
        assert_eq!(pair.features[[0, 0]], pair.prices[0]);
        assert_eq!(pair.prices[pair.len() - 1], 179.0);
    }

    #[test]
    fn start_before_window_is_insufficient_history() {
        let err = FeatureAdapter::default()
            .adapt(&table(220), FrameBound::new(10, 220))
            .unwrap_err();
        assert_eq!(
            err,
            FeatureError::InsufficientHistory {
                start: 10,
                window_size: 20
            }
        );
    }

    #[test]
    fn frame_errors_in_order() {
        let t = table(50);
        let adapter = FeatureAdapter::default();
        assert!(matches!(
            adapter.adapt(&t, FrameBound::new(20, 51)),
            Err(FeatureError::FrameOutOfRange { end: 51, len: 50 })
        ));
        assert!(matches!(
            adapter.adapt(&t, FrameBound::new(30, 30)),
            Err(FeatureError::EmptyFrame { .. })
        ));
        // Lookback is checked before range.
        assert!(matches!(
            adapter.adapt(&t, FrameBound::new(5, 500)),
            Err(FeatureError::InsufficientHistory { .. })
        ));
    }

    #[test]
    fn undefined_cell_inside_rows_is_rejected() {
        let mut t = table(100);
        let mut rsi = vec![50.0; 100];
        rsi[60] = f64::NAN;
        t.insert_column("RSI", rsi).unwrap();

        let err = FeatureAdapter::default()
            .adapt(&t, FrameBound::full(20, 100))
            .unwrap_err();
        assert_eq!(
            err,
            FeatureError::IncompleteRow {
                row: 60,
                column: "RSI".into()
            }
        );

        // Rows before the lookback are never read.
        assert!(FeatureAdapter::default()
            .adapt(&t, FrameBound::new(90, 100))
            .is_ok());
    }

    #[test]
    fn infinite_feature_is_rejected() {
        let mut t = table(50);
        let mut sma = vec![100.0; 50];
        sma[25] = f64::INFINITY;
        t.insert_column("SMA_20", sma).unwrap();
        assert!(matches!(
            FeatureAdapter::default().adapt(&t, FrameBound::full(20, 50)),
            Err(FeatureError::IncompleteRow { row: 25, .. })
        ));
    }

    #[test]
    fn missing_feature_column_is_schema_error() {
        let adapter = FeatureAdapter::new(20, Box::new(ColumnSelection::with_sma_period(50)));
        let err = adapter.adapt(&table(100), FrameBound::full(20, 100)).unwrap_err();
        assert_eq!(err, FeatureError::Schema(SchemaError::MissingColumn("SMA_50".into())));
    }

    #[test]
    fn price_diff_strategy_plugs_in() {
        let adapter = FeatureAdapter::new(5, Box::new(PriceDiffSelection));
        let pair = adapter.adapt(&table(30), FrameBound::full(5, 30)).unwrap();
        assert_eq!(pair.n_features(), 2);
        assert_eq!(pair.len(), 30);
        assert_eq!(pair.features[[3, 1]], 1.0);
    }
}

//! Feature selection strategies.
//!
//! A selector decides which columns the policy observes. It is handed to the
//! adapter as a value, so swapping features never requires a new environment
//! type.

use std::fmt;
use std::ops::Range;

use ndarray::Array2;

use crate::domain::PriceTable;
use crate::schema::{self, SchemaError};

/// Strategy object mapping a table row range to a feature matrix.
pub trait FeatureSelector: Send + Sync + fmt::Debug {
    /// Column names in output order. A policy is only valid for the exact
    /// list it was trained on.
    fn columns(&self) -> Vec<String>;

    /// Rows `range` of the table as a `range.len() × columns().len()` matrix.
    fn select(&self, table: &PriceTable, range: Range<usize>) -> Result<Array2<f64>, SchemaError>;
}

/// Explicit ordered column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSelection {
    columns: Vec<String>,
}

impl ColumnSelection {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// `[Close, Open, High, Low, RSI, SMA_<sma_period>]`.
    pub fn with_sma_period(sma_period: usize) -> Self {
        Self::new([
            schema::CLOSE.to_string(),
            schema::OPEN.to_string(),
            schema::HIGH.to_string(),
            schema::LOW.to_string(),
            schema::RSI.to_string(),
            schema::sma_column(sma_period),
        ])
    }
}

impl Default for ColumnSelection {
    fn default() -> Self {
        Self::with_sma_period(20)
    }
}

impl FeatureSelector for ColumnSelection {
    fn columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn select(&self, table: &PriceTable, range: Range<usize>) -> Result<Array2<f64>, SchemaError> {
        let mut out = Array2::zeros((range.len(), self.columns.len()));
        for (j, name) in self.columns.iter().enumerate() {
            let column = table.require_column(name)?;
            let slice = column.get(range.clone()).ok_or_else(|| SchemaError::LengthMismatch {
                column: name.clone(),
                expected: range.end,
                actual: column.len(),
            })?;
            for (i, &v) in slice.iter().enumerate() {
                out[[i, j]] = v;
            }
        }
        Ok(out)
    }
}

/// Close price and its one-step difference (first difference is 0).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceDiffSelection;

impl FeatureSelector for PriceDiffSelection {
    fn columns(&self) -> Vec<String> {
        vec![schema::CLOSE.to_string(), "Close_diff".to_string()]
    }

    fn select(&self, table: &PriceTable, range: Range<usize>) -> Result<Array2<f64>, SchemaError> {
        let closes = table.require_column(schema::CLOSE)?;
        let slice = closes.get(range.clone()).ok_or_else(|| SchemaError::LengthMismatch {
            column: schema::CLOSE.to_string(),
            expected: range.end,
            actual: closes.len(),
        })?;
        let mut out = Array2::zeros((slice.len(), 2));
        for (i, &close) in slice.iter().enumerate() {
            out[[i, 0]] = close;
            if i > 0 {
                out[[i, 1]] = close - slice[i - 1];
            }
        }
        Ok(out)
    }
}

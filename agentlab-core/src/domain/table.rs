//! PriceTable: ordered bars plus aligned derived columns.

use std::borrow::Cow;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::bar::PriceBar;
use crate::schema::{self, SchemaError};

/// A derived numeric column aligned 1:1 with the table's bars.
///
/// `NaN` marks an undefined cell (indicator warm-up).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedColumn {
    pub name: String,
    pub values: Vec<f64>,
}

/// Ordered sequence of bars with attached derived columns, indexed by timestamp.
///
/// A table is owned by the pipeline run that built it. Derived columns keep
/// their insertion order so column listings are stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    symbol: String,
    bars: Vec<PriceBar>,
    derived: Vec<DerivedColumn>,
}

impl PriceTable {
    /// Build a table from bars. Bars are sorted by timestamp and duplicate
    /// timestamps collapse to the last occurrence.
    pub fn new(symbol: impl Into<String>, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        let mut deduped: Vec<PriceBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.timestamp == bar.timestamp => *last = bar,
                _ => deduped.push(bar),
            }
        }
        Self {
            symbol: symbol.into(),
            bars: deduped,
            derived: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn timestamps(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        self.bars.iter().map(|b| b.timestamp)
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.bars.first().map(|b| b.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.bars.last().map(|b| b.timestamp)
    }

    /// Close prices in table order.
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Attach (or replace) a derived column.
    pub fn insert_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<(), SchemaError> {
        let name = name.into();
        if values.len() != self.bars.len() {
            return Err(SchemaError::LengthMismatch {
                column: name,
                expected: self.bars.len(),
                actual: values.len(),
            });
        }
        match self.derived.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.values = values,
            None => self.derived.push(DerivedColumn { name, values }),
        }
        Ok(())
    }

    /// Look up a column by its contract name. Base OHLCV columns are
    /// materialized from the bars; derived columns are borrowed.
    pub fn column(&self, name: &str) -> Option<Cow<'_, [f64]>> {
        match name {
            schema::OPEN => Some(self.base_column(|b| b.open)),
            schema::HIGH => Some(self.base_column(|b| b.high)),
            schema::LOW => Some(self.base_column(|b| b.low)),
            schema::CLOSE => Some(self.base_column(|b| b.close)),
            schema::VOLUME => Some(self.base_column(|b| b.volume as f64)),
            _ => self
                .derived
                .iter()
                .find(|c| c.name == name)
                .map(|c| Cow::Borrowed(c.values.as_slice())),
        }
    }

    fn base_column(&self, field: fn(&PriceBar) -> f64) -> Cow<'_, [f64]> {
        Cow::Owned(self.bars.iter().map(field).collect())
    }

    /// Same as [`column`](Self::column) but reports a schema error when absent.
    pub fn require_column(&self, name: &str) -> Result<Cow<'_, [f64]>, SchemaError> {
        self.column(name)
            .ok_or_else(|| SchemaError::MissingColumn(name.to_string()))
    }

    pub fn has_column(&self, name: &str) -> bool {
        schema::BASE_COLUMNS.contains(&name) || self.derived.iter().any(|c| c.name == name)
    }

    /// All column names: base OHLCV first, then derived in insertion order.
    pub fn column_names(&self) -> Vec<String> {
        schema::BASE_COLUMNS
            .iter()
            .map(|s| s.to_string())
            .chain(self.derived.iter().map(|c| c.name.clone()))
            .collect()
    }

    /// Single cell lookup.
    pub fn value(&self, name: &str, row: usize) -> Option<f64> {
        let bar = self.bars.get(row)?;
        match name {
            schema::OPEN => Some(bar.open),
            schema::HIGH => Some(bar.high),
            schema::LOW => Some(bar.low),
            schema::CLOSE => Some(bar.close),
            schema::VOLUME => Some(bar.volume as f64),
            _ => self
                .derived
                .iter()
                .find(|c| c.name == name)
                .and_then(|c| c.values.get(row).copied()),
        }
    }

    /// Value of a column on the most recent row.
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.len().checked_sub(1).and_then(|last| self.value(name, last))
    }

    /// True when a row has no void bar field and no undefined derived cell.
    pub fn row_is_complete(&self, row: usize) -> bool {
        match self.bars.get(row) {
            Some(bar) => {
                !bar.is_void() && self.derived.iter().all(|c| c.values[row].is_finite())
            }
            None => false,
        }
    }

    /// True when every row is complete.
    pub fn is_complete(&self) -> bool {
        (0..self.len()).all(|row| self.row_is_complete(row))
    }

    /// Drop every row holding an undefined cell. Returns the number of rows
    /// removed. Rows are removed, never filled.
    pub fn drop_incomplete(&mut self) -> usize {
        let keep: Vec<bool> = (0..self.len()).map(|row| self.row_is_complete(row)).collect();
        let before = self.len();

        let mut row = 0;
        self.bars.retain(|_| {
            let k = keep[row];
            row += 1;
            k
        });
        for column in &mut self.derived {
            let mut row = 0;
            column.values.retain(|_| {
                let k = keep[row];
                row += 1;
                k
            });
        }

        before - self.len()
    }
}

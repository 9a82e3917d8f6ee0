//! Column naming contract for price tables.
//!
//! Every table handed across the pipeline boundary exposes the base columns
//! `Open, High, Low, Close, Volume` (case-normalized from whatever the provider
//! returned) plus the derived indicator columns, indexed by a `Date` key.

use thiserror::Error;

pub const DATE: &str = "Date";
pub const OPEN: &str = "Open";
pub const HIGH: &str = "High";
pub const LOW: &str = "Low";
pub const CLOSE: &str = "Close";
pub const VOLUME: &str = "Volume";

pub const RSI: &str = "RSI";
pub const MACD: &str = "MACD";
pub const MACD_SIGNAL: &str = "MACD_SIGNAL";
pub const MACD_HIST: &str = "MACD_HIST";

/// Base OHLCV columns in canonical order.
pub const BASE_COLUMNS: [&str; 5] = [OPEN, HIGH, LOW, CLOSE, VOLUME];

/// Name of the simple moving average column for a period (`SMA_20` by default).
pub fn sma_column(period: usize) -> String {
    format!("SMA_{period}")
}

/// Case-normalize a raw column header: trim, then upper-case the first
/// character and lower-case the rest (`" close"` -> `"Close"`).
///
/// `Datetime` is folded into `Date` so intraday and daily sources share one key.
pub fn normalize_column_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    let normalized: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    };
    if normalized == "Datetime" {
        DATE.to_string()
    } else {
        normalized
    }
}

/// Schema violations: a column the pipeline relies on is absent or malformed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("missing required column '{0}'")]
    MissingColumn(String),

    #[error("column '{column}' has {actual} rows, table has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("column '{column}' has unsupported type {dtype}")]
    UnsupportedType { column: String, dtype: String },
}

/// Check that every base OHLCV column (and the date key) is present.
pub fn validate_base_columns<'a>(
    columns: impl IntoIterator<Item = &'a str> + Clone,
) -> Result<(), SchemaError> {
    for required in std::iter::once(DATE).chain(BASE_COLUMNS) {
        if !columns.clone().into_iter().any(|c| c == required) {
            return Err(SchemaError::MissingColumn(required.to_string()));
        }
    }
    Ok(())
}

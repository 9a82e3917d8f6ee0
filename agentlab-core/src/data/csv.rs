//! Offline CSV import: `<dir>/<TICKER>.csv`.
//!
//! Headers are case-normalized to the column contract, `Datetime` is accepted
//! as the date key, and the result is cut to the trailing `period` measured
//! from the newest row.

use std::path::{Path, PathBuf};

use chrono::Months;
use polars::prelude::*;
use tracing::{debug, warn};

use super::frame::dataframe_to_bars;
use super::provider::{DataError, DataProvider, DataSource, FetchRequest, FetchResult};
use crate::domain::PriceBar;
use crate::schema;

/// Provider reading one CSV file per ticker from a directory.
#[derive(Debug, Clone)]
pub struct CsvProvider {
    dir: PathBuf,
}

impl CsvProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{ticker}.csv"))
    }

    /// Read and normalize one CSV file.
    pub fn read_file(path: &Path) -> Result<Vec<PriceBar>, DataError> {
        let mut df = LazyCsvReader::new(path)
            .with_has_header(true)
            .finish()
            .and_then(|lf| lf.collect())
            .map_err(|e| DataError::CsvError(format!("{}: {e}", path.display())))?;

        let normalized: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|c| schema::normalize_column_name(c.as_str()))
            .collect();
        df.set_column_names(normalized)
            .map_err(|e| DataError::CsvError(format!("{}: {e}", path.display())))?;

        let (bars, skipped) = dataframe_to_bars(&df)?;
        if skipped > 0 {
            warn!(path = %path.display(), skipped, "skipped rows with unreadable dates");
        }
        Ok(bars)
    }
}

/// Keep bars within `years` of the newest bar.
fn trailing_window(mut bars: Vec<PriceBar>, years: i32) -> Vec<PriceBar> {
    let Some(last) = bars.iter().map(|b| b.timestamp).max() else {
        return bars;
    };
    let months = Months::new(12 * years.unsigned_abs());
    if let Some(cutoff) = last.checked_sub_months(months) {
        bars.retain(|b| b.timestamp > cutoff);
    }
    bars
}

impl DataProvider for CsvProvider {
    fn name(&self) -> &str {
        "csv_import"
    }

    fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, DataError> {
        let path = self.path_for(&request.ticker);
        if !path.exists() {
            return Err(DataError::SymbolNotFound {
                symbol: request.ticker.clone(),
            });
        }

        let bars = trailing_window(Self::read_file(&path)?, request.period.years());
        debug!(symbol = %request.ticker, rows = bars.len(), path = %path.display(), "csv import");
        if bars.is_empty() {
            return Err(DataError::Empty {
                symbol: request.ticker.clone(),
            });
        }

        Ok(FetchResult {
            symbol: request.ticker.clone(),
            bars,
            source: DataSource::CsvImport,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::Period;
    use crate::schema::SchemaError;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn reads_lowercase_headers() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "SPY.csv",
            "date,open,high,low,close,volume\n\
             2024-01-02,470.0,473.0,468.0,472.6,1000\n\
             2024-01-03,472.0,474.0,469.0,468.8,1100\n",
        );
        let result = CsvProvider::new(dir.path())
            .fetch(&FetchRequest::new("SPY", Period::OneYear))
            .unwrap();
        assert_eq!(result.source, DataSource::CsvImport);
        assert_eq!(result.bars.len(), 2);
        assert_eq!(result.bars[1].close, 468.8);
        assert_eq!(result.bars[0].volume, 1000);
    }

    #[test]
    fn datetime_header_becomes_date() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "BTC.csv",
            "Datetime,Open,High,Low,Close,Volume\n\
             2024-01-02 14:30:00,1,2,0.5,1.5,10\n\
             2024-01-02 15:30:00,1.5,2,1,1.8,12\n",
        );
        let bars = CsvProvider::read_file(&dir.path().join("BTC.csv")).unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].timestamp < bars[1].timestamp);
    }

    #[test]
    fn missing_date_column_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "X.csv",
            "Open,High,Low,Close,Volume\n1,2,0.5,1.5,10\n",
        );
        let err = CsvProvider::new(dir.path())
            .fetch(&FetchRequest::new("X", Period::OneYear))
            .unwrap_err();
        assert!(matches!(err, DataError::Schema(SchemaError::MissingColumn(c)) if c == "Date"));
    }

    #[test]
    fn missing_file_is_symbol_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = CsvProvider::new(dir.path())
            .fetch(&FetchRequest::new("NOPE", Period::OneYear))
            .unwrap_err();
        assert!(matches!(err, DataError::SymbolNotFound { .. }));
    }

    #[test]
    fn period_trims_to_trailing_window() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "OLD.csv",
            "Date,Open,High,Low,Close,Volume\n\
             2020-06-01,1,1,1,1,1\n\
             2023-06-01,2,2,2,2,2\n\
             2024-06-01,3,3,3,3,3\n",
        );
        let provider = CsvProvider::new(dir.path());
        let one = provider.fetch(&FetchRequest::new("OLD", Period::OneYear)).unwrap();
        assert_eq!(one.bars.len(), 1);
        let five = provider.fetch(&FetchRequest::new("OLD", Period::FiveYears)).unwrap();
        assert_eq!(five.bars.len(), 3);
    }
}

//! Parquet store for raw bars with Hive-style partitioning.
//!
//! Layout: `{dir}/symbol={TICKER}/{period}_{interval}.parquet`
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Integrity validation on load (schema check, row count > 0)
//! - Quarantine for corrupt files (`{filename}.quarantined`)
//! - Metadata sidecar per symbol, one entry per stored request

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::frame::{bars_to_dataframe, dataframe_to_bars};
use super::provider::{DataError, DataSource, FetchRequest};
use crate::domain::PriceBar;

/// Metadata for one stored request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub symbol: String,
    pub period: String,
    pub interval: String,
    pub first: NaiveDateTime,
    pub last: NaiveDateTime,
    pub bar_count: usize,
    pub data_hash: String,
    pub source: DataSource,
    pub stored_at: NaiveDateTime,
}

/// One row of `status()` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEntry {
    pub file: String,
    pub meta: StoreMeta,
}

/// On-disk bar store.
#[derive(Debug, Clone)]
pub struct ParquetStore {
    dir: PathBuf,
}

impl ParquetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("symbol={symbol}"))
    }

    fn file_stem(request: &FetchRequest) -> String {
        format!("{}_{}", request.period, request.interval)
    }

    /// `{dir}/symbol={TICKER}/{period}_{interval}.parquet`
    pub fn path_for(&self, request: &FetchRequest) -> PathBuf {
        self.symbol_dir(&request.ticker)
            .join(format!("{}.parquet", Self::file_stem(request)))
    }

    fn meta_path(&self, symbol: &str) -> PathBuf {
        self.symbol_dir(symbol).join("meta.json")
    }

    fn read_meta_map(&self, symbol: &str) -> BTreeMap<String, StoreMeta> {
        fs::read_to_string(self.meta_path(symbol))
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    /// Persist bars for a request, replacing any previous file.
    pub fn write(
        &self,
        request: &FetchRequest,
        bars: &[PriceBar],
        source: DataSource,
    ) -> Result<StoreMeta, DataError> {
        let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
            return Err(DataError::CacheError("no bars to store".into()));
        };

        let sym_dir = self.symbol_dir(&request.ticker);
        fs::create_dir_all(&sym_dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let mut df = bars_to_dataframe(bars)?;
        let path = self.path_for(request);
        let tmp_path = path.with_extension("parquet.tmp");

        let file = fs::File::create(&tmp_path)
            .map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
        ParquetWriter::new(file)
            .finish(&mut df)
            .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                warn!(path = %tmp_path.display(), error = %cleanup, "failed to remove temp file");
            }
            DataError::CacheError(format!("atomic rename failed: {e}"))
        })?;

        let hash_input = serde_json::to_vec(bars)
            .map_err(|e| DataError::CacheError(format!("hash serialization: {e}")))?;
        let meta = StoreMeta {
            symbol: request.ticker.clone(),
            period: request.period.to_string(),
            interval: request.interval.to_string(),
            first: first.timestamp,
            last: last.timestamp,
            bar_count: bars.len(),
            data_hash: blake3::hash(&hash_input).to_hex().to_string(),
            source,
            stored_at: chrono::Local::now().naive_local(),
        };

        let mut metas = self.read_meta_map(&request.ticker);
        metas.insert(Self::file_stem(request), meta.clone());
        let meta_json = serde_json::to_string_pretty(&metas)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(&request.ticker), meta_json)
            .map_err(|e| DataError::CacheError(format!("meta write: {e}")))?;

        debug!(symbol = %request.ticker, rows = bars.len(), path = %path.display(), "stored bars");
        Ok(meta)
    }

    /// Load stored bars for a request. A file that fails validation is
    /// quarantined and reported as a miss.
    pub fn load(&self, request: &FetchRequest) -> Result<Vec<PriceBar>, DataError> {
        let path = self.path_for(request);
        if !path.exists() {
            return Err(DataError::NoCachedData {
                symbol: request.ticker.clone(),
            });
        }

        match load_and_validate(&path) {
            Ok(bars) => Ok(bars),
            Err(e) => {
                let quarantine = path.with_extension("parquet.quarantined");
                warn!(path = %path.display(), error = %e, "quarantining corrupt store file");
                if let Err(rename) = fs::rename(&path, &quarantine) {
                    warn!(
                        path = %path.display(),
                        quarantine = %quarantine.display(),
                        error = %rename,
                        "failed to quarantine corrupt store file"
                    );
                }
                Err(DataError::NoCachedData {
                    symbol: request.ticker.clone(),
                })
            }
        }
    }

    pub fn get_meta(&self, request: &FetchRequest) -> Option<StoreMeta> {
        self.read_meta_map(&request.ticker)
            .remove(&Self::file_stem(request))
    }

    /// Every stored entry whose parquet file is still present, sorted by symbol.
    pub fn status(&self) -> Result<Vec<StoreEntry>, DataError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries =
            fs::read_dir(&self.dir).map_err(|e| DataError::CacheError(format!("read dir: {e}")))?;

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::CacheError(format!("dir entry: {e}")))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(symbol) = name.strip_prefix("symbol=") else {
                continue;
            };
            for (stem, meta) in self.read_meta_map(symbol) {
                let file = format!("{stem}.parquet");
                if entry.path().join(&file).exists() {
                    out.push(StoreEntry { file, meta });
                }
            }
        }
        out.sort_by(|a, b| (&a.meta.symbol, &a.file).cmp(&(&b.meta.symbol, &b.file)));
        Ok(out)
    }
}

fn load_and_validate(path: &Path) -> Result<Vec<PriceBar>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::ValidationError("empty parquet file".into()));
    }

    let (bars, skipped) = dataframe_to_bars(&df)?;
    if skipped > 0 {
        return Err(DataError::ValidationError(format!(
            "{skipped} rows with null timestamps"
        )));
    }
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::{Interval, Period};
    use chrono::NaiveDate;

    fn sample_bars() -> Vec<PriceBar> {
        (0..3)
            .map(|i| PriceBar {
                timestamp: NaiveDate::from_ymd_opt(2024, 1, 2 + i)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
                open: 100.0 + i as f64,
                high: 102.0 + i as f64,
                low: 99.0 + i as f64,
                close: 101.0 + i as f64,
                volume: 1000 + u64::from(i),
            })
            .collect()
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        let req = FetchRequest::new("SPY", Period::OneYear);

        store.write(&req, &sample_bars(), DataSource::Synthetic).unwrap();
        assert!(dir.path().join("symbol=SPY").join("1y_1d.parquet").exists());
        assert_eq!(store.load(&req).unwrap(), sample_bars());
    }

    #[test]
    fn requests_are_keyed_by_period_and_interval() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        let daily = FetchRequest::new("SPY", Period::OneYear);
        let weekly = daily.clone().with_interval(Interval::OneWeek);

        store.write(&daily, &sample_bars(), DataSource::Synthetic).unwrap();
        assert!(matches!(store.load(&weekly), Err(DataError::NoCachedData { .. })));

        store.write(&weekly, &sample_bars()[..1], DataSource::Synthetic).unwrap();
        assert_eq!(store.load(&weekly).unwrap().len(), 1);
        assert_eq!(store.get_meta(&daily).unwrap().bar_count, 3);
        assert_eq!(store.status().unwrap().len(), 2);
    }

    #[test]
    fn meta_records_range_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        let req = FetchRequest::new("SPY", Period::TwoYears);

        let meta = store.write(&req, &sample_bars(), DataSource::YahooFinance).unwrap();
        assert_eq!(meta.bar_count, 3);
        assert_eq!(meta.first, sample_bars()[0].timestamp);
        assert_eq!(meta.data_hash.len(), 64);
        assert_eq!(store.get_meta(&req), Some(meta));
    }

    #[test]
    fn corrupt_file_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        let req = FetchRequest::new("BAD", Period::OneYear);
        let path = store.path_for(&req);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"definitely not parquet").unwrap();

        assert!(matches!(store.load(&req), Err(DataError::NoCachedData { .. })));
        assert!(!path.exists());
        assert!(path.with_extension("parquet.quarantined").exists());
    }

    #[test]
    fn blocked_quarantine_still_reports_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        let req = FetchRequest::new("BAD", Period::OneYear);
        let path = store.path_for(&req);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"definitely not parquet").unwrap();
        // A non-empty directory where the quarantine file should go makes the rename fail.
        let blocker = path.with_extension("parquet.quarantined");
        fs::create_dir_all(&blocker).unwrap();
        fs::write(blocker.join("keep"), b"x").unwrap();

        assert!(matches!(store.load(&req), Err(DataError::NoCachedData { .. })));
        assert!(path.exists());
        assert!(blocker.join("keep").exists());
        assert!(matches!(store.load(&req), Err(DataError::NoCachedData { .. })));
    }

    #[test]
    fn status_of_missing_dir_is_empty() {
        let store = ParquetStore::new("/nonexistent/agentlab/store");
        assert!(store.status().unwrap().is_empty());
    }
}

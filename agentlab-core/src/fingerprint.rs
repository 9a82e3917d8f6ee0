//! Run fingerprinting: deterministic identification of the data and
//! configuration a policy was trained on.
//!
//! - `DatasetHash`: content hash of a price table (timestamps, bars, derived columns).
//! - `ConfigHash`: hash of any serializable configuration.
//! - `RunId`: hash of (dataset, config, seed).

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::PriceTable;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetHash(pub String);

impl DatasetHash {
    /// Hash every timestamp and every column value, in column order.
    pub fn of_table(table: &PriceTable) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(table.symbol().as_bytes());
        for ts in table.timestamps() {
            hasher.update(&ts.and_utc().timestamp_millis().to_le_bytes());
        }
        for name in table.column_names() {
            hasher.update(name.as_bytes());
            if let Some(values) = table.column(&name) {
                for v in values.iter() {
                    hasher.update(&v.to_bits().to_le_bytes());
                }
            }
        }
        Self(hasher.finalize().to_hex().to_string())
    }
}

impl fmt::Display for DatasetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigHash(pub String);

impl ConfigHash {
    /// Hash the canonical JSON form of a configuration.
    pub fn of<T: Serialize>(config: &T) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_vec(config)?;
        Ok(Self(blake3::hash(&json).to_hex().to_string()))
    }
}

impl fmt::Display for ConfigHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new(dataset: &DatasetHash, config: &ConfigHash, seed: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(dataset.0.as_bytes());
        hasher.update(config.0.as_bytes());
        hasher.update(&seed.to_le_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    /// First 12 hex chars, for directory names and log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Complete identity of one train + backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFingerprint {
    pub run_id: RunId,
    pub created_at: NaiveDateTime,
    pub seed: u64,

    pub symbol: String,
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
    pub rows: usize,

    pub dataset_hash: DatasetHash,
    pub config_hash: ConfigHash,
}

impl RunFingerprint {
    pub fn new<T: Serialize>(
        table: &PriceTable,
        config: &T,
        seed: u64,
    ) -> Result<Self, serde_json::Error> {
        let dataset_hash = DatasetHash::of_table(table);
        let config_hash = ConfigHash::of(config)?;
        Ok(Self {
            run_id: RunId::new(&dataset_hash, &config_hash, seed),
            created_at: chrono::Local::now().naive_local(),
            seed,
            symbol: table.symbol().to_string(),
            first: table.first_timestamp(),
            last: table.last_timestamp(),
            rows: table.len(),
            dataset_hash,
            config_hash,
        })
    }
}

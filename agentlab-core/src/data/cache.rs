//! In-memory memo of indicator-augmented tables.
//!
//! The cache is an explicit value owned by the caller rather than process
//! global state. Entries never expire; dropping the cache drops them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::provider::{FetchRequest, Interval, Period};
use crate::domain::PriceTable;
use crate::indicators::IndicatorConfig;

/// Memo key. The indicator periods are part of the key because they decide
/// which columns the table carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub ticker: String,
    pub period: Period,
    pub interval: Interval,
    pub indicators: IndicatorConfig,
}

impl CacheKey {
    pub fn new(request: &FetchRequest, indicators: &IndicatorConfig) -> Self {
        Self {
            ticker: request.ticker.trim().to_string(),
            period: request.period,
            interval: request.interval,
            indicators: *indicators,
        }
    }
}

#[derive(Debug, Default)]
pub struct TableCache {
    entries: HashMap<CacheKey, PriceTable>,
    hits: u64,
    misses: u64,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Owned copy of a cached table, so each run owns its table exclusively.
    pub fn get(&mut self, key: &CacheKey) -> Option<PriceTable> {
        match self.entries.get(key) {
            Some(table) => {
                self.hits += 1;
                Some(table.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: CacheKey, table: PriceTable) {
        self.entries.insert(key, table);
    }

    /// Return the cached table or build, store and return a fresh one.
    /// A failed build leaves the cache untouched.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: CacheKey,
        build: impl FnOnce() -> Result<PriceTable, E>,
    ) -> Result<PriceTable, E> {
        if let Some(table) = self.get(&key) {
            return Ok(table);
        }
        let table = build()?;
        self.entries.insert(key, table.clone());
        Ok(table)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

//! Market data fetcher: store lookup, provider fetch, write-through.

use tracing::{debug, info, warn};

use super::provider::{DataError, DataProvider, DataSource, FetchRequest, FetchResult};
use super::store::ParquetStore;
use crate::domain::PriceBar;

/// Resolves bars for a request from the store or a provider.
///
/// Order: store hit (unless `force`) → provider fetch → write-through.
/// With neither a store hit nor a provider the fetch fails with
/// [`DataError::NoCachedData`]. No retries happen at this level.
pub struct MarketDataFetcher {
    provider: Option<Box<dyn DataProvider>>,
    store: Option<ParquetStore>,
    force: bool,
}

impl MarketDataFetcher {
    pub fn new(provider: Box<dyn DataProvider>) -> Self {
        Self {
            provider: Some(provider),
            store: None,
            force: false,
        }
    }

    /// Fetcher that only reads from a store.
    pub fn offline(store: ParquetStore) -> Self {
        Self {
            provider: None,
            store: Some(store),
            force: false,
        }
    }

    pub fn with_store(mut self, store: ParquetStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Skip the store lookup (still writes through).
    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_deref().map(|p| p.name())
    }

    pub fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, DataError> {
        let request = &request.normalized();
        let ticker = request.ticker.as_str();
        if ticker.is_empty() {
            return Err(DataError::InvalidRequest("ticker must not be empty".into()));
        }

        if let (Some(store), false) = (&self.store, self.force) {
            match store.load(request) {
                Ok(bars) => {
                    let bars = clean_bars(ticker, bars);
                    if !bars.is_empty() {
                        debug!(symbol = ticker, rows = bars.len(), "store hit");
                        return Ok(FetchResult {
                            symbol: ticker.to_string(),
                            bars,
                            source: DataSource::Store,
                        });
                    }
                }
                Err(DataError::NoCachedData { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let Some(provider) = self.provider.as_deref() else {
            return Err(DataError::NoCachedData {
                symbol: ticker.to_string(),
            });
        };

        info!(
            symbol = ticker,
            period = %request.period,
            interval = %request.interval,
            provider = provider.name(),
            "fetching bars"
        );
        let mut result = provider.fetch(request)?;
        result.bars = clean_bars(ticker, result.bars);
        if result.bars.is_empty() {
            return Err(DataError::Empty {
                symbol: ticker.to_string(),
            });
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.write(request, &result.bars, result.source) {
                warn!(symbol = ticker, error = %e, "store write-through failed");
            }
        }

        Ok(result)
    }
}

/// Sort ascending, collapse duplicate timestamps (last wins), drop void rows.
pub fn clean_bars(symbol: &str, mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    bars.sort_by_key(|b| b.timestamp);
    let mut deduped: Vec<PriceBar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match deduped.last_mut() {
            Some(last) if last.timestamp == bar.timestamp => *last = bar,
            _ => deduped.push(bar),
        }
    }

    let before = deduped.len();
    deduped.retain(|b| !b.is_void());
    let dropped = before - deduped.len();
    if dropped > 0 {
        warn!(symbol, dropped, "dropped rows with missing prices");
    }
    deduped
}

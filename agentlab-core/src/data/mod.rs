//! Market data acquisition: providers, on-disk store, fetcher, table memo.

pub mod cache;
pub mod csv;
pub mod fetcher;
pub mod frame;
pub mod provider;
pub mod store;
pub mod synthetic;
pub mod yahoo;

pub use cache::{CacheKey, TableCache};
pub use csv::CsvProvider;
pub use fetcher::{clean_bars, MarketDataFetcher};
pub use provider::{
    DataError, DataProvider, DataSource, FetchRequest, FetchResult, Interval, Period,
};
pub use store::{ParquetStore, StoreEntry, StoreMeta};
pub use synthetic::SyntheticProvider;
pub use yahoo::YahooProvider;

//! Deterministic synthetic bars for demos and offline tests.
//!
//! The random walk is seeded from the ticker via BLAKE3, so the same ticker
//! always yields the same series. Results produced on synthetic data are
//! tagged `DataSource::Synthetic`.

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::provider::{DataError, DataProvider, DataSource, FetchRequest, FetchResult, Interval};
use crate::domain::PriceBar;

/// Random-walk provider anchored at a fixed end date.
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    end: NaiveDate,
    start_price: f64,
    daily_range: f64,
}

impl SyntheticProvider {
    pub fn new(end: NaiveDate) -> Self {
        Self {
            end,
            start_price: 100.0,
            daily_range: 0.03,
        }
    }

    fn timestamps(&self, request: &FetchRequest) -> Vec<NaiveDateTime> {
        let start = self
            .end
            .checked_sub_months(Months::new(12 * request.period.years() as u32))
            .unwrap_or(self.end);
        let is_weekday = |d: NaiveDate| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun);

        let mut out = Vec::new();
        let mut day = start;
        while day <= self.end {
            match request.interval {
                Interval::OneHour => {
                    if is_weekday(day) {
                        // Regular US session, 14:30-21:00 UTC, hourly stamps.
                        out.extend((14..21).filter_map(|h| day.and_hms_opt(h, 30, 0)));
                    }
                    day += Duration::days(1);
                }
                Interval::OneDay => {
                    if is_weekday(day) {
                        out.extend(day.and_hms_opt(0, 0, 0));
                    }
                    day += Duration::days(1);
                }
                Interval::FiveDays => {
                    out.extend(day.and_hms_opt(0, 0, 0));
                    day += Duration::days(5);
                }
                Interval::OneWeek => {
                    out.extend(day.and_hms_opt(0, 0, 0));
                    day += Duration::days(7);
                }
                Interval::OneMonth => {
                    out.extend(day.and_hms_opt(0, 0, 0));
                    day = match day.checked_add_months(Months::new(1)) {
                        Some(next) => next,
                        None => break,
                    };
                }
            }
        }
        out
    }

    /// Generate the bar series for a request.
    pub fn generate(&self, request: &FetchRequest) -> Vec<PriceBar> {
        let seed = *blake3::hash(request.ticker.as_bytes()).as_bytes();
        let mut rng = StdRng::from_seed(seed);

        let mut price = self.start_price;
        self.timestamps(request)
            .into_iter()
            .map(|timestamp| {
                let step: f64 = rng.gen_range(-self.daily_range..self.daily_range);
                let open = price;
                let close = price * (1.0 + step);
                let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
                let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
                let volume = rng.gen_range(500_000..5_000_000u64);
                price = close;
                PriceBar {
                    timestamp,
                    open,
                    high,
                    low,
                    close,
                    volume,
                }
            })
            .collect()
    }
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        // Fixed anchor keeps output identical across runs and machines.
        Self::new(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default())
    }
}

impl DataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, DataError> {
        let bars = self.generate(request);
        if bars.is_empty() {
            return Err(DataError::Empty {
                symbol: request.ticker.clone(),
            });
        }
        Ok(FetchResult {
            symbol: request.ticker.clone(),
            bars,
            source: DataSource::Synthetic,
        })
    }
}

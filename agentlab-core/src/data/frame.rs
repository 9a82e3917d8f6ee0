//! Conversion between Polars DataFrames and price bars.
//!
//! Frames use the table column contract (`Date, Open, High, Low, Close, Volume`).
//! `Date` is written as a millisecond `Datetime`; on read it is accepted as
//! `Datetime`, `Date`, or string.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use polars::prelude::*;

use super::provider::DataError;
use crate::domain::PriceBar;
use crate::schema::{self, SchemaError};

const STRING_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%dT%H:%M:%S%:z"];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

fn polars_err(context: &'static str) -> impl Fn(PolarsError) -> DataError {
    move |e| DataError::ParquetError(format!("{context}: {e}"))
}

/// Parse a timestamp string as exported by common market-data tools.
///
/// Offset-bearing stamps (`2024-01-02 09:30:00-05:00`) are converted to UTC.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.naive_utc());
        }
    }
    for fmt in STRING_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Convert bars to a DataFrame with the contract column names.
pub fn bars_to_dataframe(bars: &[PriceBar]) -> Result<DataFrame, DataError> {
    let stamps: Vec<i64> = bars
        .iter()
        .map(|b| b.timestamp.and_utc().timestamp_millis())
        .collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<u64> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        Column::new(schema::DATE.into(), stamps)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(polars_err("date cast"))?,
        Column::new(schema::OPEN.into(), opens),
        Column::new(schema::HIGH.into(), highs),
        Column::new(schema::LOW.into(), lows),
        Column::new(schema::CLOSE.into(), closes),
        Column::new(schema::VOLUME.into(), volumes),
    ])
    .map_err(polars_err("dataframe creation"))
}

/// Read the `Date` column into timestamps. Unparseable or null cells map to `None`.
fn read_timestamps(column: &Column) -> Result<Vec<Option<NaiveDateTime>>, DataError> {
    match column.dtype() {
        DataType::String => Ok(column
            .str()
            .map_err(polars_err("date column"))?
            .into_iter()
            .map(|v| v.and_then(parse_timestamp))
            .collect()),
        DataType::Date => {
            let epoch = NaiveDate::default();
            let days = column
                .cast(&DataType::Int32)
                .map_err(polars_err("date cast"))?;
            Ok(days
                .i32()
                .map_err(polars_err("date column"))?
                .into_iter()
                .map(|d| {
                    d.and_then(|d| epoch.checked_add_signed(Duration::days(i64::from(d))))
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
                .collect())
        }
        DataType::Datetime(_, _) => {
            let millis = column
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
                .and_then(|c| c.cast(&DataType::Int64))
                .map_err(polars_err("datetime cast"))?;
            Ok(millis
                .i64()
                .map_err(polars_err("datetime column"))?
                .into_iter()
                .map(|ms| ms.and_then(DateTime::from_timestamp_millis).map(|dt| dt.naive_utc()))
                .collect())
        }
        other => Err(SchemaError::UnsupportedType {
            column: schema::DATE.to_string(),
            dtype: other.to_string(),
        }
        .into()),
    }
}

/// Read a numeric column as `f64`; nulls become NaN.
fn read_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>, DataError> {
    let column = df
        .column(name)
        .map_err(|_| SchemaError::MissingColumn(name.to_string()))?;
    let cast = column
        .cast(&DataType::Float64)
        .map_err(|_| SchemaError::UnsupportedType {
            column: name.to_string(),
            dtype: column.dtype().to_string(),
        })?;
    Ok(cast
        .f64()
        .map_err(polars_err("numeric column"))?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

/// Convert a contract-named DataFrame back to bars.
///
/// Rows whose `Date` cannot be read are skipped; the number skipped is
/// returned alongside the bars. Missing price cells become NaN so the caller
/// can drop them as void rows.
pub fn dataframe_to_bars(df: &DataFrame) -> Result<(Vec<PriceBar>, usize), DataError> {
    schema::validate_base_columns(df.get_column_names().into_iter().map(|c| c.as_str()))?;

    let dates = df
        .column(schema::DATE)
        .map_err(|_| SchemaError::MissingColumn(schema::DATE.to_string()))?;
    let stamps = read_timestamps(dates)?;
    let opens = read_f64(df, schema::OPEN)?;
    let highs = read_f64(df, schema::HIGH)?;
    let lows = read_f64(df, schema::LOW)?;
    let closes = read_f64(df, schema::CLOSE)?;
    let volumes = read_f64(df, schema::VOLUME)?;

    let mut skipped = 0;
    let mut bars = Vec::with_capacity(df.height());
    for (i, stamp) in stamps.into_iter().enumerate() {
        let Some(timestamp) = stamp else {
            skipped += 1;
            continue;
        };
        let volume = volumes[i];
        bars.push(PriceBar {
            timestamp,
            open: opens[i],
            high: highs[i],
            low: lows[i],
            close: closes[i],
            volume: if volume.is_finite() && volume > 0.0 {
                volume.round() as u64
            } else {
                0
            },
        });
    }
    Ok((bars, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn parses_common_stamp_shapes() {
        assert_eq!(parse_timestamp("2024-03-04"), Some(ts(4)));
        assert_eq!(parse_timestamp(" 2024-03-04 00:00:00 "), Some(ts(4)));
        assert_eq!(
            parse_timestamp("2024-03-04 09:30:00-05:00"),
            ts(4).checked_add_signed(Duration::minutes(14 * 60 + 30))
        );
        assert_eq!(parse_timestamp("not a date"), None);
    }

    #[test]
    fn bars_survive_a_frame() {
        let bars = vec![
            PriceBar {
                timestamp: ts(4),
                open: 10.0,
                high: 11.0,
                low: 9.0,
                close: 10.5,
                volume: 1200,
            },
            PriceBar {
                timestamp: ts(5),
                open: 10.5,
                high: 12.0,
                low: 10.0,
                close: 11.5,
                volume: 900,
            },
        ];
        let df = bars_to_dataframe(&bars).unwrap();
        assert_eq!(df.height(), 2);
        let (back, skipped) = dataframe_to_bars(&df).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(back, bars);
    }

    #[test]
    fn string_dates_and_nulls() {
        let df = DataFrame::new(vec![
            Column::new("Date".into(), &["2024-03-04", "garbage", "2024-03-06"]),
            Column::new("Open".into(), &[Some(1.0), Some(2.0), None]),
            Column::new("High".into(), &[1.0, 2.0, 3.0]),
            Column::new("Low".into(), &[1.0, 2.0, 3.0]),
            Column::new("Close".into(), &[1.0, 2.0, 3.0]),
            Column::new("Volume".into(), &[10i64, 20, 30]),
        ])
        .unwrap();
        let (bars, skipped) = dataframe_to_bars(&df).unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(bars.len(), 2);
        assert!(bars[1].open.is_nan());
        assert!(bars[1].is_void());
        assert_eq!(bars[1].volume, 30);
    }

    #[test]
    fn missing_close_is_schema_error() {
        let df = DataFrame::new(vec![
            Column::new("Date".into(), &["2024-03-04"]),
            Column::new("Open".into(), &[1.0]),
            Column::new("High".into(), &[1.0]),
            Column::new("Low".into(), &[1.0]),
            Column::new("Volume".into(), &[1.0]),
        ])
        .unwrap();
        assert!(matches!(
            dataframe_to_bars(&df),
            Err(DataError::Schema(SchemaError::MissingColumn(c))) if c == "Close"
        ));
    }
}

//! Pipeline entry points: table loading, the error taxonomy, and the
//! fetch → indicators → train → backtest run.
//!
//! Every failure is detected at the component boundary where it occurs and
//! returned as a [`PipelineError`]; nothing is retried.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use agentlab_core::data::{CacheKey, DataError, FetchRequest, MarketDataFetcher, TableCache};
use agentlab_core::domain::PriceTable;
use agentlab_core::env::EnvError;
use agentlab_core::features::FeatureError;
use agentlab_core::fingerprint::RunFingerprint;
use agentlab_core::indicators::{IndicatorConfig, IndicatorEngine, IndicatorError};
use agentlab_core::schema::SchemaError;

use crate::backtest::{run_backtest, BacktestResult};
use crate::config::{ConfigError, PipelineConfig};
use crate::policy::PolicyError;
use crate::ppo::{TrainingError, TrainingStats};
use crate::trainer::train_rl_model;

/// Current schema version for persisted run reports.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] DataError),

    #[error("data quality: {0}")]
    DataQuality(String),

    #[error("frame start {start} precedes the {window_size}-bar lookback")]
    InsufficientHistory { start: usize, window_size: usize },

    #[error("schema: {0}")]
    Schema(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("training failed: {0}")]
    TrainingFailure(#[from] TrainingError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),
}

impl From<IndicatorError> for PipelineError {
    fn from(err: IndicatorError) -> Self {
        match err {
            IndicatorError::Schema(e) => PipelineError::Schema(e.to_string()),
            IndicatorError::InvalidConfig(msg) => {
                PipelineError::Config(ConfigError::Invalid(msg))
            }
            other => PipelineError::DataQuality(other.to_string()),
        }
    }
}

impl From<SchemaError> for PipelineError {
    fn from(err: SchemaError) -> Self {
        PipelineError::Schema(err.to_string())
    }
}

impl From<FeatureError> for PipelineError {
    fn from(err: FeatureError) -> Self {
        match err {
            FeatureError::InsufficientHistory { start, window_size } => {
                PipelineError::InsufficientHistory { start, window_size }
            }
            FeatureError::Schema(e) => PipelineError::Schema(e.to_string()),
            e @ FeatureError::IncompleteRow { .. } => PipelineError::DataQuality(e.to_string()),
            other => PipelineError::InvalidFrame(other.to_string()),
        }
    }
}

/// Construction-time environment errors. Errors raised while stepping are
/// training failures and go through [`TrainingError`] instead.
impl From<EnvError> for PipelineError {
    fn from(err: EnvError) -> Self {
        match err {
            EnvError::Feature(e) => e.into(),
            other => PipelineError::InvalidFrame(other.to_string()),
        }
    }
}

impl From<PolicyError> for PipelineError {
    fn from(err: PolicyError) -> Self {
        PipelineError::Schema(err.to_string())
    }
}

/// Fetch bars and compute indicators, memoised in `cache` by
/// (ticker, period, interval, indicator periods).
pub fn load_table(
    fetcher: &MarketDataFetcher,
    cache: &mut TableCache,
    request: &FetchRequest,
    indicators: &IndicatorConfig,
) -> Result<PriceTable, PipelineError> {
    let key = CacheKey::new(request, indicators);
    cache.get_or_try_insert_with(key, || -> Result<_, PipelineError> {
        let fetched = fetcher.fetch(request)?;
        info!(
            ticker = %request.ticker,
            source = %fetched.source,
            bars = fetched.bars.len(),
            "fetched bars"
        );
        let table = PriceTable::new(fetched.symbol, fetched.bars);
        let engine = IndicatorEngine::new(*indicators)?;
        Ok(engine.compute(table)?)
    })
}

/// [`load_table`] collapsed to presence: `None` when anything failed.
/// The cause is logged.
pub fn get_data(
    fetcher: &MarketDataFetcher,
    cache: &mut TableCache,
    request: &FetchRequest,
    indicators: &IndicatorConfig,
) -> Option<PriceTable> {
    match load_table(fetcher, cache, request, indicators) {
        Ok(table) => Some(table),
        Err(e) => {
            warn!(ticker = %request.ticker, error = %e, "no data");
            None
        }
    }
}

/// Everything one train + backtest run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub fingerprint: RunFingerprint,
    pub config: PipelineConfig,
    pub training: TrainingStats,
    pub backtest: BacktestResult,
    pub rows: usize,
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl RunReport {
    /// Profit as a percentage return: `(profit - 1) * 100`.
    pub fn return_pct(&self) -> f64 {
        (self.backtest.profit - 1.0) * 100.0
    }
}

/// Train on a prepared table and replay the policy on the same frame.
pub fn train_and_backtest(
    table: &PriceTable,
    config: &PipelineConfig,
) -> Result<RunReport, PipelineError> {
    let fingerprint = RunFingerprint::new(table, config, config.training.seed)
        .map_err(|e| ConfigError::Invalid(format!("config is not serializable: {e}")))?;
    info!(run_id = fingerprint.run_id.short(), symbol = table.symbol(), "run started");

    let (policy, _env) = train_rl_model(table, config)?;
    let env_config = config.environment.env_config(table.len());
    let backtest = run_backtest(&policy, table, &env_config)?;

    info!(
        run_id = fingerprint.run_id.short(),
        profit = backtest.profit,
        steps = backtest.steps,
        "run finished"
    );
    Ok(RunReport {
        schema_version: SCHEMA_VERSION,
        fingerprint,
        config: config.clone(),
        training: policy.stats().clone(),
        backtest,
        rows: table.len(),
        first: table.first_timestamp(),
        last: table.last_timestamp(),
    })
}

/// Full run for `config.data`: load, train, backtest.
pub fn run_pipeline(
    fetcher: &MarketDataFetcher,
    cache: &mut TableCache,
    config: &PipelineConfig,
) -> Result<(PriceTable, RunReport), PipelineError> {
    config.validate()?;
    let table = load_table(fetcher, cache, &config.data.request(), &config.indicators)?;
    let report = train_and_backtest(&table, config)?;
    Ok((table, report))
}

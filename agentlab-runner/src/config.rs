//! Pipeline configuration loaded from TOML.
//!
//! Every section and field has a default, so an empty file is a valid config:
//!
//! ```toml
//! [data]
//! ticker = "AAPL"
//! period = "1y"
//! interval = "1d"
//!
//! [indicators]
//! sma_period = 20
//!
//! [environment]
//! window_size = 20
//! frame_start = 20
//!
//! [training]
//! total_timesteps = 5000
//! seed = 42
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use agentlab_core::data::{FetchRequest, Interval, Period};
use agentlab_core::env::{EnvConfig, FeeSchedule};
use agentlab_core::features::{ColumnSelection, FeatureSelector, FrameBound, PriceDiffSelection};
use agentlab_core::indicators::IndicatorConfig;

/// Errors from loading or validating a pipeline config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which columns the policy observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSet {
    /// `[Close, Open, High, Low, RSI, SMA_<P>]`.
    #[default]
    Indicators,
    /// `[Close, Close_diff]`.
    PriceDiff,
}

impl FeatureSet {
    pub fn selector(self, sma_period: usize) -> Box<dyn FeatureSelector> {
        match self {
            FeatureSet::Indicators => Box::new(ColumnSelection::with_sma_period(sma_period)),
            FeatureSet::PriceDiff => Box::new(PriceDiffSelection),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    pub ticker: String,
    pub period: Period,
    pub interval: Interval,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            ticker: "AAPL".to_string(),
            period: Period::default(),
            interval: Interval::default(),
        }
    }
}

impl DataSection {
    pub fn request(&self) -> FetchRequest {
        FetchRequest::new(self.ticker.clone(), self.period).with_interval(self.interval)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSection {
    pub window_size: usize,
    /// Defaults to `window_size`.
    pub frame_start: Option<usize>,
    /// Defaults to the table length.
    pub frame_end: Option<usize>,
    pub fees: FeeSchedule,
    pub max_episode_steps: Option<usize>,
    pub features: FeatureSet,
}

impl Default for EnvironmentSection {
    fn default() -> Self {
        Self {
            window_size: 20,
            frame_start: None,
            frame_end: None,
            fees: FeeSchedule::default(),
            max_episode_steps: None,
            features: FeatureSet::default(),
        }
    }
}

impl EnvironmentSection {
    /// Environment config for a table of `table_len` rows.
    pub fn env_config(&self, table_len: usize) -> EnvConfig {
        let frame = FrameBound::new(
            self.frame_start.unwrap_or(self.window_size),
            self.frame_end.unwrap_or(table_len),
        );
        EnvConfig {
            window_size: self.window_size,
            frame: Some(frame),
            fees: self.fees,
            max_episode_steps: self.max_episode_steps,
        }
    }
}

/// PPO hyper-parameters. Defaults follow the common PPO baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub total_timesteps: usize,
    pub seed: u64,
    pub learning_rate: f64,
    pub n_steps: usize,
    pub batch_size: usize,
    pub n_epochs: usize,
    pub gamma: f64,
    pub gae_lambda: f64,
    pub clip_range: f64,
    pub ent_coef: f64,
    pub vf_coef: f64,
    pub max_grad_norm: f64,
    pub normalize_advantage: bool,
    pub hidden_sizes: Vec<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            total_timesteps: 5000,
            seed: 42,
            learning_rate: 3e-4,
            n_steps: 2048,
            batch_size: 64,
            n_epochs: 10,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_range: 0.2,
            ent_coef: 0.0,
            vf_coef: 0.5,
            max_grad_norm: 0.5,
            normalize_advantage: true,
            hidden_sizes: vec![64, 64],
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("total_timesteps", self.total_timesteps),
            ("n_steps", self.n_steps),
            ("batch_size", self.batch_size),
            ("n_epochs", self.n_epochs),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("training.{name} must be > 0")));
            }
        }
        if self.hidden_sizes.is_empty() || self.hidden_sizes.contains(&0) {
            return Err(ConfigError::Invalid(
                "training.hidden_sizes must list at least one non-zero layer".into(),
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::Invalid("training.learning_rate must be > 0".into()));
        }
        for (name, value) in [("gamma", self.gamma), ("gae_lambda", self.gae_lambda)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("training.{name} must be in [0, 1]")));
            }
        }
        if !(self.clip_range > 0.0 && self.clip_range < 1.0) {
            return Err(ConfigError::Invalid("training.clip_range must be in (0, 1)".into()));
        }
        if self.ent_coef < 0.0 || self.vf_coef < 0.0 || self.max_grad_norm <= 0.0 {
            return Err(ConfigError::Invalid(
                "training coefficients must be non-negative and max_grad_norm > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Top-level config: one ticker, one training run, one backtest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataSection,
    pub indicators: IndicatorConfig,
    pub environment: EnvironmentSection,
    pub training: TrainingConfig,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data.ticker.trim().is_empty() {
            return Err(ConfigError::Invalid("data.ticker must not be empty".into()));
        }
        self.indicators
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let env = &self.environment;
        if env.window_size == 0 {
            return Err(ConfigError::Invalid("environment.window_size must be > 0".into()));
        }
        if let (Some(start), Some(end)) = (env.frame_start, env.frame_end) {
            if start >= end {
                return Err(ConfigError::Invalid(format!(
                    "environment frame [{start}, {end}) is empty"
                )));
            }
        }
        if env.max_episode_steps == Some(0) {
            return Err(ConfigError::Invalid(
                "environment.max_episode_steps must be > 0 when set".into(),
            ));
        }
        for (name, fee) in [("bid", env.fees.bid), ("ask", env.fees.ask)] {
            if !(0.0..1.0).contains(&fee) {
                return Err(ConfigError::Invalid(format!(
                    "environment.fees.{name} must be in [0, 1)"
                )));
            }
        }
        self.training.validate()
    }

    /// Columns the policy will observe for this config.
    pub fn selector(&self) -> Box<dyn FeatureSelector> {
        self.environment.features.selector(self.indicators.sma_period)
    }
}

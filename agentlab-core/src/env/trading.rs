//! Stock trading environment.
//!
//! Ticks index into the feature pair. An episode starts at tick `W` (the first
//! tradable row) with the agent short and no trade history, and ends on the
//! last row of the pair.
//!
//! A trade happens when the action disagrees with the position (buy while
//! short, sell while long). Closing a long position earns the price move since
//! the last trade as reward. Profit compounds only through long holdings, with
//! the ask fee paid on entry and the bid fee on exit; an open long is marked to
//! market at the end of the episode.

use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{Action, EnvError, Environment, Position, StepInfo, Transition};
use crate::domain::PriceTable;
use crate::features::{adapt, FeaturePair, FeatureSelector, FrameBound};

/// Proportional trading fees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    /// Charged when selling.
    pub bid: f64,
    /// Charged when buying.
    pub ask: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            bid: 0.01,
            ask: 0.005,
        }
    }
}

/// Environment shape: lookback, tradable frame, fees, optional step cap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub window_size: usize,
    /// `None` trades the whole table after the first window.
    pub frame: Option<FrameBound>,
    pub fees: FeeSchedule,
    pub max_episode_steps: Option<usize>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            frame: None,
            fees: FeeSchedule::default(),
            max_episode_steps: None,
        }
    }
}

impl EnvConfig {
    pub fn frame_for(&self, table_len: usize) -> FrameBound {
        self.frame
            .unwrap_or_else(|| FrameBound::full(self.window_size, table_len))
    }
}

#[derive(Debug, Clone)]
pub struct TradingEnv {
    prices: Array1<f64>,
    features: Array2<f64>,
    columns: Vec<String>,
    window_size: usize,
    fees: FeeSchedule,
    max_episode_steps: Option<usize>,
    end_tick: usize,

    current_tick: usize,
    last_trade_tick: usize,
    position: Position,
    total_reward: f64,
    total_profit: f64,
    steps: usize,
    done: bool,
    position_history: Vec<Position>,
}

impl TradingEnv {
    pub fn new(pair: FeaturePair, config: &EnvConfig) -> Result<Self, EnvError> {
        let len = pair.len();
        if pair.window_size == 0 || len < pair.window_size + 2 {
            return Err(EnvError::FrameTooShort {
                len,
                window_size: pair.window_size,
            });
        }
        let mut env = Self {
            prices: pair.prices,
            features: pair.features,
            columns: pair.columns,
            window_size: pair.window_size,
            fees: config.fees,
            max_episode_steps: config.max_episode_steps,
            end_tick: len - 1,
            current_tick: 0,
            last_trade_tick: 0,
            position: Position::Short,
            total_reward: 0.0,
            total_profit: 1.0,
            steps: 0,
            done: false,
            position_history: Vec::new(),
        };
        env.reset();
        Ok(env)
    }

    /// Adapt a table with the given feature strategy and build the environment.
    pub fn from_table(
        table: &PriceTable,
        config: &EnvConfig,
        selector: &dyn FeatureSelector,
    ) -> Result<Self, EnvError> {
        let frame = config.frame_for(table.len());
        let pair = adapt(table, config.window_size, frame, selector)?;
        Self::new(pair, config)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn prices(&self) -> &Array1<f64> {
        &self.prices
    }

    pub fn current_tick(&self) -> usize {
        self.current_tick
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn total_profit(&self) -> f64 {
        self.total_profit
    }

    pub fn total_reward(&self) -> f64 {
        self.total_reward
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of steps in a full episode.
    pub fn episode_len(&self) -> usize {
        let full = self.end_tick - self.window_size;
        self.max_episode_steps.map_or(full, |cap| cap.min(full))
    }

    /// Position held after each tick since the episode started.
    pub fn position_history(&self) -> &[Position] {
        &self.position_history
    }

    pub fn info(&self) -> StepInfo {
        StepInfo {
            total_reward: self.total_reward,
            total_profit: self.total_profit,
            position: self.position,
        }
    }

    /// Flattened `W × n_features` window ending at the current tick.
    pub fn observation(&self) -> Array1<f64> {
        let start = self.current_tick + 1 - self.window_size;
        self.features
            .slice(s![start..=self.current_tick, ..])
            .iter()
            .copied()
            .collect()
    }

    fn is_trade(&self, action: Action) -> bool {
        matches!(
            (action, self.position),
            (Action::Buy, Position::Short) | (Action::Sell, Position::Long)
        )
    }

    fn calculate_reward(&self, trade: bool) -> f64 {
        if trade && self.position == Position::Long {
            self.prices[self.current_tick] - self.prices[self.last_trade_tick]
        } else {
            0.0
        }
    }

    fn update_profit(&mut self, trade: bool, episode_end: bool) {
        if (trade || episode_end) && self.position == Position::Long {
            let current_price = self.prices[self.current_tick];
            let last_trade_price = self.prices[self.last_trade_tick];
            let shares = self.total_profit * (1.0 - self.fees.ask) / last_trade_price;
            self.total_profit = shares * (1.0 - self.fees.bid) * current_price;
        }
    }
}

impl Environment for TradingEnv {
    fn reset(&mut self) -> Array1<f64> {
        self.current_tick = self.window_size;
        self.last_trade_tick = self.window_size - 1;
        self.position = Position::Short;
        self.total_reward = 0.0;
        self.total_profit = 1.0;
        self.steps = 0;
        self.done = false;
        self.position_history.clear();
        self.observation()
    }

    fn step(&mut self, action: usize) -> Result<Transition, EnvError> {
        if self.done {
            return Err(EnvError::EpisodeFinished);
        }
        let action = Action::try_from(action)?;

        self.current_tick += 1;
        self.steps += 1;
        let terminated = self.current_tick == self.end_tick;
        let truncated = !terminated && self.max_episode_steps.is_some_and(|cap| self.steps >= cap);

        let trade = self.is_trade(action);
        let reward = self.calculate_reward(trade);
        self.total_reward += reward;
        self.update_profit(trade, terminated || truncated);

        if trade {
            self.position = self.position.opposite();
            self.last_trade_tick = self.current_tick;
        }
        self.position_history.push(self.position);
        self.done = terminated || truncated;

        trace!(
            tick = self.current_tick,
            ?action,
            reward,
            profit = self.total_profit,
            "env step"
        );

        Ok(Transition {
            observation: self.observation(),
            reward,
            terminated,
            truncated,
            info: self.info(),
        })
    }

    fn observation_len(&self) -> usize {
        self.window_size * self.features.ncols()
    }

    fn action_count(&self) -> usize {
        Action::COUNT
    }
}

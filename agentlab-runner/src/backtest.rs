//! Deterministic replay of a trained policy.
//!
//! The environment is rebuilt from the table and frame, reset, and stepped
//! with the policy's greedy action until the episode ends. Nothing random
//! happens, so the same policy on the same table always yields the same
//! profit.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;

use agentlab_core::domain::PriceTable;
use agentlab_core::env::{Action, EnvConfig, Environment, Position, TradingEnv};

use crate::pipeline::PipelineError;
use crate::policy::TrainedPolicy;
use crate::ppo::TrainingError;

/// One replayed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub timestamp: NaiveDateTime,
    pub close: f64,
    pub action: Action,
    /// Position held after the step.
    pub position: Position,
    pub reward: f64,
    pub total_profit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Terminal profit factor; 1.0 is breakeven.
    pub profit: f64,
    pub total_reward: f64,
    pub steps: usize,
    /// The episode ran to the end of the frame rather than a step cap.
    pub terminated: bool,
    pub actions: Vec<Action>,
    pub positions: Vec<Position>,
    pub trace: Vec<StepRecord>,
}

impl BacktestResult {
    /// Number of position changes.
    pub fn trade_count(&self) -> usize {
        let mut previous = Position::Short;
        let mut trades = 0;
        for &p in &self.positions {
            if p != previous {
                trades += 1;
                previous = p;
            }
        }
        trades
    }
}

/// Replay `policy` over `table` with the given environment shape.
///
/// Column or window mismatches with the policy are schema errors; any
/// failure while stepping is a training failure.
pub fn run_backtest(
    policy: &TrainedPolicy,
    table: &PriceTable,
    env_config: &EnvConfig,
) -> Result<BacktestResult, PipelineError> {
    let selector = policy.selector();
    let mut env = TradingEnv::from_table(table, env_config, selector.as_ref())?;
    policy.check_compatible(&env)?;

    let frame = env_config.frame_for(table.len());
    let row_offset = frame.start - env.window_size();
    let result = replay(policy, &mut env, table, row_offset)?;

    info!(
        symbol = table.symbol(),
        profit = result.profit,
        steps = result.steps,
        trades = result.trade_count(),
        "backtest finished"
    );
    Ok(result)
}

fn replay(
    policy: &TrainedPolicy,
    env: &mut TradingEnv,
    table: &PriceTable,
    row_offset: usize,
) -> Result<BacktestResult, TrainingError> {
    let mut obs = env.reset();
    let mut trace = Vec::with_capacity(env.episode_len());
    let mut terminated = false;

    while !env.is_done() {
        let action = policy.act(&obs)?;
        let transition = env.step(action.index())?;
        let row = row_offset + env.current_tick();
        let bar = &table.bars()[row];
        trace.push(StepRecord {
            step: trace.len(),
            timestamp: bar.timestamp,
            close: bar.close,
            action,
            position: transition.info.position,
            reward: transition.reward,
            total_profit: transition.info.total_profit,
        });
        terminated = transition.terminated;
        obs = transition.observation;
    }

    let info = env.info();
    Ok(BacktestResult {
        profit: info.total_profit,
        total_reward: info.total_reward,
        steps: trace.len(),
        terminated,
        actions: trace.iter().map(|r| r.action).collect(),
        positions: trace.iter().map(|r| r.position).collect(),
        trace,
    })
}

//! Step-based trading simulation over a feature pair.
//!
//! Two actions (sell, buy), two positions (short, long), proportional fees on
//! both legs, profit tracked as a multiplicative factor starting at 1.0.

pub mod trading;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::FeatureError;

pub use trading::{EnvConfig, FeeSchedule, TradingEnv};

#[derive(Debug, Error, PartialEq)]
pub enum EnvError {
    #[error("invalid action {0} (expected 0 = sell or 1 = buy)")]
    InvalidAction(usize),

    #[error("episode finished; call reset() before stepping again")]
    EpisodeFinished,

    #[error("{len} rows cannot hold a {window_size}-bar window plus one step")]
    FrameTooShort { len: usize, window_size: usize },

    #[error(transparent)]
    Feature(#[from] FeatureError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Sell = 0,
    Buy = 1,
}

impl Action {
    pub const COUNT: usize = 2;

    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<usize> for Action {
    type Error = EnvError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Action::Sell),
            1 => Ok(Action::Buy),
            other => Err(EnvError::InvalidAction(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    Short = 0,
    Long = 1,
}

impl Position {
    pub fn opposite(self) -> Self {
        match self {
            Position::Short => Position::Long,
            Position::Long => Position::Short,
        }
    }
}

/// Running totals reported after every step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub total_reward: f64,
    pub total_profit: f64,
    pub position: Position,
}

/// Result of one environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub observation: Array1<f64>,
    pub reward: f64,
    /// The frame ran out.
    pub terminated: bool,
    /// A step cap fired before the frame ran out.
    pub truncated: bool,
    pub info: StepInfo,
}

impl Transition {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// The seam between a learner and a simulation. Observations are flat.
pub trait Environment {
    fn reset(&mut self) -> Array1<f64>;

    fn step(&mut self, action: usize) -> Result<Transition, EnvError>;

    fn observation_len(&self) -> usize;

    fn action_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_map_to_indices() {
        assert_eq!(Action::try_from(0), Ok(Action::Sell));
        assert_eq!(Action::try_from(1), Ok(Action::Buy));
        assert_eq!(Action::try_from(2), Err(EnvError::InvalidAction(2)));
        assert_eq!(Action::Buy.index(), 1);
    }

    #[test]
    fn positions_flip() {
        assert_eq!(Position::Short.opposite(), Position::Long);
        assert_eq!(Position::Long.opposite().opposite(), Position::Long);
    }
}

//! Actor-critic policy over flattened observation windows.
//!
//! The actor and critic are separate MLPs with the same hidden layout.
//! A [`TrainedPolicy`] pins the feature columns and window it was trained
//! with; replaying it against anything else is refused.

pub mod adam;
pub mod network;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use thiserror::Error;

use agentlab_core::env::{Action, Environment, TradingEnv};
use agentlab_core::features::{ColumnSelection, FeatureSelector, PriceDiffSelection};

use crate::config::FeatureSet;
use crate::ppo::TrainingStats;

pub use adam::Adam;
pub use network::{clip_grad_norm, log_softmax, Activation, Dense, ForwardCache, LayerGrad, Mlp};

#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("policy trained on columns {trained:?}, environment exposes {actual:?}")]
    ColumnMismatch {
        trained: Vec<String>,
        actual: Vec<String>,
    },

    #[error("policy trained with window {trained}, environment uses {actual}")]
    WindowMismatch { trained: usize, actual: usize },

    #[error("observation has {actual} values, policy expects {expected}")]
    ObservationLength { expected: usize, actual: usize },
}

/// Separate policy and value networks.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorCritic {
    pub actor: Mlp,
    pub critic: Mlp,
}

impl ActorCritic {
    /// Policy head starts near-uniform (gain 0.01), value head at gain 1.
    pub fn new<R: Rng + ?Sized>(
        obs_len: usize,
        n_actions: usize,
        hidden: &[usize],
        rng: &mut R,
    ) -> Self {
        let sizes = |out: usize| {
            let mut s = Vec::with_capacity(hidden.len() + 2);
            s.push(obs_len);
            s.extend_from_slice(hidden);
            s.push(out);
            s
        };
        let actor = Mlp::new(&sizes(n_actions), 0.01, &mut *rng);
        let critic = Mlp::new(&sizes(1), 1.0, &mut *rng);
        Self { actor, critic }
    }

    pub fn obs_len(&self) -> usize {
        self.actor.input_len()
    }

    pub fn n_actions(&self) -> usize {
        self.actor.output_len()
    }

    pub fn log_probs(&self, obs: ArrayView2<f64>) -> Array2<f64> {
        log_softmax(&self.actor.forward(obs))
    }

    pub fn values(&self, obs: ArrayView2<f64>) -> Array1<f64> {
        self.critic.forward(obs).index_axis_move(Axis(1), 0)
    }

    /// Log-probabilities of every action for one observation.
    pub fn action_log_probs(&self, obs: &Array1<f64>) -> Array1<f64> {
        self.log_probs(obs.view().insert_axis(Axis(0)))
            .index_axis_move(Axis(0), 0)
    }

    pub fn value(&self, obs: &Array1<f64>) -> f64 {
        self.values(obs.view().insert_axis(Axis(0)))[0]
    }

    /// Highest-probability action; ties go to the lowest index.
    pub fn greedy_action(&self, obs: &Array1<f64>) -> usize {
        argmax(self.action_log_probs(obs).iter().copied())
    }

    /// Actor layers followed by critic layers. Optimiser state is keyed on
    /// this order.
    pub fn layers_mut(&mut self) -> impl Iterator<Item = &mut Dense> {
        self.actor
            .layers_mut()
            .iter_mut()
            .chain(self.critic.layers_mut().iter_mut())
    }

    pub fn is_finite(&self) -> bool {
        self.actor.is_finite() && self.critic.is_finite()
    }
}

fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best = (0, f64::NEG_INFINITY);
    for (i, v) in values.enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best.0
}

/// Sample an index from log-probabilities by inverse CDF.
pub fn sample_action<R: Rng + ?Sized>(log_probs: &Array1<f64>, rng: &mut R) -> usize {
    let u: f64 = rng.gen();
    let mut cumulative = 0.0;
    for (i, lp) in log_probs.iter().enumerate() {
        cumulative += lp.exp();
        if u < cumulative {
            return i;
        }
    }
    log_probs.len().saturating_sub(1)
}

/// Parameters produced by training, plus the observation contract they
/// were trained under.
#[derive(Debug, Clone)]
pub struct TrainedPolicy {
    model: ActorCritic,
    columns: Vec<String>,
    window_size: usize,
    feature_set: FeatureSet,
    stats: TrainingStats,
}

impl TrainedPolicy {
    pub fn new(
        model: ActorCritic,
        columns: Vec<String>,
        window_size: usize,
        feature_set: FeatureSet,
        stats: TrainingStats,
    ) -> Self {
        Self {
            model,
            columns,
            window_size,
            feature_set,
            stats,
        }
    }

    pub fn model(&self) -> &ActorCritic {
        &self.model
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn feature_set(&self) -> FeatureSet {
        self.feature_set
    }

    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    pub fn observation_len(&self) -> usize {
        self.window_size * self.columns.len()
    }

    /// Selector reproducing the trained column order exactly.
    pub fn selector(&self) -> Box<dyn FeatureSelector> {
        match self.feature_set {
            FeatureSet::Indicators => Box::new(ColumnSelection::new(self.columns.iter().cloned())),
            FeatureSet::PriceDiff => Box::new(PriceDiffSelection),
        }
    }

    pub fn check_compatible(&self, env: &TradingEnv) -> Result<(), PolicyError> {
        if env.columns() != self.columns.as_slice() {
            return Err(PolicyError::ColumnMismatch {
                trained: self.columns.clone(),
                actual: env.columns().to_vec(),
            });
        }
        if env.window_size() != self.window_size {
            return Err(PolicyError::WindowMismatch {
                trained: self.window_size,
                actual: env.window_size(),
            });
        }
        let actual = env.observation_len();
        if actual != self.model.obs_len() {
            return Err(PolicyError::ObservationLength {
                expected: self.model.obs_len(),
                actual,
            });
        }
        Ok(())
    }

    /// Deterministic action for an observation.
    pub fn act(&self, obs: &Array1<f64>) -> Result<Action, PolicyError> {
        if obs.len() != self.model.obs_len() {
            return Err(PolicyError::ObservationLength {
                expected: self.model.obs_len(),
                actual: obs.len(),
            });
        }
        let index = self.model.greedy_action(obs);
        Ok(if index == Action::Buy.index() {
            Action::Buy
        } else {
            Action::Sell
        })
    }
}

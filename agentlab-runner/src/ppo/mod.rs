//! Proximal policy optimisation with a clipped surrogate objective.
//!
//! Training alternates a fixed-length rollout with `n_epochs` passes of
//! shuffled minibatch updates. Episodes run across rollout boundaries; the
//! budget is checked only between rollouts, so the last rollout always
//! completes.

pub mod buffer;

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use agentlab_core::env::{EnvError, Environment};
use agentlab_core::rng::{RngHierarchy, RngStream};

use crate::config::TrainingConfig;
use crate::policy::{clip_grad_norm, log_softmax, sample_action, ActorCritic, Adam, PolicyError};

pub use buffer::{Minibatch, RolloutBuffer};

#[derive(Debug, Error, PartialEq)]
pub enum TrainingError {
    #[error("non-finite {what} at update {update}")]
    NonFinite { what: &'static str, update: usize },

    #[error("environment error: {0}")]
    Env(#[from] EnvError),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Loss terms averaged over the minibatches of one update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateStats {
    pub policy_loss: f64,
    pub value_loss: f64,
    pub entropy: f64,
    pub approx_kl: f64,
    pub clip_fraction: f64,
}

/// Summary of a finished training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    pub timesteps: usize,
    pub updates: usize,
    pub episodes: usize,
    /// Mean reward over completed episodes.
    pub mean_episode_reward: Option<f64>,
    pub last_episode_profit: Option<f64>,
    pub last_update: UpdateStats,
}

#[derive(Debug, Default)]
struct EpisodeTracker {
    reward: f64,
    completed: usize,
    reward_sum: f64,
    last_profit: Option<f64>,
}

impl EpisodeTracker {
    fn record(&mut self, reward: f64, done: bool, profit: f64) {
        self.reward += reward;
        if done {
            self.completed += 1;
            self.reward_sum += self.reward;
            self.last_profit = Some(profit);
            self.reward = 0.0;
        }
    }

    fn mean_reward(&self) -> Option<f64> {
        (self.completed > 0).then(|| self.reward_sum / self.completed as f64)
    }
}

pub struct Ppo {
    config: TrainingConfig,
    model: ActorCritic,
    optimizer: Adam,
    sampling_rng: StdRng,
    minibatch_rng: StdRng,
    num_timesteps: usize,
    updates: usize,
}

impl Ppo {
    /// Fresh model and optimiser. `stream_key` (usually the ticker) selects
    /// the RNG sub-streams, so runs on different tickers draw different
    /// numbers from the same master seed.
    pub fn new(
        obs_len: usize,
        n_actions: usize,
        config: &TrainingConfig,
        rng: &RngHierarchy,
        stream_key: &str,
    ) -> Self {
        let mut init_rng = rng.rng_for(stream_key, RngStream::PolicyInit);
        let model = ActorCritic::new(obs_len, n_actions, &config.hidden_sizes, &mut init_rng);
        Self {
            config: config.clone(),
            model,
            optimizer: Adam::new(config.learning_rate),
            sampling_rng: rng.rng_for(stream_key, RngStream::ActionSampling),
            minibatch_rng: rng.rng_for(stream_key, RngStream::Minibatch),
            num_timesteps: 0,
            updates: 0,
        }
    }

    pub fn model(&self) -> &ActorCritic {
        &self.model
    }

    pub fn into_model(self) -> ActorCritic {
        self.model
    }

    pub fn num_timesteps(&self) -> usize {
        self.num_timesteps
    }

    /// Run rollouts and updates until `total_timesteps` is reached.
    pub fn learn(&mut self, env: &mut dyn Environment) -> Result<TrainingStats, TrainingError> {
        if env.observation_len() != self.model.obs_len() {
            return Err(PolicyError::ObservationLength {
                expected: self.model.obs_len(),
                actual: env.observation_len(),
            }
            .into());
        }

        let mut buffer = RolloutBuffer::new(self.config.n_steps, self.model.obs_len());
        let mut episodes = EpisodeTracker::default();
        let mut obs = env.reset();
        let mut last_update = UpdateStats::default();

        while self.num_timesteps < self.config.total_timesteps {
            obs = self.collect_rollout(env, &mut buffer, obs, &mut episodes)?;
            last_update = self.update(&buffer)?;
        }

        info!(
            timesteps = self.num_timesteps,
            updates = self.updates,
            episodes = episodes.completed,
            "training finished"
        );
        Ok(TrainingStats {
            timesteps: self.num_timesteps,
            updates: self.updates,
            episodes: episodes.completed,
            mean_episode_reward: episodes.mean_reward(),
            last_episode_profit: episodes.last_profit,
            last_update,
        })
    }

    fn collect_rollout(
        &mut self,
        env: &mut dyn Environment,
        buffer: &mut RolloutBuffer,
        mut obs: Array1<f64>,
        episodes: &mut EpisodeTracker,
    ) -> Result<Array1<f64>, TrainingError> {
        buffer.clear();
        for _ in 0..self.config.n_steps {
            let log_probs = self.model.action_log_probs(&obs);
            let value = self.model.value(&obs);
            let action = sample_action(&log_probs, &mut self.sampling_rng);

            let transition = env.step(action)?;
            let mut reward = transition.reward;
            if transition.truncated {
                // Cut short by the step cap, not by the data: bootstrap.
                reward += self.config.gamma * self.model.value(&transition.observation);
            }
            let done = transition.done();
            episodes.record(transition.reward, done, transition.info.total_profit);

            buffer.push(obs, action, reward, done, value, log_probs[action]);
            self.num_timesteps += 1;
            obs = if done { env.reset() } else { transition.observation };
        }

        let last_value = self.model.value(&obs);
        buffer.compute_returns_and_advantages(last_value, self.config.gamma, self.config.gae_lambda);
        if buffer.returns().iter().any(|r| !r.is_finite()) {
            return Err(TrainingError::NonFinite {
                what: "return",
                update: self.updates,
            });
        }
        Ok(obs)
    }

    fn update(&mut self, buffer: &RolloutBuffer) -> Result<UpdateStats, TrainingError> {
        let mut indices: Vec<usize> = (0..buffer.len()).collect();
        let mut totals = UpdateStats::default();
        let mut batches = 0usize;

        for _ in 0..self.config.n_epochs {
            indices.shuffle(&mut self.minibatch_rng);
            for chunk in indices.chunks(self.config.batch_size) {
                let stats = self.train_minibatch(&buffer.minibatch(chunk))?;
                totals.policy_loss += stats.policy_loss;
                totals.value_loss += stats.value_loss;
                totals.entropy += stats.entropy;
                totals.approx_kl += stats.approx_kl;
                totals.clip_fraction += stats.clip_fraction;
                batches += 1;
            }
        }
        self.updates += 1;

        let n = batches.max(1) as f64;
        let stats = UpdateStats {
            policy_loss: totals.policy_loss / n,
            value_loss: totals.value_loss / n,
            entropy: totals.entropy / n,
            approx_kl: totals.approx_kl / n,
            clip_fraction: totals.clip_fraction / n,
        };
        debug!(
            update = self.updates,
            timesteps = self.num_timesteps,
            policy_loss = stats.policy_loss,
            value_loss = stats.value_loss,
            entropy = stats.entropy,
            approx_kl = stats.approx_kl,
            clip_fraction = stats.clip_fraction,
            "ppo update"
        );
        Ok(stats)
    }

    fn train_minibatch(&mut self, batch: &Minibatch) -> Result<UpdateStats, TrainingError> {
        let len = batch.len();
        let b = len as f64;
        let clip = self.config.clip_range;
        let ent_coef = self.config.ent_coef;
        let vf_coef = self.config.vf_coef;

        let advantages = if self.config.normalize_advantage && len > 1 {
            normalize(&batch.advantages)
        } else {
            batch.advantages.clone()
        };

        let (logits, actor_cache) = self.model.actor.forward_cached(batch.observations.view());
        let (values, critic_cache) = self.model.critic.forward_cached(batch.observations.view());
        let log_probs = log_softmax(&logits);

        // Policy and entropy terms, differentiated with respect to the logits.
        let mut grad_logits = Array2::zeros(logits.raw_dim());
        let (mut policy_loss, mut entropy_sum, mut approx_kl, mut clipped) = (0.0, 0.0, 0.0, 0usize);
        for i in 0..len {
            let action = batch.actions[i];
            let row = log_probs.row(i);
            let log_ratio = row[action] - batch.old_log_probs[i];
            let ratio = log_ratio.exp();
            let surrogate = ratio * advantages[i];
            let clipped_surrogate = ratio.clamp(1.0 - clip, 1.0 + clip) * advantages[i];
            policy_loss -= surrogate.min(clipped_surrogate);

            let grad_log_prob = if surrogate <= clipped_surrogate {
                -surrogate / b
            } else {
                0.0
            };
            if (ratio - 1.0).abs() > clip {
                clipped += 1;
            }
            approx_kl += (ratio - 1.0) - log_ratio;

            let entropy: f64 = -row.iter().map(|lp| lp.exp() * lp).sum::<f64>();
            entropy_sum += entropy;

            for (k, &lp) in row.iter().enumerate() {
                let p = lp.exp();
                let indicator = if k == action { 1.0 } else { 0.0 };
                grad_logits[[i, k]] =
                    grad_log_prob * (indicator - p) + ent_coef / b * p * (lp + entropy);
            }
        }
        policy_loss /= b;
        let entropy = entropy_sum / b;

        let mut grad_values = Array2::zeros(values.raw_dim());
        let mut value_loss = 0.0;
        for i in 0..len {
            let err = values[[i, 0]] - batch.returns[i];
            value_loss += err * err;
            grad_values[[i, 0]] = vf_coef * 2.0 * err / b;
        }
        value_loss /= b;

        let loss = policy_loss - ent_coef * entropy + vf_coef * value_loss;
        if !loss.is_finite() {
            return Err(TrainingError::NonFinite {
                what: "loss",
                update: self.updates,
            });
        }

        let mut grads = self.model.actor.backward(&actor_cache, grad_logits);
        grads.extend(self.model.critic.backward(&critic_cache, grad_values));
        clip_grad_norm(&mut grads, self.config.max_grad_norm);
        self.optimizer.step(self.model.layers_mut(), &grads);

        if !self.model.is_finite() {
            return Err(TrainingError::NonFinite {
                what: "parameter",
                update: self.updates,
            });
        }

        Ok(UpdateStats {
            policy_loss,
            value_loss,
            entropy,
            approx_kl: approx_kl / b,
            clip_fraction: clipped as f64 / b,
        })
    }
}

/// Zero mean, unit (sample) standard deviation.
fn normalize(values: &Array1<f64>) -> Array1<f64> {
    let n = values.len() as f64;
    let mean = values.sum() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    values.mapv(|v| (v - mean) / (var.sqrt() + 1e-8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlab_core::env::{Position, StepInfo, Transition};
    use ndarray::array;

    /// One-step bandit: action 1 pays 1, action 0 pays 0.
    struct Bandit {
        steps: usize,
    }

    impl Environment for Bandit {
        fn reset(&mut self) -> Array1<f64> {
            array![1.0, 0.0]
        }

        fn step(&mut self, action: usize) -> Result<Transition, EnvError> {
            if action > 1 {
                return Err(EnvError::InvalidAction(action));
            }
            self.steps += 1;
            let reward = action as f64;
            Ok(Transition {
                observation: array![1.0, 0.0],
                reward,
                terminated: true,
                truncated: false,
                info: StepInfo {
                    total_reward: reward,
                    total_profit: 1.0,
                    position: Position::Short,
                },
            })
        }

        fn observation_len(&self) -> usize {
            2
        }

        fn action_count(&self) -> usize {
            2
        }
    }

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            total_timesteps: 512,
            n_steps: 128,
            batch_size: 32,
            n_epochs: 4,
            learning_rate: 1e-2,
            hidden_sizes: vec![8],
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn learns_a_bandit() {
        let config = TrainingConfig {
            total_timesteps: 1024,
            ..small_config()
        };
        let mut ppo = Ppo::new(2, 2, &config, &RngHierarchy::new(1), "BANDIT");
        let mut env = Bandit { steps: 0 };
        let stats = ppo.learn(&mut env).unwrap();

        assert_eq!(stats.timesteps, 1024);
        assert_eq!(stats.updates, 8);
        assert_eq!(stats.episodes, 1024);
        assert_eq!(env.steps, 1024);

        let probs = ppo.model().action_log_probs(&array![1.0, 0.0]).mapv(f64::exp);
        assert!(probs[1] > 0.8, "p(buy) = {}", probs[1]);
    }

    #[test]
    fn last_rollout_overshoots_budget() {
        let config = TrainingConfig {
            total_timesteps: 130,
            ..small_config()
        };
        let mut ppo = Ppo::new(2, 2, &config, &RngHierarchy::new(1), "BANDIT");
        let stats = ppo.learn(&mut Bandit { steps: 0 }).unwrap();
        assert_eq!(stats.timesteps, 256);
        assert_eq!(stats.updates, 2);
    }

    #[test]
    fn same_seed_same_model() {
        let config = small_config();
        let run = |seed| {
            let mut ppo = Ppo::new(2, 2, &config, &RngHierarchy::new(seed), "BANDIT");
            ppo.learn(&mut Bandit { steps: 0 }).unwrap();
            ppo.into_model()
        };
        assert_eq!(run(7), run(7));
        assert_ne!(run(7), run(8));
    }

    #[test]
    fn observation_mismatch_is_rejected() {
        let mut ppo = Ppo::new(3, 2, &small_config(), &RngHierarchy::new(1), "X");
        let err = ppo.learn(&mut Bandit { steps: 0 }).unwrap_err();
        assert!(matches!(err, TrainingError::Policy(_)));
    }

    #[test]
    fn normalize_has_unit_sample_std() {
        let out = normalize(&array![1.0, 2.0, 3.0]);
        assert!((out.sum()).abs() < 1e-12);
        assert!((out[2] - 1.0).abs() < 1e-6);
    }
}

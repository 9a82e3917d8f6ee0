//! On-policy rollout storage with generalized advantage estimation.

use ndarray::{Array1, Array2};

/// One minibatch gathered from the rollout, rows in the order requested.
#[derive(Debug, Clone)]
pub struct Minibatch {
    pub observations: Array2<f64>,
    pub actions: Vec<usize>,
    pub old_log_probs: Array1<f64>,
    pub advantages: Array1<f64>,
    pub returns: Array1<f64>,
}

impl Minibatch {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RolloutBuffer {
    obs_len: usize,
    observations: Vec<Array1<f64>>,
    actions: Vec<usize>,
    rewards: Vec<f64>,
    /// The transition stored at this index ended its episode.
    dones: Vec<bool>,
    values: Vec<f64>,
    log_probs: Vec<f64>,
    advantages: Vec<f64>,
    returns: Vec<f64>,
}

impl RolloutBuffer {
    pub fn new(capacity: usize, obs_len: usize) -> Self {
        Self {
            obs_len,
            observations: Vec::with_capacity(capacity),
            actions: Vec::with_capacity(capacity),
            rewards: Vec::with_capacity(capacity),
            dones: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            log_probs: Vec::with_capacity(capacity),
            advantages: Vec::new(),
            returns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn clear(&mut self) {
        self.observations.clear();
        self.actions.clear();
        self.rewards.clear();
        self.dones.clear();
        self.values.clear();
        self.log_probs.clear();
        self.advantages.clear();
        self.returns.clear();
    }

    pub fn push(
        &mut self,
        observation: Array1<f64>,
        action: usize,
        reward: f64,
        done: bool,
        value: f64,
        log_prob: f64,
    ) {
        self.observations.push(observation);
        self.actions.push(action);
        self.rewards.push(reward);
        self.dones.push(done);
        self.values.push(value);
        self.log_probs.push(log_prob);
    }

    /// GAE(λ) advantages and λ-returns. `last_value` is the critic's
    /// estimate for the observation following the final stored step; it is
    /// ignored when that step ended an episode.
    pub fn compute_returns_and_advantages(&mut self, last_value: f64, gamma: f64, gae_lambda: f64) {
        let n = self.len();
        self.advantages = vec![0.0; n];
        let mut last_gae = 0.0;
        for step in (0..n).rev() {
            let next_non_terminal = if self.dones[step] { 0.0 } else { 1.0 };
            let next_value = if step + 1 == n {
                last_value
            } else {
                self.values[step + 1]
            };
            let delta =
                self.rewards[step] + gamma * next_value * next_non_terminal - self.values[step];
            last_gae = delta + gamma * gae_lambda * next_non_terminal * last_gae;
            self.advantages[step] = last_gae;
        }
        self.returns = self
            .advantages
            .iter()
            .zip(&self.values)
            .map(|(a, v)| a + v)
            .collect();
    }

    pub fn advantages(&self) -> &[f64] {
        &self.advantages
    }

    pub fn returns(&self) -> &[f64] {
        &self.returns
    }

    /// Gather rows by index. Call after
    /// [`compute_returns_and_advantages`](Self::compute_returns_and_advantages).
    pub fn minibatch(&self, indices: &[usize]) -> Minibatch {
        let observations = Array2::from_shape_fn((indices.len(), self.obs_len), |(i, j)| {
            self.observations[indices[i]][j]
        });
        let pick = |src: &[f64]| indices.iter().map(|&i| src[i]).collect::<Array1<f64>>();
        Minibatch {
            observations,
            actions: indices.iter().map(|&i| self.actions[i]).collect(),
            old_log_probs: pick(&self.log_probs),
            advantages: pick(&self.advantages),
            returns: pick(&self.returns),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn filled(rewards: &[f64], dones: &[bool], values: &[f64]) -> RolloutBuffer {
        let mut buf = RolloutBuffer::new(rewards.len(), 1);
        for i in 0..rewards.len() {
            buf.push(array![i as f64], i % 2, rewards[i], dones[i], values[i], -0.5);
        }
        buf
    }

    #[test]
    fn lambda_one_gives_discounted_returns() {
        let mut buf = filled(&[1.0, 1.0, 1.0], &[false, false, true], &[0.0, 0.0, 0.0]);
        buf.compute_returns_and_advantages(100.0, 0.5, 1.0);
        // Episode ends at step 2, so the bootstrap value is ignored.
        assert_eq!(buf.returns(), &[1.75, 1.5, 1.0]);
    }

    #[test]
    fn bootstraps_from_last_value_when_not_done() {
        let mut buf = filled(&[0.0], &[false], &[1.0]);
        buf.compute_returns_and_advantages(2.0, 0.9, 0.95);
        assert!((buf.advantages()[0] - (0.9 * 2.0 - 1.0)).abs() < 1e-12);
        assert!((buf.returns()[0] - 1.8).abs() < 1e-12);
    }

    #[test]
    fn episode_boundary_stops_propagation() {
        let mut buf = filled(&[0.0, 10.0], &[true, false], &[0.0, 0.0]);
        buf.compute_returns_and_advantages(0.0, 0.99, 0.95);
        assert_eq!(buf.advantages()[0], 0.0);
        assert_eq!(buf.advantages()[1], 10.0);
    }

    #[test]
    fn minibatch_gathers_rows() {
        let mut buf = filled(&[1.0, 2.0, 3.0], &[false, false, false], &[0.1, 0.2, 0.3]);
        buf.compute_returns_and_advantages(0.0, 0.99, 0.95);
        let batch = buf.minibatch(&[2, 0]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.observations, array![[2.0], [0.0]]);
        assert_eq!(batch.actions, vec![0, 0]);
        assert_eq!(batch.returns[0], buf.returns()[2]);
        assert_eq!(batch.old_log_probs, array![-0.5, -0.5]);

        buf.clear();
        assert!(buf.is_empty());
    }
}

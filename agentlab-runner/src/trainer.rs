//! Policy training entry point.

use tracing::info;

use agentlab_core::domain::PriceTable;
use agentlab_core::env::{Environment, TradingEnv};
use agentlab_core::rng::RngHierarchy;

use crate::config::PipelineConfig;
use crate::pipeline::PipelineError;
use crate::policy::TrainedPolicy;
use crate::ppo::Ppo;

/// Build the environment over `table` and train a fresh policy for the
/// configured step budget. Returns the policy and the environment as
/// training left it.
///
/// Frame and column problems are rejected before any training step.
pub fn train_rl_model(
    table: &PriceTable,
    config: &PipelineConfig,
) -> Result<(TrainedPolicy, TradingEnv), PipelineError> {
    config.validate()?;
    let env_config = config.environment.env_config(table.len());
    let selector = config.selector();
    let mut env = TradingEnv::from_table(table, &env_config, selector.as_ref())?;

    info!(
        symbol = table.symbol(),
        rows = table.len(),
        episode_len = env.episode_len(),
        observation_len = env.observation_len(),
        timesteps = config.training.total_timesteps,
        "training policy"
    );

    let rng = RngHierarchy::new(config.training.seed);
    let mut ppo = Ppo::new(
        env.observation_len(),
        env.action_count(),
        &config.training,
        &rng,
        table.symbol(),
    );
    let stats = ppo.learn(&mut env)?;

    let policy = TrainedPolicy::new(
        ppo.into_model(),
        env.columns().to_vec(),
        env.window_size(),
        config.environment.features,
        stats,
    );
    Ok((policy, env))
}

//! AgentLab Runner: configuration, PPO training, backtest replay, artifacts.
//!
//! This crate builds on `agentlab-core` to provide:
//! - TOML pipeline configuration with validation
//! - Memoised table loading (fetch + indicators)
//! - An actor-critic policy trained with clipped PPO
//! - Deterministic greedy backtest replay
//! - Run reports exported as JSON and CSV

pub mod backtest;
pub mod config;
pub mod export;
pub mod pipeline;
pub mod policy;
pub mod ppo;
pub mod trainer;

pub use backtest::{run_backtest, BacktestResult, StepRecord};
pub use config::{ConfigError, FeatureSet, PipelineConfig, TrainingConfig};
pub use export::{
    export_actions_csv, export_json, export_table_csv, import_json, load_artifacts,
    save_artifacts,
};
pub use pipeline::{
    get_data, load_table, run_pipeline, train_and_backtest, PipelineError, RunReport,
    SCHEMA_VERSION,
};
pub use policy::{ActorCritic, PolicyError, TrainedPolicy};
pub use ppo::{Ppo, TrainingError, TrainingStats, UpdateStats};
pub use trainer::train_rl_model;

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn policy_is_send_sync() {
        assert_send::<TrainedPolicy>();
        assert_sync::<TrainedPolicy>();
    }

    #[test]
    fn report_types_are_send_sync() {
        assert_send::<RunReport>();
        assert_sync::<RunReport>();
        assert_send::<BacktestResult>();
        assert_sync::<BacktestResult>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<PipelineConfig>();
        assert_sync::<PipelineConfig>();
    }

    #[test]
    fn error_types_are_send_sync() {
        assert_send::<PipelineError>();
        assert_sync::<PipelineError>();
    }
}

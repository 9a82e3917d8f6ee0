//! End-to-end runs on synthetic bars: train, replay, persist.

use agentlab_core::data::{MarketDataFetcher, ParquetStore, SyntheticProvider, TableCache};
use agentlab_core::domain::PriceTable;
use agentlab_runner::{
    load_artifacts, load_table, run_backtest, run_pipeline, save_artifacts, train_and_backtest,
    train_rl_model, PipelineConfig, PipelineError,
};
use chrono::NaiveDate;
use proptest::prelude::*;

fn fetcher() -> MarketDataFetcher {
    let end = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
    MarketDataFetcher::new(Box::new(SyntheticProvider::new(end)))
}

fn quick_config(ticker: &str, seed: u64) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.data.ticker = ticker.to_string();
    config.training.seed = seed;
    config.training.total_timesteps = 128;
    config.training.n_steps = 128;
    config.training.batch_size = 64;
    config.training.n_epochs = 2;
    config.training.hidden_sizes = vec![16, 16];
    config
}

fn synthetic_table(ticker: &str) -> PriceTable {
    let config = quick_config(ticker, 0);
    load_table(
        &fetcher(),
        &mut TableCache::new(),
        &config.data.request(),
        &config.indicators,
    )
    .unwrap()
}

#[test]
fn replaying_one_policy_twice_gives_identical_profit() {
    let table = synthetic_table("SPY");
    let config = quick_config("SPY", 7);
    let (policy, _env) = train_rl_model(&table, &config).unwrap();
    let env_config = config.environment.env_config(table.len());

    let a = run_backtest(&policy, &table, &env_config).unwrap();
    let b = run_backtest(&policy, &table, &env_config).unwrap();
    assert_eq!(a.profit, b.profit);
    assert_eq!(a.actions, b.actions);
    assert!(a.profit > 0.0);
    assert_eq!(a.steps, table.len() - 1 - config.environment.window_size);
}

#[test]
fn same_seed_same_report() {
    let table = synthetic_table("QQQ");
    let config = quick_config("QQQ", 11);
    let a = train_and_backtest(&table, &config).unwrap();
    let b = train_and_backtest(&table, &config).unwrap();
    assert_eq!(a.backtest, b.backtest);
    assert_eq!(a.training, b.training);
    assert_eq!(a.fingerprint.run_id, b.fingerprint.run_id);
}

#[test]
fn run_pipeline_end_to_end_with_store_and_artifacts() {
    let store_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher().with_store(ParquetStore::new(store_dir.path()));
    let mut cache = TableCache::new();
    let config = quick_config("IWM", 3);

    let (table, report) = run_pipeline(&fetcher, &mut cache, &config).unwrap();
    assert_eq!(report.rows, table.len());
    assert_eq!(report.first, table.first_timestamp());
    assert_eq!(report.training.timesteps, 128);
    assert_eq!(report.training.updates, 1);
    assert!(report.backtest.terminated);

    // Raw bars were written through to the store.
    assert!(ParquetStore::new(store_dir.path())
        .path_for(&config.data.request())
        .exists());

    let run_dir = save_artifacts(&report, out_dir.path()).unwrap();
    assert_eq!(load_artifacts(&run_dir).unwrap(), report);
}

#[test]
fn frame_inside_lookback_fails_before_training() {
    let mut config = quick_config("SPY", 1);
    config.environment.frame_start = Some(10);
    let err = run_pipeline(&fetcher(), &mut TableCache::new(), &config).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InsufficientHistory {
            start: 10,
            window_size: 20
        }
    ));
}

#[test]
fn frame_past_the_table_is_invalid() {
    let table = synthetic_table("SPY");
    let mut config = quick_config("SPY", 1);
    config.environment.frame_end = Some(table.len() + 5);
    let err = train_rl_model(&table, &config).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidFrame(_)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(4))]

    #[test]
    fn profit_is_reproducible_for_any_seed(seed in any::<u64>()) {
        let table = synthetic_table("DIA");
        let mut config = quick_config("DIA", seed);
        config.training.total_timesteps = 64;
        config.training.n_steps = 64;
        config.training.batch_size = 32;
        config.training.n_epochs = 1;

        let a = train_and_backtest(&table, &config).unwrap();
        let b = train_and_backtest(&table, &config).unwrap();
        prop_assert_eq!(a.backtest.profit, b.backtest.profit);
        prop_assert!(a.backtest.profit > 0.0);
    }
}

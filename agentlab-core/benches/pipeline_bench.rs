//! Criterion benchmarks for AgentLab hot paths.
//!
//! Benchmarks:
//! 1. Indicator engine (all columns + warm-up drop) over growing tables
//! 2. Feature adaptation of a full frame
//! 3. Environment episode (step loop with observation slicing)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use agentlab_core::domain::{PriceBar, PriceTable};
use agentlab_core::env::{EnvConfig, Environment, TradingEnv};
use agentlab_core::features::{ColumnSelection, FeatureAdapter, FrameBound};
use agentlab_core::indicators::IndicatorEngine;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_table(n: usize) -> PriceTable {
    let base = chrono::NaiveDate::from_ymd_opt(2020, 1, 2)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    let bars = (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            PriceBar {
                timestamp: base + chrono::Duration::days(i as i64),
                open: close - 0.3,
                high: close + 1.5,
                low: close - 1.5,
                close,
                volume: 1_000_000 + (i as u64 % 500_000),
            }
        })
        .collect();
    PriceTable::new("BENCH", bars)
}

// ── 1. Indicators ────────────────────────────────────────────────────

fn bench_indicators(c: &mut Criterion) {
    let mut group = c.benchmark_group("indicator_engine");
    let engine = IndicatorEngine::default();

    for &n in &[252usize, 1260, 5040] {
        let table = make_table(n);
        group.bench_with_input(BenchmarkId::new("apply", n), &table, |b, table| {
            b.iter(|| {
                let mut t = table.clone();
                engine.apply(&mut t).ok();
                black_box(t.len())
            })
        });
    }
    group.finish();
}

// ── 2. Feature adaptation ────────────────────────────────────────────

fn bench_adapter(c: &mut Criterion) {
    let mut group = c.benchmark_group("feature_adapter");
    let table = IndicatorEngine::default()
        .compute(make_table(1260))
        .unwrap_or_else(|_| make_table(1));
    let adapter = FeatureAdapter::default();
    let frame = FrameBound::full(adapter.window_size(), table.len());

    group.bench_function("adapt_full_frame", |b| {
        b.iter(|| black_box(adapter.adapt(&table, frame).map(|p| p.len())))
    });
    group.finish();
}

// ── 3. Environment ───────────────────────────────────────────────────

fn bench_env(c: &mut Criterion) {
    let mut group = c.benchmark_group("trading_env");
    let table = IndicatorEngine::default()
        .compute(make_table(1260))
        .unwrap_or_else(|_| make_table(1));

    if let Ok(env) = TradingEnv::from_table(&table, &EnvConfig::default(), &ColumnSelection::default()) {
        group.bench_function("episode_alternating", |b| {
            b.iter(|| {
                let mut env = env.clone();
                env.reset();
                let mut action = 0;
                while !env.is_done() {
                    if env.step(action).is_err() {
                        break;
                    }
                    action = 1 - action;
                }
                black_box(env.total_profit())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_indicators, bench_adapter, bench_env);
criterion_main!(benches);

//! AgentLab Core: market data, indicators, feature adaptation, trading environment.
//!
//! This crate contains everything between a ticker symbol and a steppable
//! simulation:
//! - Domain types (bars, indicator-augmented price tables)
//! - Data acquisition (Yahoo, CSV, synthetic), Parquet store, in-memory table memo
//! - Indicator engine (SMA, RSI, MACD) with warm-up row dropping
//! - Feature adapter with pluggable feature-selection strategies
//! - Stock trading environment with fee-aware profit accounting

pub mod data;
pub mod domain;
pub mod env;
pub mod features;
pub mod fingerprint;
pub mod indicators;
pub mod rng;
pub mod schema;

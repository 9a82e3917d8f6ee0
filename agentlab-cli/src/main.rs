//! AgentLab CLI: fetch, train, and cache commands.
//!
//! Commands:
//! - `fetch`: load bars, compute indicators, print the latest rows
//! - `train`: fetch → indicators → PPO training → greedy backtest
//! - `cache status`: list stored bar sets

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use agentlab_core::data::{
    CsvProvider, DataProvider, FetchRequest, Interval, MarketDataFetcher, ParquetStore, Period,
    SyntheticProvider, TableCache, YahooProvider,
};
use agentlab_core::domain::PriceTable;
use agentlab_core::indicators::IndicatorConfig;
use agentlab_core::schema;
use agentlab_runner::{
    export_table_csv, load_table, run_pipeline, save_artifacts, PipelineConfig, RunReport,
};

#[derive(Parser)]
#[command(
    name = "agentlab",
    about = "AgentLab CLI: indicator-driven PPO trading agent"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Source {
    Yahoo,
    Csv,
    Synthetic,
}

#[derive(Subcommand)]
enum Commands {
    /// Load bars with indicators and print the latest rows.
    Fetch {
        /// Ticker symbol (e.g., AAPL).
        ticker: String,

        /// History length: 1y, 2y, or 5y.
        #[arg(long, default_value = "2y")]
        period: Period,

        /// Bar interval: 1h, 1d, 5d, 1wk, or 1mo.
        #[arg(long, default_value = "1d")]
        interval: Interval,

        /// Where bars come from.
        #[arg(long, value_enum, default_value_t = Source::Yahoo)]
        source: Source,

        /// Directory holding `<TICKER>.csv` files (with --source csv).
        #[arg(long, default_value = "csv")]
        csv_dir: PathBuf,

        /// Bar store directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,

        /// Refetch even if the store holds the request.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Write the full indicator table to this CSV file.
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Train a policy on a ticker and backtest it.
    Train {
        /// Ticker symbol (overrides the config file).
        ticker: String,

        /// Path to a TOML pipeline config.
        #[arg(long)]
        config: Option<PathBuf>,

        /// History length (overrides the config file).
        #[arg(long)]
        period: Option<Period>,

        /// Where bars come from.
        #[arg(long, value_enum, default_value_t = Source::Yahoo)]
        source: Source,

        /// Directory holding `<TICKER>.csv` files (with --source csv).
        #[arg(long, default_value = "csv")]
        csv_dir: PathBuf,

        /// Bar store directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,

        /// Training step budget (overrides the config file).
        #[arg(long)]
        timesteps: Option<usize>,

        /// Master seed (overrides the config file).
        #[arg(long)]
        seed: Option<u64>,

        /// Output directory for run artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Bar store commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List stored bar sets with their date ranges.
    Status {
        /// Bar store directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            ticker,
            period,
            interval,
            source,
            csv_dir,
            cache_dir,
            force,
            export,
        } => {
            let request = FetchRequest::new(ticker, period).with_interval(interval);
            let fetcher = build_fetcher(source, &csv_dir, &cache_dir, force)?;
            run_fetch(&fetcher, &request, export.as_deref())
        }
        Commands::Train {
            ticker,
            config,
            period,
            source,
            csv_dir,
            cache_dir,
            timesteps,
            seed,
            output_dir,
        } => {
            let mut config = match config {
                Some(path) => PipelineConfig::from_file(&path)?,
                None => PipelineConfig::default(),
            };
            config.data.ticker = ticker;
            if let Some(period) = period {
                config.data.period = period;
            }
            if let Some(timesteps) = timesteps {
                config.training.total_timesteps = timesteps;
            }
            if let Some(seed) = seed {
                config.training.seed = seed;
            }
            let fetcher = build_fetcher(source, &csv_dir, &cache_dir, false)?;
            run_train(&fetcher, &config, &output_dir)
        }
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
        },
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("agentlab=info,agentlab_core=info,agentlab_runner=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn build_fetcher(
    source: Source,
    csv_dir: &Path,
    cache_dir: &Path,
    force: bool,
) -> Result<MarketDataFetcher> {
    let provider: Box<dyn DataProvider> = match source {
        Source::Yahoo => Box::new(YahooProvider::new()?),
        Source::Csv => Box::new(CsvProvider::new(csv_dir)),
        Source::Synthetic => Box::new(SyntheticProvider::new(
            chrono::Local::now().date_naive(),
        )),
    };
    Ok(MarketDataFetcher::new(provider)
        .with_store(ParquetStore::new(cache_dir))
        .force_refresh(force))
}

fn run_fetch(
    fetcher: &MarketDataFetcher,
    request: &FetchRequest,
    export: Option<&Path>,
) -> Result<()> {
    let indicators = IndicatorConfig::default();
    let table = load_table(fetcher, &mut TableCache::new(), request, &indicators)
        .with_context(|| format!("no result for {}", request.ticker))?;

    print_latest_rows(&table, &indicators.sma_column(), 10);

    if let Some(path) = export {
        std::fs::write(path, export_table_csv(&table)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Indicator table written to: {}", path.display());
    }
    Ok(())
}

fn run_train(fetcher: &MarketDataFetcher, config: &PipelineConfig, output_dir: &Path) -> Result<()> {
    let (_table, report) = run_pipeline(fetcher, &mut TableCache::new(), config)
        .with_context(|| format!("no result for {}", config.data.ticker))?;

    print_summary(&report);

    let run_dir = save_artifacts(&report, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    let entries = ParquetStore::new(cache_dir).status()?;
    if entries.is_empty() {
        println!("Store is empty: {}", cache_dir.display());
        return Ok(());
    }

    println!("Store: {}", cache_dir.display());
    println!("Entries: {}", entries.len());
    println!();
    println!(
        "{:<8} {:<6} {:<6} {:<25} {:>8} {:<14}",
        "Symbol", "Period", "Int.", "Range", "Bars", "Source"
    );
    println!("{}", "-".repeat(72));
    for entry in &entries {
        let meta = &entry.meta;
        println!(
            "{:<8} {:<6} {:<6} {:<25} {:>8} {:<14}",
            meta.symbol,
            meta.period,
            meta.interval,
            format!("{} to {}", meta.first.date(), meta.last.date()),
            meta.bar_count,
            meta.source.to_string()
        );
    }
    Ok(())
}

fn print_latest_rows(table: &PriceTable, sma_column: &str, count: usize) {
    println!();
    println!("=== {} ({} rows) ===", table.symbol(), table.len());
    println!(
        "{:<20} {:>12} {:>10} {:>12}",
        schema::DATE,
        schema::CLOSE,
        schema::RSI,
        sma_column
    );
    let start = table.len().saturating_sub(count);
    for (row, bar) in table.bars().iter().enumerate().skip(start) {
        println!(
            "{:<20} {:>12.4} {:>10.2} {:>12.4}",
            bar.timestamp.to_string(),
            bar.close,
            table.value(schema::RSI, row).unwrap_or(f64::NAN),
            table.value(sma_column, row).unwrap_or(f64::NAN)
        );
    }
    println!();
    if let Some(close) = table.latest(schema::CLOSE) {
        println!("Latest close:   {close:.4}");
    }
    if let Some(rsi) = table.latest(schema::RSI) {
        println!("Latest RSI:     {rsi:.2}");
    }
    println!();
}

fn print_summary(report: &RunReport) {
    let backtest = &report.backtest;
    println!();
    println!("=== Training Result ===");
    println!("Symbol:         {}", report.fingerprint.symbol);
    println!("Run ID:         {}", report.fingerprint.run_id.short());
    if let (Some(first), Some(last)) = (report.first, report.last) {
        println!("Period:         {} to {}", first.date(), last.date());
    }
    println!("Rows:           {}", report.rows);
    println!(
        "Timesteps:      {} ({} updates, {} episodes)",
        report.training.timesteps, report.training.updates, report.training.episodes
    );
    println!();
    println!("--- Backtest ---");
    println!("Steps:          {}", backtest.steps);
    println!("Trades:         {}", backtest.trade_count());
    println!("Total Reward:   {:.4}", backtest.total_reward);
    println!("Profit:         {:.4}", backtest.profit);
    println!("Return:         {:.2}%", report.return_pct());
    if !backtest.terminated {
        println!();
        println!("NOTE: replay stopped at the step cap before the end of the frame");
    }
    println!();
}

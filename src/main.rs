use anyhow::{Context, Result};
use backtester::{BacktestResults, Backtester, CsvDataProvider, HistoricalFeed};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, Table};
use configuration::{AllocationMethod, Config, SlippageMode};
use core_types::StrategyId;
use executor::{FeeSchedule, Portfolio, SimulatedExecutor};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use strategies::create_strategy;

/// The main entry point for the backtesting application.
#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Execute the appropriate command
    match cli.command {
        Commands::Backtest(args) => handle_backtest(args).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Replays historical bars through trading strategies and reports the results.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backtest per requested strategy over the same data.
    Backtest(BacktestArgs),
}

#[derive(Parser)]
struct BacktestArgs {
    /// Path to the TOML configuration file. Defaults apply when it is missing.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Strategy to run (e.g., "ma_crossover"). Repeat to compare several.
    #[arg(long = "strategy", default_value = "ma_crossover")]
    strategies: Vec<StrategyId>,

    /// Comma-separated symbols, overriding `backtest.symbols`.
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,

    /// Initial capital, overriding `backtest.initial_capital`.
    #[arg(long)]
    capital: Option<Decimal>,

    /// Directory of `<SYMBOL>.csv` files, overriding `backtest.data_dir`.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// The first day to replay (format: YYYY-MM-DD).
    #[arg(long)]
    from: Option<NaiveDate>,

    /// The last day to replay (format: YYYY-MM-DD).
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Seed for noisy slippage; implies `--slippage-mode noisy`.
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, value_enum)]
    slippage_mode: Option<SlippageMode>,

    /// Capital allocation policy for signal-driven strategies.
    #[arg(long, value_enum)]
    allocation: Option<AllocationMethod>,

    /// Write every run's results as a JSON array to this file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Record engine events and write them as JSON lines to this file.
    #[arg(long)]
    journal: Option<PathBuf>,

    /// Show a progress bar per run.
    #[arg(long)]
    progress: bool,
}

// ==============================================================================
// Backtest Command Logic
// ==============================================================================

fn load(args: &BacktestArgs) -> Result<Config> {
    let mut config = if args.config.exists() {
        configuration::load_config(&args.config)
            .with_context(|| format!("failed to load {}", args.config.display()))?
    } else {
        Config::default()
    };

    let bt = &mut config.backtest;
    if !args.symbols.is_empty() {
        bt.symbols = args.symbols.clone();
    }
    if let Some(capital) = args.capital {
        bt.initial_capital = capital;
    }
    if let Some(dir) = &args.data_dir {
        bt.data_dir = dir.clone();
    }
    if args.from.is_some() {
        bt.start_date = args.from;
    }
    if args.to.is_some() {
        bt.end_date = args.to;
    }
    bt.show_progress |= args.progress;
    bt.record_events |= args.journal.is_some();

    if let Some(mode) = args.slippage_mode {
        config.simulation.slippage_mode = mode;
    }
    if let Some(seed) = args.seed {
        config.simulation.seed = Some(seed);
        config.simulation.slippage_mode = SlippageMode::Noisy;
    }
    if let Some(method) = args.allocation {
        config.allocation.method = method;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Handles the orchestration of one or more independent backtests.
async fn handle_backtest(args: BacktestArgs) -> Result<()> {
    let config = load(&args)?;
    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = configuration::init_logging(&config.logging)?;

    if !args.config.exists() {
        tracing::info!(path = %args.config.display(), "Config file not found, using defaults");
    }
    tracing::info!(
        strategies = ?args.strategies,
        symbols = ?config.backtest.symbols,
        capital = %config.backtest.initial_capital,
        "Starting backtests"
    );

    // Each run owns its feed, broker, ledger and engine.
    let tasks: Vec<_> = args
        .strategies
        .iter()
        .map(|&id| {
            let config = config.clone();
            tokio::task::spawn_blocking(move || run_one(id, &config))
        })
        .collect();

    let mut completed = Vec::new();
    for (id, joined) in args.strategies.iter().zip(join_all(tasks).await) {
        match joined.context("backtest task panicked")? {
            Ok(results) => completed.push(results),
            Err(e) => {
                tracing::error!(strategy = %id, error = ?e, "Backtest failed");
                eprintln!("Backtest for {id} failed: {e:#}");
            }
        }
    }

    for results in &completed {
        println!("{}", results.summary());
    }
    if completed.len() > 1 {
        println!("{}", comparison_table(&completed));
    }

    if let Some(path) = &args.output {
        write_output(path, &completed)?;
    }
    if let Some(path) = &args.journal {
        let mut lines = String::new();
        for results in &completed {
            lines.push_str(&results.journal()?);
        }
        std::fs::write(path, lines).with_context(|| format!("failed to write {}", path.display()))?;
    }

    if completed.is_empty() {
        anyhow::bail!("no backtest completed");
    }
    Ok(())
}

fn run_one(id: StrategyId, config: &Config) -> Result<BacktestResults> {
    let params = &config.backtest;
    let provider = CsvDataProvider::new(&params.data_dir);
    let feed = HistoricalFeed::from_config(Box::new(provider), params);
    let strategy = create_strategy(id, config, &params.symbols)?;
    let executor = SimulatedExecutor::new(&config.simulation);
    let portfolio = Portfolio::new(params.initial_capital, FeeSchedule::new(&config.simulation));

    let mut engine = Backtester::new(params.clone(), strategy, Box::new(feed), Box::new(executor), portfolio);
    let results = engine
        .run()
        .with_context(|| format!("backtest for {id} failed"))?;
    Ok(results.clone())
}

fn comparison_table(runs: &[BacktestResults]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Strategy", "Final Capital", "Return %", "Max DD %", "Trades", "Win Rate %", "Sharpe",
    ]);
    for r in runs {
        table.add_row(vec![
            Cell::new(&r.strategy),
            Cell::new(format!("{:.2}", r.final_capital)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", r.total_return_pct)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", r.max_drawdown * Decimal::ONE_HUNDRED)).set_alignment(CellAlignment::Right),
            Cell::new(r.trades.len()).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", r.metrics.win_rate_pct)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.4}", r.metrics.sharpe_ratio)).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

fn write_output(path: &Path, runs: &[BacktestResults]) -> Result<()> {
    let json = serde_json::to_string_pretty(runs)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), runs = runs.len(), "Results written");
    Ok(())
}

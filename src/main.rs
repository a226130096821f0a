use anyhow::{bail, Context, Result};
use backtester::{BacktestDriver, BacktestResult};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use configuration::{load_config, validate_config, Config};
use core_types::Bar;
use engine::{Engine, FuturesCalendar};
use execution::synthetic::{generate_bars, SyntheticConfig};
use execution::{Broker, SimBroker};
use std::path::Path;
use std::sync::Arc;
use store::{connect, Store, WalkForwardFoldRow};
use tokio::sync::{broadcast, mpsc};
use wfo::WalkForwardEvaluator;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = if Path::new(&cli.config).exists() {
        load_config(Some(&cli.config))?
    } else {
        // The defaults describe the reference MES setup; a missing file is
        // fine for local experiments.
        let config = Config::default();
        validate_config(&config)?;
        config
    };

    let _guard = configuration::init_tracing(&config.logging)?;
    tracing::info!(config_file = %cli.config, "meridian starting");

    match cli.command {
        Commands::SeedData(args) => handle_seed_data(config, args).await?,
        Commands::Backtest(args) => handle_backtest(config, args).await?,
        Commands::Walkforward(args) => handle_walkforward(config, args).await?,
        Commands::Run(args) => handle_run(config, args).await?,
        Commands::Report(args) => handle_report(config, args).await?,
    }

    Ok(())
}

// ==============================================================================
// CLI Structure
// ==============================================================================

#[derive(Parser)]
#[command(author, version, about = "Mean-reversion futures trading bot", long_about = None)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, short, global = true, default_value = "meridian.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate synthetic bars into the store for backtesting.
    SeedData(SeedDataArgs),
    /// Replay stored bars through the engine and report metrics.
    Backtest(BacktestArgs),
    /// Ordered train/test folds over stored bars.
    Walkforward(WalkforwardArgs),
    /// Run the live engine loop.
    Run(RunArgs),
    /// Show recent trades and daily summaries from the store.
    Report(ReportArgs),
}

#[derive(Parser)]
struct SeedDataArgs {
    /// Trading days of data to generate (78 five-minute bars each).
    #[arg(long, default_value_t = 30)]
    days: u32,
    /// Seed for the generator; same seed, same bars.
    #[arg(long, default_value_t = 20240305)]
    seed: u64,
}

#[derive(Parser)]
struct BacktestArgs {
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
}

#[derive(Parser)]
struct WalkforwardArgs {
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long, default_value_t = 5)]
    folds: usize,
    #[arg(long, default_value_t = 0.7)]
    train_ratio: f64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExecutionMode {
    /// Synthetic data, simulated fills. No external connections.
    Paper,
    /// Real brokerage adapter (not bundled).
    Live,
}

#[derive(Parser)]
struct RunArgs {
    #[arg(long, value_enum, default_value_t = ExecutionMode::Paper)]
    mode: ExecutionMode,
    /// Bars to stream before stopping in paper mode.
    #[arg(long, default_value_t = 1000)]
    bars: usize,
}

#[derive(Parser)]
struct ReportArgs {
    #[arg(long, default_value_t = 20)]
    limit: u32,
}

// ==============================================================================
// Command handlers
// ==============================================================================

async fn open_store(config: &Config) -> Result<Store> {
    let pool = connect(&config.database.path)
        .await
        .with_context(|| format!("opening store at {}", config.database.path))?;
    let store = Store::new(pool);
    store.init().await?;
    Ok(store)
}

async fn load_bars(
    store: &Store,
    config: &Config,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<Bar>> {
    let from = from
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
    let to = to
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|| Utc::now() + Duration::days(3650));

    let bars = store
        .bars_in_range(&config.instrument.symbol, from, to)
        .await?;
    if bars.is_empty() {
        bail!(
            "no bars for {} in the requested range; run `meridian seed-data` first",
            config.instrument.symbol
        );
    }
    Ok(bars)
}

async fn handle_seed_data(config: Config, args: SeedDataArgs) -> Result<()> {
    let store = open_store(&config).await?;

    let bars_total = args.days as usize * 78;
    let start = Utc::now() - Duration::days(args.days as i64);
    let mut synthetic = SyntheticConfig::new(start, bars_total, args.seed);
    synthetic.bar_minutes = config.backtest.bar_minutes;

    let bars = generate_bars(&synthetic);
    store
        .save_bars(&config.instrument.symbol, &bars)
        .await?;

    println!(
        "Seeded {} bars for {} (seed {}).",
        bars.len(),
        config.instrument.symbol,
        args.seed
    );
    Ok(())
}

async fn handle_backtest(config: Config, args: BacktestArgs) -> Result<()> {
    let store = open_store(&config).await?;
    let bars = load_bars(&store, &config, args.from, args.to).await?;

    let driver = BacktestDriver::new(config.clone());
    let result = driver.run(&bars).await?;
    let run_id = driver.persist(&store, &result, Utc::now()).await?;

    println!("Backtest over {} bars (run #{run_id}):", bars.len());
    print_report(&result);
    Ok(())
}

async fn handle_walkforward(config: Config, args: WalkforwardArgs) -> Result<()> {
    let store = open_store(&config).await?;
    let bars = load_bars(&store, &config, args.from, args.to).await?;

    let evaluator = WalkForwardEvaluator::new(config.clone());
    let walked = evaluator.run(&bars, args.folds, args.train_ratio).await?;

    let fold_rows: Vec<WalkForwardFoldRow> = walked
        .folds
        .iter()
        .map(|f| WalkForwardFoldRow {
            fold: f.fold,
            trades: f.result.report.total_trades,
            pnl: f.result.report.total_pnl,
            win_rate: f.result.report.win_rate,
            profit_factor: f.result.report.profit_factor,
            max_drawdown: f.result.report.max_drawdown,
        })
        .collect();
    let run_id = store
        .save_walkforward_run(
            Utc::now(),
            &fold_rows,
            walked.overall.total_trades,
            walked.overall.total_pnl,
            walked.overall.max_drawdown,
        )
        .await?;

    println!(
        "Walk-forward over {} bars, {} folds (run #{run_id}):",
        bars.len(),
        walked.folds.len()
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Fold", "Train", "Test", "Trades", "P&L", "Win %", "PF", "Max DD"]);
    for fold in &walked.folds {
        let report = &fold.result.report;
        table.add_row(vec![
            Cell::new(fold.fold),
            Cell::new(fold.train_bars),
            Cell::new(fold.test_bars),
            Cell::new(report.total_trades),
            Cell::new(format!("{:+.2}", report.total_pnl)),
            Cell::new(
                report
                    .win_rate
                    .map(|w| format!("{:.1}", w * 100.0))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(format!("{:.2}", report.profit_factor)),
            Cell::new(format!("{:.2}", report.max_drawdown)),
        ]);
    }
    println!("{table}");

    println!("Overall:");
    print_performance(&walked.overall);
    Ok(())
}

async fn handle_run(config: Config, args: RunArgs) -> Result<()> {
    match args.mode {
        ExecutionMode::Live => {
            bail!("no live brokerage adapter is bundled; wire one to the Broker trait and rebuild")
        }
        ExecutionMode::Paper => {}
    }

    let store = open_store(&config).await?;

    let slippage = config.execution.slippage_ticks * config.instrument.tick_size;
    let broker = SimBroker::new(&config.instrument.symbol, slippage);
    broker.connect().await?;

    let (event_tx, event_rx) = broadcast::channel(256);
    if let Some(alerter) = alerter::TelegramAlerter::new(&config.telegram) {
        tokio::spawn(alerter::run_alerter_service(alerter, event_rx));
    } else {
        drop(event_rx);
    }

    let calendar = FuturesCalendar::new(&config.calendar)?;
    let mut engine = Engine::new(
        config.clone(),
        Arc::new(broker.clone()),
        store.clone(),
        Box::new(calendar),
        event_tx,
    )?;
    engine.restore().await?;

    // Paper feed: a seeded synthetic stream, one bar per second, timestamps
    // spaced at the configured timeframe.
    let (bar_tx, bar_rx) = mpsc::channel::<Bar>(16);
    let feed_broker = broker.clone();
    let mut synthetic = SyntheticConfig::new(Utc::now(), args.bars, rand::random());
    synthetic.bar_minutes = config.backtest.bar_minutes;
    // Ctrl-c stops the feeder; the closed channel drains the engine into a
    // clean shutdown (flatten, final snapshot, stop event).
    let feeder = tokio::spawn(async move {
        let bars = generate_bars(&synthetic);
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
        for bar in bars {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupt received, stopping bar feed");
                    break;
                }
                _ = ticker.tick() => {
                    feed_broker.set_bar(bar).await;
                    if bar_tx.send(bar).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    engine.run(bar_rx, "paper").await?;
    let _ = feeder.await;

    Ok(())
}

async fn handle_report(config: Config, args: ReportArgs) -> Result<()> {
    let store = open_store(&config).await?;

    let trades = store.recent_trades(args.limit).await?;
    if trades.is_empty() {
        println!("No trades recorded yet.");
    } else {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                "Closed", "Side", "Size", "Entry", "Exit", "P&L", "Z in", "Z out", "Reason",
            ]);
        for trade in &trades {
            table.add_row(vec![
                Cell::new(trade.close_time.format("%Y-%m-%d %H:%M")),
                Cell::new(trade.side),
                Cell::new(trade.size),
                Cell::new(format!("{:.2}", trade.entry_price)),
                Cell::new(format!("{:.2}", trade.exit_price)),
                Cell::new(format!("{:+.2}", trade.realized_pnl)),
                Cell::new(format!("{:+.2}", trade.z_on_entry)),
                Cell::new(format!("{:+.2}", trade.z_on_exit)),
                Cell::new(trade.close_reason.as_str()),
            ]);
        }
        println!("Recent trades:");
        println!("{table}");
    }

    let summaries = store.recent_daily_summaries(args.limit).await?;
    if !summaries.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Date", "Trades", "Wins", "Losses", "P&L", "Max DD"]);
        for summary in &summaries {
            table.add_row(vec![
                Cell::new(summary.date),
                Cell::new(summary.trades),
                Cell::new(summary.wins),
                Cell::new(summary.losses),
                Cell::new(format!("{:+.2}", summary.pnl)),
                Cell::new(format!("{:.2}", summary.max_drawdown)),
            ]);
        }
        println!("Daily summaries:");
        println!("{table}");
    }

    Ok(())
}

// ==============================================================================
// Rendering
// ==============================================================================

fn print_report(result: &BacktestResult) {
    print_performance(&result.report);

    if !result.trades.is_empty() {
        let tail = result.trades.iter().rev().take(10).collect::<Vec<_>>();
        println!("Last {} trades:", tail.len());
        for trade in tail.into_iter().rev() {
            println!(
                "  {} | {:5} | {:+8.2} | z {:+5.2} -> {:+5.2} | {}",
                trade.close_time.format("%Y-%m-%d %H:%M"),
                trade.side.to_string(),
                trade.realized_pnl,
                trade.z_on_entry,
                trade.z_on_exit,
                trade.close_reason.as_str()
            );
        }
    }
}

fn print_performance(report: &analytics::PerformanceReport) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.add_row(vec![Cell::new("Total trades"), Cell::new(report.total_trades)]);
    table.add_row(vec![
        Cell::new("Winners / losers"),
        Cell::new(format!("{} / {}", report.winning_trades, report.losing_trades)),
    ]);
    table.add_row(vec![
        Cell::new("Win rate"),
        Cell::new(
            report
                .win_rate
                .map(|w| format!("{:.1}%", w * 100.0))
                .unwrap_or_else(|| "-".to_string()),
        ),
    ]);
    table.add_row(vec![
        Cell::new("Total P&L"),
        Cell::new(format!("{:+.2}", report.total_pnl)),
    ]);
    table.add_row(vec![
        Cell::new("Profit factor"),
        Cell::new(format!("{:.2}", report.profit_factor)),
    ]);
    table.add_row(vec![
        Cell::new("Max drawdown"),
        Cell::new(format!("{:.2}", report.max_drawdown)),
    ]);
    table.add_row(vec![
        Cell::new("Sharpe (per trade)"),
        Cell::new(
            report
                .sharpe_ratio
                .map(|s| format!("{s:.2}"))
                .unwrap_or_else(|| "-".to_string()),
        ),
    ]);
    table.add_row(vec![
        Cell::new("Avg win / avg loss"),
        Cell::new(format!("{:.2} / {:.2}", report.average_win, report.average_loss)),
    ]);
    println!("{table}");
}

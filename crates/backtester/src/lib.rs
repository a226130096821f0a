//! # Meridian Backtester Crate
//!
//! Deterministic historical replay. The driver assembles the *real* engine —
//! the same signal generator, risk gate, ledger, and state machine the live
//! path runs — over a simulated broker and an in-memory store, and feeds it
//! a recorded bar sequence. Same bars, same configuration: byte-identical
//! trades and metrics, every run.

pub mod error;

pub use error::BacktestError;

use std::sync::Arc;

use analytics::{AnalyticsEngine, PerformanceReport};
use chrono::{DateTime, Utc};
use configuration::{Config, SlippageMode};
use core_types::{Bar, Trade};
use engine::{AlwaysOpen, Engine};
use execution::SimBroker;
use execution::Broker as _;
use indicatif::{ProgressBar, ProgressStyle};
use store::{connect_in_memory, Store};
use tokio::sync::broadcast;

/// The output of one replay: the closed trades in order, the realized
/// equity curve sampled at each close, and the derived metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
    pub report: PerformanceReport,
}

/// Replays bar sequences through the live code paths.
pub struct BacktestDriver {
    config: Config,
}

impl BacktestDriver {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Replays `bars` cold: the window warms up over the first `lookback`
    /// bars of the slice itself.
    pub async fn run(&self, bars: &[Bar]) -> Result<BacktestResult, BacktestError> {
        self.run_seeded(&[], bars).await
    }

    /// Replays `bars` with the rolling window pre-seeded from `warmup`
    /// (reference history preceding the test slice; it is never traded).
    ///
    /// A position still open when the bars run out is discarded, not
    /// force-closed: only completed round trips are scored.
    pub async fn run_seeded(
        &self,
        warmup: &[Bar],
        bars: &[Bar],
    ) -> Result<BacktestResult, BacktestError> {
        if bars.is_empty() {
            return Err(BacktestError::NoData);
        }

        let slippage = match self.config.backtest.slippage_mode {
            SlippageMode::None => 0.0,
            SlippageMode::PerSide => {
                self.config.execution.slippage_ticks * self.config.instrument.tick_size
            }
        };

        let broker = SimBroker::new(&self.config.instrument.symbol, slippage);
        broker.connect().await?;

        let store = Store::new(connect_in_memory().await?);
        store.init().await?;

        // Replay has no event consumers; the engine fires into the void.
        let (event_tx, _event_rx) = broadcast::channel(256);
        let mut engine = Engine::new(
            self.config.clone(),
            Arc::new(broker.clone()),
            store.clone(),
            Box::new(AlwaysOpen),
            event_tx,
        )?;
        engine.warm(warmup)?;

        let progress = ProgressBar::new(bars.len() as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        for bar in bars {
            broker.set_bar(*bar).await;
            engine.on_bar(bar).await?;
            progress.inc(1);
        }
        progress.finish_and_clear();

        let trades = store.all_trades().await?;
        let equity_curve = equity_curve(&trades);
        let report = AnalyticsEngine::new().calculate(&trades, &equity_curve)?;

        tracing::info!(
            bars = bars.len(),
            trades = trades.len(),
            pnl = report.total_pnl,
            "replay complete"
        );

        Ok(BacktestResult {
            trades,
            equity_curve,
            report,
        })
    }

    /// Persists the run's headline numbers alongside the parameters that
    /// produced them.
    pub async fn persist(
        &self,
        store: &Store,
        result: &BacktestResult,
        as_of: DateTime<Utc>,
    ) -> Result<i64, BacktestError> {
        let parameters = serde_json::json!({
            "strategy": &self.config.strategy,
            "risk": &self.config.risk,
            "execution": &self.config.execution,
            "backtest": &self.config.backtest,
        });
        let id = store
            .save_backtest_run(
                as_of,
                result.report.total_trades,
                result.report.total_pnl,
                result.report.win_rate,
                result.report.max_drawdown,
                result.report.profit_factor,
                result.report.sharpe_ratio,
                &parameters,
            )
            .await?;
        Ok(id)
    }
}

/// Cumulative realized P&L sampled at each trade close.
pub fn equity_curve(trades: &[Trade]) -> Vec<(DateTime<Utc>, f64)> {
    let mut equity = 0.0;
    trades
        .iter()
        .map(|t| {
            equity += t.realized_pnl;
            (t.close_time, equity)
        })
        .collect()
}

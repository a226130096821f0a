use chrono::Duration;
use core_types::serde_duration;
use serde::{Deserialize, Serialize};

/// A standardized report of a strategy's performance over a trade list.
///
/// The data transfer object for results throughout the system: the
/// backtester returns it, the walk-forward evaluator aggregates it, the
/// store persists it, and the CLI renders it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    // I. Profitability
    pub total_pnl: f64,
    /// Sum of winning trades' P&L; non-negative.
    pub gross_profit: f64,
    /// Magnitude of losing trades' P&L; non-negative.
    pub gross_loss: f64,
    /// `gross_profit / gross_loss`. Infinity when there are wins but no
    /// losses, zero when there are no wins.
    pub profit_factor: f64,

    // II. Risk
    /// Largest peak-to-trough fall of the equity curve, in P&L units.
    pub max_drawdown: f64,
    /// Mean over standard deviation of per-trade P&L, unannualised.
    /// None with fewer than two trades or zero dispersion.
    pub sharpe_ratio: Option<f64>,

    // III. Trade statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// wins / total; None with no trades.
    pub win_rate: Option<f64>,
    pub average_win: f64,
    pub average_loss: f64,

    // IV. Time
    #[serde(with = "serde_duration")]
    pub average_holding_period: Duration,
}

impl PerformanceReport {
    /// A zeroed-out report, the result of a run with no trades.
    pub fn empty() -> Self {
        Self {
            total_pnl: 0.0,
            gross_profit: 0.0,
            gross_loss: 0.0,
            profit_factor: 0.0,
            max_drawdown: 0.0,
            sharpe_ratio: None,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: None,
            average_win: 0.0,
            average_loss: 0.0,
            average_holding_period: Duration::zero(),
        }
    }
}

impl Default for PerformanceReport {
    fn default() -> Self {
        Self::empty()
    }
}

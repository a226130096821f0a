use chrono::{DateTime, Duration, Utc};
use core_types::Trade;

use crate::error::AnalyticsError;
use crate::report::PerformanceReport;

/// A stateless calculator for deriving performance metrics from trading
/// activity.
#[derive(Debug, Default)]
pub struct AnalyticsEngine {}

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The main entry point for calculating performance metrics.
    ///
    /// The equity curve is cumulative realized P&L sampled at each trade
    /// close; drawdown is measured on it in P&L units.
    pub fn calculate(
        &self,
        trades: &[Trade],
        equity_curve: &[(DateTime<Utc>, f64)],
    ) -> Result<PerformanceReport, AnalyticsError> {
        if trades.is_empty() {
            return Ok(PerformanceReport::empty());
        }

        let mut report = PerformanceReport::empty();
        self.calculate_profitability(trades, &mut report);
        self.calculate_drawdown(equity_curve, &mut report);
        self.calculate_sharpe(trades, &mut report);
        self.calculate_time_metrics(trades, &mut report);
        Ok(report)
    }

    fn calculate_profitability(&self, trades: &[Trade], report: &mut PerformanceReport) {
        report.total_trades = trades.len();

        for trade in trades {
            report.total_pnl += trade.realized_pnl;
            if trade.is_win() {
                report.winning_trades += 1;
                report.gross_profit += trade.realized_pnl;
            } else {
                report.losing_trades += 1;
                report.gross_loss += trade.realized_pnl.abs();
            }
        }

        report.win_rate = Some(report.winning_trades as f64 / report.total_trades as f64);

        report.profit_factor = if report.winning_trades == 0 {
            0.0
        } else if report.gross_loss == 0.0 {
            f64::INFINITY
        } else {
            report.gross_profit / report.gross_loss
        };

        if report.winning_trades > 0 {
            report.average_win = report.gross_profit / report.winning_trades as f64;
        }
        if report.losing_trades > 0 {
            report.average_loss = report.gross_loss / report.losing_trades as f64;
        }
    }

    fn calculate_drawdown(
        &self,
        equity_curve: &[(DateTime<Utc>, f64)],
        report: &mut PerformanceReport,
    ) {
        let mut peak = f64::NEG_INFINITY;
        let mut max_drawdown: f64 = 0.0;
        for &(_, equity) in equity_curve {
            if equity > peak {
                peak = equity;
            }
            max_drawdown = max_drawdown.max(peak - equity);
        }
        report.max_drawdown = max_drawdown;
    }

    /// Mean over sample standard deviation of per-trade P&L. No
    /// annualisation: the figure compares runs, it does not claim a yearly
    /// number.
    fn calculate_sharpe(&self, trades: &[Trade], report: &mut PerformanceReport) {
        if trades.len() < 2 {
            return;
        }
        let n = trades.len() as f64;
        let mean = trades.iter().map(|t| t.realized_pnl).sum::<f64>() / n;
        let ssd: f64 = trades
            .iter()
            .map(|t| {
                let d = t.realized_pnl - mean;
                d * d
            })
            .sum();
        let std = (ssd / (n - 1.0)).sqrt();
        if std > 0.0 {
            report.sharpe_ratio = Some(mean / std);
        }
    }

    fn calculate_time_metrics(&self, trades: &[Trade], report: &mut PerformanceReport) {
        let total_secs: i64 = trades.iter().map(|t| t.holding_period().num_seconds()).sum();
        report.average_holding_period = Duration::seconds(total_secs / trades.len() as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_types::{CloseReason, Side};

    fn trade(pnl: f64, minutes_held: i64) -> Trade {
        let open = Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap();
        Trade {
            open_time: open,
            close_time: open + Duration::minutes(minutes_held),
            side: Side::Long,
            size: 1,
            entry_price: 5000.0,
            exit_price: 5000.0 + pnl / 5.0,
            realized_pnl: pnl,
            z_on_entry: -2.0,
            z_on_exit: 0.0,
            close_reason: CloseReason::ZExit,
        }
    }

    fn curve(trades: &[Trade]) -> Vec<(DateTime<Utc>, f64)> {
        let mut equity = 0.0;
        trades
            .iter()
            .map(|t| {
                equity += t.realized_pnl;
                (t.close_time, equity)
            })
            .collect()
    }

    #[test]
    fn empty_trade_list_gives_empty_report() {
        let report = AnalyticsEngine::new().calculate(&[], &[]).unwrap();
        assert_eq!(report.total_trades, 0);
        assert!(report.win_rate.is_none());
        assert_eq!(report.profit_factor, 0.0);
    }

    #[test]
    fn win_rate_and_averages() {
        let trades = vec![trade(100.0, 30), trade(-50.0, 20), trade(60.0, 10)];
        let report = AnalyticsEngine::new()
            .calculate(&trades, &curve(&trades))
            .unwrap();
        assert_eq!(report.total_trades, 3);
        assert_eq!(report.winning_trades, 2);
        assert_eq!(report.losing_trades, 1);
        assert!((report.win_rate.unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.average_win, 80.0);
        assert_eq!(report.average_loss, 50.0);
        assert!((report.profit_factor - 160.0 / 50.0).abs() < 1e-12);
        assert_eq!(report.average_holding_period, Duration::minutes(20));
    }

    #[test]
    fn profit_factor_is_infinite_without_losses() {
        let trades = vec![trade(10.0, 5), trade(20.0, 5)];
        let report = AnalyticsEngine::new()
            .calculate(&trades, &curve(&trades))
            .unwrap();
        assert!(report.profit_factor.is_infinite());
    }

    #[test]
    fn profit_factor_is_zero_without_wins() {
        let trades = vec![trade(-10.0, 5), trade(-20.0, 5)];
        let report = AnalyticsEngine::new()
            .calculate(&trades, &curve(&trades))
            .unwrap();
        assert_eq!(report.profit_factor, 0.0);
    }

    #[test]
    fn drawdown_is_peak_to_trough_in_pnl_units() {
        let trades = vec![
            trade(100.0, 5),
            trade(-30.0, 5),
            trade(-40.0, 5),
            trade(90.0, 5),
        ];
        // Equity: 100, 70, 30, 120. Peak 100, trough 30.
        let report = AnalyticsEngine::new()
            .calculate(&trades, &curve(&trades))
            .unwrap();
        assert_eq!(report.max_drawdown, 70.0);
    }

    #[test]
    fn sharpe_matches_hand_computation() {
        let trades = vec![trade(10.0, 5), trade(20.0, 5), trade(30.0, 5)];
        let report = AnalyticsEngine::new()
            .calculate(&trades, &curve(&trades))
            .unwrap();
        // mean 20, sample std 10.
        assert!((report.sharpe_ratio.unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn identical_trades_have_no_sharpe() {
        let trades = vec![trade(10.0, 5), trade(10.0, 5)];
        let report = AnalyticsEngine::new()
            .calculate(&trades, &curve(&trades))
            .unwrap();
        assert!(report.sharpe_ratio.is_none());
    }
}

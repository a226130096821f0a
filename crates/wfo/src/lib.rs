//! # Meridian Walk-Forward Crate
//!
//! Chronology-preserving evaluation: the bar range splits into ordered,
//! non-overlapping folds; within each fold the leading slice only seeds the
//! rolling window and the trailing slice trades through the full replay
//! stack. Every fold starts with a fresh engine and fresh risk state, so no
//! session accounting leaks across fold boundaries.

pub mod error;

pub use error::WfoError;

use analytics::{AnalyticsEngine, PerformanceReport};
use backtester::{BacktestDriver, BacktestResult};
use chrono::{DateTime, Utc};
use configuration::Config;
use core_types::{Bar, Trade};

/// One fold's slice layout and its replay outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldResult {
    /// 1-based fold number.
    pub fold: usize,
    pub train_bars: usize,
    pub test_bars: usize,
    pub result: BacktestResult,
}

/// Per-fold results plus aggregates over the concatenated trade list.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkForwardResult {
    pub folds: Vec<FoldResult>,
    /// All folds' trades in chronological order.
    pub trades: Vec<Trade>,
    /// Equity curve stitched across folds (cumulative realized P&L).
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
    /// Metrics over the concatenated trades and stitched curve.
    pub overall: PerformanceReport,
}

pub struct WalkForwardEvaluator {
    config: Config,
}

impl WalkForwardEvaluator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Runs `n_folds` ordered folds over `bars`, seeding each fold's window
    /// from its leading `train_ratio` slice. The folds cover the full range;
    /// the division remainder lands in the last fold.
    pub async fn run(
        &self,
        bars: &[Bar],
        n_folds: usize,
        train_ratio: f64,
    ) -> Result<WalkForwardResult, WfoError> {
        if n_folds == 0 {
            return Err(WfoError::InvalidFolds("n_folds must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&train_ratio) {
            return Err(WfoError::InvalidFolds(format!(
                "train_ratio {train_ratio} must lie in [0, 1)"
            )));
        }
        let fold_size = bars.len() / n_folds;
        if fold_size == 0 {
            return Err(WfoError::InvalidFolds(format!(
                "{} bars cannot fill {} folds",
                bars.len(),
                n_folds
            )));
        }

        let driver = BacktestDriver::new(self.config.clone());
        let mut folds = Vec::with_capacity(n_folds);

        for fold in 0..n_folds {
            let start = fold * fold_size;
            let end = if fold == n_folds - 1 {
                bars.len()
            } else {
                start + fold_size
            };
            let train_len = ((end - start) as f64 * train_ratio) as usize;

            let train = &bars[start..start + train_len];
            let test = &bars[start + train_len..end];

            tracing::info!(
                fold = fold + 1,
                n_folds,
                train_bars = train.len(),
                test_bars = test.len(),
                "running fold"
            );

            let result = driver
                .run_seeded(train, test)
                .await
                .map_err(|source| WfoError::FoldFailed {
                    fold: fold + 1,
                    source,
                })?;

            folds.push(FoldResult {
                fold: fold + 1,
                train_bars: train.len(),
                test_bars: test.len(),
                result,
            });
        }

        let trades: Vec<Trade> = folds
            .iter()
            .flat_map(|f| f.result.trades.iter().cloned())
            .collect();
        let equity_curve = backtester::equity_curve(&trades);
        let overall = AnalyticsEngine::new().calculate(&trades, &equity_curve)?;

        tracing::info!(
            folds = folds.len(),
            trades = trades.len(),
            pnl = overall.total_pnl,
            "walk-forward complete"
        );

        Ok(WalkForwardResult {
            folds,
            trades,
            equity_curve,
            overall,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use execution::synthetic::{generate_bars, SyntheticConfig};

    fn series(seed: u64, n: usize) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        generate_bars(&SyntheticConfig::new(start, n, seed))
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.strategy.min_volume = 0;
        config
    }

    #[tokio::test]
    async fn one_unseeded_fold_equals_a_plain_backtest() {
        let bars = series(42, 2000);
        let evaluator = WalkForwardEvaluator::new(config());
        let walked = evaluator.run(&bars, 1, 0.0).await.unwrap();

        let plain = BacktestDriver::new(config()).run(&bars).await.unwrap();

        assert_eq!(walked.folds.len(), 1);
        assert_eq!(walked.trades, plain.trades);
        assert_eq!(walked.overall, plain.report);
    }

    #[tokio::test]
    async fn folds_are_ordered_and_cover_the_range() {
        let bars = series(9, 2003);
        let evaluator = WalkForwardEvaluator::new(config());
        let walked = evaluator.run(&bars, 5, 0.7).await.unwrap();

        assert_eq!(walked.folds.len(), 5);
        let covered: usize = walked
            .folds
            .iter()
            .map(|f| f.train_bars + f.test_bars)
            .sum();
        // Integer division leaves the remainder in the last fold.
        assert_eq!(covered, 2003);
        assert!(walked.folds[4].train_bars + walked.folds[4].test_bars >= 400);

        // Chronology: every fold's trades close after the previous fold's.
        for pair in walked.folds.windows(2) {
            if let (Some(prev), Some(next)) = (
                pair[0].result.trades.last(),
                pair[1].result.trades.first(),
            ) {
                assert!(prev.close_time < next.close_time);
            }
        }
    }

    #[tokio::test]
    async fn each_fold_starts_with_fresh_risk_state() {
        // A config whose daily trade cap would bind quickly if sessions
        // leaked across folds: each fold gets its own budget.
        let mut config = config();
        config.risk.max_daily_trades = 2;
        let bars = series(42, 3000);

        let evaluator = WalkForwardEvaluator::new(config);
        let walked = evaluator.run(&bars, 3, 0.5).await.unwrap();

        // No single fold can exceed its own per-session budget.
        for fold in &walked.folds {
            let per_day = fold
                .result
                .trades
                .iter()
                .fold(std::collections::HashMap::<chrono::NaiveDate, u32>::new(), |mut acc, t| {
                    *acc.entry(t.close_time.date_naive()).or_default() += 1;
                    acc
                });
            assert!(per_day.values().all(|&n| n <= 2));
        }
    }

    #[tokio::test]
    async fn degenerate_layouts_are_rejected() {
        let bars = series(1, 10);
        let evaluator = WalkForwardEvaluator::new(config());
        assert!(evaluator.run(&bars, 0, 0.7).await.is_err());
        assert!(evaluator.run(&bars, 20, 0.7).await.is_err());
        assert!(evaluator.run(&bars, 2, 1.0).await.is_err());
    }
}

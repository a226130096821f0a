use thiserror::Error;

#[derive(Error, Debug)]
pub enum WfoError {
    #[error("Invalid fold layout: {0}")]
    InvalidFolds(String),

    #[error("Backtest failed inside fold {fold}: {source}")]
    FoldFailed {
        fold: usize,
        #[source]
        source: backtester::BacktestError,
    },

    #[error("Analytics error: {0}")]
    Analytics(#[from] analytics::AnalyticsError),
}

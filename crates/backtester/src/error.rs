use thiserror::Error;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("No bars to replay")]
    NoData,

    #[error("Engine error during replay: {0}")]
    Engine(#[from] engine::EngineError),

    #[error("Execution error during replay: {0}")]
    Execution(#[from] execution::ExecutionError),

    #[error("Store error during replay: {0}")]
    Store(#[from] store::StoreError),

    #[error("Analytics error: {0}")]
    Analytics(#[from] analytics::AnalyticsError),
}

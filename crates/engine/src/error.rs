use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("Strategy error: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Risk management error: {0}")]
    Risk(#[from] risk::RiskError),

    #[error("Execution error: {0}")]
    Execution(#[from] execution::ExecutionError),

    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("Ledger/position state error: {0}")]
    Position(String),

    #[error("Snapshot does not match the recorded window hash; refusing to resume from it")]
    SnapshotMismatch,

    #[error("Serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Broker is not connected")]
    NotConnected,

    #[error("Unknown intent id: {0}")]
    UnknownIntent(String),

    #[error("Limit order submitted without a price")]
    MissingLimitPrice,

    #[error("No market data available to price the order")]
    NoMarketData,

    #[error("Position already open; the ledger tracks at most one")]
    PositionAlreadyOpen,

    #[error("No open position to {0}")]
    NoOpenPosition(&'static str),

    #[error("Broker rejected the order: {0}")]
    Rejected(String),
}

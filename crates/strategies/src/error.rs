use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Invalid strategy parameters: {0}")]
    InvalidParameters(String),

    #[error("Non-finite input price: {0}")]
    NonFiniteInput(f64),
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Bar at {timestamp} violates OHLC ordering: o={open} h={high} l={low} c={close}")]
    MalformedBar {
        timestamp: String,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("Non-finite price: {0}")]
    NonFinitePrice(f64),

    #[error("Calculation error: {0}")]
    Calculation(String),
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlerterError {
    #[error("Failed to send alert request: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Alert API returned an error: {0}")]
    ApiError(String),
}

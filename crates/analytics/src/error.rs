use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Internal analytics error: {0}")]
    InternalError(String),
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("An error occurred during JSON serialization/deserialization: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt record in store: {0}")]
    CorruptRecord(String),

    #[error("The requested data was not found in the store.")]
    NotFound,
}

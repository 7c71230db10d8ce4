use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("database is corrupted: {0}")]
    Corruption(String),
}

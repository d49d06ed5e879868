use thiserror::Error;

/// Closed error taxonomy returned by every repository operation.
///
/// Callers distinguish [`StoreError::NotFound`] and treat everything else
/// as transient unless otherwise classified.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

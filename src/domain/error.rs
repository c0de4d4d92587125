use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid todo id {0:?}")]
    InvalidId(String),
    #[error("todo {0} not found")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(#[from] mongodb::error::Error),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("store assigned a non-ObjectId key {0}")]
    UnexpectedKey(String),
}

impl StoreError {
    /// Failures of the backing store itself, as opposed to bad input or a missing record.
    pub fn is_storage(&self) -> bool { matches!(self, Self::Storage(_) | Self::Timeout(_) | Self::UnexpectedKey(_)) }
}

pub type StoreResult<T> = Result<T, StoreError>;

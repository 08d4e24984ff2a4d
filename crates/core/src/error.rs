use thiserror::Error;

pub type SegmentatorResult<T> = Result<T, SegmentatorError>;

#[derive(Error, Debug)]
pub enum SegmentatorError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(String),

    /// A rollback failed after a statement failure inside a transaction.
    /// Both errors are preserved; the original is the root cause.
    #[error("transaction error: {cause}, rollback error: {rollback}")]
    Integrity { cause: String, rollback: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SegmentatorError {
    /// Client errors are surfaced as 400-class responses and never retried.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SegmentatorError::InvalidInput(_) | SegmentatorError::NotFound(_)
        )
    }
}

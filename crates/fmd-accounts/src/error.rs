use fmd_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account not found: {0}")]
    NotFound(String),

    #[error("index {index} out of range for {len} entries")]
    OutOfRange { index: usize, len: usize },

    #[error("storage failure: {0}")]
    Storage(#[from] DbError),

    /// The OS random source failed. Not retryable.
    #[error("secure random source failed: {0}")]
    RandomSource(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("hashed password is not a PHC string: {0}")]
    InvalidPasswordHash(String),

    #[error("legacy export unreadable: {0}")]
    LegacyExport(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AccountResult<T> = Result<T, AccountError>;

impl AccountError {
    /// Environment-level faults that callers must not retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RandomSource(_))
    }
}

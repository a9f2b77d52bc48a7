use thiserror::Error;

use super::{FileId, TransactionID};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Transaction {0} is not running")]
    IllegalTransaction(TransactionID),

    #[error("Transaction {0} was aborted")]
    TransactionAborted(TransactionID),

    #[error("Buffer pool full: no page is eligible for eviction")]
    BufferPoolFull,

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt log record at offset {offset}")]
    CorruptLog { offset: u64 },

    #[error("Page {page_no} not found in file {file}")]
    PageNotFound { file: FileId, page_no: usize },

    #[error("Page size mismatch: expected {expected}, got {actual}")]
    PageSizeMismatch { expected: usize, actual: usize },

    #[error("File {0} is not registered with the buffer pool")]
    UnknownFile(FileId),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<bincode::Error> for DbError {
    fn from(err: bincode::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

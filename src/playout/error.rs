use crate::store::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayoutError {
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("playout scheduler is not running")]
    Unavailable,
}

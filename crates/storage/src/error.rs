use thiserror::Error;

use crate::filter::FilterError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("chunk {id} has no {kind} vector")]
    MissingVector { id: String, kind: &'static str },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid filter: {0}")]
    Filter(#[from] FilterError),

    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(String),
}

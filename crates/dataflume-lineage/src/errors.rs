use thiserror::Error;

/// Errors raised for malformed lineage submissions.
#[derive(Debug, Error)]
pub enum LineageError {
    #[error("invalid lineage entry: {0}")]
    InvalidEntry(String),
}

use thiserror::Error;

/// Core error type shared across Dataflume crates.
#[derive(Debug, Error)]
pub enum Error {
    /// A record could not be built from its raw representation.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Convenience alias for results returned by core helpers.
pub type Result<T> = std::result::Result<T, Error>;

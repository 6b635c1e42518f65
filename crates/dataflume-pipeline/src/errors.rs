use thiserror::Error;

use crate::collaborators::{SourceError, StorageError};

/// Errors surfaced by the pipeline orchestrator.
///
/// Row-level validation findings never appear here; they travel inside
/// structured results. Storage and source errors are batch-fatal for the
/// owning job; queue saturation is a retryable backpressure signal.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("job queue is full")]
    QueueFull,
    #[error("{0}")]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Source(#[from] SourceError),
    #[error("{0}")]
    Rule(#[from] dataflume_validate::RuleError),
    #[error("{0}")]
    Lineage(#[from] dataflume_lineage::LineageError),
    #[error("deadline exceeded")]
    Timeout,
    #[error("pipeline is not running")]
    NotRunning,
}

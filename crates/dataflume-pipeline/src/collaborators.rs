use std::collections::BTreeMap;

use async_trait::async_trait;
use dataflume_core::Batch;
use dataflume_lineage::{LineageEntry, SchemaChange};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reading from an upstream source. Unrecoverable for the batch
/// that hit them.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source read failed: {0}")]
    Read(String),
    #[error("unknown source: {0}")]
    Unknown(String),
}

/// Failures in the storage collaborator. Batch-fatal.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage write failed: {0}")]
    Write(String),
    #[error("object not found: {0}")]
    NotFound(String),
}

/// Failures publishing events. Logged, never fatal to the owning job.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish failed: {0}")]
    Send(String),
}

/// Free-form metadata attached to stored objects.
pub type ObjectMetadata = BTreeMap<String, String>;

/// Receipt for a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub path: String,
    pub size: u64,
}

/// A finite, lazily-produced sequence of records, batched on request.
#[async_trait]
pub trait Source: Send {
    /// Next batch of at most `hint` records; None when exhausted.
    async fn next_batch(&mut self, hint: usize) -> Result<Option<Batch>, SourceError>;
}

/// Opens a [`Source`] for a job's source identifier.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn open(&self, source: &str) -> Result<Box<dyn Source>, SourceError>;
}

/// Durable storage seam. The pipeline calls `store` exactly once per batch
/// that passed validation/quality gating.
#[async_trait]
pub trait StorageManager: Send + Sync {
    async fn store(
        &self,
        path: &str,
        bytes: Vec<u8>,
        metadata: ObjectMetadata,
    ) -> Result<StoredObject, StorageError>;
    async fn retrieve(&self, path: &str) -> Result<(Vec<u8>, ObjectMetadata), StorageError>;
    async fn list(
        &self,
        prefix: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>, StorageError>;
    async fn get_metadata(&self, path: &str) -> Result<ObjectMetadata, StorageError>;
    async fn delete(&self, path: &str) -> Result<(), StorageError>;
}

/// Event emitted once per completed batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEvent {
    pub job_id: String,
    pub batch_index: usize,
    pub records_processed: usize,
    pub records_failed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    pub lineage: LineageEntry,
}

/// Event emitted once per recorded schema change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaChangeEvent {
    pub dataset: String,
    pub change: SchemaChange,
}

/// Downstream event seam; best-effort from the pipeline's perspective.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_batch(&self, event: BatchEvent) -> Result<(), PublishError>;
    async fn publish_schema_change(&self, event: SchemaChangeEvent) -> Result<(), PublishError>;
}

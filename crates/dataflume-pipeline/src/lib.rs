//! ETL pipeline orchestrator for Dataflume.
//!
//! Owns job lifecycle, a bounded worker pool draining a FIFO job queue, and
//! per-batch orchestration: validate, quality-score, persist through the
//! storage seam, record lineage, publish events. Cancellation is cooperative
//! and sampled only at batch boundaries.

pub mod collaborators;
pub mod config;
pub mod errors;
pub mod job;
pub mod mem;
pub mod metrics;
pub mod pipeline;

pub use collaborators::{
    BatchEvent, EventPublisher, ObjectMetadata, PublishError, SchemaChangeEvent, Source,
    SourceError, SourceProvider, StorageError, StorageManager, StoredObject,
};
pub use config::{PipelineConfig, QueuePolicy};
pub use errors::PipelineError;
pub use job::{Job, JobConfig, JobMetrics, JobStatus, JobType};
pub use mem::{MemoryPublisher, MemorySource, MemorySourceProvider, MemoryStorage};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use pipeline::{BatchSummary, Pipeline, ProcessOptions, ProcessReport};

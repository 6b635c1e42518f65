use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;

use dataflume_core::{Record, SchemaSnapshot};
use dataflume_lineage::{Direction, LineageEntry, LineageInfo, SchemaChange, Tracker, diff_schemas};
use dataflume_quality::Checker;
use dataflume_validate::{CompiledRuleSet, validate};
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use crate::collaborators::{
    BatchEvent, EventPublisher, ObjectMetadata, SchemaChangeEvent, SourceProvider, StorageError,
    StorageManager,
};
use crate::config::{PipelineConfig, QueuePolicy};
use crate::errors::PipelineError;
use crate::job::{Job, JobConfig, JobStatus};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};

/// Options for the synchronous, non-queued processing path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// Batch size override; the configured batch size when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default = "default_true")]
    pub validate: bool,
    #[serde(default = "default_true")]
    pub quality_check: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            batch_size: None,
            validate: true,
            quality_check: true,
        }
    }
}

/// Per-batch outcome of the synchronous path, merged in submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_index: usize,
    pub records: usize,
    pub records_failed: usize,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
}

/// Aggregate result of `process_data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessReport {
    pub records_processed: u64,
    pub records_failed: u64,
    pub batches: Vec<BatchSummary>,
}

struct Shared {
    config: PipelineConfig,
    rules: CompiledRuleSet,
    checker: Checker,
    tracker: Tracker,
    sources: Arc<dyn SourceProvider>,
    storage: Arc<dyn StorageManager>,
    publisher: Arc<dyn EventPublisher>,
    metrics: PipelineMetrics,
    jobs: RwLock<BTreeMap<String, Arc<Mutex<Job>>>>,
}

type JobHandle = Arc<Mutex<Job>>;

/// The ETL orchestrator: bounded FIFO job queue, fixed worker pool,
/// cooperative cancellation sampled at batch boundaries.
///
/// Owns its queue, rule set, quality checker, lineage tracker, and metrics;
/// constructed once per process and passed by handle to callers.
pub struct Pipeline {
    shared: Arc<Shared>,
    job_tx: mpsc::Sender<JobHandle>,
    job_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<JobHandle>>>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        sources: Arc<dyn SourceProvider>,
        storage: Arc<dyn StorageManager>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let rules = CompiledRuleSet::compile(&config.rules)?;
        let mut checker = Checker::new(config.quality.clone());
        if !rules.is_empty() {
            checker = checker.with_rules(CompiledRuleSet::compile(&config.rules)?);
        }

        let (job_tx, job_rx) = mpsc::channel(config.queue_size);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                rules,
                checker,
                tracker: Tracker::new(),
                sources,
                storage,
                publisher,
                metrics: PipelineMetrics::default(),
                jobs: RwLock::new(BTreeMap::new()),
            }),
            job_tx,
            job_rx: Arc::new(tokio::sync::Mutex::new(job_rx)),
            shutdown,
            workers: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        })
    }

    /// Validate and enqueue a job. Returns immediately; the job runs when a
    /// worker picks it up. Queue saturation surfaces as backpressure per
    /// the configured policy.
    pub async fn create_job(&self, config: JobConfig) -> Result<Job, PipelineError> {
        if *self.shutdown.borrow() {
            return Err(PipelineError::NotRunning);
        }
        if config.name.trim().is_empty() {
            return Err(PipelineError::Config("job name is required".to_string()));
        }
        if config.source.trim().is_empty() {
            return Err(PipelineError::Config("job source is required".to_string()));
        }
        if config.target.trim().is_empty() {
            return Err(PipelineError::Config("job target is required".to_string()));
        }

        let mut job = Job::new(config);
        let snapshot = job.clone();
        job.transition(JobStatus::Queued);
        let handle: JobHandle = Arc::new(Mutex::new(job));

        self.shared
            .jobs
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .insert(snapshot.id.clone(), handle.clone());

        let enqueued = match self.shared.config.queue_policy {
            QueuePolicy::FailFast => self.job_tx.try_send(handle).map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => PipelineError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => PipelineError::NotRunning,
            }),
            QueuePolicy::Block => {
                match tokio::time::timeout(
                    self.shared.config.processing_timeout(),
                    self.job_tx.send(handle),
                )
                .await
                {
                    Err(_) => Err(PipelineError::Timeout),
                    Ok(Err(_)) => Err(PipelineError::NotRunning),
                    Ok(Ok(())) => Ok(()),
                }
            }
        };

        if let Err(err) = enqueued {
            self.shared
                .jobs
                .write()
                .unwrap_or_else(|err| err.into_inner())
                .remove(&snapshot.id);
            return Err(err);
        }

        self.shared.metrics.job_created();
        info!(
            event = "job_submitted",
            job_id = %snapshot.id,
            name = %snapshot.name,
            source = %snapshot.source,
            target = %snapshot.target,
        );
        Ok(snapshot)
    }

    /// Launch the worker pool. Each worker owns one job at a time for its
    /// full run, preserving per-job batch order.
    pub fn start(&self) -> Result<(), PipelineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::Config(
                "pipeline is already running".to_string(),
            ));
        }

        info!(
            event = "pipeline_started",
            workers = self.shared.config.worker_pool_size,
            queue_size = self.shared.config.queue_size,
        );

        let mut workers = self.workers.lock().unwrap_or_else(|err| err.into_inner());
        for worker_id in 0..self.shared.config.worker_pool_size {
            let shared = self.shared.clone();
            let job_rx = self.job_rx.clone();
            let shutdown_rx = self.shutdown.subscribe();
            workers.push(tokio::spawn(worker_loop(
                shared, job_rx, shutdown_rx, worker_id,
            )));
        }
        Ok(())
    }

    /// Signal cooperative cancellation and wait, bounded by the shutdown
    /// timeout, for in-flight batches to finish. Queued-but-not-started
    /// jobs are marked cancelled.
    pub async fn stop(&self) -> Result<(), PipelineError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(PipelineError::NotRunning);
        }

        info!(event = "pipeline_stopping");
        let _ = self.shutdown.send(true);

        let handles: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .drain(..)
            .collect();

        let drained = tokio::time::timeout(self.shared.config.shutdown_timeout(), async {
            for handle in handles {
                let _ = handle.await;
            }
        })
        .await;

        if drained.is_err() {
            warn!(event = "pipeline_stop_timeout");
            return Err(PipelineError::Timeout);
        }

        // Workers are gone; whatever is left in the queue never started.
        if let Ok(mut rx) = self.job_rx.try_lock() {
            while let Ok(handle) = rx.try_recv() {
                let mut job = lock_job(&handle);
                if job.transition(JobStatus::Cancelled) {
                    self.shared.metrics.job_cancelled();
                    info!(event = "job_cancelled", job_id = %job.id);
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(event = "pipeline_stopped");
        Ok(())
    }

    /// Synchronous path through the same validate/quality stages: partition
    /// into batches, fan out across a bounded sub-pool, merge results in
    /// submission order.
    pub async fn process_data(
        &self,
        records: &[Record],
        options: ProcessOptions,
    ) -> Result<ProcessReport, PipelineError> {
        let batch_size = options.batch_size.unwrap_or(self.shared.config.batch_size);
        if batch_size == 0 {
            return Err(PipelineError::Config(
                "batch_size must be positive".to_string(),
            ));
        }

        let chunks: Vec<Vec<Record>> = records.chunks(batch_size).map(<[Record]>::to_vec).collect();
        let total = chunks.len();
        let semaphore = Arc::new(Semaphore::new(self.shared.config.worker_pool_size.max(1)));

        let mut tasks: JoinSet<(usize, BatchSummary)> = JoinSet::new();
        for (index, chunk) in chunks.into_iter().enumerate() {
            let shared = self.shared.clone();
            let semaphore = semaphore.clone();
            let options = options.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, process_chunk(&shared, index, &chunk, &options))
            });
        }

        let mut merged: Vec<Option<BatchSummary>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            let (index, summary) =
                joined.map_err(|err| PipelineError::Config(format!("batch task failed: {err}")))?;
            merged[index] = Some(summary);
        }

        let batches: Vec<BatchSummary> = merged.into_iter().flatten().collect();
        let records_processed = batches.iter().map(|batch| batch.records as u64).sum();
        let records_failed = batches.iter().map(|batch| batch.records_failed as u64).sum();

        Ok(ProcessReport {
            records_processed,
            records_failed,
            batches,
        })
    }

    /// Point-in-time counters, safe under concurrent reads while workers
    /// mutate them.
    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Snapshot of a job's observable state.
    pub fn job(&self, id: &str) -> Option<Job> {
        self.shared
            .jobs
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .get(id)
            .map(|handle| lock_job(handle).clone())
    }

    pub fn tracker(&self) -> &Tracker {
        &self.shared.tracker
    }

    /// Bounded lineage traversal using the configured max depth.
    pub fn dataset_lineage(&self, dataset: &str, direction: Direction) -> LineageInfo {
        self.shared
            .tracker
            .dataset_lineage(dataset, direction, self.shared.config.lineage_max_depth)
    }

    /// Append a schema change to the lineage log and publish it. Publish
    /// failures are logged, never surfaced.
    pub async fn record_schema_change(&self, change: SchemaChange) -> Result<(), PipelineError> {
        let dataset = change.dataset.clone();
        self.shared.tracker.track_schema_change(change.clone())?;
        if let Err(err) = self
            .shared
            .publisher
            .publish_schema_change(SchemaChangeEvent { dataset, change })
            .await
        {
            warn!(event = "schema_publish_failed", error = %err);
        }
        Ok(())
    }
}

fn lock_job(handle: &JobHandle) -> MutexGuard<'_, Job> {
    handle.lock().unwrap_or_else(|err| err.into_inner())
}

async fn worker_loop(
    shared: Arc<Shared>,
    job_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<JobHandle>>>,
    mut shutdown_rx: watch::Receiver<bool>,
    worker_id: usize,
) {
    info!(event = "worker_started", worker_id);
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        let next = {
            let mut rx = job_rx.lock().await;
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => None,
                job = rx.recv() => job,
            }
        };
        let Some(handle) = next else {
            break;
        };
        run_job(&shared, &handle, &mut shutdown_rx, worker_id).await;
    }
    info!(event = "worker_stopped", worker_id);
}

async fn run_job(
    shared: &Shared,
    handle: &JobHandle,
    shutdown_rx: &mut watch::Receiver<bool>,
    worker_id: usize,
) {
    // A job dequeued at the same instant shutdown fired never started.
    if *shutdown_rx.borrow() {
        let mut job = lock_job(handle);
        if job.transition(JobStatus::Cancelled) {
            shared.metrics.job_cancelled();
            info!(event = "job_cancelled", job_id = %job.id);
        }
        return;
    }

    let (job_id, source_name, target) = {
        let mut job = lock_job(handle);
        if !job.transition(JobStatus::Running) {
            return;
        }
        (job.id.clone(), job.source.clone(), job.target.clone())
    };

    info!(event = "job_started", job_id = %job_id, worker_id);
    let started = Instant::now();
    let outcome = execute_job(shared, &job_id, &source_name, &target, handle, shutdown_rx).await;

    let mut job = lock_job(handle);
    job.metrics.processing_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(()) => {
            job.transition(JobStatus::Completed);
            shared.metrics.job_completed();
            info!(
                event = "job_completed",
                job_id = %job_id,
                records = job.metrics.records_processed,
                batches = job.metrics.batches_committed,
            );
        }
        Err(err) => {
            let resume_point = job
                .metrics
                .last_committed_batch
                .map(|index| index.to_string())
                .unwrap_or_else(|| "none".to_string());
            job.error = Some(format!("{err} (last committed batch: {resume_point})"));
            job.transition(JobStatus::Failed);
            shared.metrics.job_failed();
            error!(event = "job_failed", job_id = %job_id, error = %err);
        }
    }
}

async fn execute_job(
    shared: &Shared,
    job_id: &str,
    source_name: &str,
    target: &str,
    handle: &JobHandle,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<(), PipelineError> {
    let mut source = shared.sources.open(source_name).await?;
    let mut batch_index = 0usize;

    loop {
        // Cancellation is sampled only here, at the batch boundary.
        if *shutdown_rx.borrow() {
            info!(event = "job_interrupted", job_id = %job_id, next_batch = batch_index);
            break;
        }
        let Some(batch) = source.next_batch(shared.config.batch_size).await? else {
            break;
        };
        process_batch(shared, job_id, source_name, target, batch_index, &batch, handle).await?;
        batch_index += 1;
    }

    Ok(())
}

async fn process_batch(
    shared: &Shared,
    job_id: &str,
    source_name: &str,
    target: &str,
    batch_index: usize,
    batch: &[Record],
    handle: &JobHandle,
) -> Result<(), PipelineError> {
    let started = Instant::now();

    let mut failed_rows = 0usize;
    if !shared.rules.is_empty() {
        let result = validate(batch, &shared.rules);
        let failing: BTreeSet<usize> = result
            .errors
            .iter()
            .map(|error| error.record_index)
            .collect();
        failed_rows = failing.len();
    }

    let quality = shared.checker.check_quality(batch, &shared.config.dimensions);

    // Detect schema evolution against what lineage saw last, before this
    // batch's entry lands.
    let snapshot = SchemaSnapshot::infer(batch);
    if let Some(previous) = shared.tracker.current_schema(target)
        && previous != snapshot
    {
        for change in diff_schemas(target, &previous, &snapshot) {
            shared.tracker.track_schema_change(change.clone())?;
            if let Err(err) = shared
                .publisher
                .publish_schema_change(SchemaChangeEvent {
                    dataset: target.to_string(),
                    change,
                })
                .await
            {
                warn!(event = "schema_publish_failed", job_id = %job_id, error = %err);
            }
        }
    }

    let path = format!("{target}/{job_id}/batch-{batch_index:06}.json");
    let bytes = serde_json::to_vec(batch)
        .map_err(|err| StorageError::Write(format!("batch serialization failed: {err}")))?;
    let mut metadata = ObjectMetadata::new();
    metadata.insert("job_id".to_string(), job_id.to_string());
    metadata.insert("batch_index".to_string(), batch_index.to_string());
    metadata.insert("records".to_string(), batch.len().to_string());

    // The storage write is bounded by the processing deadline. The
    // store-plus-lineage commit pair is never split by a timeout: lineage
    // is recorded iff the write returned.
    let stored = tokio::time::timeout(
        shared.config.processing_timeout(),
        shared.storage.store(&path, bytes, metadata),
    )
    .await
    .map_err(|_| PipelineError::Timeout)??;

    let entry = LineageEntry {
        target_dataset: target.to_string(),
        operation: "etl_batch".to_string(),
        source_datasets: vec![source_name.to_string()],
        schema_snapshot: snapshot,
        transformations: Vec::new(),
        timestamp: chrono::Utc::now(),
    };
    shared.tracker.track(entry.clone())?;

    let event = BatchEvent {
        job_id: job_id.to_string(),
        batch_index,
        records_processed: batch.len(),
        records_failed: failed_rows,
        quality_score: Some(quality.overall_score),
        lineage: entry,
    };
    if let Err(err) = shared.publisher.publish_batch(event).await {
        warn!(event = "batch_publish_failed", job_id = %job_id, batch_index, error = %err);
    }

    shared
        .metrics
        .record_batch(started.elapsed(), batch.len() as u64, failed_rows as u64);

    let mut job = lock_job(handle);
    job.metrics.records_processed += batch.len() as u64;
    job.metrics.records_failed += failed_rows as u64;
    job.metrics.batches_committed += 1;
    job.metrics.last_committed_batch = Some(batch_index as u64);
    let committed = job.metrics.batches_committed as f64;
    job.metrics.quality_score = Some(match job.metrics.quality_score {
        None => quality.overall_score,
        Some(previous) => previous + (quality.overall_score - previous) / committed,
    });

    info!(
        event = "batch_committed",
        job_id = %job_id,
        batch_index,
        records = batch.len(),
        failed = failed_rows,
        stored_path = %stored.path,
        quality_score = quality.overall_score,
    );
    Ok(())
}

fn process_chunk(
    shared: &Shared,
    index: usize,
    batch: &[Record],
    options: &ProcessOptions,
) -> BatchSummary {
    let started = Instant::now();

    let mut records_failed = 0usize;
    let mut valid = true;
    if options.validate && !shared.rules.is_empty() {
        let result = validate(batch, &shared.rules);
        let failing: BTreeSet<usize> = result
            .errors
            .iter()
            .map(|error| error.record_index)
            .collect();
        records_failed = failing.len();
        valid = result.valid;
    }

    let quality_score = options.quality_check.then(|| {
        shared
            .checker
            .check_quality(batch, &shared.config.dimensions)
            .overall_score
    });

    shared
        .metrics
        .record_batch(started.elapsed(), batch.len() as u64, records_failed as u64);

    BatchSummary {
        batch_index: index,
        records: batch.len(),
        records_failed,
        valid,
        quality_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{MemoryPublisher, MemorySourceProvider, MemoryStorage};

    fn pipeline(config: PipelineConfig) -> Pipeline {
        Pipeline::new(
            config,
            Arc::new(MemorySourceProvider::new()),
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryPublisher::new()),
        )
        .expect("pipeline")
    }

    #[tokio::test]
    async fn create_job_requires_mandatory_fields() {
        let pipeline = pipeline(PipelineConfig::default());
        let err = pipeline
            .create_job(JobConfig {
                name: "ingest".to_string(),
                source: String::new(),
                target: "staged".to_string(),
                ..JobConfig::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[tokio::test]
    async fn create_job_returns_created_status() {
        let pipeline = pipeline(PipelineConfig::default());
        let job = pipeline
            .create_job(JobConfig {
                name: "ingest".to_string(),
                source: "raw".to_string(),
                target: "staged".to_string(),
                ..JobConfig::default()
            })
            .await
            .expect("job");
        assert_eq!(job.status, JobStatus::Created);
        // The registered job is already queued for pickup.
        assert_eq!(pipeline.job(&job.id).map(|j| j.status), Some(JobStatus::Queued));
    }

    #[tokio::test]
    async fn full_queue_fails_fast() {
        let config = PipelineConfig {
            queue_size: 1,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(config);
        let job_config = JobConfig {
            name: "ingest".to_string(),
            source: "raw".to_string(),
            target: "staged".to_string(),
            ..JobConfig::default()
        };

        pipeline.create_job(job_config.clone()).await.expect("first job");
        let err = pipeline.create_job(job_config).await.unwrap_err();
        assert!(matches!(err, PipelineError::QueueFull));
    }

    #[tokio::test]
    async fn process_data_rejects_zero_batch_size() {
        let pipeline = pipeline(PipelineConfig::default());
        let err = pipeline
            .process_data(
                &[],
                ProcessOptions {
                    batch_size: Some(0),
                    ..ProcessOptions::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[tokio::test]
    async fn process_data_merges_batches_in_submission_order() {
        let config = PipelineConfig {
            rules: vec![dataflume_core::Rule::range("amount", "amount", 0.0, 100.0)],
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(config);

        let records: Vec<Record> = (0..25)
            .map(|i| {
                let mut record = Record::new();
                record.insert("id", i as i64);
                // One out-of-range amount in the third batch.
                record.insert("amount", if i == 22 { 500.0 } else { 10.0 });
                record
            })
            .collect();

        let report = pipeline
            .process_data(
                &records,
                ProcessOptions {
                    batch_size: Some(10),
                    ..ProcessOptions::default()
                },
            )
            .await
            .expect("report");

        assert_eq!(report.records_processed, 25);
        assert_eq!(report.records_failed, 1);
        assert_eq!(report.batches.len(), 3);
        let indices: Vec<usize> = report.batches.iter().map(|b| b.batch_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(!report.batches[2].valid);
        assert!(report.batches[0].valid);
    }
}

use std::sync::Arc;
use std::time::Duration;

use dataflume_core::{ChangeType, Record, Rule};
use dataflume_pipeline::{
    Job, JobConfig, JobStatus, MemoryPublisher, MemorySourceProvider, MemoryStorage, Pipeline,
    PipelineConfig, ProcessOptions,
};

struct Harness {
    pipeline: Pipeline,
    sources: Arc<MemorySourceProvider>,
    storage: Arc<MemoryStorage>,
    publisher: Arc<MemoryPublisher>,
}

fn harness(config: PipelineConfig) -> Harness {
    let sources = Arc::new(MemorySourceProvider::new());
    let storage = Arc::new(MemoryStorage::new());
    let publisher = Arc::new(MemoryPublisher::new());
    let pipeline = Pipeline::new(
        config,
        sources.clone(),
        storage.clone(),
        publisher.clone(),
    )
    .expect("pipeline");
    Harness {
        pipeline,
        sources,
        storage,
        publisher,
    }
}

fn records(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            let mut record = Record::new();
            record.insert("id", i as i64);
            record.insert("amount", 10.0 + i as f64);
            record
        })
        .collect()
}

fn job_config(name: &str, source: &str, target: &str) -> JobConfig {
    JobConfig {
        name: name.to_string(),
        source: source.to_string(),
        target: target.to_string(),
        ..JobConfig::default()
    }
}

async fn wait_terminal(pipeline: &Pipeline, id: &str) -> Job {
    for _ in 0..250 {
        if let Some(job) = pipeline.job(id)
            && job.status.is_terminal()
        {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {id} did not reach a terminal state");
}

#[tokio::test]
async fn job_runs_to_completion() {
    let config = PipelineConfig {
        worker_pool_size: 2,
        batch_size: 10,
        rules: vec![Rule::range("amount_bounds", "amount", 0.0, 1000.0)],
        ..PipelineConfig::default()
    };
    let h = harness(config);
    h.sources.register("raw_txns", records(25));

    h.pipeline.start().expect("start");
    let job = h
        .pipeline
        .create_job(job_config("ingest", "raw_txns", "staged_txns"))
        .await
        .expect("create job");

    let finished = wait_terminal(&h.pipeline, &job.id).await;
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.metrics.records_processed, 25);
    assert_eq!(finished.metrics.records_failed, 0);
    assert_eq!(finished.metrics.batches_committed, 3);
    assert_eq!(finished.metrics.last_committed_batch, Some(2));
    assert!(finished.metrics.quality_score.is_some());

    // One storage object, one lineage entry, one event per batch.
    assert_eq!(h.storage.object_count(), 3);
    assert_eq!(h.pipeline.tracker().entry_count(), 3);
    assert_eq!(h.publisher.batch_events().len(), 3);

    let metrics = h.pipeline.get_metrics();
    assert_eq!(metrics.jobs_created, 1);
    assert_eq!(metrics.jobs_completed, 1);
    assert_eq!(metrics.records_processed, 25);

    h.pipeline.stop().await.expect("stop");
}

#[tokio::test]
async fn source_failure_reports_resume_offset() {
    let config = PipelineConfig {
        worker_pool_size: 1,
        batch_size: 10,
        ..PipelineConfig::default()
    };
    let h = harness(config);
    h.sources.register_failing("flaky", records(30), 2);

    h.pipeline.start().expect("start");
    let job = h
        .pipeline
        .create_job(job_config("ingest", "flaky", "staged"))
        .await
        .expect("create job");

    let finished = wait_terminal(&h.pipeline, &job.id).await;
    assert_eq!(finished.status, JobStatus::Failed);
    // Batches 0 and 1 committed before the source broke.
    assert_eq!(finished.metrics.batches_committed, 2);
    assert_eq!(finished.metrics.last_committed_batch, Some(1));
    assert!(finished.error.as_deref().unwrap_or_default().contains("last committed batch: 1"));

    // Committed batches stay committed, nothing beyond them landed.
    assert_eq!(h.storage.object_count(), 2);
    assert_eq!(h.pipeline.tracker().entry_count(), 2);
    assert_eq!(h.pipeline.get_metrics().jobs_failed, 1);

    h.pipeline.stop().await.expect("stop");
}

#[tokio::test]
async fn storage_failure_is_batch_fatal_and_atomic() {
    let config = PipelineConfig {
        worker_pool_size: 1,
        batch_size: 10,
        ..PipelineConfig::default()
    };
    let h = harness(config);
    h.sources.register("raw", records(20));
    h.storage.set_fail_writes(true);

    h.pipeline.start().expect("start");
    let job = h
        .pipeline
        .create_job(job_config("ingest", "raw", "staged"))
        .await
        .expect("create job");

    let finished = wait_terminal(&h.pipeline, &job.id).await;
    assert_eq!(finished.status, JobStatus::Failed);
    assert_eq!(finished.metrics.last_committed_batch, None);

    // The failed batch is not observable anywhere: no object, no lineage.
    assert_eq!(h.storage.object_count(), 0);
    assert_eq!(h.pipeline.tracker().entry_count(), 0);

    h.pipeline.stop().await.expect("stop");
}

#[tokio::test]
async fn publish_failure_does_not_fail_the_job() {
    let config = PipelineConfig {
        worker_pool_size: 1,
        batch_size: 10,
        ..PipelineConfig::default()
    };
    let h = harness(config);
    h.sources.register("raw", records(10));
    h.publisher.set_fail(true);

    h.pipeline.start().expect("start");
    let job = h
        .pipeline
        .create_job(job_config("ingest", "raw", "staged"))
        .await
        .expect("create job");

    let finished = wait_terminal(&h.pipeline, &job.id).await;
    assert_eq!(finished.status, JobStatus::Completed);
    assert!(h.publisher.batch_events().is_empty());
    assert_eq!(h.storage.object_count(), 1);

    h.pipeline.stop().await.expect("stop");
}

#[tokio::test]
async fn stop_cancels_queued_jobs_and_keeps_batches_atomic() {
    let config = PipelineConfig {
        worker_pool_size: 1,
        batch_size: 10,
        ..PipelineConfig::default()
    };
    let h = harness(config);
    h.sources
        .register_slow("slow_a", records(40), Duration::from_millis(50));
    h.sources
        .register_slow("slow_b", records(40), Duration::from_millis(50));

    h.pipeline.start().expect("start");
    let running = h
        .pipeline
        .create_job(job_config("first", "slow_a", "staged_a"))
        .await
        .expect("first job");
    let queued = h
        .pipeline
        .create_job(job_config("second", "slow_b", "staged_b"))
        .await
        .expect("second job");

    // Let the single worker get partway through the first job.
    tokio::time::sleep(Duration::from_millis(120)).await;
    h.pipeline.stop().await.expect("stop");

    let first = h.pipeline.job(&running.id).expect("first job state");
    let second = h.pipeline.job(&queued.id).expect("second job state");

    // The in-flight job finished its current batch and stopped cleanly; the
    // queued one never started.
    assert_eq!(first.status, JobStatus::Completed);
    assert!(first.metrics.batches_committed >= 1);
    assert_eq!(second.status, JobStatus::Cancelled);
    assert_eq!(second.metrics.batches_committed, 0);
    assert_eq!(h.pipeline.get_metrics().jobs_cancelled, 1);

    // Every started batch fully committed: storage write and lineage entry
    // are always paired.
    assert_eq!(
        h.storage.object_count(),
        h.pipeline.tracker().entry_count()
    );
}

#[tokio::test]
async fn schema_evolution_between_batches_is_recorded() {
    let config = PipelineConfig {
        worker_pool_size: 1,
        batch_size: 5,
        ..PipelineConfig::default()
    };
    let h = harness(config);

    let mut rows = Vec::new();
    for i in 0..5 {
        let mut record = Record::new();
        record.insert("id", i as i64);
        rows.push(record);
    }
    for i in 5..10 {
        let mut record = Record::new();
        record.insert("id", i as i64);
        record.insert("email", format!("user{i}@x.com"));
        rows.push(record);
    }
    h.sources.register("evolving", rows);

    h.pipeline.start().expect("start");
    let job = h
        .pipeline
        .create_job(job_config("ingest", "evolving", "accounts"))
        .await
        .expect("create job");
    let finished = wait_terminal(&h.pipeline, &job.id).await;
    assert_eq!(finished.status, JobStatus::Completed);

    let history = h.pipeline.tracker().schema_history("accounts");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].change_type, ChangeType::FieldAdded);
    assert_eq!(history[0].field, "email");
    assert_eq!(h.publisher.schema_events().len(), 1);

    let current = h
        .pipeline
        .tracker()
        .current_schema("accounts")
        .expect("current schema");
    assert!(current.fields.contains_key("email"));

    h.pipeline.stop().await.expect("stop");
}

#[tokio::test]
async fn process_data_matches_the_worked_example() {
    let config = PipelineConfig {
        rules: vec![
            Rule::pattern(
                "email_format",
                "email",
                r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
            ),
            Rule::range("age_bounds", "age", 0.0, 150.0),
        ],
        ..PipelineConfig::default()
    };
    let h = harness(config);

    let records: Vec<Record> = [
        serde_json::json!({"id": 1, "name": "John", "email": "john@x.com"}),
        serde_json::json!({"id": 2, "name": "Jane", "email": "jane@x.com"}),
        serde_json::json!({"id": 3, "name": "", "email": "invalid-email"}),
    ]
    .into_iter()
    .map(|json| Record::from_json(json).expect("record"))
    .collect();

    let report = h
        .pipeline
        .process_data(&records, ProcessOptions::default())
        .await
        .expect("report");

    assert_eq!(report.records_processed, 3);
    assert_eq!(report.records_failed, 1);
    assert_eq!(report.batches.len(), 1);
    assert!(!report.batches[0].valid);
    assert!(report.batches[0].quality_score.is_some());
}

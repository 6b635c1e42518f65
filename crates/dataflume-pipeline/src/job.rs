use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a job consumes its source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    #[default]
    Batch,
    Stream,
}

/// Caller-supplied job definition. `name`, `source`, and `target` are
/// mandatory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    #[serde(default)]
    pub job_type: JobType,
    pub source: String,
    pub target: String,
}

/// Job lifecycle states. Transitions are monotonic; terminal states are
/// absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Legal edges of the state machine.
    pub fn can_transition(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Created, JobStatus::Queued)
                | (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }
}

/// Per-job execution counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetrics {
    pub records_processed: u64,
    pub records_failed: u64,
    pub batches_committed: u64,
    /// Offset of the last batch whose storage write and lineage entry both
    /// landed; the caller's resume point after a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_committed_batch: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    pub processing_ms: u64,
}

/// An ETL job and its observable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub job_type: JobType,
    pub source: String,
    pub target: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metrics: JobMetrics,
}

impl Job {
    pub fn new(config: JobConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: config.name,
            job_type: config.job_type,
            source: config.source,
            target: config.target,
            status: JobStatus::Created,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            metrics: JobMetrics::default(),
        }
    }

    /// Apply a transition if the state machine allows it; illegal edges are
    /// ignored and reported as false.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition(next) {
            return false;
        }
        self.status = next;
        match next {
            JobStatus::Running => self.started_at = Some(Utc::now()),
            status if status.is_terminal() => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(JobConfig {
            name: "ingest".to_string(),
            job_type: JobType::Batch,
            source: "raw".to_string(),
            target: "staged".to_string(),
        })
    }

    #[test]
    fn happy_path_transitions() {
        let mut job = job();
        assert!(job.transition(JobStatus::Queued));
        assert!(job.transition(JobStatus::Running));
        assert!(job.started_at.is_some());
        assert!(job.transition(JobStatus::Completed));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn terminal_states_are_absorbing() {
        let mut job = job();
        job.transition(JobStatus::Queued);
        job.transition(JobStatus::Cancelled);
        assert!(!job.transition(JobStatus::Running));
        assert!(!job.transition(JobStatus::Completed));
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[test]
    fn skipping_states_is_rejected() {
        let mut job = job();
        assert!(!job.transition(JobStatus::Running));
        assert!(!job.transition(JobStatus::Completed));
        assert_eq!(job.status, JobStatus::Created);
    }
}

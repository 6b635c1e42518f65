use std::time::Duration;

use dataflume_core::Rule;
use dataflume_quality::{QualityConfig, QualityDimension};
use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;

/// Behavior of `create_job` when the job queue is saturated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Fail immediately with a queue-full error (caller-visible
    /// backpressure).
    #[default]
    FailFast,
    /// Block until queue space frees up, bounded by the processing timeout.
    Block,
}

/// Configuration surface consumed by the pipeline. Loading files is the
/// caller's business; this type only deserializes and validates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_processing_timeout_secs")]
    pub processing_timeout_secs: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    #[serde(default)]
    pub queue_policy: QueuePolicy,
    /// Active rule set applied to every batch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
    /// Quality dimensions scored per batch.
    #[serde(default = "default_dimensions")]
    pub dimensions: Vec<QualityDimension>,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default = "default_lineage_max_depth")]
    pub lineage_max_depth: usize,
}

fn default_worker_pool_size() -> usize {
    10
}

fn default_queue_size() -> usize {
    20
}

fn default_batch_size() -> usize {
    1000
}

fn default_processing_timeout_secs() -> u64 {
    30
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_dimensions() -> Vec<QualityDimension> {
    QualityDimension::ALL.to_vec()
}

fn default_lineage_max_depth() -> usize {
    10
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            queue_size: default_queue_size(),
            batch_size: default_batch_size(),
            processing_timeout_secs: default_processing_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            queue_policy: QueuePolicy::default(),
            rules: Vec::new(),
            dimensions: default_dimensions(),
            quality: QualityConfig::default(),
            lineage_max_depth: default_lineage_max_depth(),
        }
    }
}

impl PipelineConfig {
    /// Parse from a TOML document and validate.
    pub fn from_toml_str(raw: &str) -> Result<Self, PipelineError> {
        let config: Self =
            toml::from_str(raw).map_err(|err| PipelineError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on structurally impossible settings.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.worker_pool_size == 0 {
            return Err(PipelineError::Config(
                "worker_pool_size must be positive".to_string(),
            ));
        }
        if self.queue_size == 0 {
            return Err(PipelineError::Config(
                "queue_size must be positive".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::Config(
                "batch_size must be positive".to_string(),
            ));
        }
        for (dimension, threshold) in &self.quality.thresholds {
            if !(0.0..=1.0).contains(threshold) {
                return Err(PipelineError::Config(format!(
                    "threshold for {} must lie in [0, 1]",
                    dimension.name()
                )));
            }
        }
        for (dimension, weight) in &self.quality.weights {
            if *weight < 0.0 {
                return Err(PipelineError::Config(format!(
                    "weight for {} must be non-negative",
                    dimension.name()
                )));
            }
        }
        Ok(())
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        PipelineConfig::default().validate().expect("valid defaults");
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = PipelineConfig {
            batch_size: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn toml_roundtrip_with_overrides() {
        let config = PipelineConfig::from_toml_str(
            r#"
            worker_pool_size = 2
            batch_size = 50
            queue_policy = "block"

            [[rules]]
            name = "email_format"
            field = "email"
            kind = "pattern"
            severity = "error"

            [rules.params]
            pattern = ".+@.+"
            "#,
        )
        .expect("parse config");
        assert_eq!(config.worker_pool_size, 2);
        assert_eq!(config.queue_policy, QueuePolicy::Block);
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.dimensions.len(), 6);
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let raw = r#"
            [quality.thresholds]
            completeness = 1.5
        "#;
        assert!(PipelineConfig::from_toml_str(raw).is_err());
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Independently scored axes of data fitness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityDimension {
    Completeness,
    Accuracy,
    Consistency,
    Validity,
    Uniqueness,
    Freshness,
}

impl QualityDimension {
    pub const ALL: [QualityDimension; 6] = [
        QualityDimension::Completeness,
        QualityDimension::Accuracy,
        QualityDimension::Consistency,
        QualityDimension::Validity,
        QualityDimension::Uniqueness,
        QualityDimension::Freshness,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            QualityDimension::Completeness => "completeness",
            QualityDimension::Accuracy => "accuracy",
            QualityDimension::Consistency => "consistency",
            QualityDimension::Validity => "validity",
            QualityDimension::Uniqueness => "uniqueness",
            QualityDimension::Freshness => "freshness",
        }
    }
}

/// Concrete issue categories surfaced while scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Duplicate,
    PatternMismatch,
    Missing,
    Stale,
}

/// Issue severity graded by how far the governing score falls below 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// A concrete quality issue affecting one field or dedup group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub field: String,
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    pub count: usize,
    pub description: String,
}

/// A remediation suggestion derived from detected issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub description: String,
    /// Indices into the issue list this recommendation was derived from.
    pub related_issues: Vec<usize>,
}

/// Score for one requested dimension. `score` is None when the computation
/// was not meaningful for the input (degraded, never a hard failure).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
}

/// Outcome of a quality assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityResult {
    /// Weighted mean over the requested, known dimensions; 0.0 by
    /// convention when none could be computed.
    pub overall_score: f64,
    /// Exactly the requested dimensions.
    pub dimension_scores: BTreeMap<QualityDimension, DimensionScore>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
    pub record_count: usize,
}

/// Key used by uniqueness scoring and duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DedupKey {
    /// Key on one field; records missing the field fall back to
    /// whole-record identity.
    Field { name: String },
    /// Full-record equality.
    WholeRecord,
}

impl Default for DedupKey {
    fn default() -> Self {
        DedupKey::Field {
            name: "id".to_string(),
        }
    }
}

/// Quality checker configuration: per-dimension weights and thresholds,
/// freshness window, timestamp field candidates, and the dedup key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Per-dimension weights for the overall score; unlisted dimensions
    /// weigh 1.0 (equal weighting by default).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub weights: BTreeMap<QualityDimension, f64>,
    /// Per-dimension pass thresholds; unlisted dimensions use built-in
    /// defaults. Thresholds classify, they never clip scores.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub thresholds: BTreeMap<QualityDimension, f64>,
    /// Recency window for freshness scoring, in seconds.
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,
    /// Field names probed, in order, for a record's timestamp.
    #[serde(default = "default_timestamp_fields")]
    pub timestamp_fields: Vec<String>,
    #[serde(default)]
    pub dedup_key: DedupKey,
}

fn default_freshness_window_secs() -> u64 {
    3600
}

fn default_timestamp_fields() -> Vec<String> {
    ["timestamp", "created_at", "updated_at", "date", "time"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            weights: BTreeMap::new(),
            thresholds: BTreeMap::new(),
            freshness_window_secs: default_freshness_window_secs(),
            timestamp_fields: default_timestamp_fields(),
            dedup_key: DedupKey::default(),
        }
    }
}

impl QualityConfig {
    pub fn weight(&self, dimension: QualityDimension) -> f64 {
        self.weights.get(&dimension).copied().unwrap_or(1.0)
    }

    pub fn threshold(&self, dimension: QualityDimension) -> f64 {
        if let Some(threshold) = self.thresholds.get(&dimension) {
            return *threshold;
        }
        match dimension {
            QualityDimension::Completeness => 0.95,
            QualityDimension::Accuracy => 0.99,
            QualityDimension::Consistency => 0.98,
            _ => 0.9,
        }
    }
}

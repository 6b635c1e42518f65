//! Quality checker for Dataflume.
//!
//! Scores record sets along six quality dimensions, detects concrete data
//! issues, and derives remediation recommendations. Pure over its inputs;
//! composable with the validation engine for rule-backed accuracy scoring.

pub mod checker;
pub mod model;

pub use checker::Checker;
pub use model::{
    DedupKey, DimensionScore, Issue, IssueKind, IssueSeverity, QualityConfig, QualityDimension,
    QualityResult, Recommendation,
};

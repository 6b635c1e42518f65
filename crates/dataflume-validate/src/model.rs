use std::collections::BTreeMap;

use dataflume_core::Severity;
use serde::{Deserialize, Serialize};

/// One rule violation on one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub record_index: usize,
    pub field: String,
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
}

/// Outcome of validating a record set against a rule set.
///
/// Row-level violations are collected here, never raised as hard failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationError>,
    pub profile: DataProfile,
}

/// A value and how often it occurred in a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueFrequency {
    pub value: String,
    pub count: usize,
}

/// Per-field statistics gathered while profiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldProfile {
    pub field: String,
    /// Fraction of records where the field is present and non-blank.
    pub completeness: f64,
    /// Distinct non-blank values over non-blank values; 1.0 when the field
    /// has no non-blank values at all.
    pub uniqueness: f64,
    pub inferred_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_values: Vec<ValueFrequency>,
}

/// Profile of a whole record set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataProfile {
    pub total_records: usize,
    /// Count of distinct field names observed across all records.
    pub total_fields: usize,
    pub field_profiles: BTreeMap<String, FieldProfile>,
}

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use dataflume_core::{FormatCheck, Record, Value, parse_timestamp};
use dataflume_validate::CompiledRuleSet;

use crate::model::{
    DedupKey, DimensionScore, Issue, IssueKind, IssueSeverity, QualityConfig, QualityDimension,
    QualityResult, Recommendation,
};

/// Scores record sets along quality dimensions and surfaces concrete
/// issues. Pure over its inputs; no shared mutable state.
pub struct Checker {
    config: QualityConfig,
    rules: Option<CompiledRuleSet>,
}

impl Checker {
    pub fn new(config: QualityConfig) -> Self {
        Self {
            config,
            rules: None,
        }
    }

    /// Attach a compiled rule set; accuracy scoring then delegates to the
    /// validation engine instead of the built-in plausibility heuristic.
    pub fn with_rules(mut self, rules: CompiledRuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Assess the requested dimensions over a record set.
    ///
    /// The result holds exactly the requested dimensions; one whose
    /// computation is not meaningful for the input degrades to an unknown
    /// score instead of failing the call.
    pub fn check_quality(
        &self,
        records: &[Record],
        dimensions: &[QualityDimension],
    ) -> QualityResult {
        let mut dimension_scores = BTreeMap::new();
        let mut issues = Vec::new();

        for dimension in dimensions {
            let score = match dimension {
                QualityDimension::Completeness => self.score_completeness(records, &mut issues),
                QualityDimension::Accuracy => self.score_accuracy(records),
                QualityDimension::Consistency => self.score_consistency(records),
                QualityDimension::Validity => self.score_validity(records, &mut issues),
                QualityDimension::Uniqueness => self.score_uniqueness(records, &mut issues),
                QualityDimension::Freshness => self.score_freshness(records, &mut issues),
            };
            let passed = score.map(|s| s >= self.config.threshold(*dimension));
            dimension_scores.insert(*dimension, DimensionScore { score, passed });
        }

        let mut weighted = 0.0;
        let mut weight_total = 0.0;
        for (dimension, entry) in &dimension_scores {
            if let Some(score) = entry.score {
                let weight = self.config.weight(*dimension);
                weighted += score * weight;
                weight_total += weight;
            }
        }
        let overall_score = if weight_total > 0.0 {
            weighted / weight_total
        } else {
            0.0
        };

        issues.sort_by(|a, b| (a.kind, &a.field).cmp(&(b.kind, &b.field)));

        QualityResult {
            overall_score,
            dimension_scores,
            issues,
            record_count: records.len(),
        }
    }

    /// Detect duplicate-key groups and semantic format mismatches,
    /// independently of a full quality assessment.
    pub fn detect_issues(&self, records: &[Record]) -> Vec<Issue> {
        let mut issues = Vec::new();
        let total = records.len();

        let mut groups: BTreeMap<String, usize> = BTreeMap::new();
        for record in records {
            *groups.entry(self.dedup_key(record)).or_insert(0) += 1;
        }
        for (key, size) in groups {
            if size > 1 {
                let spare = 1.0 - (size - 1) as f64 / total.max(1) as f64;
                issues.push(Issue {
                    field: self.dedup_field_label().to_string(),
                    kind: IssueKind::Duplicate,
                    severity: severity_for(spare),
                    count: size,
                    description: format!("{size} records share key {key}"),
                });
            }
        }

        let mut failures: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for record in records {
            for (field, value) in record.fields() {
                if value.is_empty() {
                    continue;
                }
                if let Some(valid) = self.semantic_check(field, value) {
                    let entry = failures.entry(field.clone()).or_insert((0, 0));
                    entry.1 += 1;
                    if !valid {
                        entry.0 += 1;
                    }
                }
            }
        }
        for (field, (failed, checked)) in failures {
            if failed > 0 {
                issues.push(Issue {
                    field: field.clone(),
                    kind: IssueKind::PatternMismatch,
                    severity: severity_for(1.0 - failed as f64 / checked as f64),
                    count: failed,
                    description: format!("{failed} value(s) in '{field}' fail the format check"),
                });
            }
        }

        issues.sort_by(|a, b| (a.kind, &a.field).cmp(&(b.kind, &b.field)));
        issues
    }

    /// One recommendation per distinct (kind, field) pair, ordered by total
    /// affected count descending.
    pub fn generate_recommendations(&self, issues: &[Issue]) -> Vec<Recommendation> {
        let mut grouped: BTreeMap<(IssueKind, &str), (usize, Vec<usize>)> = BTreeMap::new();
        for (index, issue) in issues.iter().enumerate() {
            let entry = grouped
                .entry((issue.kind, issue.field.as_str()))
                .or_insert((0, Vec::new()));
            entry.0 += issue.count;
            entry.1.push(index);
        }

        let mut recommendations: Vec<(usize, Recommendation)> = grouped
            .into_iter()
            .map(|((kind, field), (count, related_issues))| {
                let (title, description) = recommendation_text(kind, field, count);
                (
                    count,
                    Recommendation {
                        title,
                        description,
                        related_issues,
                    },
                )
            })
            .collect();
        recommendations.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.title.cmp(&b.1.title)));
        recommendations
            .into_iter()
            .map(|(_, recommendation)| recommendation)
            .collect()
    }

    fn score_completeness(&self, records: &[Record], issues: &mut Vec<Issue>) -> Option<f64> {
        let mut present: BTreeMap<String, usize> = BTreeMap::new();
        for record in records {
            for (field, value) in record.fields() {
                let entry = present.entry(field.clone()).or_insert(0);
                if !value.is_empty() {
                    *entry += 1;
                }
            }
        }
        if records.is_empty() || present.is_empty() {
            return None;
        }

        let total_cells = records.len() * present.len();
        let complete_cells: usize = present.values().sum();

        let threshold = self.config.threshold(QualityDimension::Completeness);
        for (field, count) in &present {
            let rate = *count as f64 / records.len() as f64;
            if rate < threshold {
                let missing = records.len() - count;
                issues.push(Issue {
                    field: field.clone(),
                    kind: IssueKind::Missing,
                    severity: severity_for(rate),
                    count: missing,
                    description: format!("{missing} record(s) missing a value for '{field}'"),
                });
            }
        }

        Some(complete_cells as f64 / total_cells as f64)
    }

    fn score_accuracy(&self, records: &[Record]) -> Option<f64> {
        if let Some(rules) = &self.rules
            && !rules.is_empty()
        {
            let total = records.len() * rules.len();
            if total == 0 {
                return None;
            }
            let violations: usize = records
                .iter()
                .map(|record| rules.check_record(record).len())
                .sum();
            return Some(1.0 - violations as f64 / total as f64);
        }

        let mut checked = 0usize;
        let mut plausible = 0usize;
        for record in records {
            for (field, value) in record.fields() {
                if value.is_empty() {
                    continue;
                }
                checked += 1;
                if is_plausible(field, value) {
                    plausible += 1;
                }
            }
        }
        if checked == 0 {
            return None;
        }
        Some(plausible as f64 / checked as f64)
    }

    fn score_consistency(&self, records: &[Record]) -> Option<f64> {
        let mut type_counts: BTreeMap<String, BTreeMap<&'static str, usize>> = BTreeMap::new();
        for record in records {
            for (field, value) in record.fields() {
                if value.is_empty() {
                    continue;
                }
                *type_counts
                    .entry(field.clone())
                    .or_default()
                    .entry(value.type_name())
                    .or_insert(0) += 1;
            }
        }

        let mut total = 0usize;
        let mut matching = 0usize;
        for by_type in type_counts.values() {
            let field_total: usize = by_type.values().sum();
            let majority = by_type.values().copied().max().unwrap_or(0);
            total += field_total;
            matching += majority;
        }
        if total == 0 {
            return None;
        }
        Some(matching as f64 / total as f64)
    }

    fn score_validity(&self, records: &[Record], issues: &mut Vec<Issue>) -> Option<f64> {
        let mut checked = 0usize;
        let mut valid = 0usize;
        let mut failures: BTreeMap<String, usize> = BTreeMap::new();

        for record in records {
            for (field, value) in record.fields() {
                if value.is_empty() {
                    continue;
                }
                checked += 1;
                match self.semantic_check(field, value) {
                    Some(true) | None => valid += 1,
                    Some(false) => {
                        *failures.entry(field.clone()).or_insert(0) += 1;
                    }
                }
            }
        }
        if checked == 0 {
            return None;
        }

        for (field, failed) in failures {
            issues.push(Issue {
                field: field.clone(),
                kind: IssueKind::PatternMismatch,
                severity: severity_for(1.0 - failed as f64 / checked as f64),
                count: failed,
                description: format!("{failed} value(s) in '{field}' violate domain constraints"),
            });
        }

        Some(valid as f64 / checked as f64)
    }

    fn score_uniqueness(&self, records: &[Record], issues: &mut Vec<Issue>) -> Option<f64> {
        let total = records.len();
        if total == 0 {
            return None;
        }

        let mut groups: BTreeMap<String, usize> = BTreeMap::new();
        for record in records {
            *groups.entry(self.dedup_key(record)).or_insert(0) += 1;
        }
        let duplicate_count: usize = groups.values().map(|size| size - 1).sum();
        let score = 1.0 - duplicate_count as f64 / total as f64;

        if duplicate_count > 0 {
            issues.push(Issue {
                field: self.dedup_field_label().to_string(),
                kind: IssueKind::Duplicate,
                severity: severity_for(score),
                count: duplicate_count,
                description: format!("{duplicate_count} duplicate record(s) by dedup key"),
            });
        }

        Some(score)
    }

    fn score_freshness(&self, records: &[Record], issues: &mut Vec<Issue>) -> Option<f64> {
        if records.is_empty() {
            return None;
        }
        let window = Duration::seconds(self.config.freshness_window_secs as i64);
        let cutoff = Utc::now() - window;

        let mut fresh = 0usize;
        for record in records {
            let timestamp = self
                .config
                .timestamp_fields
                .iter()
                .find_map(|field| record.get(field).filter(|value| !value.is_empty()));
            match timestamp {
                // Records without any timestamp field count as fresh.
                None => fresh += 1,
                Some(value) => {
                    if parse_timestamp(value).is_some_and(|ts| ts > cutoff) {
                        fresh += 1;
                    }
                }
            }
        }

        let score = fresh as f64 / records.len() as f64;
        let stale = records.len() - fresh;
        if stale > 0 && score < self.config.threshold(QualityDimension::Freshness) {
            issues.push(Issue {
                field: self
                    .config
                    .timestamp_fields
                    .first()
                    .cloned()
                    .unwrap_or_default(),
                kind: IssueKind::Stale,
                severity: severity_for(score),
                count: stale,
                description: format!("{stale} record(s) older than the freshness window"),
            });
        }

        Some(score)
    }

    /// Semantic domain check for one cell. None when the field has no
    /// associated constraint (such cells count as valid).
    fn semantic_check(&self, field: &str, value: &Value) -> Option<bool> {
        let lower = field.to_lowercase();
        if lower.contains("timestamp") || lower.contains("date") || lower.contains("time") {
            // Timestamps must parse and must not sit in the future.
            return Some(parse_timestamp(value).is_some_and(|ts| ts <= Utc::now()));
        }
        FormatCheck::for_field(field).map(|check| check.matches(value))
    }

    fn dedup_key(&self, record: &Record) -> String {
        match &self.config.dedup_key {
            DedupKey::Field { name } => match record.get(name).filter(|value| !value.is_empty()) {
                Some(value) => format!("{name}={value}"),
                None => format!("record={}", record.identity()),
            },
            DedupKey::WholeRecord => format!("record={}", record.identity()),
        }
    }

    fn dedup_field_label(&self) -> &str {
        match &self.config.dedup_key {
            DedupKey::Field { name } => name.as_str(),
            DedupKey::WholeRecord => "record",
        }
    }
}

impl Default for Checker {
    fn default() -> Self {
        Self::new(QualityConfig::default())
    }
}

fn severity_for(score: f64) -> IssueSeverity {
    if score >= 0.9 {
        IssueSeverity::Low
    } else if score >= 0.7 {
        IssueSeverity::Medium
    } else if score >= 0.5 {
        IssueSeverity::High
    } else {
        IssueSeverity::Critical
    }
}

// Plausibility heuristic used when no rule set is configured: placeholder
// text, dominant repeated characters, and impossible numeric ranges.
fn is_plausible(field: &str, value: &Value) -> bool {
    if let Some(s) = value.as_str() {
        let lower = s.to_lowercase();
        if lower.contains("test") || lower.contains("dummy") || lower.contains("example") {
            return false;
        }
        if s.len() > 3 && has_dominant_char(s) {
            return false;
        }
    }
    if let Some(n) = value.as_number() {
        let lower = field.to_lowercase();
        if lower.contains("age") && !(0.0..=150.0).contains(&n) {
            return false;
        }
        if lower.contains("amount") && n < 0.0 {
            return false;
        }
    }
    true
}

fn has_dominant_char(s: &str) -> bool {
    let mut counts: BTreeMap<char, usize> = BTreeMap::new();
    for c in s.chars() {
        *counts.entry(c).or_insert(0) += 1;
    }
    let threshold = (s.chars().count() as f64 * 0.7).ceil() as usize;
    counts.values().any(|count| *count >= threshold)
}

fn recommendation_text(kind: IssueKind, field: &str, count: usize) -> (String, String) {
    match kind {
        IssueKind::Duplicate => (
            format!("Deduplicate records keyed by '{field}'"),
            format!(
                "{count} record(s) share a duplicate key; add a dedup step upstream of ingestion."
            ),
        ),
        IssueKind::PatternMismatch => (
            format!("Standardize '{field}' values"),
            format!(
                "{count} value(s) fail the '{field}' format check; add a validation rule or fix the source feed."
            ),
        ),
        IssueKind::Missing => (
            format!("Backfill missing values in '{field}'"),
            format!(
                "{count} record(s) lack '{field}'; make the field required at the source or provide defaults."
            ),
        ),
        IssueKind::Stale => (
            "Refresh stale records".to_string(),
            format!("{count} record(s) fall outside the freshness window; update the feed more often."),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: serde_json::Value) -> Record {
        Record::from_json(json).expect("record")
    }

    fn sample_records() -> Vec<Record> {
        vec![
            record(serde_json::json!({"id": 1, "email": "a"})),
            record(serde_json::json!({"id": 1, "email": "b"})),
            record(serde_json::json!({"id": 3, "email": "invalid-email"})),
        ]
    }

    #[test]
    fn detect_issues_finds_duplicates_and_mismatches() {
        let checker = Checker::default();
        let issues = checker.detect_issues(&sample_records());

        let duplicate = issues
            .iter()
            .find(|issue| issue.kind == IssueKind::Duplicate)
            .expect("duplicate issue");
        assert_eq!(duplicate.count, 2);
        assert_eq!(duplicate.field, "id");
        assert!(duplicate.description.contains("id=1"));

        let mismatch = issues
            .iter()
            .find(|issue| issue.kind == IssueKind::PatternMismatch)
            .expect("pattern mismatch issue");
        assert_eq!(mismatch.field, "email");
    }

    #[test]
    fn requested_dimensions_are_exactly_reported() {
        let checker = Checker::default();
        let requested = [QualityDimension::Completeness, QualityDimension::Uniqueness];
        let result = checker.check_quality(&sample_records(), &requested);

        assert_eq!(result.dimension_scores.len(), 2);
        assert!(result.dimension_scores.contains_key(&QualityDimension::Completeness));
        assert!(result.dimension_scores.contains_key(&QualityDimension::Uniqueness));
        for entry in result.dimension_scores.values() {
            let score = entry.score.expect("known score");
            assert!((0.0..=1.0).contains(&score));
        }
        assert!((0.0..=1.0).contains(&result.overall_score));
    }

    #[test]
    fn uniqueness_counts_extra_occurrences() {
        let checker = Checker::default();
        let result = checker.check_quality(&sample_records(), &[QualityDimension::Uniqueness]);
        let score = result.dimension_scores[&QualityDimension::Uniqueness]
            .score
            .unwrap();
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_degrades_to_unknown_scores() {
        let checker = Checker::default();
        let result = checker.check_quality(&[], &QualityDimension::ALL);
        assert_eq!(result.dimension_scores.len(), 6);
        for entry in result.dimension_scores.values() {
            assert!(entry.score.is_none());
            assert!(entry.passed.is_none());
        }
        assert_eq!(result.overall_score, 0.0);
    }

    #[test]
    fn overall_score_is_monotonic_in_a_dimension() {
        let checker = Checker::default();
        let sparse = vec![
            record(serde_json::json!({"id": 1, "name": "Ann"})),
            record(serde_json::json!({"id": 2, "name": null})),
        ];
        let dense = vec![
            record(serde_json::json!({"id": 1, "name": "Ann"})),
            record(serde_json::json!({"id": 2, "name": "Ben"})),
        ];
        let dims = [QualityDimension::Completeness, QualityDimension::Uniqueness];

        let low = checker.check_quality(&sparse, &dims);
        let high = checker.check_quality(&dense, &dims);
        // Uniqueness identical across both sets; only completeness moved.
        assert_eq!(
            low.dimension_scores[&QualityDimension::Uniqueness].score,
            high.dimension_scores[&QualityDimension::Uniqueness].score
        );
        assert!(high.overall_score > low.overall_score);
    }

    #[test]
    fn check_quality_is_pure() {
        let checker = Checker::default();
        let records = sample_records();
        let dims = [
            QualityDimension::Completeness,
            QualityDimension::Consistency,
            QualityDimension::Uniqueness,
        ];
        let first = checker.check_quality(&records, &dims);
        let second = checker.check_quality(&records, &dims);
        assert_eq!(first.overall_score, second.overall_score);
        assert_eq!(first.issues, second.issues);
    }

    #[test]
    fn accuracy_flags_placeholder_text() {
        let checker = Checker::default();
        let records = vec![
            record(serde_json::json!({"name": "real customer"})),
            record(serde_json::json!({"name": "test entry"})),
        ];
        let result = checker.check_quality(&records, &[QualityDimension::Accuracy]);
        let score = result.dimension_scores[&QualityDimension::Accuracy]
            .score
            .unwrap();
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn freshness_counts_recent_records() {
        let checker = Checker::default();
        let recent = Utc::now().to_rfc3339();
        let records = vec![
            record(serde_json::json!({"id": 1, "timestamp": recent})),
            record(serde_json::json!({"id": 2, "timestamp": "2001-01-01T00:00:00Z"})),
            record(serde_json::json!({"id": 3})),
        ];
        let result = checker.check_quality(&records, &[QualityDimension::Freshness]);
        let score = result.dimension_scores[&QualityDimension::Freshness]
            .score
            .unwrap();
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn whole_record_dedup_key_is_configurable() {
        let config = QualityConfig {
            dedup_key: DedupKey::WholeRecord,
            ..QualityConfig::default()
        };
        let checker = Checker::new(config);
        let records = vec![
            record(serde_json::json!({"id": 1, "email": "a"})),
            record(serde_json::json!({"id": 1, "email": "b"})),
        ];
        // Distinct field values, so whole-record identity sees no duplicates.
        assert!(checker.detect_issues(&records).iter().all(|issue| issue.kind != IssueKind::Duplicate));
    }

    #[test]
    fn recommendations_are_grouped_and_ordered() {
        let checker = Checker::default();
        let issues = vec![
            Issue {
                field: "email".to_string(),
                kind: IssueKind::PatternMismatch,
                severity: IssueSeverity::Medium,
                count: 2,
                description: String::new(),
            },
            Issue {
                field: "id".to_string(),
                kind: IssueKind::Duplicate,
                severity: IssueSeverity::High,
                count: 5,
                description: String::new(),
            },
            Issue {
                field: "email".to_string(),
                kind: IssueKind::PatternMismatch,
                severity: IssueSeverity::Low,
                count: 1,
                description: String::new(),
            },
        ];

        let recommendations = checker.generate_recommendations(&issues);
        assert_eq!(recommendations.len(), 2);
        assert!(recommendations[0].title.contains("Deduplicate"));
        assert_eq!(recommendations[1].related_issues, vec![0, 2]);
    }
}

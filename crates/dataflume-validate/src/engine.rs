use std::collections::BTreeMap;

use dataflume_core::{FormatCheck, Record, Rule, RuleKind, Severity, Value};
use regex::Regex;
use uuid::Uuid;

use crate::errors::RuleError;
use crate::model::{
    DataProfile, FieldProfile, ValidationError, ValidationResult, ValueFrequency,
};

const TOP_VALUES_LIMIT: usize = 10;

/// Validate and normalize a rule definition, assigning an id when absent.
///
/// Pattern rules must compile, range rules need a coherent bound pair, and
/// custom rules must name a known built-in check.
pub fn create_rule(mut rule: Rule) -> Result<Rule, RuleError> {
    match rule.kind {
        RuleKind::Pattern => {
            let pattern = rule.params.pattern.as_deref().ok_or_else(|| {
                RuleError::InvalidPattern {
                    name: rule.name.clone(),
                    reason: "pattern parameter is required".to_string(),
                }
            })?;
            compile_pattern(pattern).map_err(|err| RuleError::InvalidPattern {
                name: rule.name.clone(),
                reason: err.to_string(),
            })?;
        }
        RuleKind::Range => {
            let (min, max) = (rule.params.min, rule.params.max);
            if min.is_none() && max.is_none() {
                return Err(RuleError::InvalidRange {
                    name: rule.name.clone(),
                    reason: "at least one of min/max is required".to_string(),
                });
            }
            if let (Some(min), Some(max)) = (min, max)
                && min > max
            {
                return Err(RuleError::InvalidRange {
                    name: rule.name.clone(),
                    reason: format!("min {min} exceeds max {max}"),
                });
            }
        }
        RuleKind::Required => {}
        RuleKind::Custom => {
            let check = rule.params.check.as_deref().unwrap_or_default();
            if FormatCheck::from_name(check).is_none() {
                return Err(RuleError::UnknownCheck {
                    name: rule.name.clone(),
                    check: check.to_string(),
                });
            }
        }
    }

    if rule.id.is_none() {
        rule.id = Some(Uuid::new_v4().to_string());
    }
    Ok(rule)
}

// Anchor so pattern rules are full-match, not substring search.
fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

enum CompiledCheck {
    Pattern(Regex),
    Range { min: Option<f64>, max: Option<f64> },
    Required,
    Custom(FormatCheck),
}

struct CompiledRule {
    id: String,
    field: String,
    severity: Severity,
    check: CompiledCheck,
}

/// A rule set with pre-compiled patterns, evaluated per record in
/// declaration order.
pub struct CompiledRuleSet {
    rules: Vec<CompiledRule>,
}

impl CompiledRuleSet {
    /// Compile every rule, normalizing each via [`create_rule`] first.
    pub fn compile(rules: &[Rule]) -> Result<Self, RuleError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let rule = create_rule(rule.clone())?;
            let check = match rule.kind {
                RuleKind::Pattern => CompiledCheck::Pattern(
                    compile_pattern(rule.params.pattern.as_deref().unwrap_or_default()).map_err(
                        |err| RuleError::InvalidPattern {
                            name: rule.name.clone(),
                            reason: err.to_string(),
                        },
                    )?,
                ),
                RuleKind::Range => CompiledCheck::Range {
                    min: rule.params.min,
                    max: rule.params.max,
                },
                RuleKind::Required => CompiledCheck::Required,
                RuleKind::Custom => CompiledCheck::Custom(
                    FormatCheck::from_name(rule.params.check.as_deref().unwrap_or_default())
                        .expect("check validated by create_rule"),
                ),
            };
            compiled.push(CompiledRule {
                id: rule.id.expect("id assigned by create_rule"),
                field: rule.field,
                severity: rule.severity,
                check,
            });
        }
        Ok(Self { rules: compiled })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Violations of a single record's fields, without positional context.
    /// Used by quality scoring to grade cells; `validate` attaches indices.
    pub fn check_record(&self, record: &Record) -> Vec<(usize, String)> {
        let mut violations = Vec::new();
        for (rule_index, rule) in self.rules.iter().enumerate() {
            if let Some(message) = apply_rule(rule, record.get(rule.field.as_str())) {
                violations.push((rule_index, message));
            }
        }
        violations
    }
}

fn apply_rule(rule: &CompiledRule, value: Option<&Value>) -> Option<String> {
    match &rule.check {
        CompiledCheck::Required => match value {
            Some(v) if !v.is_empty() => None,
            _ => Some(format!("required field '{}' is missing or empty", rule.field)),
        },
        // Non-required rules skip absent or null fields.
        _ => {
            let value = match value {
                Some(v) if !v.is_null() => v,
                _ => return None,
            };
            match &rule.check {
                CompiledCheck::Pattern(regex) => {
                    let text = value.to_string();
                    (!regex.is_match(&text))
                        .then(|| format!("value '{text}' does not match pattern"))
                }
                CompiledCheck::Range { min, max } => match value.as_number() {
                    None => Some(format!("value '{value}' is not numeric")),
                    Some(n) => {
                        if let Some(min) = min
                            && n < *min
                        {
                            Some(format!("value {n} is below minimum {min}"))
                        } else if let Some(max) = max
                            && n > *max
                        {
                            Some(format!("value {n} is above maximum {max}"))
                        } else {
                            None
                        }
                    }
                },
                CompiledCheck::Custom(check) => (!check.matches(value))
                    .then(|| format!("value '{value}' fails {} check", check.name())),
                CompiledCheck::Required => unreachable!("handled above"),
            }
        }
    }
}

/// Evaluate a rule set against a record set.
///
/// Errors come out in deterministic order: record order, then rule
/// declaration order. The result also carries the field profile of the
/// evaluated records.
pub fn validate(records: &[Record], rules: &CompiledRuleSet) -> ValidationResult {
    let mut errors = Vec::new();

    for (record_index, record) in records.iter().enumerate() {
        for (rule_index, message) in rules.check_record(record) {
            let rule = &rules.rules[rule_index];
            errors.push(ValidationError {
                record_index,
                field: rule.field.clone(),
                rule_id: rule.id.clone(),
                severity: rule.severity,
                message,
            });
        }
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
        profile: profile(records),
    }
}

struct FieldStats {
    present: usize,
    counts: BTreeMap<String, usize>,
    type_counts: BTreeMap<&'static str, usize>,
    min_value: Option<f64>,
    max_value: Option<f64>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    sample: Option<String>,
}

impl FieldStats {
    fn new() -> Self {
        Self {
            present: 0,
            counts: BTreeMap::new(),
            type_counts: BTreeMap::new(),
            min_value: None,
            max_value: None,
            min_length: None,
            max_length: None,
            sample: None,
        }
    }
}

/// Profile a record set: per-field completeness, uniqueness, inferred type,
/// value bounds, and top values.
pub fn profile(records: &[Record]) -> DataProfile {
    let mut stats: BTreeMap<String, FieldStats> = BTreeMap::new();

    for record in records {
        for (field, value) in record.fields() {
            let entry = stats
                .entry(field.clone())
                .or_insert_with(FieldStats::new);
            if value.is_empty() {
                continue;
            }
            entry.present += 1;
            *entry.type_counts.entry(value.type_name()).or_insert(0) += 1;

            let canonical = value.to_string();
            if entry.sample.is_none() {
                entry.sample = Some(canonical.clone());
            }
            if let Some(n) = value.as_number() {
                entry.min_value = Some(entry.min_value.map_or(n, |m| m.min(n)));
                entry.max_value = Some(entry.max_value.map_or(n, |m| m.max(n)));
            }
            if let Some(s) = value.as_str() {
                let len = s.len();
                entry.min_length = Some(entry.min_length.map_or(len, |m| m.min(len)));
                entry.max_length = Some(entry.max_length.map_or(len, |m| m.max(len)));
            }
            *entry.counts.entry(canonical).or_insert(0) += 1;
        }
    }

    let total_records = records.len();
    let total_fields = stats.len();

    let field_profiles = stats
        .into_iter()
        .map(|(field, stats)| {
            let completeness = if total_records == 0 {
                1.0
            } else {
                stats.present as f64 / total_records as f64
            };
            let uniqueness = if stats.present == 0 {
                1.0
            } else {
                stats.counts.len() as f64 / stats.present as f64
            };
            let inferred_type = stats
                .type_counts
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
                .map(|(name, _)| (*name).to_string())
                .unwrap_or_else(|| "null".to_string());

            let mut top_values: Vec<ValueFrequency> = stats
                .counts
                .into_iter()
                .map(|(value, count)| ValueFrequency { value, count })
                .collect();
            top_values.sort_by(|a, b| b.count.cmp(&a.count).then(a.value.cmp(&b.value)));
            top_values.truncate(TOP_VALUES_LIMIT);

            let profile = FieldProfile {
                field: field.clone(),
                completeness,
                uniqueness,
                inferred_type,
                sample: stats.sample,
                min_value: stats.min_value,
                max_value: stats.max_value,
                min_length: stats.min_length,
                max_length: stats.max_length,
                top_values,
            };
            (field, profile)
        })
        .collect();

    DataProfile {
        total_records,
        total_fields,
        field_profiles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflume_core::RuleParams;

    fn record(json: serde_json::Value) -> Record {
        Record::from_json(json).expect("record")
    }

    fn rules() -> CompiledRuleSet {
        CompiledRuleSet::compile(&[
            Rule::pattern("email_format", "email", r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}"),
            Rule::range("age_bounds", "age", 0.0, 150.0),
        ])
        .expect("compile")
    }

    #[test]
    fn create_rule_assigns_id_and_rejects_bad_patterns() {
        let rule = create_rule(Rule::required("id_present", "id")).unwrap();
        assert!(rule.id.is_some());

        let err = create_rule(Rule::pattern("broken", "field", "[unclosed")).unwrap_err();
        assert!(matches!(err, RuleError::InvalidPattern { .. }));
    }

    #[test]
    fn create_rule_rejects_inverted_range() {
        let err = create_rule(Rule::range("inverted", "age", 10.0, 1.0)).unwrap_err();
        assert!(matches!(err, RuleError::InvalidRange { .. }));
    }

    #[test]
    fn create_rule_rejects_unknown_custom_check() {
        let err = create_rule(Rule::custom("mystery", "field", "palindrome")).unwrap_err();
        assert!(matches!(err, RuleError::UnknownCheck { .. }));
    }

    #[test]
    fn create_rule_requires_a_range_bound() {
        let rule = Rule {
            id: None,
            name: "empty_range".to_string(),
            field: "amount".to_string(),
            kind: RuleKind::Range,
            params: RuleParams::default(),
            severity: Severity::Error,
        };
        assert!(matches!(
            create_rule(rule),
            Err(RuleError::InvalidRange { .. })
        ));
    }

    #[test]
    fn end_to_end_example_produces_exactly_one_error() {
        let records = vec![
            record(serde_json::json!({"id": 1, "name": "John", "email": "john@x.com"})),
            record(serde_json::json!({"id": 2, "name": "Jane", "email": "jane@x.com"})),
            record(serde_json::json!({"id": 3, "name": "", "email": "invalid-email"})),
        ];

        let result = validate(&records, &rules());
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].record_index, 2);
        assert_eq!(result.errors[0].field, "email");

        let name = &result.profile.field_profiles["name"];
        assert!((name.completeness - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn errors_come_out_in_record_then_rule_order() {
        let set = CompiledRuleSet::compile(&[
            Rule::required("name_present", "name"),
            Rule::range("age_bounds", "age", 0.0, 120.0),
        ])
        .unwrap();
        let records = vec![
            record(serde_json::json!({"name": "", "age": 200})),
            record(serde_json::json!({"age": -1})),
        ];

        let result = validate(&records, &set);
        let order: Vec<(usize, &str)> = result
            .errors
            .iter()
            .map(|e| (e.record_index, e.field.as_str()))
            .collect();
        assert_eq!(order, vec![(0, "name"), (0, "age"), (1, "name"), (1, "age")]);
    }

    #[test]
    fn rule_on_absent_field_is_skipped() {
        let set = CompiledRuleSet::compile(&[Rule::range("age_bounds", "age", 0.0, 10.0)]).unwrap();
        let result = validate(&[record(serde_json::json!({"name": "x"}))], &set);
        assert!(result.valid);
    }

    #[test]
    fn non_numeric_value_violates_range() {
        let set = CompiledRuleSet::compile(&[Rule::range("age_bounds", "age", 0.0, 10.0)]).unwrap();
        let result = validate(&[record(serde_json::json!({"age": "many"}))], &set);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("not numeric"));
    }

    #[test]
    fn uniqueness_is_one_when_no_values() {
        let records = vec![
            record(serde_json::json!({"note": null})),
            record(serde_json::json!({"note": ""})),
        ];
        let profile = profile(&records);
        let note = &profile.field_profiles["note"];
        assert_eq!(note.completeness, 0.0);
        assert_eq!(note.uniqueness, 1.0);
    }

    #[test]
    fn profile_counts_distinct_fields() {
        let records = vec![
            record(serde_json::json!({"a": 1, "b": "x"})),
            record(serde_json::json!({"b": "x", "c": true})),
        ];
        let profile = profile(&records);
        assert_eq!(profile.total_records, 2);
        assert_eq!(profile.total_fields, 3);
        let b = &profile.field_profiles["b"];
        assert_eq!(b.completeness, 1.0);
        assert_eq!(b.uniqueness, 0.5);
        assert_eq!(b.inferred_type, "string");
    }

    #[test]
    fn validate_is_deterministic() {
        let records = vec![
            record(serde_json::json!({"email": "a@b.co", "age": 4})),
            record(serde_json::json!({"email": "nope", "age": 500})),
        ];
        let first = validate(&records, &rules());
        let second = validate(&records, &rules());
        assert_eq!(first.errors.len(), second.errors.len());
        for (a, b) in first.errors.iter().zip(second.errors.iter()) {
            assert_eq!(a.record_index, b.record_index);
            assert_eq!(a.field, b.field);
            assert_eq!(a.message, b.message);
        }
    }
}
